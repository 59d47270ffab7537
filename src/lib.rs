//! # CodeLab Sandbox
//!
//! Compile sessions for C#, Visual Basic and F# gated by a declarative API
//! policy, with verified programs executed in a WebAssembly sandbox.
//!
//! Every request flows through the same stages:
//!
//! 1. A [`CompilationSession`] holds the text and the options selected for its
//!    language by a [`LanguageAdapter`](languages::LanguageAdapter).
//! 2. A [`CompilationEngine`](compilation::CompilationEngine) compiles it and
//!    reports the library members the code references.
//! 3. The [`PolicyEnforcer`] checks every reference against the policy tree and
//!    attaches guards to allowed call sites.
//! 4. The verified assembly is either rendered by an inspection backend or run
//!    by the [`ExecutionHost`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use codelab_sandbox_rs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let host = Arc::new(ExecutionHost::new(SandboxConfig::default())?);
//!     let pipeline = Pipeline::new(Arc::new(WasmEngine::new(Arc::clone(&host)))).with_host(host);
//!
//!     let mut session = global_registry().start_session(names::CSHARP)?;
//!     OptionDispatcher::new().apply(&mut session, options::TARGET, targets::RUN)?;
//!     session.set_text(GUEST_WAT);
//!
//!     let result = pipeline.update(&session).await;
//!     assert!(result.is_success());
//!     Ok(())
//! }
//! ```
//!
//! ## Security Model
//!
//! 1. **API policy**: references to denied members fail the request before anything runs
//! 2. **Import verification**: the host links only imports that enforcement verified
//! 3. **Guards**: sequence and count arguments are bounded at the call boundary
//! 4. **Resource limits**: memory, fuel and wall-clock time are bounded
//! 5. **Epoch interruption**: cooperative timeout and cancellation even for tight loops

mod macros;

pub mod compilation;
pub mod error;
pub mod languages;
pub mod options;
pub mod policy;
pub mod prelude;
pub mod sandbox;

// Re-export main types at crate root for convenience
pub use compilation::{CompilationSession, Pipeline, UpdateResult, WasmEngine};
pub use error::{FailureKind, PolicyBuildError, Result, SandboxError};
pub use languages::{global_registry, LanguageRegistry};
pub use options::OptionDispatcher;
pub use policy::{global_policy, PolicyEnforcer, PolicyTree};
pub use sandbox::cache::{ModuleCache, SharedEngine};
pub use sandbox::config::{SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::{ExecutionHost, ExecutionMetadata, ExecutionResult, ExecutionStatus};
