//! Prelude module for convenient imports.

pub use crate::compilation::{
    CompilationEngine, CompilationSession, InspectionBackend, Pipeline, UpdateOutput,
    UpdateResult, WasmEngine,
};
pub use crate::error::{FailureKind, Result, SandboxError};
pub use crate::languages::{global_registry, names, targets, LanguageAdapter};
pub use crate::options::{self, OptionDispatcher};
pub use crate::policy::{global_policy, AccessLevel, MemberRef, PolicyEnforcer};
pub use crate::sandbox::{
    config::SandboxConfig,
    executor::{ExecutionHost, ExecutionResult, ExecutionStatus},
    flow::FlowEvent,
};
