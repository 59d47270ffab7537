//! Execution host: Wasm stores, limits, host members and flow capture.

pub mod cache;
pub mod config;
pub mod executor;
pub mod flow;
pub mod host_api;
pub mod io;
pub mod limits;

pub use cache::{ModuleCache, SharedEngine};
pub use config::{SandboxConfig, SandboxConfigBuilder};
pub use executor::{ExecutionHost, ExecutionMetadata, ExecutionResult, ExecutionStatus};
pub use flow::FlowEvent;
