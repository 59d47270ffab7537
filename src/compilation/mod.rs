//! Compilation sessions, diagnostics and the per-request pipeline.

pub mod assembly;
pub mod diagnostics;
pub mod pipeline;
pub mod session;
pub mod wasm;

pub use assembly::{AssemblyStreams, CompiledAssembly, Construct};
pub use diagnostics::{Diagnostic, Severity};
pub use pipeline::{
    CompilationEngine, CompileOutput, Failure, InspectionBackend, Pipeline, UpdateOutput,
    UpdateResult,
};
pub use session::{
    CancelHandle, CompilationOptions, CompilationSession, DocumentationMode, OptimizationLevel,
    OutputKind, ParseOptions, ReferenceSet,
};
pub use wasm::WasmEngine;
