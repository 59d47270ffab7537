//! Compilation engine for guests written directly as WebAssembly.
//!
//! The session text is a module in text format; the compiled assembly is that
//! text, which the execution host compiles (and caches) itself. Each import
//! becomes a call site located at the line that declares it.

use std::sync::Arc;

use crate::compilation::assembly::{AssemblyStreams, CompiledAssembly};
use crate::compilation::diagnostics::Diagnostic;
use crate::compilation::pipeline::{CompilationEngine, CompileOutput};
use crate::compilation::session::CompilationSession;
use crate::policy::rewriter::CallSite;
use crate::sandbox::executor::ExecutionHost;
use crate::sandbox::host_api;

/// Diagnostic id for modules that fail to compile.
pub const INVALID_MODULE_ID: &str = "WASM0001";

/// Engine that accepts WebAssembly text and describes its imports.
#[derive(Debug, Clone)]
pub struct WasmEngine {
    host: Arc<ExecutionHost>,
}

impl WasmEngine {
    /// Compile through `host`, so the module is cached for execution.
    pub fn new(host: Arc<ExecutionHost>) -> Self {
        Self { host }
    }
}

impl CompilationEngine for WasmEngine {
    fn compile(&self, session: &CompilationSession) -> CompileOutput {
        let text = session.text();
        match self.host.load_module(text.as_bytes()) {
            Ok(module) => {
                let references = host_api::describe_imports(&module)
                    .into_iter()
                    .map(|site| locate(text, site))
                    .collect();
                CompileOutput {
                    assembly: Some(CompiledAssembly::new(AssemblyStreams::new(text), references)),
                    diagnostics: Vec::new(),
                }
            }
            Err(error) => CompileOutput {
                assembly: None,
                diagnostics: vec![Diagnostic::error(INVALID_MODULE_ID, error.to_string())],
            },
        }
    }
}

fn locate(text: &str, site: CallSite) -> CallSite {
    let needle = format!("\"{}\" \"{}\"", site.member.type_path(), site.member.member());
    match text.lines().position(|line| line.contains(&needle)) {
        Some(index) => site.at_line(index as u32 + 1),
        None => site,
    }
}
