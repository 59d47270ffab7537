//! Per-request pipeline: compile, enforce, then run or inspect.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::compilation::assembly::{AssemblyStreams, CompiledAssembly};
use crate::compilation::diagnostics::Diagnostic;
use crate::compilation::session::CompilationSession;
use crate::error::{FailureKind, Result, SandboxError};
use crate::languages::targets;
use crate::macros::{debug, log_warn};
use crate::policy::enforcement::PolicyEnforcer;
use crate::sandbox::executor::{ExecutionHost, ExecutionResult};

/// What a compiler front end produced for one request.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// The compiled assembly, absent when compilation failed.
    pub assembly: Option<CompiledAssembly>,
    /// Every diagnostic the compiler reported.
    pub diagnostics: Vec<Diagnostic>,
}

/// Compiler front end for one or more languages.
///
/// Compilation is synchronous and CPU-bound. The engine reads the session's
/// text, options and references and must not keep them.
pub trait CompilationEngine: Send + Sync {
    /// Compile the session's current text.
    fn compile(&self, session: &CompilationSession) -> CompileOutput;
}

/// Renders a verified assembly for a non-executing target.
pub trait InspectionBackend: Send + Sync {
    /// Produce the textual view of `streams`.
    ///
    /// The streams are only borrowed for the duration of the call.
    fn inspect(&self, session: &CompilationSession, streams: &AssemblyStreams) -> Result<String>;
}

/// Successful output of a request.
#[derive(Debug, Clone)]
pub enum UpdateOutput {
    /// Text from an inspection backend.
    Inspection(String),
    /// Result of running the assembly.
    Execution(ExecutionResult),
}

/// Why a request produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Category of the failure.
    pub kind: FailureKind,
    /// Human-readable message.
    pub message: String,
}

impl From<&SandboxError> for Failure {
    fn from(error: &SandboxError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Everything a client receives for one request.
#[derive(Debug, Clone, Default)]
pub struct UpdateResult {
    /// Compiler and policy diagnostics, in report order.
    pub diagnostics: Vec<Diagnostic>,
    /// Output, when the request succeeded.
    pub output: Option<UpdateOutput>,
    /// Failure, when it did not.
    pub failure: Option<Failure>,
}

impl UpdateResult {
    /// Whether the request produced output.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Drives a session's text through compilation, policy enforcement and the
/// selected target.
pub struct Pipeline {
    engine: Arc<dyn CompilationEngine>,
    enforcer: PolicyEnforcer,
    backends: BTreeMap<String, Arc<dyn InspectionBackend>>,
    host: Option<Arc<ExecutionHost>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline enforcing the process-wide policy, with no backends
    /// and no execution host.
    pub fn new(engine: Arc<dyn CompilationEngine>) -> Self {
        Self {
            engine,
            enforcer: PolicyEnforcer::global(),
            backends: BTreeMap::new(),
            host: None,
        }
    }

    /// Enforce a different policy.
    pub fn with_enforcer(mut self, enforcer: PolicyEnforcer) -> Self {
        self.enforcer = enforcer;
        self
    }

    /// Register the backend for an inspection target.
    pub fn with_backend(mut self, target: impl Into<String>, backend: Arc<dyn InspectionBackend>) -> Self {
        self.backends.insert(target.into(), backend);
        self
    }

    /// Run `Run` requests on `host`.
    pub fn with_host(mut self, host: Arc<ExecutionHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Process the session's current text for its current target.
    ///
    /// Never fails: errors are reported through [`UpdateResult::failure`],
    /// and policy violations also appear as diagnostics.
    pub async fn update(&self, session: &CompilationSession) -> UpdateResult {
        let mut diagnostics = Vec::new();
        match self.run(session, &mut diagnostics).await {
            Ok(output) => UpdateResult {
                diagnostics,
                output: Some(output),
                failure: None,
            },
            Err(error) => {
                if let SandboxError::PolicyViolation(violations) = &error {
                    diagnostics.extend(violations.iter().map(|v| v.to_diagnostic()));
                }
                log_warn!(language = session.language_name(), %error, "request failed");
                UpdateResult {
                    diagnostics,
                    output: None,
                    failure: Some(Failure::from(&error)),
                }
            }
        }
    }

    async fn run(&self, session: &CompilationSession, diagnostics: &mut Vec<Diagnostic>) -> Result<UpdateOutput> {
        check_cancelled(session)?;
        let target = session.target().unwrap_or(targets::RUN);
        let adapter = session.adapter();
        if let Some(construct) = adapter
            .find_constructs(session)
            .into_iter()
            .find(|construct| !adapter.supports(target, construct))
        {
            return Err(SandboxError::NotSupported {
                construct: construct.to_string(),
                target: target.to_string(),
            });
        }

        let compiled = self.engine.compile(session);
        let suppressed = &session.compilation_options.suppressed_diagnostics;
        diagnostics.extend(
            compiled
                .diagnostics
                .into_iter()
                .filter(|d| !suppressed.contains(&d.id)),
        );
        let errors: Vec<Diagnostic> = diagnostics.iter().filter(|d| d.is_error()).cloned().collect();
        let assembly = match compiled.assembly {
            Some(assembly) if errors.is_empty() => assembly,
            _ => return Err(SandboxError::Compilation(errors)),
        };
        check_cancelled(session)?;

        let verified = self.enforcer.enforce(assembly)?;
        check_cancelled(session)?;
        debug!(language = session.language_name(), %target, "assembly verified");

        if target == targets::RUN {
            let host = self
                .host
                .as_ref()
                .ok_or_else(|| SandboxError::Config("no execution host configured".to_string()))?;
            let result = host.execute_with_cancel(&verified, &session.cancel_handle()).await?;
            return Ok(UpdateOutput::Execution(result));
        }

        let backend = self
            .backends
            .get(target)
            .ok_or_else(|| SandboxError::InvalidOption {
                name: crate::options::TARGET.to_string(),
                value: target.to_string(),
            })?;
        let text = backend.inspect(session, verified.streams())?;
        Ok(UpdateOutput::Inspection(text))
    }
}

fn check_cancelled(session: &CompilationSession) -> Result<()> {
    if session.is_cancelled() {
        return Err(SandboxError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilation::diagnostics::Severity;
    use crate::languages::{global_registry, names};
    use crate::policy::rewriter::{CallSite, ParamShape};

    struct FixedEngine(CompileOutput);

    impl CompilationEngine for FixedEngine {
        fn compile(&self, _session: &CompilationSession) -> CompileOutput {
            self.0.clone()
        }
    }

    struct LengthBackend;

    impl InspectionBackend for LengthBackend {
        fn inspect(&self, _session: &CompilationSession, streams: &AssemblyStreams) -> Result<String> {
            Ok(format!("{} bytes", streams.binary().len()))
        }
    }

    fn assembly(member: &str) -> CompiledAssembly {
        CompiledAssembly::new(
            AssemblyStreams::new(vec![1, 2, 3]),
            vec![CallSite::new(member.parse().unwrap(), vec![ParamShape::Value]).at_line(2)],
        )
    }

    fn session(target: &str) -> CompilationSession {
        let mut session = global_registry().start_session(names::CSHARP).unwrap();
        session.set_target(target);
        session
    }

    #[tokio::test]
    async fn test_inspection_target() {
        let engine = FixedEngine(CompileOutput {
            assembly: Some(assembly("System.Console::WriteLine")),
            diagnostics: vec![],
        });
        let pipeline = Pipeline::new(Arc::new(engine)).with_backend(targets::IL, Arc::new(LengthBackend));

        let result = pipeline.update(&session(targets::IL)).await;
        assert!(result.is_success());
        assert!(matches!(result.output, Some(UpdateOutput::Inspection(ref text)) if text == "3 bytes"));
    }

    #[tokio::test]
    async fn test_violation_reported_as_diagnostic() {
        let engine = FixedEngine(CompileOutput {
            assembly: Some(assembly("System.IO.File::ReadAllText")),
            diagnostics: vec![],
        });
        let pipeline = Pipeline::new(Arc::new(engine)).with_backend(targets::IL, Arc::new(LengthBackend));

        let result = pipeline.update(&session(targets::IL)).await;
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::PolicyViolation);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].line, Some(2));
        assert!(result.output.is_none());
    }

    #[tokio::test]
    async fn test_suppressed_diagnostics_dropped() {
        let engine = FixedEngine(CompileOutput {
            assembly: Some(assembly("System.Console::WriteLine")),
            diagnostics: vec![
                Diagnostic::warning("CS1591", "missing XML comment"),
                Diagnostic::warning("CS0168", "unused variable"),
            ],
        });
        let pipeline = Pipeline::new(Arc::new(engine)).with_backend(targets::IL, Arc::new(LengthBackend));

        let result = pipeline.update(&session(targets::IL)).await;
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].id, "CS0168");
        assert_eq!(result.diagnostics[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_compile_errors_stop_the_request() {
        let engine = FixedEngine(CompileOutput {
            assembly: None,
            diagnostics: vec![Diagnostic::error("CS1002", "; expected").at(1, 10)],
        });
        let result = Pipeline::new(Arc::new(engine)).update(&session(targets::RUN)).await;
        assert_eq!(result.failure.unwrap().kind, FailureKind::Compilation);
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_target_and_missing_host() {
        let engine: Arc<dyn CompilationEngine> = Arc::new(FixedEngine(CompileOutput {
            assembly: Some(assembly("System.Console::WriteLine")),
            diagnostics: vec![],
        }));
        let pipeline = Pipeline::new(engine);

        let unknown = pipeline.update(&session(targets::AST)).await;
        assert_eq!(unknown.failure.unwrap().kind, FailureKind::InvalidRequest);

        let no_host = pipeline.update(&session(targets::RUN)).await;
        assert_eq!(no_host.failure.unwrap().kind, FailureKind::Internal);
    }

    #[tokio::test]
    async fn test_cancelled_session() {
        let engine = FixedEngine(CompileOutput::default());
        let session = session(targets::IL);
        session.cancel();

        let result = Pipeline::new(Arc::new(engine)).update(&session).await;
        assert_eq!(result.failure.unwrap().kind, FailureKind::Cancelled);
    }
}
