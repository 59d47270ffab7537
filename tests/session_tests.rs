//! Session, option dispatch and pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codelab_sandbox_rs::compilation::{
    AssemblyStreams, CompileOutput, CompiledAssembly, OptimizationLevel, OutputKind,
};
use codelab_sandbox_rs::languages::SourcePosition;
use codelab_sandbox_rs::policy::enforcement::POLICY_VIOLATION_ID;
use codelab_sandbox_rs::prelude::*;

/// Engine returning an empty assembly and counting its invocations.
#[derive(Default)]
struct CountingEngine {
    calls: AtomicUsize,
}

impl CompilationEngine for CountingEngine {
    fn compile(&self, _session: &CompilationSession) -> CompileOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        CompileOutput {
            assembly: Some(CompiledAssembly::new(AssemblyStreams::new(vec![0u8]), Vec::new())),
            diagnostics: Vec::new(),
        }
    }
}

struct EchoBackend;

impl InspectionBackend for EchoBackend {
    fn inspect(&self, session: &CompilationSession, _streams: &AssemblyStreams) -> Result<String> {
        Ok(format!("{} for {}", session.target().unwrap_or_default(), session.language_name()))
    }
}

fn session(language: &str, target: &str, text: &str) -> CompilationSession {
    let mut session = global_registry().start_session(language).unwrap();
    OptionDispatcher::new()
        .apply(&mut session, options::TARGET, target)
        .unwrap();
    session.set_text(text);
    session
}

fn wasm_pipeline() -> Pipeline {
    let host = Arc::new(ExecutionHost::new(SandboxConfig::default()).unwrap());
    Pipeline::new(Arc::new(WasmEngine::new(Arc::clone(&host)))).with_host(host)
}

#[test]
fn test_every_language_accepts_options() {
    let dispatcher = OptionDispatcher::new();
    for language in global_registry().languages() {
        let mut session = global_registry().start_session(language).unwrap();
        let unhandled = dispatcher
            .apply_all(
                &mut session,
                [
                    (options::OPTIMIZE, "release"),
                    (options::TARGET, targets::IL),
                    ("x-editor", "vim"),
                ],
            )
            .unwrap();

        assert_eq!(unhandled, ["x-editor"], "{language}");
        assert_eq!(session.optimization(), OptimizationLevel::Release, "{language}");
        assert_eq!(session.target(), Some(targets::IL), "{language}");
    }
}

#[test]
fn test_sessions_are_independent() {
    let mut release = global_registry().start_session(names::CSHARP).unwrap();
    let debug = global_registry().start_session(names::CSHARP).unwrap();
    OptionDispatcher::new()
        .apply(&mut release, options::OPTIMIZE, "release")
        .unwrap();

    assert_eq!(release.optimization(), OptimizationLevel::Release);
    assert_eq!(debug.optimization(), OptimizationLevel::Debug);
    assert!(debug
        .parse_options
        .preprocessor_symbols
        .contains(&"DEBUG".to_string()));
}

#[test]
fn test_run_target_builds_console_application() {
    let csharp = session(names::CSHARP, targets::RUN, "");
    assert_eq!(csharp.compilation_options.output_kind, OutputKind::ConsoleApplication);
    assert!(!csharp.compilation_options.allow_unsafe);

    let fsharp = session(names::FSHARP, targets::RUN, "");
    assert_eq!(fsharp.compilation_options.output_kind, OutputKind::DynamicallyLinkedLibrary);
}

#[test]
fn test_method_parameter_lines() {
    let text = "class Calc\n{\n    int Add(int a,\n            int b)\n    {\n        return a + b;\n    }\n}\n";
    let session = session(names::CSHARP, targets::RUN, text);
    let adapter = session.adapter();

    assert_eq!(
        adapter.method_parameter_lines(&session, SourcePosition::new(6, 9)),
        [3, 4]
    );
    assert!(adapter
        .method_parameter_lines(&session, SourcePosition::new(1, 1))
        .is_empty());
}

#[test]
fn test_static_initializer_not_supported_for_jit_asm() {
    let engine = Arc::new(CountingEngine::default());
    let pipeline = Pipeline::new(engine.clone())
        .with_backend(targets::JIT_ASM, Arc::new(EchoBackend))
        .with_backend(targets::IL, Arc::new(EchoBackend));
    let text = "class Counter\n{\n    static int next = 1;\n}\n";

    let jit = tokio_test::block_on(pipeline.update(&session(names::CSHARP, targets::JIT_ASM, text)));
    let failure = jit.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::NotSupported);
    assert!(failure.message.contains("Counter"));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);

    let il = tokio_test::block_on(pipeline.update(&session(names::CSHARP, targets::IL, text)));
    assert!(il.is_success());
    assert!(matches!(il.output, Some(UpdateOutput::Inspection(ref text)) if text == "IL for C#"));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shared_initializers_not_supported_for_jit_asm() {
    let engine = Arc::new(CountingEngine::default());
    let pipeline = Pipeline::new(engine.clone()).with_backend(targets::JIT_ASM, Arc::new(EchoBackend));

    let vb = tokio_test::block_on(pipeline.update(&session(
        names::VISUAL_BASIC,
        targets::JIT_ASM,
        "Class C\n    Shared F As Integer = 0\nEnd Class\n",
    )));
    let failure = vb.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::NotSupported);
    assert!(failure.message.contains("`C`"));

    let fsharp = tokio_test::block_on(pipeline.update(&session(
        names::FSHARP,
        targets::JIT_ASM,
        "module Lookup\nlet table = dict [ 1, \"one\" ]\n",
    )));
    assert_eq!(fsharp.failure.unwrap().kind, FailureKind::NotSupported);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);

    let functions_only = tokio_test::block_on(pipeline.update(&session(
        names::FSHARP,
        targets::JIT_ASM,
        "module Lookup\nlet find key = key + 1\n",
    )));
    assert!(functions_only.is_success());
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_through_pipeline() {
    let wat = r#"(module
        (import "System.Console" "WriteLine" (func $println (param i32 i32)))
        (memory (export "memory") 1)
        (data (i32.const 0) "Hello, World!")
        (func (export "_start") (call $println (i32.const 0) (i32.const 13))))"#;

    let result = wasm_pipeline()
        .update(&session(names::CSHARP, targets::RUN, wat))
        .await;
    assert!(result.is_success(), "{:?}", result.failure);
    match result.output {
        Some(UpdateOutput::Execution(execution)) => {
            assert!(execution.is_success());
            assert_eq!(execution.stdout, "Hello, World!\n");
        }
        other => panic!("expected execution output, got {other:?}"),
    }
}

#[tokio::test]
async fn test_policy_violation_through_pipeline() {
    let wat = "(module\n  (import \"System.IO.File\" \"Delete\" (func (param i32 i32)))\n  (func (export \"_start\")))";

    let result = wasm_pipeline()
        .update(&session(names::VISUAL_BASIC, targets::RUN, wat))
        .await;
    assert_eq!(result.failure.unwrap().kind, FailureKind::PolicyViolation);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].id, POLICY_VIOLATION_ID);
    assert_eq!(result.diagnostics[0].line, Some(2));
    assert!(result.output.is_none());
}

#[tokio::test]
async fn test_invalid_module_is_a_compilation_failure() {
    let result = wasm_pipeline()
        .update(&session(names::FSHARP, targets::RUN, "(module (func"))
        .await;
    assert_eq!(result.failure.unwrap().kind, FailureKind::Compilation);
    assert!(result.diagnostics[0].is_error());
}

#[tokio::test]
async fn test_cancel_session_during_run() {
    let session = session(
        names::CSHARP,
        targets::RUN,
        r#"(module (func (export "_start") (loop $spin (br $spin))))"#,
    );
    let handle = session.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let result = wasm_pipeline().update(&session).await;
    assert_eq!(result.failure.unwrap().kind, FailureKind::Cancelled);
}
