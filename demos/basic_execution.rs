//! Basic example of running a guest through the full request pipeline.
//!
//! Run with: cargo run --example basic_execution

use std::sync::Arc;
use std::time::Duration;

use codelab_sandbox_rs::prelude::*;

const HELLO: &str = r#"(module
    (import "CodeLab.Runtime.Internal.Flow" "ReportLineStart" (func $line (param i32)))
    (import "CodeLab.Runtime.Internal.Flow" "ReportValue" (func $value (param i32 i32 i32 i32 i32)))
    (import "System.Console" "WriteLine" (func $println (param i32 i32)))
    (memory (export "memory") 1)
    (data (i32.const 0) "Hello, World!answer42")
    (func (export "_start")
        (call $line (i32.const 1))
        (call $println (i32.const 0) (i32.const 13))
        (call $line (i32.const 2))
        (call $value (i32.const 2) (i32.const 13) (i32.const 6) (i32.const 19) (i32.const 2))))"#;

const FORBIDDEN: &str = r#"(module
    (import "System.IO.File" "ReadAllText" (func $read (param i32 i32) (result i32)))
    (func (export "_start") (drop (call $read (i32.const 0) (i32.const 0)))))"#;

const SPIN: &str = r#"(module (func (export "_start") (loop $spin (br $spin))))"#;

fn print_result(result: &UpdateResult) {
    for diagnostic in &result.diagnostics {
        println!("diagnostic: {}", diagnostic);
    }
    if let Some(failure) = &result.failure {
        println!("failed ({:?}): {}", failure.kind, failure.message);
    }
    if let Some(UpdateOutput::Execution(execution)) = &result.output {
        println!("stdout: {}", execution.stdout.trim_end());
        for event in &execution.flow {
            println!("flow: {}", event);
        }
        println!("duration: {:?}", execution.metadata.duration);
        println!("peak_memory: {} bytes", execution.metadata.peak_memory);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = SandboxConfig::builder()
        .timeout(Duration::from_secs(1))
        .max_memory(32 * 1024 * 1024) // 32MB
        .build();
    println!("Creating execution host with config: {:?}", config);

    let host = Arc::new(ExecutionHost::new(config)?);
    let pipeline = Pipeline::new(Arc::new(WasmEngine::new(Arc::clone(&host)))).with_host(host);

    let mut session = global_registry().start_session(names::CSHARP)?;
    OptionDispatcher::new().apply(&mut session, options::TARGET, targets::RUN)?;

    println!("\n=== Test 1: Hello world ===");
    session.set_text(HELLO);
    print_result(&pipeline.update(&session).await);

    println!("\n=== Test 2: Denied API ===");
    session.set_text(FORBIDDEN);
    print_result(&pipeline.update(&session).await);

    println!("\n=== Test 3: Infinite loop ===");
    session.set_text(SPIN);
    print_result(&pipeline.update(&session).await);

    Ok(())
}
