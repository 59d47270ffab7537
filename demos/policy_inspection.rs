//! Inspect the API policy and the per-language session defaults.
//!
//! Run with: cargo run --example policy_inspection [Namespace.Type::Member ...]

use codelab_sandbox_rs::policy::Decision;
use codelab_sandbox_rs::prelude::*;

const SAMPLES: &[&str] = &[
    "System.Console::WriteLine",
    "System.Console::ReadLine",
    "System.Math::Max",
    "System.String::Intern",
    "System.IO.File::ReadAllText",
    "System.Threading.Thread::Sleep",
    "System.Linq.Enumerable::Sum",
    "System.Reflection.MethodInfo::get_Name",
    "System.Reflection.MethodInfo::Invoke",
    "System.Linq.Expressions.LambdaExpression::Compile",
    "Microsoft.FSharp.Core.Operators::Lock",
    "Microsoft.FSharp.Core.ExtraTopLevelOperators::CreateSet",
];

fn main() -> Result<()> {
    let policy = global_policy();
    println!(
        "policy built from surface {} with {} nodes",
        policy.surface_version(),
        policy.node_count()
    );

    let requested: Vec<String> = std::env::args().skip(1).collect();
    let members: Vec<&str> = if requested.is_empty() {
        SAMPLES.to_vec()
    } else {
        requested.iter().map(String::as_str).collect()
    };

    println!("\n=== Decisions ===");
    for path in members {
        let member: MemberRef = path.parse()?;
        match policy.resolve(&member) {
            Decision::Allowed(Some(rewriter)) => println!("{member}: allowed via {}", rewriter.name()),
            Decision::Allowed(None) => println!("{member}: allowed"),
            Decision::Denied(reason) => println!("{member}: denied ({reason:?})"),
        }
    }

    println!("\n=== Language defaults ===");
    let dispatcher = OptionDispatcher::new();
    for language in global_registry().languages() {
        let mut session = global_registry().start_session(language)?;
        for level in ["debug", "release"] {
            dispatcher.apply(&mut session, options::OPTIMIZE, level)?;
            println!(
                "{language} [{level}]: version {}, symbols {:?}, flags {:?}",
                session.parse_options.language_version,
                session.parse_options.preprocessor_symbols,
                session.compilation_options.other_flags,
            );
        }
        println!("{language} references: {:?}", session.references().libraries());
    }

    Ok(())
}
