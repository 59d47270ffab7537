//! C# adapter.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::syntax;
use super::{names, targets, LanguageAdapter, LanguageDefaults, SharedOptions, SourcePosition};
use crate::compilation::assembly::Construct;
use crate::compilation::session::{
    CompilationOptions, CompilationSession, DocumentationMode, OptimizationLevel, OutputKind,
    ParseOptions, ReferenceSet,
};

/// Newest language version the front end accepts.
pub const MAX_LANGUAGE_VERSION: &str = "preview";

/// Missing XML comment for publicly visible type or member.
const MISSING_XML_COMMENT: &str = "CS1591";

const RELEASE_SYMBOLS: [&str; 1] = ["__DEMO_EXPERIMENTAL__"];
const DEBUG_SYMBOLS: [&str; 2] = ["__DEMO_EXPERIMENTAL__", "DEBUG"];

const REFERENCES: [&str; 9] = [
    "System.Runtime",
    "System.Threading.Tasks.Extensions",
    "System.ValueTuple",
    "System.Memory",
    "Microsoft.CSharp",
    "CodeLab.Runtime",
    "System.Xml.Linq",
    "System.Data",
    "System.Web",
];

fn symbols(level: OptimizationLevel) -> Vec<String> {
    let symbols: &[&str] = match level {
        OptimizationLevel::Debug => &DEBUG_SYMBOLS,
        OptimizationLevel::Release => &RELEASE_SYMBOLS,
    };
    symbols.iter().map(|s| s.to_string()).collect()
}

/// Adapter for C#.
#[derive(Debug, Clone, Copy, Default)]
pub struct CSharpAdapter;

impl LanguageAdapter for CSharpAdapter {
    fn language_name(&self) -> &'static str {
        names::CSHARP
    }

    fn configure(&self, shared: &SharedOptions) -> LanguageDefaults {
        LanguageDefaults {
            parse_options: ParseOptions {
                language_version: MAX_LANGUAGE_VERSION.to_string(),
                preprocessor_symbols: symbols(OptimizationLevel::Debug),
                documentation_mode: DocumentationMode::Diagnose,
                features: shared.features.clone(),
            },
            compilation_options: CompilationOptions {
                output_kind: OutputKind::DynamicallyLinkedLibrary,
                optimization: OptimizationLevel::Debug,
                allow_unsafe: false,
                suppressed_diagnostics: BTreeSet::from([MISSING_XML_COMMENT.to_string()]),
                other_flags: Vec::new(),
            },
            references: Arc::new(ReferenceSet::new(REFERENCES).extended(&shared.extra_references)),
        }
    }

    fn set_optimization(&self, session: &mut CompilationSession, level: OptimizationLevel) {
        session.parse_options.preprocessor_symbols = symbols(level);
        session.compilation_options.optimization = level;
    }

    fn set_options_for_target(&self, session: &mut CompilationSession, target: &str) {
        let run = target == targets::RUN;
        let options = &mut session.compilation_options;
        options.output_kind = if run {
            OutputKind::ConsoleApplication
        } else {
            OutputKind::DynamicallyLinkedLibrary
        };
        // Unsafe code is only ever inspected, never executed.
        options.allow_unsafe = !run;
    }

    fn method_parameter_lines(&self, session: &CompilationSession, position: SourcePosition) -> Vec<u32> {
        syntax::scan(session.text())
            .method_at(position)
            .map(|method| method.parameter_lines.clone())
            .unwrap_or_default()
    }

    fn find_constructs(&self, session: &CompilationSession) -> Vec<Construct> {
        syntax::scan(session.text())
            .static_initializers
            .into_iter()
            .map(|s| Construct::StaticInitializer { type_name: s.type_name })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(text: &str) -> CompilationSession {
        let adapter = Arc::new(CSharpAdapter);
        let defaults = adapter.configure(&SharedOptions::default());
        let mut session = CompilationSession::new(adapter, &defaults);
        session.set_text(text);
        session
    }

    #[test]
    fn test_defaults() {
        let defaults = CSharpAdapter.configure(
            &SharedOptions::builder()
                .feature("strict")
                .extra_reference("System.Numerics")
                .build(),
        );
        assert_eq!(defaults.parse_options.language_version, MAX_LANGUAGE_VERSION);
        assert_eq!(defaults.parse_options.documentation_mode, DocumentationMode::Diagnose);
        assert_eq!(defaults.parse_options.features, ["strict"]);
        assert!(defaults.compilation_options.suppressed_diagnostics.contains("CS1591"));
        assert!(defaults.references.contains("CodeLab.Runtime"));
        assert!(defaults.references.contains("System.Numerics"));
    }

    #[test]
    fn test_optimization_switches_symbols() {
        let mut session = session("");
        CSharpAdapter.set_optimization(&mut session, OptimizationLevel::Release);
        assert_eq!(session.parse_options.preprocessor_symbols, ["__DEMO_EXPERIMENTAL__"]);
        assert_eq!(session.optimization(), OptimizationLevel::Release);

        CSharpAdapter.set_optimization(&mut session, OptimizationLevel::Debug);
        assert_eq!(
            session.parse_options.preprocessor_symbols,
            ["__DEMO_EXPERIMENTAL__", "DEBUG"]
        );
    }

    #[test]
    fn test_target_controls_output_and_unsafe() {
        let mut session = session("");
        CSharpAdapter.set_options_for_target(&mut session, targets::RUN);
        assert_eq!(session.compilation_options.output_kind, OutputKind::ConsoleApplication);
        assert!(!session.compilation_options.allow_unsafe);

        CSharpAdapter.set_options_for_target(&mut session, targets::IL);
        assert_eq!(session.compilation_options.output_kind, OutputKind::DynamicallyLinkedLibrary);
        assert!(session.compilation_options.allow_unsafe);
    }

    #[test]
    fn test_static_initializer_unsupported_for_jit_asm() {
        let session = session("class C { static int F = 0; }");
        let constructs = CSharpAdapter.find_constructs(&session);
        assert_eq!(
            constructs,
            vec![Construct::StaticInitializer { type_name: "C".to_string() }]
        );
        assert!(!CSharpAdapter.supports(targets::JIT_ASM, &constructs[0]));
        assert!(CSharpAdapter.supports(targets::IL, &constructs[0]));
    }
}
