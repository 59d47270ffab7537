//! F# adapter.
//!
//! The F# front end takes its settings as command-line switches, so debug and
//! optimization state is kept in `other_flags`.

use std::sync::Arc;

use super::{names, set_symbol, LanguageAdapter, LanguageDefaults, SharedOptions};
use crate::compilation::assembly::Construct;
use crate::compilation::session::{
    CompilationOptions, CompilationSession, OptimizationLevel, OutputKind, ParseOptions,
    ReferenceSet,
};

/// Language version of the bundled F# front end.
pub const LANGUAGE_VERSION: &str = "4.5";

const DEFINE_DEBUG: &str = "--define:DEBUG";

const REFERENCES: [&str; 5] = [
    "System.Runtime",
    "FSharp.Core",
    "System.Threading.Tasks",
    "CodeLab.Runtime",
    "System.Data",
];

/// Set a `--name+` / `--name-` switch, replacing any previous value.
fn set_switch(flags: &mut Vec<String>, name: &str, on: bool) {
    let plus = format!("--{name}+");
    let minus = format!("--{name}-");
    flags.retain(|f| *f != plus && *f != minus);
    flags.push(if on { plus } else { minus });
}

fn apply_level(flags: &mut Vec<String>, level: OptimizationLevel) {
    let debug = level == OptimizationLevel::Debug;
    set_switch(flags, "debug", debug);
    set_switch(flags, "optimize", !debug);
    set_symbol(flags, DEFINE_DEBUG, debug);
}

/// Adapter for F#.
///
/// Run targets stay libraries: the entry point is supplied by the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct FSharpAdapter;

impl LanguageAdapter for FSharpAdapter {
    fn language_name(&self) -> &'static str {
        names::FSHARP
    }

    fn configure(&self, shared: &SharedOptions) -> LanguageDefaults {
        let mut other_flags = Vec::new();
        apply_level(&mut other_flags, OptimizationLevel::Debug);
        LanguageDefaults {
            parse_options: ParseOptions {
                language_version: LANGUAGE_VERSION.to_string(),
                features: shared.features.clone(),
                ..ParseOptions::default()
            },
            compilation_options: CompilationOptions {
                output_kind: OutputKind::DynamicallyLinkedLibrary,
                other_flags,
                ..CompilationOptions::default()
            },
            references: Arc::new(ReferenceSet::new(REFERENCES).extended(&shared.extra_references)),
        }
    }

    fn set_optimization(&self, session: &mut CompilationSession, level: OptimizationLevel) {
        apply_level(&mut session.compilation_options.other_flags, level);
        session.compilation_options.optimization = level;
    }

    fn set_options_for_target(&self, _session: &mut CompilationSession, _target: &str) {}

    fn find_constructs(&self, session: &CompilationSession) -> Vec<Construct> {
        static_bindings(session.text())
            .into_iter()
            .map(|type_name| Construct::StaticInitializer { type_name })
            .collect()
    }
}

/// Name of the module wrapping a file without a `module` declaration.
const IMPLICIT_MODULE: &str = "Program";

const BINDING_MODIFIERS: [&str; 6] = ["rec", "mutable", "private", "internal", "public", "inline"];

enum Scope {
    Module(String),
    Type(String),
    Expr,
}

fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut previous = ' ';
    for (index, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '/' if previous == '/' && !in_string => return &line[..index - 1],
            _ => {}
        }
        previous = c;
    }
    line
}

fn declared_name(words: &[&str]) -> String {
    words
        .iter()
        .copied()
        .skip(1)
        .find(|w| !BINDING_MODIFIERS.contains(w))
        .map(|w| w.split(['(', '<', '=', ':']).next().unwrap_or(w).to_string())
        .unwrap_or_default()
}

/// Whether the text after `let` binds a value rather than a function.
fn binds_value(binding: &str) -> bool {
    let mut rest = binding.trim_start();
    while let Some(modifier) = BINDING_MODIFIERS.iter().find(|m| {
        rest.strip_prefix(**m)
            .is_some_and(|r| r.starts_with(char::is_whitespace))
    }) {
        rest = rest[modifier.len()..].trim_start();
    }
    let after = if rest.starts_with('(') {
        let mut depth = 0usize;
        let close = rest.char_indices().find(|&(_, c)| {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            depth == 0
        });
        match close {
            Some((index, _)) => &rest[index + 1..],
            None => return false,
        }
    } else {
        rest.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_' || c == '\'')
    };
    let after = after.trim_start();
    after.starts_with('=') || after.starts_with(':')
}

/// Types whose static initialization runs user code: module-level value
/// bindings and `static let` / `static member val` in classes. Nested
/// modules and types are joined with `+`.
fn static_bindings(text: &str) -> Vec<String> {
    let mut root = IMPLICIT_MODULE.to_string();
    let mut scopes: Vec<(usize, Scope)> = Vec::new();
    let mut literal = false;
    let mut found = Vec::new();

    for line in text.lines() {
        let code = strip_comment(line);
        let indent = code.len() - code.trim_start().len();
        let mut trimmed = code.trim();
        if trimmed.starts_with("(*") {
            continue;
        }
        while let Some(attribute) = trimmed.strip_prefix("[<") {
            let Some(close) = attribute.find(">]") else {
                break;
            };
            literal |= attribute[..close].contains("Literal");
            trimmed = attribute[close + 2..].trim_start();
        }
        if trimmed.is_empty() {
            continue;
        }

        while scopes.last().is_some_and(|(depth, _)| *depth >= indent) {
            scopes.pop();
        }
        let path = || {
            let mut names = vec![root.as_str()];
            names.extend(scopes.iter().filter_map(|(_, scope)| match scope {
                Scope::Module(name) | Scope::Type(name) => Some(name.as_str()),
                Scope::Expr => None,
            }));
            names.join("+")
        };
        let owner = scopes.last().map(|(_, scope)| scope);
        let words: Vec<&str> = trimmed.split_whitespace().collect();

        let scope = match (words[0], owner) {
            (_, Some(Scope::Expr)) | ("namespace", _) => Scope::Expr,
            ("module", _) if trimmed.ends_with('=') => Scope::Module(declared_name(&words)),
            ("module", _) => {
                root = declared_name(&words);
                literal = false;
                continue;
            }
            ("type" | "and", _) => Scope::Type(declared_name(&words)),
            ("let", None | Some(Scope::Module(_))) => {
                if !literal && binds_value(&trimmed[3..]) {
                    found.push(path());
                }
                Scope::Expr
            }
            ("static", Some(Scope::Type(_))) => {
                let initialized = matches!(words.get(1), Some(&"let"))
                    || (words.get(1) == Some(&"member") && words.get(2) == Some(&"val"));
                if initialized {
                    found.push(path());
                }
                Scope::Expr
            }
            _ => Scope::Expr,
        };
        literal = false;
        scopes.push((indent, scope));
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::targets;

    fn session() -> CompilationSession {
        let adapter = Arc::new(FSharpAdapter);
        let defaults = adapter.configure(&SharedOptions::default());
        CompilationSession::new(adapter, &defaults)
    }

    #[test]
    fn test_release_flags() {
        let mut session = session();
        FSharpAdapter.set_optimization(&mut session, OptimizationLevel::Release);
        assert_eq!(session.compilation_options.other_flags, ["--debug-", "--optimize+"]);
    }

    #[test]
    fn test_switches_do_not_accumulate() {
        let mut session = session();
        for _ in 0..3 {
            FSharpAdapter.set_optimization(&mut session, OptimizationLevel::Release);
            FSharpAdapter.set_optimization(&mut session, OptimizationLevel::Debug);
        }
        assert_eq!(
            session.compilation_options.other_flags,
            ["--debug+", "--optimize-", "--define:DEBUG"]
        );
    }

    #[test]
    fn test_target_is_ignored() {
        let mut session = session();
        let before = session.compilation_options.clone();
        FSharpAdapter.set_options_for_target(&mut session, targets::RUN);
        assert_eq!(session.compilation_options, before);
        assert_eq!(session.compilation_options.output_kind, OutputKind::DynamicallyLinkedLibrary);
    }

    #[test]
    fn test_static_bindings() {
        let text = "module Counter\n\
                    \n\
                    [<Literal>]\n\
                    let Seed = 1\n\
                    let mutable next = Seed // shared counter\n\
                    let add x y = x + y\n\
                    let (lo, hi) = (0, 10)\n\
                    \n\
                    type Cache() =\n    \
                        static let entries = System.Collections.Generic.Dictionary<int, int>()\n    \
                        let local = 0\n    \
                        member _.Count =\n        \
                            let inner = 1\n        \
                            entries.Count + inner\n\
                    \n\
                    module Nested =\n    \
                        let limit: int = 10\n    \
                        let twice x = x * 2\n";
        assert_eq!(
            static_bindings(text),
            ["Counter", "Counter", "Counter+Cache", "Counter+Nested"]
        );
    }

    #[test]
    fn test_functions_only_script() {
        let mut session = session();
        session.set_text("let square x = x * x\nlet run () =\n    let total = square 3\n    printfn \"%d\" total\n");
        assert!(FSharpAdapter.find_constructs(&session).is_empty());

        session.set_text("let table = dict [ 1, \"one\" ]\n");
        let constructs = FSharpAdapter.find_constructs(&session);
        assert_eq!(constructs, vec![Construct::StaticInitializer { type_name: "Program".to_string() }]);
        assert!(!FSharpAdapter.supports(targets::JIT_ASM, &constructs[0]));
    }
}
