//! Visual Basic adapter.

use std::sync::Arc;

use super::{names, targets, LanguageAdapter, LanguageDefaults, SharedOptions};
use crate::compilation::assembly::Construct;
use crate::compilation::session::{
    CompilationOptions, CompilationSession, OptimizationLevel, OutputKind, ParseOptions,
    ReferenceSet,
};

/// Newest language version the front end accepts.
pub const MAX_LANGUAGE_VERSION: &str = "latest";

const DEBUG_SYMBOL: &str = "DEBUG=True";

const REFERENCES: [&str; 4] = [
    "System.Runtime",
    "Microsoft.VisualBasic",
    "System.ValueTuple",
    "CodeLab.Runtime",
];

/// Declaration modifiers, compared case-insensitively.
const MODIFIERS: [&str; 25] = [
    "Public", "Private", "Protected", "Friend", "Shared", "Shadows", "Overloads", "Overrides",
    "Overridable", "NotOverridable", "MustOverride", "ReadOnly", "WriteOnly", "Dim", "Const",
    "Static", "Partial", "Async", "Iterator", "Default", "WithEvents", "Widening", "Narrowing",
    "MustInherit", "NotInheritable",
];

/// Member-level statements that never declare a field.
const NON_FIELD_KEYWORDS: [&str; 8] = [
    "Declare", "Delegate", "Event", "Inherits", "Implements", "Imports", "Option", "Namespace",
];

fn symbols(level: OptimizationLevel) -> Vec<String> {
    match level {
        OptimizationLevel::Debug => vec![DEBUG_SYMBOL.to_string()],
        OptimizationLevel::Release => Vec::new(),
    }
}

/// Adapter for Visual Basic.
///
/// Method parameter lines are not reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisualBasicAdapter;

impl LanguageAdapter for VisualBasicAdapter {
    fn language_name(&self) -> &'static str {
        names::VISUAL_BASIC
    }

    fn configure(&self, shared: &SharedOptions) -> LanguageDefaults {
        LanguageDefaults {
            parse_options: ParseOptions {
                language_version: MAX_LANGUAGE_VERSION.to_string(),
                preprocessor_symbols: symbols(OptimizationLevel::Debug),
                features: shared.features.clone(),
                ..ParseOptions::default()
            },
            compilation_options: CompilationOptions::default(),
            references: Arc::new(ReferenceSet::new(REFERENCES).extended(&shared.extra_references)),
        }
    }

    fn set_optimization(&self, session: &mut CompilationSession, level: OptimizationLevel) {
        session.parse_options.preprocessor_symbols = symbols(level);
        session.compilation_options.optimization = level;
    }

    fn set_options_for_target(&self, session: &mut CompilationSession, target: &str) {
        session.compilation_options.output_kind = if target == targets::RUN {
            OutputKind::ConsoleApplication
        } else {
            OutputKind::DynamicallyLinkedLibrary
        };
    }

    fn find_constructs(&self, session: &CompilationSession) -> Vec<Construct> {
        shared_initializers(session.text())
            .into_iter()
            .map(|type_name| Construct::StaticInitializer { type_name })
            .collect()
    }
}

#[derive(Debug)]
enum Block {
    Type { name: String, module: bool, interface: bool },
    /// A member body, closed by `End <keyword>`.
    Body(&'static str),
    /// A property header that may or may not open a `Get`/`Set` body.
    Property,
}

fn is(word: &str, keyword: &str) -> bool {
    word.eq_ignore_ascii_case(keyword)
}

/// Code part of a line: comments removed, leading attribute list skipped.
fn code_of(line: &str) -> &str {
    let mut in_string = false;
    let mut end = line.len();
    for (index, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            '\'' | '\u{2018}' | '\u{2019}' if !in_string => {
                end = index;
                break;
            }
            _ => {}
        }
    }
    let mut code = line[..end].trim();
    let remark = code.get(..3).is_some_and(|w| is(w, "REM"))
        && code.get(3..).is_some_and(|r| r.is_empty() || r.starts_with(char::is_whitespace));
    if remark {
        return "";
    }
    while code.starts_with('<') {
        match code.find('>') {
            Some(close) => code = code[close + 1..].trim_start(),
            None => return "",
        }
    }
    code
}

fn has_initializer(code: &str) -> bool {
    let mut in_string = false;
    code.chars().any(|c| {
        if c == '"' {
            in_string = !in_string;
        }
        c == '=' && !in_string
    })
}

/// Types with a shared field initializer or a `Shared Sub New`, nested types
/// joined with `+`. Members of a `Module` are implicitly shared.
fn shared_initializers(text: &str) -> Vec<String> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut found = Vec::new();

    for line in text.lines() {
        let code = code_of(line);
        let words: Vec<&str> = code.split_whitespace().collect();
        let Some(&first) = words.first() else {
            continue;
        };

        match blocks.last() {
            Some(Block::Body(end)) => {
                let end = *end;
                if is(first, "End") && words.get(1).is_some_and(|w| is(w, end)) {
                    blocks.pop();
                }
                continue;
            }
            Some(Block::Property) => {
                blocks.pop();
                let accessor = words
                    .iter()
                    .find(|w| !MODIFIERS.iter().any(|m| is(w, m)))
                    .is_some_and(|w| is(w, "Get") || is(w, "Set"));
                if accessor {
                    blocks.push(Block::Body("Property"));
                    continue;
                }
            }
            _ => {}
        }

        if is(first, "End") {
            let closes_type = words
                .get(1)
                .is_some_and(|w| ["Class", "Structure", "Module", "Interface"].iter().any(|k| is(w, k)));
            if closes_type && matches!(blocks.last(), Some(Block::Type { .. })) {
                blocks.pop();
            }
            continue;
        }

        let split = words
            .iter()
            .position(|w| !MODIFIERS.iter().any(|m| is(w, m)))
            .unwrap_or(words.len());
        let (modifiers, rest) = words.split_at(split);
        let has = |modifier: &str| modifiers.iter().any(|w| is(w, modifier));
        let Some(&keyword) = rest.first() else {
            continue;
        };

        let (type_path, in_module, in_interface) = {
            let mut names = Vec::new();
            let mut innermost = None;
            for block in &blocks {
                if let Block::Type { name, module, interface } = block {
                    names.push(name.as_str());
                    innermost = Some((*module, *interface));
                }
            }
            let (module, interface) = innermost.unwrap_or((false, false));
            (names.join("+"), module, interface)
        };
        let shared = has("Shared") || in_module;

        let kind = ["Class", "Structure", "Module", "Interface"]
            .into_iter()
            .find(|k| is(keyword, k));
        if let Some(kind) = kind {
            let name = rest.get(1).copied().map_or("", |w| w.split('(').next().unwrap_or(w));
            blocks.push(Block::Type {
                name: name.to_string(),
                module: kind == "Module",
                interface: kind == "Interface",
            });
            continue;
        }
        if type_path.is_empty() || in_interface {
            continue;
        }

        let bodiless = has("MustOverride");
        if let Some(end) = ["Sub", "Function", "Operator"].into_iter().find(|k| is(keyword, k)) {
            let constructor = rest
                .get(1)
                .copied()
                .is_some_and(|w| is(w.split('(').next().unwrap_or(w), "New"));
            if end == "Sub" && constructor && shared {
                found.push(type_path);
            }
            if !bodiless {
                blocks.push(Block::Body(end));
            }
        } else if is(keyword, "Property") {
            if has_initializer(code) {
                if shared {
                    found.push(type_path);
                }
            } else if !bodiless {
                blocks.push(Block::Property);
            }
        } else if is(keyword, "Enum") {
            blocks.push(Block::Body("Enum"));
        } else if is(keyword, "Custom") {
            blocks.push(Block::Body("Event"));
        } else if !NON_FIELD_KEYWORDS.iter().any(|k| is(keyword, k))
            && shared
            && !has("Const")
            && has_initializer(code)
        {
            found.push(type_path);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::SourcePosition;

    fn session() -> CompilationSession {
        let adapter = Arc::new(VisualBasicAdapter);
        let defaults = adapter.configure(&SharedOptions::default());
        CompilationSession::new(adapter, &defaults)
    }

    #[test]
    fn test_debug_symbol_only_in_debug() {
        let mut session = session();
        VisualBasicAdapter.set_optimization(&mut session, OptimizationLevel::Debug);
        assert_eq!(session.parse_options.preprocessor_symbols, ["DEBUG=True"]);

        VisualBasicAdapter.set_optimization(&mut session, OptimizationLevel::Release);
        assert!(session.parse_options.preprocessor_symbols.is_empty());
        assert_eq!(session.optimization(), OptimizationLevel::Release);
    }

    #[test]
    fn test_target_never_allows_unsafe() {
        let mut session = session();
        VisualBasicAdapter.set_options_for_target(&mut session, targets::RUN);
        assert_eq!(session.compilation_options.output_kind, OutputKind::ConsoleApplication);

        VisualBasicAdapter.set_options_for_target(&mut session, targets::CSHARP);
        assert_eq!(session.compilation_options.output_kind, OutputKind::DynamicallyLinkedLibrary);
        assert!(!session.compilation_options.allow_unsafe);
    }

    #[test]
    fn test_parameter_lines_unsupported() {
        let mut session = session();
        session.set_text("Class C\n  Sub M(a As Integer)\n  End Sub\nEnd Class");
        assert!(VisualBasicAdapter
            .method_parameter_lines(&session, SourcePosition::new(2, 7))
            .is_empty());
    }

    #[test]
    fn test_shared_initializers_found() {
        let text = "Imports System\n\
                    Class Counter\n\
                    Private Shared nextId As Integer = 1 ' seed\n\
                    Private count As Integer = 0\n\
                    Const Limit As Integer = 10\n\
                    Sub Bump()\n\
                        Dim step As Integer = 1\n\
                    End Sub\n\
                    Class Inner\n\
                        Shared Sub New()\n\
                        End Sub\n\
                    End Class\n\
                    End Class\n\
                    Module Settings\n\
                    Dim name As String = \"x\"\n\
                    Function Twice(x As Integer) As Integer\n\
                        Return x * 2\n\
                    End Function\n\
                    End Module\n";
        assert_eq!(
            shared_initializers(text),
            ["Counter", "Counter+Inner", "Settings"]
        );
    }

    #[test]
    fn test_instance_members_and_properties() {
        let text = "Class C\n\
                    Property Name As String\n\
                    Property Size As Integer\n\
                        Get\n\
                            Dim x = 1\n\
                            Return x\n\
                        End Get\n\
                    End Property\n\
                    Shared Property Total As Integer = 3\n\
                    End Class\n";
        assert_eq!(shared_initializers(text), ["C"]);
    }

    #[test]
    fn test_shared_field_unsupported_for_jit_asm() {
        let mut session = session();
        session.set_text("Class C\n    Shared F As Integer = 0\nEnd Class");
        let constructs = VisualBasicAdapter.find_constructs(&session);
        assert_eq!(constructs, vec![Construct::StaticInitializer { type_name: "C".to_string() }]);
        assert!(!VisualBasicAdapter.supports(targets::JIT_ASM, &constructs[0]));
    }
}
