//! Lightweight C# declaration scanner.
//!
//! Recognizes namespace, type, method and field declarations well enough to
//! answer position queries and to spot static initializers. Member bodies are
//! skipped as balanced braces, so statements never reach the declaration
//! logic.

use super::SourcePosition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Punct,
    Literal,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    pos: SourcePosition,
}

impl Token<'_> {
    fn is(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == punct
    }

    fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == word
    }
}

const TWO_CHAR_PUNCT: [&str; 7] = ["=>", "==", "!=", "<=", ">=", "::", "??"];
const TYPE_KEYWORDS: [&str; 5] = ["class", "struct", "interface", "enum", "record"];
const NON_METHOD_WORDS: [&str; 23] = [
    "if", "while", "for", "foreach", "switch", "using", "lock", "catch", "return", "new", "typeof",
    "sizeof", "nameof", "default", "base", "this", "checked", "unchecked", "fixed", "when",
    "await", "throw", "is",
];
const MODIFIERS: [&str; 16] = [
    "public", "private", "protected", "internal", "static", "virtual", "override", "abstract",
    "sealed", "async", "extern", "unsafe", "readonly", "partial", "ref", "volatile",
];

struct Lexer<'a> {
    text: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
            index: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map_or(self.text.len(), |(offset, _)| *offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_line(&mut self) {
        while self.peek(0).is_some_and(|c| c != '\n') {
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) {
        while let Some(c) = self.bump() {
            if c == '*' && self.peek(0) == Some('/') {
                self.bump();
                return;
            }
        }
    }

    /// Skip to the closing quote; the opening quote is already consumed.
    fn skip_string(&mut self, verbatim: bool) {
        while let Some(c) = self.bump() {
            match c {
                '"' if verbatim && self.peek(0) == Some('"') => {
                    self.bump();
                }
                '"' => return,
                '\\' if !verbatim => {
                    self.bump();
                }
                '\n' if !verbatim => return,
                _ => {}
            }
        }
    }

    fn skip_char_literal(&mut self) {
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '\'' | '\n' => return,
                _ => {}
            }
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek(0) {
            match (c, self.peek(1)) {
                (c, _) if c.is_whitespace() => {
                    self.bump();
                }
                ('/', Some('/')) | ('#', _) => self.skip_line(),
                ('/', Some('*')) => {
                    self.bump();
                    self.bump();
                    self.skip_block_comment();
                }
                _ => return,
            }
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        self.skip_trivia();
        let pos = SourcePosition::new(self.line, self.column);
        let start = self.offset();
        let c = self.bump()?;

        let kind = match (c, self.peek(0), self.peek(1)) {
            ('"', _, _) => {
                self.skip_string(false);
                TokenKind::Literal
            }
            ('@' | '$', Some('"'), _) => {
                self.bump();
                self.skip_string(c == '@');
                TokenKind::Literal
            }
            ('@' | '$', Some('@' | '$'), Some('"')) => {
                self.bump();
                self.bump();
                self.skip_string(true);
                TokenKind::Literal
            }
            ('\'', _, _) => {
                self.skip_char_literal();
                TokenKind::Literal
            }
            (c, _, _) if c.is_alphabetic() || c == '_' || c == '@' => {
                while self.peek(0).is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    self.bump();
                }
                TokenKind::Ident
            }
            (c, _, _) if c.is_ascii_digit() => {
                while self
                    .peek(0)
                    .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.')
                {
                    self.bump();
                }
                TokenKind::Literal
            }
            (c, Some(next), _) => {
                if TWO_CHAR_PUNCT
                    .iter()
                    .any(|p| p.chars().eq([c, next].into_iter()))
                {
                    self.bump();
                }
                TokenKind::Punct
            }
            _ => TokenKind::Punct,
        };

        let text = self.text;
        Some(Token {
            kind,
            text: &text[start..self.offset()],
            pos,
        })
    }
}

/// A method, constructor or operator declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDeclaration {
    /// Declared name (`operator` for operators).
    pub name: String,
    /// Position of the first token, attributes included.
    pub start: SourcePosition,
    /// Position of the closing `}` or `;`.
    pub end: SourcePosition,
    /// Line of each parameter, in declaration order.
    pub parameter_lines: Vec<u32>,
}

impl MethodDeclaration {
    /// Whether `position` falls inside the declaration.
    pub fn contains(&self, position: SourcePosition) -> bool {
        self.start <= position && position <= self.end
    }
}

/// A static field initializer or static constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticInitializer {
    /// Declaring type, nested types joined with `+`.
    pub type_name: String,
    /// Line of the declaration.
    pub line: u32,
}

/// Declarations found in a source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationScan {
    /// Methods in source order.
    pub methods: Vec<MethodDeclaration>,
    /// Static initializers in source order.
    pub static_initializers: Vec<StaticInitializer>,
}

impl DeclarationScan {
    /// The method declaration containing `position`.
    pub fn method_at(&self, position: SourcePosition) -> Option<&MethodDeclaration> {
        self.methods.iter().find(|m| m.contains(position))
    }
}

#[derive(Debug)]
enum Scope {
    Namespace,
    Type(String),
    Member(Option<usize>),
}

struct Scanner<'a> {
    scopes: Vec<Scope>,
    header: Vec<Token<'a>>,
    last_member_static: bool,
    scan: DeclarationScan,
}

/// Scan C# source for declarations.
pub fn scan(text: &str) -> DeclarationScan {
    let mut scanner = Scanner {
        scopes: Vec::new(),
        header: Vec::new(),
        last_member_static: false,
        scan: DeclarationScan::default(),
    };
    for token in Lexer::new(text) {
        scanner.push(token);
    }
    scanner.scan
}

impl<'a> Scanner<'a> {
    fn push(&mut self, token: Token<'a>) {
        if let Some(Scope::Member(_)) = self.scopes.last() {
            if token.is("{") {
                self.scopes.push(Scope::Member(None));
            } else if token.is("}") {
                if let Some(Scope::Member(Some(index))) = self.scopes.pop() {
                    self.scan.methods[index].end = token.pos;
                }
            }
            return;
        }

        if token.is("{") {
            let scope = self.open_scope(token.pos);
            self.scopes.push(scope);
            self.header.clear();
        } else if token.is(";") {
            self.end_declaration(token.pos);
            self.last_member_static = false;
            self.header.clear();
        } else if token.is("}") {
            self.scopes.pop();
            self.header.clear();
        } else {
            self.header.push(token);
        }
    }

    fn type_path(&self) -> Option<String> {
        if !matches!(self.scopes.last(), Some(Scope::Type(_))) {
            return None;
        }
        let names: Vec<&str> = self
            .scopes
            .iter()
            .filter_map(|s| match s {
                Scope::Type(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        Some(names.join("+"))
    }

    fn open_scope(&mut self, pos: SourcePosition) -> Scope {
        let header = &self.header;
        if header.iter().any(|t| t.is_ident("namespace")) {
            return Scope::Namespace;
        }
        if let Some(name) = declared_type_name(header) {
            return Scope::Type(name);
        }
        let Some(type_path) = self.type_path() else {
            return Scope::Member(None);
        };
        self.last_member_static = false;

        if let Some(shape) = method_shape(header) {
            let index = self.record_method(&type_path, shape, pos);
            return Scope::Member(Some(index));
        }
        if is_static(header) {
            if has_initializer(header) {
                self.record_static(type_path);
            } else {
                self.last_member_static = true;
            }
        }
        Scope::Member(None)
    }

    fn end_declaration(&mut self, pos: SourcePosition) {
        let Some(type_path) = self.type_path() else {
            return;
        };
        let header = &self.header;
        if header.is_empty() || declared_type_name(header).is_some() {
            return;
        }
        if let Some(shape) = method_shape(header) {
            self.record_method(&type_path, shape, pos);
            return;
        }
        let property_initializer = header[0].is("=") && self.last_member_static;
        if property_initializer || (is_static(header) && has_initializer(header)) {
            self.record_static(type_path);
        }
    }

    fn record_method(&mut self, type_path: &str, shape: MethodShape, end: SourcePosition) -> usize {
        let header = &self.header;
        let name = match header[shape.name] {
            Token {
                kind: TokenKind::Ident,
                text,
                ..
            } => text,
            _ => "operator",
        };
        let simple_type = type_path.rsplit('+').next().unwrap_or(type_path);
        let static_constructor = is_static(header) && name == simple_type;

        self.scan.methods.push(MethodDeclaration {
            name: name.to_string(),
            start: header[0].pos,
            end,
            parameter_lines: parameter_lines(header, shape.open),
        });
        if static_constructor {
            self.record_static(type_path.to_string());
        }
        self.scan.methods.len() - 1
    }

    fn record_static(&mut self, type_name: String) {
        let line = self.header.first().map_or(0, |t| t.pos.line);
        self.scan
            .static_initializers
            .push(StaticInitializer { type_name, line });
    }
}

/// Header tokens outside parentheses and brackets, with their indices.
fn top_level<'h, 'a>(header: &'h [Token<'a>]) -> impl Iterator<Item = (usize, &'h Token<'a>)> {
    let mut depth = 0usize;
    header.iter().enumerate().filter(move |(_, t)| {
        let at_top = depth == 0;
        if t.is("(") || t.is("[") {
            depth += 1;
        } else if (t.is(")") || t.is("]")) && depth > 0 {
            depth -= 1;
        }
        at_top
    })
}

fn first_paren(header: &[Token]) -> usize {
    top_level(header)
        .find(|(_, t)| t.is("("))
        .map_or(header.len(), |(index, _)| index)
}

fn declared_type_name(header: &[Token]) -> Option<String> {
    let limit = first_paren(header);
    let keyword = top_level(&header[..limit])
        .find(|(_, t)| t.kind == TokenKind::Ident && TYPE_KEYWORDS.contains(&t.text))
        .map(|(index, _)| index)?;
    header[keyword + 1..]
        .iter()
        .find(|t| t.kind == TokenKind::Ident && !TYPE_KEYWORDS.contains(&t.text))
        .map(|t| t.text.to_string())
}

#[derive(Debug, Clone, Copy)]
struct MethodShape {
    /// Index of the parameter list's `(`.
    open: usize,
    /// Index of the name token (the operator symbol for operators).
    name: usize,
}

/// Shape of the header when it declares a method.
///
/// The parameter list is the first top-level `(` directly after a name, so a
/// parenthesized tuple return type is skipped. Anything after a top-level `=`
/// or `=>` is an initializer or expression body, never a parameter list.
fn method_shape(header: &[Token]) -> Option<MethodShape> {
    if top_level(header).any(|(_, t)| t.is_ident("delegate")) {
        return None;
    }
    for (index, token) in top_level(header) {
        if token.is("=") || token.is("=>") {
            return None;
        }
        if token.is("(") {
            if let Some(name) = name_before(header, index) {
                return Some(MethodShape { open: index, name });
            }
        }
    }
    None
}

/// Index of the method name preceding the `(` at `open`, generic arguments skipped.
fn name_before(header: &[Token], open: usize) -> Option<usize> {
    let mut before = open.checked_sub(1)?;
    if header[before].is(">") {
        let mut depth = 0usize;
        loop {
            if header[before].is(">") {
                depth += 1;
            } else if header[before].is("<") {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            before = before.checked_sub(1)?;
        }
        before = before.checked_sub(1)?;
    }

    let name = &header[before];
    let is_name = name.kind == TokenKind::Ident
        && !NON_METHOD_WORDS.contains(&name.text)
        && !MODIFIERS.contains(&name.text);
    let is_operator = before > 0 && header[before - 1].is_ident("operator");
    (is_name || is_operator).then_some(before)
}

fn parameter_lines(header: &[Token], open: usize) -> Vec<u32> {
    let mut lines = Vec::new();
    let mut depth = 0usize;
    let mut at_start = true;
    for token in &header[open + 1..] {
        if depth == 0 && token.is(")") {
            break;
        }
        if depth == 0 && token.is(",") {
            at_start = true;
            continue;
        }
        if at_start {
            lines.push(token.pos.line);
            at_start = false;
        }
        if token.is("(") || token.is("[") || token.is("<") {
            depth += 1;
        } else if token.is(")") || token.is("]") || token.is(">") {
            depth = depth.saturating_sub(1);
        }
    }
    lines
}

fn is_static(header: &[Token]) -> bool {
    top_level(header).any(|(_, t)| t.is_ident("static"))
}

fn has_initializer(header: &[Token]) -> bool {
    top_level(header).any(|(_, t)| t.is("="))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_at(text: &str, needle: &str) -> Vec<u32> {
        let offset = text.find(needle).unwrap();
        let line = text[..offset].matches('\n').count() as u32 + 1;
        let column = (offset - text[..offset].rfind('\n').map_or(0, |i| i + 1)) as u32 + 1;
        scan(text)
            .method_at(SourcePosition::new(line, column))
            .map(|m| m.parameter_lines.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_single_line_parameters() {
        let text = "class C { void M(int a, string b) {} }";
        assert_eq!(lines_at(text, "M("), vec![1, 1]);
        assert_eq!(lines_at(text, "{}"), vec![1, 1]);
    }

    #[test]
    fn test_parameters_on_separate_lines() {
        let text = "class C {\n    int M(\n        [In] int a,\n        Dictionary<int, string> b,\n        int c = 1)\n    {\n        return a;\n    }\n}";
        assert_eq!(lines_at(text, "return"), vec![3, 4, 5]);
    }

    #[test]
    fn test_outside_method_is_empty() {
        let text = "class C {\n    int F = 0;\n    void M(int a) {}\n}";
        assert!(lines_at(text, "F =").is_empty());
        assert_eq!(lines_at(text, "M("), vec![3]);
    }

    #[test]
    fn test_expression_bodied_and_generic_methods() {
        let text = "class C {\n    T Id<T>(T value) => value;\n    public static C operator +(C x,\n        C y) => x;\n}";
        let declarations = scan(text);
        let names: Vec<&str> = declarations.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Id", "operator"]);
        assert_eq!(declarations.methods[1].parameter_lines, vec![3, 4]);
        assert!(declarations.static_initializers.is_empty());
    }

    #[test]
    fn test_braces_in_strings_and_comments_ignored() {
        let text = "class C {\n    // }\n    string S = \"}{\";\n    /* { */ void M(int a) { var s = @\"}\"; }\n}";
        assert_eq!(lines_at(text, "M("), vec![4]);
    }

    #[test]
    fn test_static_field_initializer() {
        let declarations = scan("class C { static int F = 0; }");
        assert_eq!(
            declarations.static_initializers,
            vec![StaticInitializer {
                type_name: "C".to_string(),
                line: 1
            }]
        );
    }

    #[test]
    fn test_static_constructor_and_nested_types() {
        let text = "namespace N {\n  class Outer {\n    class Inner {\n      static Inner() { }\n    }\n    static int P { get; } = 5;\n  }\n}";
        let types: Vec<String> = scan(text)
            .static_initializers
            .into_iter()
            .map(|s| s.type_name)
            .collect();
        assert_eq!(types, ["Outer+Inner", "Outer"]);
    }

    #[test]
    fn test_non_static_members_are_not_initializers() {
        let text = "class C {\n  const int A = 1;\n  int B = 2;\n  static int M() => 0;\n  static int P { get; set; }\n  int Q { get; } = 3;\n}";
        assert!(scan(text).static_initializers.is_empty());
    }

    #[test]
    fn test_tuple_return_types() {
        let text = "class C {\n    public (int, int) M(int a,\n        string b) => (a, b.Length);\n    (int x, int y) N(int a,\n        int b) { return (a, b); }\n}";
        let names: Vec<String> = scan(text).methods.into_iter().map(|m| m.name).collect();
        assert_eq!(names, ["M", "N"]);
        assert_eq!(lines_at(text, "M("), vec![2, 3]);
        assert_eq!(lines_at(text, "return"), vec![4, 5]);
    }

    #[test]
    fn test_expression_bodied_property_and_delegate_are_not_methods() {
        let text = "class C {\n    int P => Compute(1, 2);\n    delegate int D(int x,\n        int y);\n    int Compute(int a, int b) => a + b;\n}";
        let names: Vec<String> = scan(text).methods.into_iter().map(|m| m.name).collect();
        assert_eq!(names, ["Compute"]);
        assert!(lines_at(text, "Compute(1").is_empty());
        assert!(lines_at(text, "D(").is_empty());
        assert_eq!(lines_at(text, "a + b"), vec![5, 5]);
    }
}
