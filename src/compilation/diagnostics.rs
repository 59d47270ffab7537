//! Compiler and policy diagnostics.

use std::fmt;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Not shown by default.
    Hidden,
    /// Informational.
    Info,
    /// Warning; does not fail the compilation.
    Warning,
    /// Error; fails the compilation.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Hidden => "hidden",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// One diagnostic with an optional 1-based source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Identifier such as `CS0103`.
    pub id: String,
    /// Human-readable message.
    pub message: String,
    /// Line, when known.
    pub line: Option<u32>,
    /// Column, when known.
    pub column: Option<u32>,
}

impl Diagnostic {
    /// Create a diagnostic without position.
    pub fn new(severity: Severity, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            id: id.into(),
            message: message.into(),
            line: None,
            column: None,
        }
    }

    /// Create an error diagnostic.
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, id, message)
    }

    /// Create a warning diagnostic.
    pub fn warning(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, id, message)
    }

    /// Attach a position.
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    /// Whether this diagnostic fails the compilation.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "({line},{column}): ")?,
            (Some(line), None) => write!(f, "({line}): ")?,
            _ => {}
        }
        write!(f, "{} {}: {}", self.severity, self.id, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_position() {
        let diagnostic = Diagnostic::error("CS0103", "The name 'x' does not exist").at(3, 9);
        assert_eq!(
            diagnostic.to_string(),
            "(3,9): error CS0103: The name 'x' does not exist"
        );
        assert!(diagnostic.is_error());
        assert!(!Diagnostic::warning("CS0168", "unused").is_error());
    }
}
