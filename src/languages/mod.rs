//! Language adapters: per-language compiler configuration behind one contract.

pub mod csharp;
pub mod fsharp;
pub mod registry;
pub mod syntax;
pub mod visual_basic;

use std::sync::Arc;

use crate::compilation::assembly::Construct;
use crate::compilation::session::{
    CompilationOptions, CompilationSession, OptimizationLevel, ParseOptions, ReferenceSet,
};

pub use csharp::CSharpAdapter;
pub use fsharp::FSharpAdapter;
pub use registry::{global_registry, LanguageRegistry};
pub use visual_basic::VisualBasicAdapter;

/// Language names used to select adapters.
pub mod names {
    /// C#.
    pub const CSHARP: &str = "C#";
    /// Visual Basic.
    pub const VISUAL_BASIC: &str = "Visual Basic";
    /// F#.
    pub const FSHARP: &str = "F#";
}

/// Target names accepted by the `target` option.
pub mod targets {
    /// Execute in the sandbox.
    pub const RUN: &str = "Run";
    /// Decompile to C#.
    pub const CSHARP: &str = "C#";
    /// Decompile to Visual Basic.
    pub const VISUAL_BASIC: &str = "Visual Basic";
    /// Intermediate language listing.
    pub const IL: &str = "IL";
    /// Machine-code disassembly.
    pub const JIT_ASM: &str = "JIT ASM";
    /// Syntax tree.
    pub const AST: &str = "AST";
}

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePosition {
    /// Line, starting at 1.
    pub line: u32,
    /// Column, starting at 1.
    pub column: u32,
}

impl SourcePosition {
    /// Create a position.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Options shared by every adapter's one-time configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedOptions {
    /// Front-end feature flags.
    pub features: Vec<String>,
    /// Extra libraries added to every language's reference set.
    pub extra_references: Vec<String>,
}

impl SharedOptions {
    /// Create a new builder for SharedOptions.
    pub fn builder() -> SharedOptionsBuilder {
        SharedOptionsBuilder::default()
    }
}

/// Builder for [`SharedOptions`].
#[derive(Debug, Clone, Default)]
pub struct SharedOptionsBuilder {
    features: Vec<String>,
    extra_references: Vec<String>,
}

impl SharedOptionsBuilder {
    /// Enable a front-end feature flag.
    pub fn feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    /// Add a library to every reference set.
    pub fn extra_reference(mut self, library: impl Into<String>) -> Self {
        self.extra_references.push(library.into());
        self
    }

    /// Build the SharedOptions.
    pub fn build(self) -> SharedOptions {
        SharedOptions {
            features: self.features,
            extra_references: self.extra_references,
        }
    }
}

/// Process-wide defaults produced by [`LanguageAdapter::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageDefaults {
    /// Parse configuration new sessions start from.
    pub parse_options: ParseOptions,
    /// Compilation configuration new sessions start from.
    pub compilation_options: CompilationOptions,
    /// Fixed reference set, shared by all sessions of the language.
    pub references: Arc<ReferenceSet>,
}

/// Per-language implementation of the session configuration contract.
///
/// Adapters hold no per-session state; everything they change lives on the
/// [`CompilationSession`] passed in.
pub trait LanguageAdapter: Send + Sync {
    /// Language name the adapter is registered under.
    fn language_name(&self) -> &'static str;

    /// Produce the language defaults. Runs at most once per process, lazily.
    fn configure(&self, shared: &SharedOptions) -> LanguageDefaults;

    /// Apply an optimization level.
    fn set_optimization(&self, session: &mut CompilationSession, level: OptimizationLevel);

    /// Adjust output kind and allowances for a target.
    fn set_options_for_target(&self, session: &mut CompilationSession, target: &str);

    /// 1-based lines of the parameters of the method enclosing `position`.
    ///
    /// Empty when the position is outside a method or the language does not
    /// support the query.
    fn method_parameter_lines(&self, session: &CompilationSession, position: SourcePosition) -> Vec<u32> {
        let _ = (session, position);
        Vec::new()
    }

    /// Target-sensitive constructs present in the session text.
    fn find_constructs(&self, session: &CompilationSession) -> Vec<Construct> {
        let _ = session;
        Vec::new()
    }

    /// Whether `target` can handle `construct`.
    fn supports(&self, target: &str, construct: &Construct) -> bool {
        !matches!(
            (target, construct),
            (targets::JIT_ASM, Construct::StaticInitializer { .. })
        )
    }
}

/// Replace or remove `symbol` in a symbol list, keeping order.
pub(crate) fn set_symbol(symbols: &mut Vec<String>, symbol: &str, defined: bool) {
    symbols.retain(|s| s != symbol);
    if defined {
        symbols.push(symbol.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_options_builder() {
        let options = SharedOptions::builder()
            .feature("flow-analysis")
            .extra_reference("System.Numerics")
            .build();
        assert_eq!(options.features, ["flow-analysis"]);
        assert_eq!(options.extra_references, ["System.Numerics"]);
    }

    #[test]
    fn test_set_symbol_is_idempotent() {
        let mut symbols = vec!["__DEMO_EXPERIMENTAL__".to_string()];
        set_symbol(&mut symbols, "DEBUG", true);
        set_symbol(&mut symbols, "DEBUG", true);
        assert_eq!(symbols, ["__DEMO_EXPERIMENTAL__", "DEBUG"]);
        set_symbol(&mut symbols, "DEBUG", false);
        assert_eq!(symbols, ["__DEMO_EXPERIMENTAL__"]);
    }
}
