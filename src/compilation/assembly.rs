//! Compiled-assembly handoff between the engine, the enforcer and consumers.

use std::fmt;

use crate::policy::rewriter::CallSite;

/// Binary output of a compilation plus its optional debug symbols.
///
/// Consumers borrow the streams for the duration of one backend call; the
/// buffers are released when the owning assembly is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyStreams {
    binary: Vec<u8>,
    symbols: Option<Vec<u8>>,
}

impl AssemblyStreams {
    /// Wrap a binary stream.
    pub fn new(binary: impl Into<Vec<u8>>) -> Self {
        Self {
            binary: binary.into(),
            symbols: None,
        }
    }

    /// Attach a companion debug-symbol stream.
    pub fn with_symbols(mut self, symbols: impl Into<Vec<u8>>) -> Self {
        self.symbols = Some(symbols.into());
        self
    }

    /// The binary stream.
    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    /// The debug-symbol stream, if produced.
    pub fn symbols(&self) -> Option<&[u8]> {
        self.symbols.as_deref()
    }
}

/// Output of a compilation engine, before policy verification.
#[derive(Debug, Clone)]
pub struct CompiledAssembly {
    streams: AssemblyStreams,
    references: Vec<CallSite>,
}

impl CompiledAssembly {
    /// Create an assembly from its streams and the library call sites it contains.
    pub fn new(streams: AssemblyStreams, references: Vec<CallSite>) -> Self {
        Self { streams, references }
    }

    /// The compiled streams.
    pub fn streams(&self) -> &AssemblyStreams {
        &self.streams
    }

    /// Every call site referencing a library member.
    pub fn references(&self) -> &[CallSite] {
        &self.references
    }

    pub(crate) fn into_parts(self) -> (AssemblyStreams, Vec<CallSite>) {
        (self.streams, self.references)
    }
}

/// A source construct some targets cannot handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Construct {
    /// A static field initializer or static constructor.
    StaticInitializer {
        /// Declaring type.
        type_name: String,
    },
}

impl fmt::Display for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Construct::StaticInitializer { type_name } => {
                write!(f, "static initializer in `{type_name}`")
            }
        }
    }
}
