//! Per-request compilation state.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::SandboxError;
use crate::languages::{LanguageAdapter, LanguageDefaults};

/// Optimization level selected through the `optimize` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OptimizationLevel {
    /// `DEBUG` defined, optimizations off.
    #[default]
    Debug,
    /// Optimizations on.
    Release,
}

impl FromStr for OptimizationLevel {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(OptimizationLevel::Debug),
            "release" => Ok(OptimizationLevel::Release),
            other => Err(SandboxError::InvalidOption {
                name: "optimize".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptimizationLevel::Debug => "debug",
            OptimizationLevel::Release => "release",
        })
    }
}

/// Kind of binary the engine produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputKind {
    /// Library without an entry point.
    #[default]
    DynamicallyLinkedLibrary,
    /// Executable with an entry point.
    ConsoleApplication,
}

/// How documentation comments are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DocumentationMode {
    /// Not parsed.
    #[default]
    None,
    /// Parsed without diagnostics.
    Parse,
    /// Parsed and diagnosed.
    Diagnose,
}

/// Parse configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseOptions {
    /// Language version requested from the front end.
    pub language_version: String,
    /// Preprocessor symbols, in definition order.
    pub preprocessor_symbols: Vec<String>,
    /// Documentation comment handling.
    pub documentation_mode: DocumentationMode,
    /// Front-end feature flags (`name` or `name=value`).
    pub features: Vec<String>,
}

/// Compilation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompilationOptions {
    /// Output kind.
    pub output_kind: OutputKind,
    /// Optimization level.
    pub optimization: OptimizationLevel,
    /// Whether unsafe code is accepted.
    pub allow_unsafe: bool,
    /// Diagnostic ids that are never reported.
    pub suppressed_diagnostics: BTreeSet<String>,
    /// Extra command-line style switches for front ends configured that way.
    pub other_flags: Vec<String>,
}

/// Library assemblies compiled code is allowed to reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceSet {
    libraries: Vec<String>,
}

impl ReferenceSet {
    /// Create a set from library names, dropping duplicates.
    pub fn new<I, S>(libraries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for library in libraries {
            set.push(library.into());
        }
        set
    }

    fn push(&mut self, library: String) {
        if !self.libraries.contains(&library) {
            self.libraries.push(library);
        }
    }

    /// Return a copy extended with `extra`.
    pub fn extended<'a>(&self, extra: impl IntoIterator<Item = &'a String>) -> Self {
        let mut set = self.clone();
        for library in extra {
            set.push(library.clone());
        }
        set
    }

    /// Library names in order.
    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    /// Whether the set contains a library.
    pub fn contains(&self, library: &str) -> bool {
        self.libraries.iter().any(|l| l == library)
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation signal shared between a session and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    /// Signal cancellation and wake every waiter.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Whether cancellation was signalled.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Resolve once cancellation is signalled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Mutable compilation state owned by one client connection.
///
/// The adapter is bound when the session starts and never changes.
pub struct CompilationSession {
    adapter: Arc<dyn LanguageAdapter>,
    text: String,
    target: Option<String>,
    /// Parse configuration.
    pub parse_options: ParseOptions,
    /// Compilation configuration.
    pub compilation_options: CompilationOptions,
    references: Arc<ReferenceSet>,
    cancel: CancelHandle,
}

impl CompilationSession {
    /// Start a session from the language defaults.
    pub fn new(adapter: Arc<dyn LanguageAdapter>, defaults: &LanguageDefaults) -> Self {
        Self {
            adapter,
            text: String::new(),
            target: None,
            parse_options: defaults.parse_options.clone(),
            compilation_options: defaults.compilation_options.clone(),
            references: Arc::clone(&defaults.references),
            cancel: CancelHandle::default(),
        }
    }

    /// Name of the bound language.
    pub fn language_name(&self) -> &'static str {
        self.adapter.language_name()
    }

    /// The bound adapter.
    pub fn adapter(&self) -> Arc<dyn LanguageAdapter> {
        Arc::clone(&self.adapter)
    }

    /// Current source text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the source text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Recorded target name, if any.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Record the target name.
    pub fn set_target(&mut self, target: impl Into<String>) {
        self.target = Some(target.into());
    }

    /// Libraries the compilation may reference.
    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    /// Handle for cancelling this session from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancel any in-flight request.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the session was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Selected optimization level.
    pub fn optimization(&self) -> OptimizationLevel {
        self.compilation_options.optimization
    }
}

impl fmt::Debug for CompilationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationSession")
            .field("language", &self.language_name())
            .field("target", &self.target)
            .field("parse_options", &self.parse_options)
            .field("compilation_options", &self.compilation_options)
            .field("references", &self.references.libraries().len())
            .finish()
    }
}
