//! Process-wide language adapter registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

use super::{CSharpAdapter, FSharpAdapter, LanguageAdapter, LanguageDefaults, SharedOptions, VisualBasicAdapter};
use crate::compilation::session::CompilationSession;
use crate::error::{Result, SandboxError};
use crate::macros::info;

struct Entry {
    adapter: Arc<dyn LanguageAdapter>,
    defaults: OnceLock<LanguageDefaults>,
}

/// Immutable mapping from language name to adapter.
///
/// Each adapter's [`configure`](LanguageAdapter::configure) runs lazily, the
/// first time a session for that language starts, and exactly once.
pub struct LanguageRegistry {
    shared: SharedOptions,
    entries: BTreeMap<&'static str, Entry>,
}

impl LanguageRegistry {
    /// Create a registry over the given adapters.
    pub fn new(shared: SharedOptions, adapters: impl IntoIterator<Item = Arc<dyn LanguageAdapter>>) -> Self {
        let entries = adapters
            .into_iter()
            .map(|adapter| {
                (
                    adapter.language_name(),
                    Entry {
                        adapter,
                        defaults: OnceLock::new(),
                    },
                )
            })
            .collect();
        Self { shared, entries }
    }

    /// Registry with the C#, Visual Basic and F# adapters.
    pub fn with_default_adapters(shared: SharedOptions) -> Self {
        let adapters: [Arc<dyn LanguageAdapter>; 3] = [
            Arc::new(CSharpAdapter),
            Arc::new(VisualBasicAdapter),
            Arc::new(FSharpAdapter),
        ];
        Self::new(shared, adapters)
    }

    fn entry(&self, language: &str) -> Result<&Entry> {
        self.entries
            .get(language)
            .ok_or_else(|| SandboxError::UnknownLanguage(language.to_string()))
    }

    /// Registered language names.
    pub fn languages(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// The adapter registered for `language`.
    pub fn adapter(&self, language: &str) -> Result<Arc<dyn LanguageAdapter>> {
        Ok(Arc::clone(&self.entry(language)?.adapter))
    }

    /// Defaults for `language`, configuring the adapter on first use.
    pub fn defaults(&self, language: &str) -> Result<&LanguageDefaults> {
        let entry = self.entry(language)?;
        Ok(entry.defaults.get_or_init(|| {
            info!(language, "configuring language adapter");
            entry.adapter.configure(&self.shared)
        }))
    }

    /// Whether `language` has been configured yet.
    pub fn is_configured(&self, language: &str) -> bool {
        self.entries
            .get(language)
            .is_some_and(|entry| entry.defaults.get().is_some())
    }

    /// Start a session bound to the adapter for `language`.
    pub fn start_session(&self, language: &str) -> Result<CompilationSession> {
        let defaults = self.defaults(language)?;
        Ok(CompilationSession::new(self.adapter(language)?, defaults))
    }
}

impl fmt::Debug for LanguageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageRegistry")
            .field("languages", &self.entries.keys().collect::<Vec<_>>())
            .field("shared", &self.shared)
            .finish()
    }
}

static GLOBAL_REGISTRY: LazyLock<LanguageRegistry> =
    LazyLock::new(|| LanguageRegistry::with_default_adapters(SharedOptions::default()));

/// The process-wide registry with the default adapters.
pub fn global_registry() -> &'static LanguageRegistry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::names;

    #[test]
    fn test_configures_lazily_once() {
        let registry = LanguageRegistry::with_default_adapters(SharedOptions::default());
        assert!(!registry.is_configured(names::FSHARP));

        let first = registry.defaults(names::FSHARP).unwrap() as *const LanguageDefaults;
        let second = registry.defaults(names::FSHARP).unwrap() as *const LanguageDefaults;
        assert_eq!(first, second);
        assert!(registry.is_configured(names::FSHARP));
        assert!(!registry.is_configured(names::CSHARP));
    }

    #[test]
    fn test_session_bound_to_language() {
        let session = global_registry().start_session(names::CSHARP).unwrap();
        assert_eq!(session.language_name(), names::CSHARP);
        assert!(session.references().contains("System.Runtime"));
    }

    #[test]
    fn test_unknown_language() {
        let error = global_registry().start_session("COBOL").unwrap_err();
        assert!(matches!(error, SandboxError::UnknownLanguage(ref name) if name == "COBOL"));
        assert_eq!(
            global_registry().languages().collect::<Vec<_>>(),
            ["C#", "F#", "Visual Basic"]
        );
    }
}
