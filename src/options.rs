//! Option protocol dispatcher.
//!
//! The transport layer forwards every `name=value` pair it receives for a
//! session; options not listed here are reported as unhandled so other layers
//! can share the channel.

use crate::compilation::session::{CompilationSession, OptimizationLevel};
use crate::error::Result;
use crate::macros::debug;

/// Option selecting `debug` or `release`.
pub const OPTIMIZE: &str = "optimize";
/// Option selecting the target.
pub const TARGET: &str = "target";

/// Routes named option updates to the session's adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionDispatcher;

impl OptionDispatcher {
    /// Create a dispatcher.
    pub fn new() -> Self {
        Self
    }

    /// Apply one option.
    ///
    /// Returns `Ok(false)` for options this dispatcher does not handle. The
    /// target is recorded on the session before the adapter sees it, since
    /// inspection backends read the recorded name.
    pub fn apply(&self, session: &mut CompilationSession, name: &str, value: &str) -> Result<bool> {
        let adapter = session.adapter();
        match name {
            OPTIMIZE => {
                let level: OptimizationLevel = value.parse()?;
                adapter.set_optimization(session, level);
            }
            TARGET => {
                session.set_target(value);
                adapter.set_options_for_target(session, value);
            }
            _ => return Ok(false),
        }
        debug!(language = session.language_name(), option = name, value, "session option applied");
        Ok(true)
    }

    /// Apply several options in order, returning the names left unhandled.
    pub fn apply_all<'a>(
        &self,
        session: &mut CompilationSession,
        options: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Vec<&'a str>> {
        let mut unhandled = Vec::new();
        for (name, value) in options {
            if !self.apply(session, name, value)? {
                unhandled.push(name);
            }
        }
        Ok(unhandled)
    }
}
