//! Guard rewriters applied to allowed call sites.
//!
//! A rewriter is pure metadata: it maps a call-site description to a
//! replacement description and never looks at program state. The execution
//! host honours the resulting [`Guard`]s when it links the member.

use std::fmt;
use std::sync::{Arc, LazyLock};

use super::access::MemberRef;

/// How a parameter of a called member behaves at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamShape {
    /// Plain value, passed through.
    Value,
    /// Lazily produced sequence, pulled by the callee.
    Sequence,
    /// Integer that drives iteration, allocation or waiting inside the callee.
    Count,
    /// Sequence that is copied into a bounded buffer before the call.
    Materialized,
}

/// Runtime guard attached to a call site by a rewriter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Guard {
    /// Drain the sequence argument into a buffer of at most `max_items`
    /// before the callee runs; longer sequences are rejected.
    MaterializeSequence {
        /// Index of the parameter.
        parameter: usize,
        /// Largest accepted number of items.
        max_items: usize,
    },
    /// Reject calls whose count argument is negative or exceeds `max`.
    LimitCount {
        /// Index of the parameter.
        parameter: usize,
        /// Largest accepted value.
        max: i64,
    },
}

impl Guard {
    /// Index of the parameter this guard applies to.
    pub fn parameter(&self) -> usize {
        match self {
            Guard::MaterializeSequence { parameter, .. } | Guard::LimitCount { parameter, .. } => {
                *parameter
            }
        }
    }
}

/// Description of one call to a library member from compiled code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Called member.
    pub member: MemberRef,
    /// Parameter shapes, in declaration order.
    pub parameters: Vec<ParamShape>,
    /// Guards attached by rewriting.
    pub guards: Vec<Guard>,
    /// Source line of the call, when the engine knows it.
    pub line: Option<u32>,
}

impl CallSite {
    /// Create an unguarded call site.
    pub fn new(member: MemberRef, parameters: Vec<ParamShape>) -> Self {
        Self {
            member,
            parameters,
            guards: Vec::new(),
            line: None,
        }
    }

    /// Attach the source line of the call.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Guard attached to the given parameter, if any.
    pub fn guard_for(&self, parameter: usize) -> Option<&Guard> {
        self.guards.iter().find(|g| g.parameter() == parameter)
    }

    /// Item bound for a materialized sequence parameter.
    pub fn materialize_limit(&self, parameter: usize) -> Option<usize> {
        match self.guard_for(parameter) {
            Some(Guard::MaterializeSequence { max_items, .. }) => Some(*max_items),
            _ => None,
        }
    }

    /// Upper bound for a count parameter.
    pub fn count_limit(&self, parameter: usize) -> Option<i64> {
        match self.guard_for(parameter) {
            Some(Guard::LimitCount { max, .. }) => Some(*max),
            _ => None,
        }
    }

    fn positions(&self, shape: ParamShape) -> Vec<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == shape)
            .map(|(i, _)| i)
            .collect()
    }
}

/// A call-site transformation.
///
/// Implementations must be pure functions of the call site; new kinds plug in
/// without touching tree traversal or enforcement.
pub trait Rewriter: Send + Sync + fmt::Debug {
    /// Stable name, used when comparing or describing policies.
    fn name(&self) -> &'static str;

    /// Produce the replacement call site.
    fn rewrite(&self, site: CallSite) -> CallSite;
}

/// Identity rewriter for trusted instrumentation hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGuardRewriter;

impl Rewriter for NoGuardRewriter {
    fn name(&self) -> &'static str {
        "no-guard"
    }

    fn rewrite(&self, site: CallSite) -> CallSite {
        site
    }
}

/// Forces lazy sequence arguments to be copied into a bounded buffer first.
#[derive(Debug, Clone, Copy)]
pub struct CollectedEnumerableArgumentRewriter {
    max_items: usize,
}

impl CollectedEnumerableArgumentRewriter {
    /// Default bound on materialized sequence length.
    pub const DEFAULT_MAX_ITEMS: usize = 10_000;

    /// Create a rewriter with a custom item bound.
    pub fn new(max_items: usize) -> Self {
        Self { max_items }
    }
}

impl Default for CollectedEnumerableArgumentRewriter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ITEMS)
    }
}

impl Rewriter for CollectedEnumerableArgumentRewriter {
    fn name(&self) -> &'static str {
        "collected-enumerable-argument"
    }

    fn rewrite(&self, mut site: CallSite) -> CallSite {
        for parameter in site.positions(ParamShape::Sequence) {
            site.parameters[parameter] = ParamShape::Materialized;
            site.guards.push(Guard::MaterializeSequence {
                parameter,
                max_items: self.max_items,
            });
        }
        site
    }
}

/// Bounds count-like integer arguments.
#[derive(Debug, Clone, Copy)]
pub struct CountArgumentRewriter {
    max: i64,
}

impl CountArgumentRewriter {
    /// Create a rewriter accepting counts in `0..=max`.
    pub fn new(max: i64) -> Self {
        Self { max }
    }
}

impl Rewriter for CountArgumentRewriter {
    fn name(&self) -> &'static str {
        "count-argument"
    }

    fn rewrite(&self, mut site: CallSite) -> CallSite {
        for parameter in site.positions(ParamShape::Count) {
            site.guards.push(Guard::LimitCount {
                parameter,
                max: self.max,
            });
        }
        site
    }
}

static NO_GUARD: LazyLock<Arc<dyn Rewriter>> = LazyLock::new(|| Arc::new(NoGuardRewriter));
static COLLECTED: LazyLock<Arc<dyn Rewriter>> =
    LazyLock::new(|| Arc::new(CollectedEnumerableArgumentRewriter::default()));

/// Shared [`NoGuardRewriter`].
pub fn no_guard() -> Arc<dyn Rewriter> {
    Arc::clone(&NO_GUARD)
}

/// Shared [`CollectedEnumerableArgumentRewriter`] with the default bound.
pub fn collected_enumerable() -> Arc<dyn Rewriter> {
    Arc::clone(&COLLECTED)
}

/// A [`CountArgumentRewriter`] accepting counts up to `max`.
pub fn count_argument(max: i64) -> Arc<dyn Rewriter> {
    Arc::new(CountArgumentRewriter::new(max))
}
