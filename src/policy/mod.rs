//! API policy: which library members sandboxed code may call, and how.

pub mod access;
pub mod builder;
pub mod enforcement;
pub mod rewriter;
pub mod rules;
pub mod surface;
pub mod tree;

pub use access::{AccessLevel, MemberRef};
pub use builder::{FamilyMode, FamilyRule, PolicyBuilder};
pub use enforcement::{PolicyEnforcer, PolicyViolation, VerifiedAssembly};
pub use rewriter::{
    CallSite, CollectedEnumerableArgumentRewriter, CountArgumentRewriter, Guard, NoGuardRewriter,
    ParamShape, Rewriter,
};
pub use rules::{build_policy, global_policy};
pub use surface::ReferenceSurface;
pub use tree::{Decision, DenyReason, PolicyNode, PolicyTree};
