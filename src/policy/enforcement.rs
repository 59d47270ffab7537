//! Verification of compiled assemblies against the API policy.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::access::MemberRef;
use super::rewriter::CallSite;
use super::rules::global_policy;
use super::tree::{Decision, PolicyTree};
use crate::compilation::assembly::{AssemblyStreams, CompiledAssembly};
use crate::compilation::diagnostics::Diagnostic;
use crate::error::{Result, SandboxError};
use crate::macros::{debug, log_warn};

/// Diagnostic id reported for policy violations.
pub const POLICY_VIOLATION_ID: &str = "CL0001";

/// A reference to a member the policy does not allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    member: MemberRef,
    line: Option<u32>,
}

impl PolicyViolation {
    /// Create a violation for `member`, referenced at `line` when known.
    pub fn new(member: MemberRef, line: Option<u32>) -> Self {
        Self { member, line }
    }

    /// The offending member.
    pub fn member(&self) -> &MemberRef {
        &self.member
    }

    /// Source line of the first offending reference.
    pub fn line(&self) -> Option<u32> {
        self.line
    }

    /// Render as a compiler-style error diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diagnostic = Diagnostic::error(POLICY_VIOLATION_ID, self.to_string());
        diagnostic.line = self.line;
        diagnostic
    }
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "use of `{}` is not allowed", self.member)
    }
}

/// An assembly whose every library reference passed the policy.
///
/// Only [`PolicyEnforcer::enforce`] creates these, so holding one proves
/// verification ran.
#[derive(Debug, Clone)]
pub struct VerifiedAssembly {
    streams: AssemblyStreams,
    call_sites: BTreeMap<MemberRef, CallSite>,
    surface_version: &'static str,
}

impl VerifiedAssembly {
    /// The compiled streams.
    pub fn streams(&self) -> &AssemblyStreams {
        &self.streams
    }

    /// The rewritten call site for a member, if the assembly references it.
    pub fn call_site(&self, member: &MemberRef) -> Option<&CallSite> {
        self.call_sites.get(member)
    }

    /// All rewritten call sites, one per referenced member.
    pub fn call_sites(&self) -> impl Iterator<Item = &CallSite> {
        self.call_sites.values()
    }

    /// Reference surface version of the policy that verified this assembly.
    pub fn surface_version(&self) -> &'static str {
        self.surface_version
    }
}

/// Applies a [`PolicyTree`] to compiled assemblies.
#[derive(Debug, Clone)]
pub struct PolicyEnforcer {
    policy: Arc<PolicyTree>,
}

impl PolicyEnforcer {
    /// Create an enforcer over `policy`.
    pub fn new(policy: Arc<PolicyTree>) -> Self {
        Self { policy }
    }

    /// An enforcer over the process-wide policy.
    pub fn global() -> Self {
        Self::new(global_policy())
    }

    /// The policy being enforced.
    pub fn policy(&self) -> &Arc<PolicyTree> {
        &self.policy
    }

    /// Verify every reference of `assembly` and apply the matching rewriters.
    ///
    /// All offending members are collected (once each, with the line of their
    /// first reference) and reported together.
    pub fn enforce(&self, assembly: CompiledAssembly) -> Result<VerifiedAssembly> {
        let (streams, references) = assembly.into_parts();
        let mut call_sites = BTreeMap::new();
        let mut violations: Vec<PolicyViolation> = Vec::new();

        for site in references {
            match self.policy.resolve(&site.member) {
                Decision::Denied(_reason) => {
                    if violations.iter().any(|v| v.member == site.member) {
                        continue;
                    }
                    log_warn!(member = %site.member, reason = ?_reason, "policy denied member reference");
                    violations.push(PolicyViolation::new(site.member, site.line));
                }
                Decision::Allowed(rewriter) => {
                    if let Entry::Vacant(slot) = call_sites.entry(site.member.clone()) {
                        let site = match rewriter {
                            Some(rewriter) => {
                                debug!(member = %site.member, rewriter = rewriter.name(), "rewriting call site");
                                rewriter.rewrite(site)
                            }
                            None => site,
                        };
                        slot.insert(site);
                    }
                }
            }
        }

        if !violations.is_empty() {
            return Err(SandboxError::PolicyViolation(violations));
        }
        Ok(VerifiedAssembly {
            streams,
            call_sites,
            surface_version: self.policy.surface_version(),
        })
    }
}
