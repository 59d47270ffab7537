//! The namespace → type → member access tree.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::access::{AccessLevel, MemberRef};
use super::rewriter::Rewriter;

/// A node in the policy tree: a namespace, a type or a member.
#[derive(Clone)]
pub struct PolicyNode {
    access: AccessLevel,
    rewriter: Option<Arc<dyn Rewriter>>,
    children: BTreeMap<String, PolicyNode>,
}

impl PolicyNode {
    pub(crate) fn new(access: AccessLevel, rewriter: Option<Arc<dyn Rewriter>>) -> Self {
        Self {
            access,
            rewriter,
            children: BTreeMap::new(),
        }
    }

    /// Access level declared on this node.
    pub fn access(&self) -> AccessLevel {
        self.access
    }

    /// Rewriter declared on this node (members only).
    pub fn rewriter(&self) -> Option<&Arc<dyn Rewriter>> {
        self.rewriter.as_ref()
    }

    /// Child node by name.
    pub fn child(&self, name: &str) -> Option<&PolicyNode> {
        self.children.get(name)
    }

    /// Children in name order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &PolicyNode)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn children_mut(&mut self) -> &mut BTreeMap<String, PolicyNode> {
        &mut self.children
    }

    pub(crate) fn set_rewriter(&mut self, rewriter: Option<Arc<dyn Rewriter>>) {
        self.rewriter = rewriter;
    }

    fn count(&self) -> usize {
        1 + self.children.values().map(PolicyNode::count).sum::<usize>()
    }
}

impl PartialEq for PolicyNode {
    fn eq(&self, other: &Self) -> bool {
        self.access == other.access
            && self.rewriter.as_ref().map(|r| r.name()) == other.rewriter.as_ref().map(|r| r.name())
            && self.children == other.children
    }
}

impl Eq for PolicyNode {}

impl fmt::Debug for PolicyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyNode")
            .field("access", &self.access)
            .field("rewriter", &self.rewriter.as_ref().map(|r| r.name()))
            .field("children", &self.children)
            .finish()
    }
}

/// Why a reference was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The namespace, type or member is not in the tree.
    NotListed,
    /// A node on the path is explicitly denied.
    Explicit,
    /// A neutral node has no rule for the child.
    NeutralWithoutRule,
}

/// Effective decision for one member reference.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Use is permitted, through the rewriter when present.
    Allowed(Option<Arc<dyn Rewriter>>),
    /// Use is blocked.
    Denied(DenyReason),
}

impl Decision {
    /// Whether the decision permits use.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }

    /// Effective access level: never `Neutral`.
    pub fn access(&self) -> AccessLevel {
        match self {
            Decision::Allowed(_) => AccessLevel::Allowed,
            Decision::Denied(_) => AccessLevel::Denied,
        }
    }

    /// The rewriter to apply, if allowed with one.
    pub fn rewriter(&self) -> Option<&Arc<dyn Rewriter>> {
        match self {
            Decision::Allowed(rewriter) => rewriter.as_ref(),
            Decision::Denied(_) => None,
        }
    }
}

/// Immutable, process-wide API policy.
///
/// Built once by [`PolicyBuilder`](super::builder::PolicyBuilder) and shared
/// read-only across sessions.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PolicyTree {
    namespaces: BTreeMap<String, PolicyNode>,
    surface_version: &'static str,
}

impl PolicyTree {
    pub(crate) fn new(namespaces: BTreeMap<String, PolicyNode>, surface_version: &'static str) -> Self {
        Self {
            namespaces,
            surface_version,
        }
    }

    /// Version of the reference surface the tree was generated from.
    pub fn surface_version(&self) -> &'static str {
        self.surface_version
    }

    /// Namespace node by name (`""` for the global namespace).
    pub fn namespace(&self, name: &str) -> Option<&PolicyNode> {
        self.namespaces.get(name)
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.namespaces.values().map(PolicyNode::count).sum()
    }

    /// Resolve a member reference.
    ///
    /// Walks namespace → type → member. The first `Denied` short-circuits, a
    /// `Neutral` level without a child rule denies, and an `Allowed` level
    /// without a child rule allows its whole subtree.
    pub fn resolve(&self, member: &MemberRef) -> Decision {
        let Some(namespace) = self.namespaces.get(member.namespace()) else {
            return Decision::Denied(DenyReason::NotListed);
        };
        let path = [member.type_name(), member.member()];
        let mut node = namespace;
        for (depth, name) in path.iter().enumerate() {
            match node.access {
                AccessLevel::Denied => return Decision::Denied(DenyReason::Explicit),
                AccessLevel::Neutral | AccessLevel::Allowed => {}
            }
            match node.children.get(*name) {
                Some(child) => node = child,
                None if node.access == AccessLevel::Allowed => return Decision::Allowed(None),
                None if depth == 0 && node.children.is_empty() => {
                    return Decision::Denied(DenyReason::NotListed)
                }
                None => return Decision::Denied(DenyReason::NeutralWithoutRule),
            }
        }
        match node.access {
            AccessLevel::Allowed => Decision::Allowed(node.rewriter.clone()),
            AccessLevel::Denied => Decision::Denied(DenyReason::Explicit),
            AccessLevel::Neutral => Decision::Denied(DenyReason::NeutralWithoutRule),
        }
    }

    /// Canonical one-line-per-node listing, stable across builds.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (name, node) in &self.namespaces {
            describe_node(&mut out, 0, if name.is_empty() { "<global>" } else { name }, node);
        }
        out
    }
}

fn describe_node(out: &mut String, depth: usize, name: &str, node: &PolicyNode) {
    use std::fmt::Write;

    let _ = write!(out, "{:indent$}{name}: {}", "", node.access, indent = depth * 2);
    if let Some(rewriter) = &node.rewriter {
        let _ = write!(out, " [{}]", rewriter.name());
    }
    out.push('\n');
    for (child_name, child) in &node.children {
        describe_node(out, depth + 1, child_name, child);
    }
}
