//! Policy construction: explicit rules plus rules generated from the reference surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::access::{getter_name, AccessLevel};
use super::rewriter::Rewriter;
use super::surface::{ReferenceSurface, TypeKind};
use super::tree::{PolicyNode, PolicyTree};
use crate::error::PolicyBuildError;
use crate::macros::info;

/// A member rule within a type.
#[derive(Debug, Clone)]
struct MemberRule {
    name: String,
    access: AccessLevel,
    rewriter: Option<Arc<dyn Rewriter>>,
}

/// Rules for one type.
#[derive(Debug, Clone)]
pub struct TypeRules {
    name: String,
    access: AccessLevel,
    members: Vec<MemberRule>,
    validated: bool,
}

impl TypeRules {
    fn new(name: &str, access: AccessLevel, validated: bool) -> Self {
        Self {
            name: name.to_string(),
            access,
            members: Vec::new(),
            validated,
        }
    }

    /// Add a member rule (all overloads of the name).
    pub fn member(mut self, name: &str, access: AccessLevel) -> Self {
        self.members.push(MemberRule {
            name: name.to_string(),
            access,
            rewriter: None,
        });
        self
    }

    /// Add an allowed member rule whose call sites go through `rewriter`.
    pub fn member_with(mut self, name: &str, access: AccessLevel, rewriter: Arc<dyn Rewriter>) -> Self {
        self.members.push(MemberRule {
            name: name.to_string(),
            access,
            rewriter: Some(rewriter),
        });
        self
    }

    /// Add a rule for a property getter.
    pub fn getter(self, property: &str, access: AccessLevel) -> Self {
        self.member(&getter_name(property), access)
    }
}

/// Rules for one namespace.
#[derive(Debug, Clone)]
pub struct NamespaceRules {
    name: String,
    access: AccessLevel,
    types: Vec<TypeRules>,
}

impl NamespaceRules {
    fn new(name: &str, access: AccessLevel) -> Self {
        Self {
            name: name.to_string(),
            access,
            types: Vec::new(),
        }
    }

    /// Add a type rule without member rules.
    pub fn ty(self, name: &str, access: AccessLevel) -> Self {
        self.ty_with(name, access, |t| t)
    }

    /// Add a type rule and configure its members.
    pub fn ty_with(mut self, name: &str, access: AccessLevel, setup: impl FnOnce(TypeRules) -> TypeRules) -> Self {
        self.types.push(setup(TypeRules::new(name, access, true)));
        self
    }

    fn generated(&mut self, rules: TypeRules) {
        self.types.push(rules);
    }
}

/// How a generated family is turned into rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyMode {
    /// Family types are neutral: getters are allowed unless they expose a
    /// native handle, and methods only when they return another family type.
    Introspection,
    /// Family types are allowed except members that compile or execute code.
    DenyDynamicCompilation,
}

/// A library family whose rules are derived from the reference surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyRule {
    /// Namespace scanned for exported types.
    pub namespace: &'static str,
    /// Full name of the family root type.
    pub root: &'static str,
    /// Generation mode.
    pub mode: FamilyMode,
}

/// Builds an immutable [`PolicyTree`].
///
/// Building is deterministic for a fixed surface: rules are merged into
/// ordered maps, so insertion order never leaks into the result.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    surface: ReferenceSurface,
    namespaces: Vec<NamespaceRules>,
}

impl PolicyBuilder {
    /// Start a builder validating against `surface`.
    pub fn new(surface: ReferenceSurface) -> Self {
        Self {
            surface,
            namespaces: Vec::new(),
        }
    }

    /// Declare a namespace and its type rules.
    ///
    /// Declaring the same namespace twice merges the rules; the access levels
    /// must agree.
    pub fn namespace(mut self, name: &str, access: AccessLevel, setup: impl FnOnce(NamespaceRules) -> NamespaceRules) -> Self {
        self.namespaces.push(setup(NamespaceRules::new(name, access)));
        self
    }

    /// Generate rules for every exported type of a family namespace.
    ///
    /// Enumerations are allowed outright; types outside the family are left
    /// out, which keeps them denied.
    pub fn family(mut self, family: FamilyRule) -> Self {
        let mut rules = NamespaceRules::new(family.namespace, AccessLevel::Neutral);
        for ty in self.surface.types_in(family.namespace) {
            if ty.kind == TypeKind::Enum {
                rules.generated(TypeRules::new(ty.name, AccessLevel::Allowed, false));
                continue;
            }
            if !self.surface.is_same_or_subclass(&ty.full_name(), family.root) {
                continue;
            }

            let type_rules = match family.mode {
                FamilyMode::Introspection => {
                    let mut t = TypeRules::new(ty.name, AccessLevel::Neutral, false);
                    for property in self.surface.all_properties(ty) {
                        if property.name.contains("Handle") {
                            continue;
                        }
                        t = t.getter(property.name, AccessLevel::Allowed);
                    }
                    for method in self.surface.all_methods(ty) {
                        if self.surface.is_same_or_subclass(method.returns, family.root) {
                            t = t.member(method.name, AccessLevel::Allowed);
                        }
                    }
                    t
                }
                FamilyMode::DenyDynamicCompilation => {
                    let mut t = TypeRules::new(ty.name, AccessLevel::Allowed, false);
                    for method in self.surface.all_methods(ty) {
                        if method.name.contains("Compile") {
                            t = t.member(method.name, AccessLevel::Denied);
                        }
                    }
                    t
                }
            };
            rules.generated(type_rules);
        }
        self.namespaces.push(rules);
        self
    }

    /// Validate and assemble the tree.
    pub fn build(self) -> Result<PolicyTree, PolicyBuildError> {
        let mut namespaces: BTreeMap<String, PolicyNode> = BTreeMap::new();
        for ns in self.namespaces {
            let ns_node = merge_node(&mut namespaces, &ns.name, ns.access, None, &ns.name)?;
            for ty in ns.types {
                let type_path = if ns.name.is_empty() {
                    ty.name.clone()
                } else {
                    format!("{}.{}", ns.name, ty.name)
                };
                let entry = self.surface.find(&ns.name, &ty.name);
                if ty.validated && entry.is_none() {
                    return Err(PolicyBuildError::UnknownType(type_path));
                }
                if ns.access == AccessLevel::Denied && ty.access != AccessLevel::Denied {
                    return Err(PolicyBuildError::WidenedDenial(ns.name.clone()));
                }

                let ty_node = merge_node(ns_node.children_mut(), &ty.name, ty.access, None, &type_path)?;
                for member in ty.members {
                    let member_path = format!("{type_path}::{}", member.name);
                    if ty.validated {
                        match entry {
                            Some(entry) if self.surface.has_member(entry, &member.name) => {}
                            _ => {
                                return Err(PolicyBuildError::UnknownMember {
                                    type_name: type_path.clone(),
                                    member: member.name,
                                })
                            }
                        }
                    }
                    if ty.access == AccessLevel::Denied && member.access != AccessLevel::Denied {
                        return Err(PolicyBuildError::WidenedDenial(type_path.clone()));
                    }
                    if member.rewriter.is_some() && member.access != AccessLevel::Allowed {
                        return Err(PolicyBuildError::RewriterOnDenied(member_path));
                    }
                    merge_node(
                        ty_node.children_mut(),
                        &member.name,
                        member.access,
                        member.rewriter,
                        &member_path,
                    )?;
                }
            }
        }

        let tree = PolicyTree::new(namespaces, self.surface.version());
        info!(
            nodes = tree.node_count(),
            surface = tree.surface_version(),
            "API policy built"
        );
        Ok(tree)
    }
}

fn merge_node<'a>(
    map: &'a mut BTreeMap<String, PolicyNode>,
    name: &str,
    access: AccessLevel,
    rewriter: Option<Arc<dyn Rewriter>>,
    path: &str,
) -> Result<&'a mut PolicyNode, PolicyBuildError> {
    let node = map
        .entry(name.to_string())
        .or_insert_with(|| PolicyNode::new(access, None));
    if node.access() != access {
        return Err(PolicyBuildError::ConflictingAccess(path.to_string()));
    }
    if let Some(rewriter) = rewriter {
        match node.rewriter() {
            Some(existing) if existing.name() != rewriter.name() => {
                return Err(PolicyBuildError::ConflictingAccess(path.to_string()));
            }
            _ => node.set_rewriter(Some(rewriter)),
        }
    }
    Ok(node)
}
