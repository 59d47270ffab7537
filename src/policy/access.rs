//! Access levels and member identities.

use std::fmt;
use std::str::FromStr;

use crate::error::SandboxError;

/// Access decision attached to a namespace, type or member rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessLevel {
    /// Use is blocked entirely, including all children.
    Denied,
    /// No blanket decision; children must be decided individually.
    Neutral,
    /// Use is permitted, optionally through a rewriter.
    Allowed,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccessLevel::Denied => "denied",
            AccessLevel::Neutral => "neutral",
            AccessLevel::Allowed => "allowed",
        })
    }
}

/// Fully-qualified reference to a library member.
///
/// Nested types use `+` (`Outer+Inner`) and generic arity uses a backtick
/// (`FSharpOption`1`), so the namespace always ends at the last `.` of the
/// type path. Property getters are named `get_<Property>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberRef {
    namespace: String,
    type_name: String,
    member: String,
}

impl MemberRef {
    /// Create a member reference from its parts.
    pub fn new(
        namespace: impl Into<String>,
        type_name: impl Into<String>,
        member: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
            member: member.into(),
        }
    }

    /// Build a reference from a type path such as `System.Console` and a member name.
    pub fn from_type_path(type_path: &str, member: impl Into<String>) -> Self {
        let (namespace, type_name) = split_type_path(type_path);
        Self::new(namespace, type_name, member)
    }

    /// Namespace, empty for the global namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Type name within the namespace.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Member name.
    pub fn member(&self) -> &str {
        &self.member
    }

    /// `Namespace.Type`, or just `Type` in the global namespace.
    pub fn type_path(&self) -> String {
        if self.namespace.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}.{}", self.namespace, self.type_name)
        }
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.namespace.is_empty() {
            write!(f, "{}.", self.namespace)?;
        }
        write!(f, "{}::{}", self.type_name, self.member)
    }
}

impl FromStr for MemberRef {
    type Err = SandboxError;

    /// Parse `Namespace.Type::Member`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_path, member) = s
            .split_once("::")
            .ok_or_else(|| SandboxError::Config(format!("malformed member reference `{s}`")))?;
        if type_path.is_empty() || member.is_empty() {
            return Err(SandboxError::Config(format!("malformed member reference `{s}`")));
        }
        Ok(Self::from_type_path(type_path, member))
    }
}

/// Split `A.B.Type` into `("A.B", "Type")`; a path without dots is in the global namespace.
pub fn split_type_path(type_path: &str) -> (&str, &str) {
    match type_path.rsplit_once('.') {
        Some((namespace, type_name)) => (namespace, type_name),
        None => ("", type_path),
    }
}

/// Name of the accessor member generated for a property getter.
pub fn getter_name(property: &str) -> String {
    format!("get_{property}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_member_ref() {
        let member: MemberRef = "System.Console::WriteLine".parse().unwrap();
        assert_eq!(member.namespace(), "System");
        assert_eq!(member.type_name(), "Console");
        assert_eq!(member.member(), "WriteLine");
        assert_eq!(member.to_string(), "System.Console::WriteLine");
    }

    #[test]
    fn test_nested_and_global_types() {
        let nested: MemberRef = "Microsoft.FSharp.Core.ExtraTopLevelOperators+Checked::op_Addition"
            .parse()
            .unwrap();
        assert_eq!(nested.namespace(), "Microsoft.FSharp.Core");
        assert_eq!(nested.type_name(), "ExtraTopLevelOperators+Checked");

        let global: MemberRef = "CodeLabObjectExtensions::Inspect".parse().unwrap();
        assert_eq!(global.namespace(), "");
        assert_eq!(global.type_path(), "CodeLabObjectExtensions");
        assert_eq!(global.to_string(), "CodeLabObjectExtensions::Inspect");
    }

    #[test]
    fn test_malformed_member_ref() {
        assert!("System.Console".parse::<MemberRef>().is_err());
        assert!("::Write".parse::<MemberRef>().is_err());
    }
}
