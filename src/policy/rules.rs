//! The API policy applied to all sandboxed code.

use std::sync::{Arc, LazyLock};

use super::access::AccessLevel::{Allowed, Denied, Neutral};
use super::builder::{FamilyMode, FamilyRule, PolicyBuilder};
use super::rewriter::{collected_enumerable, count_argument, no_guard};
use super::surface::ReferenceSurface;
use super::tree::PolicyTree;
use crate::error::PolicyBuildError;

/// Longest sleep sandboxed code may request, in milliseconds.
pub const MAX_SLEEP_MS: i64 = 1_000;

/// Reflection types: safe introspection chains only.
pub const REFLECTION_FAMILY: FamilyRule = FamilyRule {
    namespace: "System.Reflection",
    root: "System.Reflection.MemberInfo",
    mode: FamilyMode::Introspection,
};

/// Expression trees: any node, but no dynamic compilation.
pub const EXPRESSION_FAMILY: FamilyRule = FamilyRule {
    namespace: "System.Linq.Expressions",
    root: "System.Linq.Expressions.Expression",
    mode: FamilyMode::DenyDynamicCompilation,
};

/// Baseline rules for core types every language needs.
pub fn safe_defaults(builder: PolicyBuilder) -> PolicyBuilder {
    builder
        .namespace("System", Neutral, |n| {
            n.ty_with("Object", Neutral, |t| {
                t.member("ToString", Allowed)
                    .member("Equals", Allowed)
                    .member("GetHashCode", Allowed)
            })
            .ty("Int32", Allowed)
            .ty("Int64", Allowed)
            .ty("Boolean", Allowed)
            .ty("Double", Allowed)
            .ty("Char", Allowed)
            .ty("Math", Allowed)
            .ty_with("String", Allowed, |t| t.member("Intern", Denied))
        })
        .namespace("System.Linq", Neutral, |n| {
            n.ty_with("Enumerable", Neutral, |t| {
                t.member_with("Sum", Allowed, collected_enumerable())
                    .member_with("Count", Allowed, collected_enumerable())
                    .member("Select", Allowed)
                    .member("Where", Allowed)
            })
        })
        .namespace("System.Threading", Neutral, |n| {
            n.ty_with("Thread", Neutral, |t| {
                t.member_with("Sleep", Allowed, count_argument(MAX_SLEEP_MS))
            })
        })
}

/// Rules for console output, the lab runtime and language support libraries.
pub fn explicit_rules(builder: PolicyBuilder) -> PolicyBuilder {
    builder
        .namespace("System", Neutral, |n| {
            n.ty_with("Console", Neutral, |t| {
                t.member("Write", Allowed)
                    .member("WriteLine", Allowed)
                    // F# printf writes through Console.Out
                    .getter("Out", Allowed)
            })
            .ty("STAThreadAttribute", Allowed)
        })
        .namespace("System.IO", Neutral, |n| n.ty("TextWriter", Neutral))
        .namespace("CodeLab.Runtime.Internal", Neutral, |n| {
            n.ty_with("Flow", Neutral, |t| {
                t.member_with("ReportException", Allowed, no_guard())
                    .member_with("ReportLineStart", Allowed, no_guard())
                    .member_with("ReportValue", Allowed, no_guard())
            })
        })
        .namespace("", Neutral, |n| n.ty("CodeLabObjectExtensions", Allowed))
        .namespace("Microsoft.FSharp.Core", Neutral, |n| {
            n.ty("CompilationArgumentCountsAttribute", Allowed)
                .ty("CompilationMappingAttribute", Allowed)
                .ty("EntryPointAttribute", Allowed)
                .ty_with("ExtraTopLevelOperators", Neutral, |t| {
                    t.member_with("CreateDictionary", Allowed, collected_enumerable())
                        .member_with("CreateSet", Allowed, collected_enumerable())
                        .member("LazyPattern", Allowed)
                        .member("PrintFormat", Allowed)
                        .member("PrintFormatLine", Allowed)
                        .member("PrintFormatToTextWriter", Allowed)
                        .member("PrintFormatLineToTextWriter", Allowed)
                        .member("PrintFormatToString", Allowed)
                        .member("SpliceExpression", Allowed)
                        .member("SpliceUntypedExpression", Allowed)
                        .member("ToByte", Allowed)
                        .member("ToDouble", Allowed)
                        .member("ToSByte", Allowed)
                        .member("ToSingle", Allowed)
                })
                .ty("ExtraTopLevelOperators+Checked", Allowed)
                .ty("FSharpChoice`2", Allowed)
                .ty("FSharpFunc`2", Allowed)
                .ty("FSharpOption`1", Allowed)
                .ty("OptimizedClosures+FSharpFunc`3", Allowed)
                .ty("OptimizedClosures+FSharpFunc`4", Allowed)
                .ty("OptimizedClosures+FSharpFunc`5", Allowed)
                .ty_with("Operators", Allowed, |t| {
                    t.member("ConsoleError", Denied)
                        .member("ConsoleIn", Denied)
                        .member("ConsoleOut", Denied)
                        .member("Lock", Denied)
                })
                .ty("PrintfFormat`4", Allowed)
                .ty("PrintfFormat`5", Allowed)
                .ty_with("PrintfModule", Neutral, |t| {
                    t.member("PrintFormat", Allowed)
                        .member("PrintFormatLine", Allowed)
                        .member("PrintFormatToTextWriter", Allowed)
                        .member("PrintFormatLineToTextWriter", Allowed)
                })
                .ty("Unit", Allowed)
        })
        .namespace("Microsoft.FSharp.Collections", Neutral, |n| n.ty("FSharpList`1", Allowed))
        .namespace("Microsoft.VisualBasic.CompilerServices", Neutral, |n| {
            n.ty("StandardModuleAttribute", Allowed)
        })
}

/// Build the complete policy over `surface`.
pub fn build_policy(surface: ReferenceSurface) -> Result<PolicyTree, PolicyBuildError> {
    let builder = PolicyBuilder::new(surface)
        .family(REFLECTION_FAMILY)
        .family(EXPRESSION_FAMILY);
    explicit_rules(safe_defaults(builder)).build()
}

static GLOBAL_POLICY: LazyLock<Arc<PolicyTree>> = LazyLock::new(|| {
    match build_policy(ReferenceSurface::bundled()) {
        Ok(tree) => Arc::new(tree),
        // A broken rule table is a packaging defect; refuse to start.
        Err(e) => panic!("failed to build API policy: {e}"),
    }
});

/// The process-wide policy, built on first use.
///
/// # Panics
///
/// Panics if the bundled rule table does not validate against the bundled
/// reference surface.
pub fn global_policy() -> Arc<PolicyTree> {
    Arc::clone(&GLOBAL_POLICY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::access::MemberRef;
    use crate::policy::tree::Decision;

    fn decide(path: &str) -> Decision {
        global_policy().resolve(&path.parse::<MemberRef>().unwrap())
    }

    #[test]
    fn test_bundled_policy_builds() {
        let tree = build_policy(ReferenceSurface::bundled()).unwrap();
        assert_eq!(tree.surface_version(), crate::policy::surface::SURFACE_VERSION);
        assert!(tree.node_count() > 100);
    }

    #[test]
    fn test_console_output_allowed() {
        assert!(decide("System.Console::WriteLine").is_allowed());
        assert!(decide("System.Console::get_Out").is_allowed());
        assert!(!decide("System.Console::ReadLine").is_allowed());
        assert!(!decide("System.Console::SetOut").is_allowed());
    }

    #[test]
    fn test_dangerous_apis_denied() {
        assert!(!decide("System.IO.File::ReadAllText").is_allowed());
        assert!(!decide("System.Environment::Exit").is_allowed());
        assert!(!decide("System.Type::InvokeMember").is_allowed());
        assert!(!decide("System.Reflection.Assembly::Load").is_allowed());
        assert!(!decide("System.Linq.Expressions.LambdaExpression::Compile").is_allowed());
        assert!(!decide("Microsoft.FSharp.Core.Operators::Lock").is_allowed());
        assert!(!decide("System.String::Intern").is_allowed());
    }

    #[test]
    fn test_flow_hooks_pass_through() {
        for hook in ["ReportLineStart", "ReportValue", "ReportException"] {
            let decision = decide(&format!("CodeLab.Runtime.Internal.Flow::{hook}"));
            assert_eq!(decision.rewriter().map(|r| r.name()), Some("no-guard"));
        }
    }

    #[test]
    fn test_guarded_members_carry_rewriters() {
        let create_set = decide("Microsoft.FSharp.Core.ExtraTopLevelOperators::CreateSet");
        assert_eq!(
            create_set.rewriter().map(|r| r.name()),
            Some("collected-enumerable-argument")
        );
        let sleep = decide("System.Threading.Thread::Sleep");
        assert_eq!(sleep.rewriter().map(|r| r.name()), Some("count-argument"));
    }

    #[test]
    fn test_fsharp_core_types() {
        assert!(decide("Microsoft.FSharp.Core.FSharpOption`1::get_Value").is_allowed());
        assert!(decide("Microsoft.FSharp.Core.Operators::op_Addition").is_allowed());
        assert!(decide("Microsoft.FSharp.Collections.FSharpList`1::Cons").is_allowed());
        assert!(decide("CodeLabObjectExtensions::Inspect").is_allowed());
    }
}
