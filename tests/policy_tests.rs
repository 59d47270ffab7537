//! Policy building, resolution and enforcement through the public API.

use codelab_sandbox_rs::compilation::{AssemblyStreams, CompiledAssembly};
use codelab_sandbox_rs::policy::rewriter::{collected_enumerable, count_argument};
use codelab_sandbox_rs::policy::rules::{EXPRESSION_FAMILY, REFLECTION_FAMILY};
use codelab_sandbox_rs::policy::{
    build_policy, global_policy, AccessLevel::*, CallSite, Decision, DenyReason, Guard, MemberRef,
    ParamShape, PolicyBuilder, PolicyEnforcer, ReferenceSurface,
};
use codelab_sandbox_rs::{PolicyBuildError, SandboxError};

fn member(path: &str) -> MemberRef {
    path.parse().unwrap()
}

fn console_only() -> PolicyBuilder {
    PolicyBuilder::new(ReferenceSurface::bundled()).namespace("System", Neutral, |n| {
        n.ty_with("Console", Neutral, |t| t.member("WriteLine", Allowed))
            .ty("Math", Allowed)
    })
}

#[test]
fn test_build_is_deterministic() {
    let first = build_policy(ReferenceSurface::bundled()).unwrap();
    let second = build_policy(ReferenceSurface::bundled()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.describe(), global_policy().describe());
}

#[test]
fn test_resolution_rules() {
    let tree = console_only().build().unwrap();

    assert!(tree.resolve(&member("System.Console::WriteLine")).is_allowed());
    // An allowed type allows every member without a rule.
    assert!(matches!(tree.resolve(&member("System.Math::Max")), Decision::Allowed(None)));
    assert!(matches!(
        tree.resolve(&member("System.Console::ReadLine")),
        Decision::Denied(DenyReason::NeutralWithoutRule)
    ));
    assert!(matches!(
        tree.resolve(&member("System.IO.File::Delete")),
        Decision::Denied(DenyReason::NotListed)
    ));
}

#[test]
fn test_denied_short_circuits() {
    let tree = PolicyBuilder::new(ReferenceSurface::bundled())
        .namespace("System.IO", Denied, |n| n)
        .build()
        .unwrap();
    assert!(matches!(
        tree.resolve(&member("System.IO.File::ReadAllText")),
        Decision::Denied(DenyReason::Explicit)
    ));
}

#[test]
fn test_unknown_type_aborts_build() {
    let error = PolicyBuilder::new(ReferenceSurface::bundled())
        .namespace("System", Neutral, |n| n.ty("Teleporter", Allowed))
        .build()
        .unwrap_err();
    assert!(matches!(error, PolicyBuildError::UnknownType(_)));
}

#[test]
fn test_unknown_member_aborts_build() {
    let error = PolicyBuilder::new(ReferenceSurface::bundled())
        .namespace("System", Neutral, |n| {
            n.ty_with("Console", Neutral, |t| t.member("Teleport", Allowed))
        })
        .build()
        .unwrap_err();
    assert!(matches!(error, PolicyBuildError::UnknownMember { .. }));
}

#[test]
fn test_conflicting_access_aborts_build() {
    let error = console_only()
        .namespace("System", Allowed, |n| n)
        .build()
        .unwrap_err();
    assert_eq!(error, PolicyBuildError::ConflictingAccess("System".to_string()));
}

#[test]
fn test_rewriter_requires_allowed() {
    let error = PolicyBuilder::new(ReferenceSurface::bundled())
        .namespace("System.Threading", Neutral, |n| {
            n.ty_with("Thread", Neutral, |t| t.member_with("Sleep", Denied, count_argument(10)))
        })
        .build()
        .unwrap_err();
    assert!(matches!(error, PolicyBuildError::RewriterOnDenied(_)));
}

#[test]
fn test_reflection_family_is_introspection_only() {
    let tree = PolicyBuilder::new(ReferenceSurface::bundled())
        .family(REFLECTION_FAMILY)
        .family(EXPRESSION_FAMILY)
        .build()
        .unwrap();

    assert!(tree.resolve(&member("System.Reflection.MethodInfo::get_Name")).is_allowed());
    assert!(!tree.resolve(&member("System.Reflection.MethodBase::get_MethodHandle")).is_allowed());
    assert!(!tree.resolve(&member("System.Reflection.MethodInfo::Invoke")).is_allowed());
    assert!(!tree.resolve(&member("System.Reflection.Assembly::Load")).is_allowed());
    assert!(!tree
        .resolve(&member("System.Linq.Expressions.LambdaExpression::Compile"))
        .is_allowed());
}

#[test]
fn test_enforcement_collects_every_violation() {
    let assembly = CompiledAssembly::new(
        AssemblyStreams::new(vec![0u8; 8]),
        vec![
            CallSite::new(member("System.IO.File::Delete"), vec![ParamShape::Value]).at_line(3),
            CallSite::new(member("System.Console::WriteLine"), vec![ParamShape::Value]).at_line(4),
            CallSite::new(member("System.IO.File::Delete"), vec![ParamShape::Value]).at_line(9),
            CallSite::new(member("System.Environment::Exit"), vec![ParamShape::Value]).at_line(5),
        ],
    );

    let Err(SandboxError::PolicyViolation(violations)) = PolicyEnforcer::global().enforce(assembly) else {
        panic!("expected a policy violation");
    };
    let reported: Vec<_> = violations.iter().map(|v| (v.member().to_string(), v.line())).collect();
    assert_eq!(
        reported,
        [
            ("System.IO.File::Delete".to_string(), Some(3)),
            ("System.Environment::Exit".to_string(), Some(5)),
        ]
    );
    assert!(violations.iter().all(|v| v.to_diagnostic().is_error()));
}

#[test]
fn test_custom_policy_guards_call_sites() {
    let tree = PolicyBuilder::new(ReferenceSurface::bundled())
        .namespace("System.Linq", Neutral, |n| {
            n.ty_with("Enumerable", Neutral, |t| t.member_with("Count", Allowed, collected_enumerable()))
        })
        .build()
        .unwrap();
    let enforcer = PolicyEnforcer::new(std::sync::Arc::new(tree));

    let count = member("System.Linq.Enumerable::Count");
    let verified = enforcer
        .enforce(CompiledAssembly::new(
            AssemblyStreams::new(vec![0u8; 8]),
            vec![CallSite::new(count.clone(), vec![ParamShape::Sequence])],
        ))
        .unwrap();

    let site = verified.call_site(&count).unwrap();
    assert_eq!(site.parameters, [ParamShape::Materialized]);
    assert!(matches!(site.guards[..], [Guard::MaterializeSequence { parameter: 0, .. }]));
}
