//! Host members exposed to guest modules.
//!
//! Guests import host members by type path and member name: module
//! `System.Console`, field `WriteLine`. Strings cross the boundary as a
//! `(ptr, len)` pair into the guest's exported `memory`. Sequences cross as a
//! handle that the host drains by calling the guest's `__seq_next` export
//! until it returns [`SEQUENCE_END`].
//!
//! Only imports that survived policy enforcement are linked, and each one is
//! linked with the guards its verified call site carries.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use thiserror::Error;
use wasmtime::{Caller, Engine, Extern, ExternType, Linker, Module};

use crate::error::{Result, SandboxError};
use crate::macros::log_warn;
use crate::policy::enforcement::{PolicyViolation, VerifiedAssembly};
use crate::policy::rewriter::{CallSite, CollectedEnumerableArgumentRewriter, ParamShape};
use crate::policy::MemberRef;
use crate::sandbox::flow::FlowEvent;
use crate::sandbox::limits::StoreData;
use crate::policy::rewriter::ParamShape::{Count, Sequence, Value};

/// Guest export that yields the next item of a sequence handle.
pub const SEQUENCE_NEXT: &str = "__seq_next";
/// Value `__seq_next` returns once a sequence is exhausted.
pub const SEQUENCE_END: i64 = i64::MIN;

const CONSOLE: &str = "System.Console";
const FLOW: &str = "CodeLab.Runtime.Internal.Flow";
const ENUMERABLE: &str = "System.Linq.Enumerable";
const OPERATORS: &str = "Microsoft.FSharp.Core.ExtraTopLevelOperators";
const THREAD: &str = "System.Threading.Thread";

const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Host members and the shapes of their logical parameters.
const HOST_MEMBERS: &[(&str, &str, &[ParamShape])] = &[
    (CONSOLE, "Write", &[Value]),
    (CONSOLE, "WriteLine", &[Value]),
    (FLOW, "ReportLineStart", &[Value]),
    (FLOW, "ReportValue", &[Value, Value, Value]),
    (FLOW, "ReportException", &[Value, Value]),
    (ENUMERABLE, "Sum", &[Sequence]),
    (ENUMERABLE, "Count", &[Sequence]),
    (OPERATORS, "CreateSet", &[Sequence]),
    (THREAD, "Sleep", &[Count]),
];

/// Trap raised by a host member.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostTrap {
    /// A guard rejected the call. Already recorded as a flow exception.
    #[error("{0}")]
    GuardRejected(String),
    /// The guest raised an exception through a host member.
    #[error("{0}")]
    GuestException(String),
    /// The deadline passed or the session was cancelled.
    #[error("execution interrupted")]
    Interrupted,
}

/// Parameter shapes of a host member, if the host implements it.
pub fn host_parameters(member: &MemberRef) -> Option<&'static [ParamShape]> {
    let type_path = member.type_path();
    HOST_MEMBERS
        .iter()
        .find(|(ty, name, _)| *ty == type_path && *name == member.member())
        .map(|(_, _, parameters)| *parameters)
}

/// Describe the imports of `module` as unguarded call sites.
///
/// Host members get their declared parameter shapes; anything else gets one
/// [`ParamShape::Value`] per Wasm parameter.
pub fn describe_imports(module: &Module) -> Vec<CallSite> {
    module
        .imports()
        .map(|import| {
            let member = MemberRef::from_type_path(import.module(), import.name());
            let parameters = match host_parameters(&member) {
                Some(shapes) => shapes.to_vec(),
                None => match import.ty() {
                    ExternType::Func(ty) => vec![Value; ty.params().len()],
                    _ => Vec::new(),
                },
            };
            CallSite::new(member, parameters)
        })
        .collect()
}

/// Build a linker for `module` from the verified call sites of `assembly`.
///
/// Imports that enforcement never saw are reported as policy violations.
pub fn link(engine: &Engine, module: &Module, assembly: &VerifiedAssembly) -> Result<Linker<StoreData>> {
    let mut sites = BTreeMap::new();
    let mut violations: Vec<PolicyViolation> = Vec::new();
    for import in module.imports() {
        let member = MemberRef::from_type_path(import.module(), import.name());
        match assembly.call_site(&member) {
            Some(site) => {
                sites.entry(member).or_insert(site);
            }
            None if violations.iter().any(|v| *v.member() == member) => {}
            None => {
                log_warn!(%member, "guest imports a member that was never verified");
                violations.push(PolicyViolation::new(member, None));
            }
        }
    }
    if !violations.is_empty() {
        return Err(SandboxError::PolicyViolation(violations));
    }

    let mut linker = Linker::new(engine);
    for site in sites.into_values() {
        define(&mut linker, site).map_err(SandboxError::ModuleLoad)?;
    }
    Ok(linker)
}

fn define(linker: &mut Linker<StoreData>, site: &CallSite) -> anyhow::Result<()> {
    let type_path = site.member.type_path();
    let name = site.member.member();
    match (type_path.as_str(), name) {
        (CONSOLE, "Write") => {
            linker.func_wrap(
                CONSOLE,
                name,
                |mut caller: Caller<'_, StoreData>, ptr: i32, len: i32| -> anyhow::Result<()> {
                    let text = read_str(&mut caller, ptr, len)?;
                    caller.data_mut().output.write_str(&text);
                    Ok(())
                },
            )?;
        }
        (CONSOLE, "WriteLine") => {
            linker.func_wrap(
                CONSOLE,
                name,
                |mut caller: Caller<'_, StoreData>, ptr: i32, len: i32| -> anyhow::Result<()> {
                    let text = read_str(&mut caller, ptr, len)?;
                    caller.data_mut().output.write_line(&text);
                    Ok(())
                },
            )?;
        }
        (FLOW, "ReportLineStart") => {
            linker.func_wrap(
                FLOW,
                name,
                |mut caller: Caller<'_, StoreData>, line: i32| -> anyhow::Result<()> {
                    let line = line_number(line);
                    caller.data_mut().flow.record(FlowEvent::LineReached { line });
                    Ok(())
                },
            )?;
        }
        (FLOW, "ReportValue") => {
            linker.func_wrap(
                FLOW,
                name,
                |mut caller: Caller<'_, StoreData>,
                 line: i32,
                 expression_ptr: i32,
                 expression_len: i32,
                 value_ptr: i32,
                 value_len: i32|
                 -> anyhow::Result<()> {
                    let expression = read_str(&mut caller, expression_ptr, expression_len)?;
                    let value = read_str(&mut caller, value_ptr, value_len)?;
                    caller.data_mut().flow.record(FlowEvent::ValueObserved {
                        line: line_number(line),
                        expression,
                        value,
                    });
                    Ok(())
                },
            )?;
        }
        (FLOW, "ReportException") => {
            linker.func_wrap(
                FLOW,
                name,
                |mut caller: Caller<'_, StoreData>, line: i32, ptr: i32, len: i32| -> anyhow::Result<()> {
                    let description = read_str(&mut caller, ptr, len)?;
                    caller.data_mut().flow.record(FlowEvent::ExceptionObserved {
                        line: line_number(line),
                        description,
                    });
                    Ok(())
                },
            )?;
        }
        (ENUMERABLE, "Sum") => {
            let max_items = sequence_limit(site);
            linker.func_wrap(
                ENUMERABLE,
                name,
                move |mut caller: Caller<'_, StoreData>, handle: i32| -> anyhow::Result<i64> {
                    let items = materialize(&mut caller, handle, max_items)?;
                    match items.iter().try_fold(0i64, |sum, item| sum.checked_add(*item)) {
                        Some(sum) => Ok(sum),
                        None => Err(raise(&mut caller, "arithmetic operation resulted in an overflow".into())),
                    }
                },
            )?;
        }
        (ENUMERABLE, "Count") => {
            let max_items = sequence_limit(site);
            linker.func_wrap(
                ENUMERABLE,
                name,
                move |mut caller: Caller<'_, StoreData>, handle: i32| -> anyhow::Result<i32> {
                    let items = materialize(&mut caller, handle, max_items)?;
                    Ok(i32::try_from(items.len())?)
                },
            )?;
        }
        (OPERATORS, "CreateSet") => {
            let max_items = sequence_limit(site);
            linker.func_wrap(
                OPERATORS,
                name,
                move |mut caller: Caller<'_, StoreData>, handle: i32| -> anyhow::Result<i32> {
                    let items = materialize(&mut caller, handle, max_items)?;
                    let set: BTreeSet<i64> = items.into_iter().collect();
                    Ok(i32::try_from(set.len())?)
                },
            )?;
        }
        (THREAD, "Sleep") => {
            let max = site.count_limit(0);
            linker.func_wrap(
                THREAD,
                name,
                move |mut caller: Caller<'_, StoreData>, millis: i32| -> anyhow::Result<()> {
                    let millis = i64::from(millis);
                    if millis < 0 || max.is_some_and(|max| millis > max) {
                        return Err(reject(&mut caller, format!("sleep of {millis}ms is out of range")));
                    }
                    sleep(&mut caller, Duration::from_millis(millis.unsigned_abs()))
                },
            )?;
        }
        _ => return Err(anyhow!("no host implementation for `{}`", site.member)),
    }
    Ok(())
}

fn line_number(line: i32) -> u32 {
    u32::try_from(line).unwrap_or(0)
}

fn sequence_limit(site: &CallSite) -> usize {
    site.materialize_limit(0)
        .unwrap_or(CollectedEnumerableArgumentRewriter::DEFAULT_MAX_ITEMS)
}

fn read_str(caller: &mut Caller<'_, StoreData>, ptr: i32, len: i32) -> anyhow::Result<String> {
    let memory = caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| anyhow!("guest does not export `memory`"))?;
    let start = usize::try_from(ptr)?;
    let len = usize::try_from(len)?;
    let bytes = start
        .checked_add(len)
        .and_then(|end| memory.data(&*caller).get(start..end))
        .ok_or_else(|| anyhow!("string at {start}+{len} is out of bounds"))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Drain a guest sequence into a buffer of at most `max_items` items.
fn materialize(caller: &mut Caller<'_, StoreData>, handle: i32, max_items: usize) -> anyhow::Result<Vec<i64>> {
    let next = caller
        .get_export(SEQUENCE_NEXT)
        .and_then(Extern::into_func)
        .ok_or_else(|| anyhow!("guest does not export `{SEQUENCE_NEXT}`"))?
        .typed::<i32, i64>(&*caller)?;

    let mut items = Vec::new();
    loop {
        let item = next.call(&mut *caller, handle)?;
        if item == SEQUENCE_END {
            return Ok(items);
        }
        if items.len() == max_items {
            return Err(reject(caller, format!("sequence has more than {max_items} items")));
        }
        items.push(item);
    }
}

/// Wait in slices so cancellation and the deadline are noticed promptly.
fn sleep(caller: &mut Caller<'_, StoreData>, duration: Duration) -> anyhow::Result<()> {
    let until = Instant::now() + duration;
    loop {
        if caller.data_mut().check_interrupt().is_some() {
            return Err(anyhow::Error::new(HostTrap::Interrupted));
        }
        let now = Instant::now();
        if now >= until {
            return Ok(());
        }
        let wake = until.min(caller.data().deadline());
        std::thread::sleep(wake.saturating_duration_since(now).min(SLEEP_SLICE));
    }
}

fn record_exception(caller: &mut Caller<'_, StoreData>, description: &str) {
    let flow = &mut caller.data_mut().flow;
    let line = flow.current_line();
    flow.record(FlowEvent::ExceptionObserved {
        line,
        description: description.to_string(),
    });
}

fn reject(caller: &mut Caller<'_, StoreData>, description: String) -> anyhow::Error {
    log_warn!(%description, "guard rejected host call");
    record_exception(caller, &description);
    anyhow::Error::new(HostTrap::GuardRejected(description))
}

fn raise(caller: &mut Caller<'_, StoreData>, description: String) -> anyhow::Error {
    record_exception(caller, &description);
    anyhow::Error::new(HostTrap::GuestException(description))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_parameters() {
        let sum: MemberRef = "System.Linq.Enumerable::Sum".parse().unwrap();
        assert_eq!(host_parameters(&sum), Some(&[Sequence][..]));
        let max: MemberRef = "System.Math::Max".parse().unwrap();
        assert_eq!(host_parameters(&max), None);
    }

    #[test]
    fn test_describe_imports() {
        let engine = Engine::default();
        let module = Module::new(
            &engine,
            r#"(module
                (import "System.Console" "WriteLine" (func (param i32 i32)))
                (import "System.Math" "Max" (func (param i32 i32) (result i32))))"#,
        )
        .unwrap();

        let sites = describe_imports(&module);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].member.to_string(), "System.Console::WriteLine");
        assert_eq!(sites[0].parameters, vec![Value]);
        assert_eq!(sites[1].parameters, vec![Value, Value]);
    }
}
