use super::{Binding, Failure, NativeCall, ScriptTimer};
use crate::error::{ScriptError, ScriptResult};
use crate::marshal::{ArgKind, ValueStack, RET_FALSE, RET_OK, RET_TRUE};

use ArgKind::{Any, Array, Callback, Number as N, Text};

/// Value read back for a storage key nobody has written.
const UNSET_STORAGE: i64 = -1;

pub(super) const BINDINGS: &[Binding] = &[
    Binding::new("getGlobalStorageValue", &[N], get_global_storage_value),
    Binding::new("setGlobalStorageValue", &[N, N], set_global_storage_value),
    Binding::new("debugPrint", &[Text], debug_print),
    Binding::new("isInArray", &[Array, Any], is_in_array).fails_with(Failure::Boolean),
    Binding::new("addEvent", &[Callback, N, Any], add_event).optional(1),
    Binding::new("stopEvent", &[N], stop_event).fails_with(Failure::Boolean),
];

fn get_global_storage_value(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let key = stack.pop_u32()?;
    let value = call.env.global_storage(key).map_or(UNSET_STORAGE, i64::from);
    stack.push(value);
    Ok(1)
}

fn set_global_storage_value(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let value = stack.pop_i32()?;
    let key = stack.pop_u32()?;
    call.env.set_global_storage(key, value);
    stack.push(RET_OK);
    Ok(1)
}

fn debug_print(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let message = stack.pop_text()?;
    let context = call.env.context();
    tracing::info!(target: "script", host = context.host_name().unwrap_or("-"), "{message}");
    Ok(0)
}

fn is_in_array(_call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let needle = stack.pop()?;
    let haystack = stack.pop_array()?;
    let found = haystack.iter().any(|value| value.loosely_equals(&needle));
    stack.push(if found { RET_TRUE } else { RET_FALSE });
    Ok(1)
}

/// Queues `callback(arg)` to run after `delay` milliseconds in the host and unit that called.
fn add_event(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let args = if stack.len() > 2 { vec![stack.pop()?] } else { Vec::new() };
    let delay = stack.pop_int()?.max(0) as u64;
    let function = stack.pop_text()?;

    let context = call.env.context();
    if context.is_loading() {
        return Err(ScriptError::interface("Can not add events during script loading!"));
    }
    let host = context
        .host_name()
        .ok_or_else(|| ScriptError::interface("addEvent called outside a script host"))?
        .to_string();
    let timer = ScriptTimer { host, unit: context.active_id(), function, args };
    let id = call.timers.schedule(delay, timer);
    tracing::debug!(target: "scheduler", task = id, delay, "script timer queued");
    stack.push(id as i64);
    Ok(1)
}

fn stop_event(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let id = stack.pop_int()?;
    let stopped = u64::try_from(id).is_ok_and(|id| call.timers.cancel(id));
    stack.push(if stopped { RET_TRUE } else { RET_FALSE });
    Ok(1)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use super::super::testing::*;
    use crate::env::{HostBinding, EVENT_ID_LOADING};
    use crate::marshal::ScriptValue;
    use crate::sim::SimWorld;

    fn hosted(fx: &mut Fixture, id: u32) {
        let labels = Rc::new(RefCell::new(BTreeMap::from([(id, "quests.rhai:onUse".to_string())])));
        fx.env.reset(id, Some(HostBinding { name: "actions".into(), labels }));
    }

    #[test]
    fn global_storage_defaults_to_minus_one() {
        let mut fx = Fixture::new(SimWorld::new(1));
        assert_eq!(fx.call("getGlobalStorageValue", vec![int(5)]), int(-1));
        assert_eq!(fx.call("setGlobalStorageValue", vec![int(5), int(42)]), int(0));
        fx.env.reset(1001, None);
        assert_eq!(fx.call("getGlobalStorageValue", vec![int(5)]), int(42));
    }

    #[test]
    fn is_in_array_compares_numbers_loosely() {
        let mut fx = Fixture::new(SimWorld::new(1));
        let values = ScriptValue::Array(vec![int(1), ScriptValue::Float(2.0), text("three")]);
        assert_eq!(fx.call("isInArray", vec![values.clone(), int(2)]), int(1));
        assert_eq!(fx.call("isInArray", vec![values.clone(), text("three")]), int(1));
        assert_eq!(fx.call("isInArray", vec![values, int(4)]), int(0));
        assert_eq!(fx.call("isInArray", vec![int(4), int(4)]), int(0));
    }

    #[test]
    fn debug_print_produces_no_result() {
        let mut fx = Fixture::new(SimWorld::new(1));
        assert_eq!(fx.call("debugPrint", vec![text("hello")]), ScriptValue::Nil);
        assert!(fx.last_error().is_none());
    }

    #[test]
    fn add_event_queues_a_timer_for_the_calling_unit() {
        let mut fx = Fixture::new(SimWorld::new(1));
        hosted(&mut fx, 1003);
        let id = fx.call("addEvent", vec![text("openDoor"), int(500), int(7)]);
        assert_eq!(id, int(1));
        assert_eq!(fx.call("addEvent", vec![text("closeDoor"), int(100)]), int(2));

        fx.clock.advance(500);
        let ready = fx.timers.pop_ready(fx.timers.now());
        let names: Vec<_> = ready.iter().map(|task| task.payload.function.as_str()).collect();
        assert_eq!(names, ["closeDoor", "openDoor"]);
        assert_eq!(ready[1].payload.host, "actions");
        assert_eq!(ready[1].payload.unit, 1003);
        assert_eq!(ready[1].payload.args, vec![int(7)]);
    }

    #[test]
    fn stop_event_cancels_once() {
        let mut fx = Fixture::new(SimWorld::new(1));
        hosted(&mut fx, 1000);
        let id = fx.call("addEvent", vec![text("tick"), int(50)]);
        assert_eq!(fx.call("stopEvent", vec![id.clone()]), int(1));
        assert_eq!(fx.call("stopEvent", vec![id]), int(0));
        assert_eq!(fx.call("stopEvent", vec![int(-3)]), int(0));
        assert!(fx.timers.is_empty());
    }

    #[test]
    fn add_event_is_refused_while_loading() {
        let mut fx = Fixture::new(SimWorld::new(1));
        fx.env.reset(EVENT_ID_LOADING, None);
        assert_eq!(fx.call("addEvent", vec![text("tick"), int(50)]), int(-1));
        assert!(fx.last_error().unwrap().ends_with("Can not add events during script loading!"));
        assert!(fx.timers.is_empty());
    }
}
