//! Named native entry points callable from scripts.
//!
//! Every entry point is a plain function over a [`NativeCall`] and a [`ValueStack`]. The table
//! entry declares its parameter schema and the status it hands back on failure, so argument
//! checking, error reporting and stack balance live in [`dispatch`] rather than in each function.

mod combat;
mod items;
mod player;
mod utility;

use crate::env::{EventId, Handle, ScriptEnv};
use crate::error::{NotFoundKind, ScriptError, ScriptResult};
use crate::marshal::{
    collapse_results, ArgKind, CallFrame, ScriptValue, ThingDescriptor, ValueStack, RET_ERROR, RET_FALSE,
    RET_NULL,
};
use crate::scheduler::Scheduler;
use crate::world::{CreatureView, GameWorld, ItemView, PlayerStats, Position, ThingKey, ThingView};

pub type NativeFn = fn(&mut NativeCall<'_>, &mut ValueStack) -> ScriptResult<usize>;

/// What an entry point hands back when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Status,
    Boolean,
    Null,
    Descriptor,
}

impl Failure {
    pub fn value(self) -> ScriptValue {
        match self {
            Failure::Status => ScriptValue::Int(RET_ERROR),
            Failure::Boolean => ScriptValue::Int(RET_FALSE),
            Failure::Null => ScriptValue::Int(RET_NULL),
            Failure::Descriptor => ThingDescriptor::EMPTY.to_value(),
        }
    }
}

#[derive(Clone, Copy)]
pub struct Binding {
    pub name: &'static str,
    pub params: &'static [ArgKind],
    /// Trailing parameters that may be omitted.
    pub optional: usize,
    pub failure: Failure,
    pub func: NativeFn,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding").field("name", &self.name).field("params", &self.params).finish()
    }
}

impl Binding {
    pub const fn new(name: &'static str, params: &'static [ArgKind], func: NativeFn) -> Self {
        Self { name, params, optional: 0, failure: Failure::Status, func }
    }

    pub const fn optional(mut self, count: usize) -> Self {
        self.optional = count;
        self
    }

    pub const fn fails_with(mut self, failure: Failure) -> Self {
        self.failure = failure;
        self
    }

    pub fn min_arity(&self) -> usize {
        self.params.len() - self.optional
    }

    pub fn max_arity(&self) -> usize {
        self.params.len()
    }

    pub fn check_args(&self, args: &[ScriptValue]) -> ScriptResult<()> {
        if args.len() < self.min_arity() || args.len() > self.max_arity() {
            return Err(ScriptError::invalid(format!(
                "expected {} arguments, got {}",
                self.arity_label(),
                args.len()
            )));
        }
        for (index, (kind, value)) in self.params.iter().zip(args).enumerate() {
            if !kind.accepts(value) {
                return Err(ScriptError::invalid(format!(
                    "argument #{} expected {}, got {}",
                    index + 1,
                    kind.label(),
                    value.type_name()
                )));
            }
        }
        Ok(())
    }

    fn arity_label(&self) -> String {
        if self.optional == 0 {
            self.max_arity().to_string()
        } else {
            format!("{}..{}", self.min_arity(), self.max_arity())
        }
    }
}

/// Every entry point exposed to scripts.
pub fn catalog() -> impl Iterator<Item = &'static Binding> {
    player::BINDINGS
        .iter()
        .chain(items::BINDINGS)
        .chain(combat::BINDINGS)
        .chain(utility::BINDINGS)
}

pub fn find(name: &str) -> Option<&'static Binding> {
    catalog().find(|binding| binding.name == name)
}

/// Deferred script call queued by `addEvent`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptTimer {
    pub host: String,
    /// Entry point whose source unit defines `function`.
    pub unit: EventId,
    pub function: String,
    pub args: Vec<ScriptValue>,
}

pub type TimerQueue = Scheduler<ScriptTimer>;

/// Lets entry points register script functions as callbacks of the running host.
pub trait CallbackRegistrar {
    fn register_callback(&self, function: &str) -> Option<EventId>;
}

/// Registrar for calls made outside any host.
pub struct NoCallbacks;

impl CallbackRegistrar for NoCallbacks {
    fn register_callback(&self, _function: &str) -> Option<EventId> {
        None
    }
}

/// Everything a native entry point may reach during one call.
pub struct NativeCall<'a> {
    pub env: &'a mut ScriptEnv,
    pub world: &'a mut dyn GameWorld,
    pub timers: &'a TimerQueue,
    pub callbacks: &'a dyn CallbackRegistrar,
}

impl NativeCall<'_> {
    pub fn thing(&mut self, handle: Handle) -> ScriptResult<(ThingKey, ThingView)> {
        self.env
            .resolve(&*self.world, handle)
            .and_then(|key| self.world.thing(key).map(|view| (key, view)))
            .ok_or(ScriptError::NotFound(NotFoundKind::Thing))
    }

    pub fn item(&mut self, handle: Handle) -> ScriptResult<(ThingKey, ItemView)> {
        self.env
            .resolve_item(&*self.world, handle)
            .and_then(|key| self.world.item(key).map(|view| (key, view)))
            .ok_or(ScriptError::NotFound(NotFoundKind::Item))
    }

    pub fn container(&mut self, handle: Handle) -> ScriptResult<(ThingKey, ItemView)> {
        self.env
            .resolve_container(&*self.world, handle)
            .and_then(|key| self.world.item(key).map(|view| (key, view)))
            .ok_or(ScriptError::NotFound(NotFoundKind::Container))
    }

    pub fn creature(&mut self, handle: Handle) -> ScriptResult<(ThingKey, CreatureView)> {
        self.env
            .resolve_creature(&*self.world, handle)
            .and_then(|key| self.world.creature(key).map(|view| (key, view)))
            .ok_or(ScriptError::NotFound(NotFoundKind::Creature))
    }

    pub fn player(&mut self, handle: Handle) -> ScriptResult<(ThingKey, CreatureView, PlayerStats)> {
        let key = self
            .env
            .resolve_player(&*self.world, handle)
            .ok_or(ScriptError::NotFound(NotFoundKind::Player))?;
        let mut creature = self.world.creature(key).ok_or(ScriptError::NotFound(NotFoundKind::Player))?;
        let stats = creature.player.take().ok_or(ScriptError::NotFound(NotFoundKind::Player))?;
        Ok((key, creature, stats))
    }

    /// Optional caster: zero means none.
    pub fn caster(&mut self, handle: Handle) -> ScriptResult<Option<ThingKey>> {
        if handle == 0 {
            return Ok(None);
        }
        self.creature(handle).map(|(key, _)| Some(key))
    }

    /// Assigns a handle to `thing` and builds its descriptor, or the empty descriptor.
    pub fn describe(&mut self, thing: Option<ThingKey>) -> ThingDescriptor {
        let Some(key) = thing else {
            return ThingDescriptor::EMPTY;
        };
        let Some(view) = self.world.thing(key) else {
            return ThingDescriptor::EMPTY;
        };
        let uid = self.env.assign(&*self.world, key);
        match view {
            ThingView::Creature(creature) => ThingDescriptor::for_creature(uid, &creature),
            ThingView::Item(item) => ThingDescriptor::for_item(uid, &item),
        }
    }

    /// Positions whose `x` is the marker mean "where this call happened".
    pub fn effective_position(&self, pos: Position) -> Position {
        if pos.is_real_pos_marker() {
            self.env.context().real_pos()
        } else {
            pos
        }
    }

    pub fn report(&mut self, function: &str, message: &str) {
        self.env.report(Some(function), message);
    }
}

/// Runs one entry point: schema check, call, balance check. Failures are reported against the
/// current context and turned into the binding's failure value; nothing propagates to the script.
/// An unbalanced stack is reported but the declared results are still delivered.
pub fn dispatch(binding: &Binding, call: &mut NativeCall<'_>, args: Vec<ScriptValue>) -> ScriptValue {
    if let Err(err) = binding.check_args(&args) {
        call.report(binding.name, &err.to_string());
        return binding.failure.value();
    }

    let consumed = args.len();
    let mut stack = ValueStack::from_args(args);
    let frame = CallFrame::enter(&stack, consumed);
    match (binding.func)(call, &mut stack) {
        Ok(produced) => {
            if let Err(imbalance) = frame.finish(&stack, produced) {
                tracing::debug!(
                    target: "script",
                    function = binding.name,
                    expected = imbalance.expected,
                    actual = imbalance.actual,
                    "unbalanced native call"
                );
                call.report(binding.name, &imbalance.to_string());
            }
            collapse_results(stack.split_top(produced))
        }
        Err(err) => {
            call.report(binding.name, &err.to_string());
            binding.failure.value()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::env::{ScriptEnv, EVENT_ID_USER};
    use crate::scheduler::ManualClock;
    use crate::sim::SimWorld;

    /// Env, world and timer queue wired together for calling entry points directly.
    pub struct Fixture {
        pub env: ScriptEnv,
        pub world: SimWorld,
        pub timers: TimerQueue,
        pub clock: ManualClock,
    }

    impl Fixture {
        pub fn new(world: SimWorld) -> Self {
            let clock = ManualClock::new(0);
            let mut env = ScriptEnv::default();
            env.reset(EVENT_ID_USER, None);
            Self { env, world, timers: Scheduler::new(Arc::new(clock.clone())), clock }
        }

        pub fn call(&mut self, name: &str, args: Vec<ScriptValue>) -> ScriptValue {
            let binding = find(name).unwrap_or_else(|| panic!("no entry point named {name}"));
            let mut call = NativeCall {
                env: &mut self.env,
                world: &mut self.world,
                timers: &self.timers,
                callbacks: &NoCallbacks,
            };
            dispatch(binding, &mut call, args)
        }

        pub fn last_error(&self) -> Option<&str> {
            self.env.diagnostics().last()
        }
    }

    pub fn int(value: i64) -> ScriptValue {
        ScriptValue::Int(value)
    }

    pub fn text(value: &str) -> ScriptValue {
        ScriptValue::from(value)
    }

    pub fn field(value: &ScriptValue, key: &str) -> i64 {
        match value.field(key) {
            Some(ScriptValue::Int(number)) => *number,
            other => panic!("field {key} missing or not an int: {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::testing::*;
    use super::*;
    use crate::sim::SimWorld;

    #[test]
    fn entry_point_names_are_unique() {
        let mut seen = HashSet::new();
        for binding in catalog() {
            assert!(seen.insert(binding.name), "duplicate entry point {}", binding.name);
            assert!(binding.optional <= binding.params.len());
        }
        assert!(seen.len() > 80);
    }

    #[test]
    fn wrong_argument_count_reports_and_returns_failure() {
        let mut fixture = Fixture::new(SimWorld::new(1));
        let result = fixture.call("getPlayerLevel", vec![]);
        assert_eq!(result, ScriptValue::Int(RET_ERROR));
        assert!(fixture.last_error().unwrap().contains("getPlayerLevel(). expected 1 arguments, got 0"));
    }

    #[test]
    fn wrong_argument_type_is_invalid_argument() {
        let mut fixture = Fixture::new(SimWorld::new(1));
        let result = fixture.call("getPlayerLevel", vec![text("bob")]);
        assert_eq!(result, ScriptValue::Int(RET_ERROR));
        assert!(fixture.last_error().unwrap().contains("argument #1 expected number, got string"));
    }

    fn leaves_extra_value(_call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
        stack.pop_int()?;
        stack.push(41);
        stack.push(42);
        Ok(1)
    }

    #[test]
    fn unbalanced_entry_point_is_reported() {
        const BROKEN: Binding = Binding::new("broken", &[ArgKind::Number], leaves_extra_value);
        let mut fixture = Fixture::new(SimWorld::new(1));
        let mut call = NativeCall {
            env: &mut fixture.env,
            world: &mut fixture.world,
            timers: &fixture.timers,
            callbacks: &NoCallbacks,
        };
        let result = dispatch(&BROKEN, &mut call, vec![int(3)]);
        assert_eq!(result, ScriptValue::Int(42), "declared result is still delivered");
        assert!(fixture.env.diagnostics().last().unwrap().ends_with("broken(). Stack size changed!"));
    }
}
