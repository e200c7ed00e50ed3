//! One scripting interpreter per interface (actions, spells, talk actions...).
//!
//! A host loads source units, keeps a global table of the functions they define, and turns
//! selected functions into numbered entry points. Every native entry point from [`bindings`] is
//! registered on the engine for every argument count, so a wrong count is reported through the
//! diagnostic channel like any other argument error instead of aborting the script.
//!
//! [`bindings`]: crate::bindings

mod convert;

use std::cell::{RefCell, RefMut};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use rhai::{CallFnOptions, Dynamic, Engine, Scope, AST};

pub use convert::{from_dynamic, to_dynamic};

use crate::bindings::{self, dispatch, Binding, CallbackRegistrar, NativeCall, ScriptTimer, TimerQueue};
use crate::env::{EnvHandle, EventId, EventLabels, HostBinding, ScriptEnv, EVENT_ID_LOADING, EVENT_ID_USER};
use crate::error::{ScriptError, ScriptResult};
use crate::marshal::ScriptValue;
use crate::world::GameWorld;

/// Shared, single-threaded handle to the world the scripts drive.
pub type WorldHandle = Rc<RefCell<dyn GameWorld>>;

/// Highest argument count any entry point is reachable with.
pub const MAX_NATIVE_ARGS: usize = 7;

const UNKNOWN_LABEL: &str = "(Unknown script file)";

struct ScriptUnit {
    label: String,
    ast: Rc<AST>,
}

struct EntryPoint {
    unit: usize,
    function: String,
}

struct HostTables {
    units: Vec<ScriptUnit>,
    /// Function name to the unit that defined it last. Registration takes names out.
    globals: HashMap<String, usize>,
    entries: HashMap<EventId, EntryPoint>,
    next_event_id: EventId,
    /// Unit whose top-level statements are running.
    loading: Option<usize>,
    /// Functions of the bootstrap unit, visible to every later unit.
    prelude: Option<AST>,
}

impl Default for HostTables {
    fn default() -> Self {
        Self {
            units: Vec::new(),
            globals: HashMap::new(),
            entries: HashMap::new(),
            next_event_id: EVENT_ID_USER,
            loading: None,
            prelude: None,
        }
    }
}

impl HostTables {
    fn allocate(&mut self, labels: &EventLabels, unit: usize, function: &str) -> EventId {
        let id = self.next_event_id;
        self.next_event_id += 1;
        let label = format!("{}:{function}", self.units[unit].label);
        if let Ok(mut labels) = labels.try_borrow_mut() {
            labels.insert(id, label);
        }
        self.entries.insert(id, EntryPoint { unit, function: function.to_string() });
        id
    }

    fn entry_ast(&self, id: EventId) -> Option<(Rc<AST>, String)> {
        let entry = self.entries.get(&id)?;
        let unit = self.units.get(entry.unit)?;
        Some((Rc::clone(&unit.ast), entry.function.clone()))
    }
}

/// State every registered native closure shares with its host.
#[derive(Clone)]
struct Dispatcher {
    env: EnvHandle,
    world: WorldHandle,
    timers: TimerQueue,
    tables: Rc<RefCell<HostTables>>,
    labels: EventLabels,
}

impl Dispatcher {
    fn call(&self, binding: &'static Binding, args: Vec<Dynamic>) -> Dynamic {
        let args = args.iter().map(from_dynamic).collect();
        let result = match (self.env.borrow_mut(), self.world.try_borrow_mut()) {
            (Ok(mut env), Ok(mut world)) => {
                let mut call = NativeCall { env: &mut env, world: &mut *world, timers: &self.timers, callbacks: self };
                dispatch(binding, &mut call, args)
            }
            (Ok(mut env), Err(_)) => {
                env.report(Some(binding.name), "game world is busy");
                binding.failure.value()
            }
            (Err(err), _) => {
                tracing::error!(target: "script", function = binding.name, "{err}");
                binding.failure.value()
            }
        };
        to_dynamic(result)
    }
}

impl CallbackRegistrar for Dispatcher {
    fn register_callback(&self, function: &str) -> Option<EventId> {
        let mut tables = self.tables.try_borrow_mut().ok()?;
        let unit = tables.loading?;
        let defined = tables.units[unit].ast.iter_functions().any(|def| def.name == function);
        if !defined {
            return None;
        }
        Some(tables.allocate(&self.labels, unit, function))
    }
}

macro_rules! register_arity {
    ($engine:ident, $binding:ident, $dispatcher:ident; $($arg:ident),*) => {{
        let dispatcher = $dispatcher.clone();
        $engine.register_fn($binding.name, move |$($arg: Dynamic),*| -> Dynamic {
            dispatcher.call($binding, vec![$($arg),*])
        });
    }};
}

fn register_binding(engine: &mut Engine, binding: &'static Binding, dispatcher: &Dispatcher) {
    for arity in 0..=MAX_NATIVE_ARGS {
        match arity {
            0 => register_arity!(engine, binding, dispatcher;),
            1 => register_arity!(engine, binding, dispatcher; a),
            2 => register_arity!(engine, binding, dispatcher; a, b),
            3 => register_arity!(engine, binding, dispatcher; a, b, c),
            4 => register_arity!(engine, binding, dispatcher; a, b, c, d),
            5 => register_arity!(engine, binding, dispatcher; a, b, c, d, e),
            6 => register_arity!(engine, binding, dispatcher; a, b, c, d, e, f),
            _ => register_arity!(engine, binding, dispatcher; a, b, c, d, e, f, g),
        }
    }
}

pub struct ScriptHost {
    name: Rc<str>,
    engine: Engine,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHost").field("name", &self.name).field("units", &self.unit_count()).finish()
    }
}

impl ScriptHost {
    pub fn new(name: &str, env: EnvHandle, world: WorldHandle, timers: TimerQueue) -> Self {
        let name: Rc<str> = Rc::from(name);
        let dispatcher = Dispatcher {
            env,
            world,
            timers,
            tables: Rc::new(RefCell::new(HostTables::default())),
            labels: EventLabels::default(),
        };

        let mut engine = Engine::new();
        engine.set_fast_operators(true);
        let print_host = Rc::clone(&name);
        engine.on_print(move |text| tracing::info!(target: "script", host = %print_host, "{text}"));
        let debug_host = Rc::clone(&name);
        engine.on_debug(move |text, source, pos| {
            tracing::debug!(target: "script", host = %debug_host, source = source.unwrap_or("-"), %pos, "{text}")
        });
        for binding in bindings::catalog() {
            register_binding(&mut engine, binding, &dispatcher);
        }

        Self { name, engine, dispatcher }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_count(&self) -> usize {
        self.dispatcher.tables.try_borrow().map_or(0, |tables| tables.units.len())
    }

    fn tables(&self) -> ScriptResult<RefMut<'_, HostTables>> {
        self.dispatcher
            .tables
            .try_borrow_mut()
            .map_err(|_| ScriptError::interface(format!("script host {} is busy", self.name)))
    }

    fn binding(&self) -> HostBinding {
        HostBinding { name: Rc::clone(&self.name), labels: Rc::clone(&self.dispatcher.labels) }
    }

    fn set_label(&self, id: EventId, label: &str) {
        if let Ok(mut labels) = self.dispatcher.labels.try_borrow_mut() {
            labels.insert(id, label.to_string());
        }
    }

    /// Runs the bootstrap unit. Its functions become visible to every unit loaded afterwards. A
    /// failing bootstrap is logged and the host carries on without it.
    pub fn init(&mut self, label: &str, source: &str) -> bool {
        if let Err(err) = self.load(label, source) {
            tracing::warn!(target: "script", host = %self.name, "bootstrap {label} failed: {err}");
            return false;
        }
        self.adopt_prelude();
        true
    }

    pub fn init_file(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        if let Err(err) = self.load_file(path) {
            tracing::warn!(target: "script", host = %self.name, "bootstrap {} failed: {err}", path.display());
            return false;
        }
        self.adopt_prelude();
        true
    }

    fn adopt_prelude(&mut self) {
        if let Ok(mut tables) = self.tables() {
            let functions = tables.units.last().map(|unit| unit.ast.clone_functions_only());
            tables.prelude = match (tables.prelude.take(), functions) {
                (Some(prelude), Some(functions)) => Some(prelude.merge(&functions)),
                (prelude, functions) => functions.or(prelude),
            };
        }
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ScriptResult<()> {
        let path = path.as_ref();
        let label = path.file_name().map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
        match fs::read_to_string(path) {
            Ok(source) => self.load(&label, &source),
            Err(err) => {
                let fault = ScriptError::load(&label, format!("can not read {}: {err}", path.display()));
                self.report_error(None, &fault.to_string());
                Err(fault)
            }
        }
    }

    /// Compiles and runs one source unit under the loading id. The unit's functions shadow
    /// earlier globals of the same name; if the unit fails they are rolled back.
    pub fn load(&mut self, label: &str, source: &str) -> ScriptResult<()> {
        self.set_label(EVENT_ID_LOADING, label);
        self.dispatcher.env.borrow_mut()?.reset(EVENT_ID_LOADING, Some(self.binding()));
        let unit_ast = match self.engine.compile(source) {
            Ok(ast) => ast,
            Err(err) => {
                let fault = ScriptError::load(label, err.to_string());
                self.report_error(None, &fault.to_string());
                return Err(fault);
            }
        };
        let defined: BTreeSet<String> = unit_ast.iter_functions().map(|def| def.name.to_string()).collect();

        let (index, shadowed, ast) = {
            let mut tables = self.tables()?;
            let ast = match &tables.prelude {
                Some(prelude) => prelude.merge(&unit_ast),
                None => unit_ast,
            };
            let ast = Rc::new(ast);
            let index = tables.units.len();
            let shadowed: Vec<(String, Option<usize>)> = defined
                .into_iter()
                .map(|name| {
                    let previous = tables.globals.insert(name.clone(), index);
                    (name, previous)
                })
                .collect();
            tables.units.push(ScriptUnit { label: label.to_string(), ast: Rc::clone(&ast) });
            tables.loading = Some(index);
            (index, shadowed, ast)
        };

        let outcome = self.engine.run_ast_with_scope(&mut Scope::new(), &ast);

        let mut tables = self.tables()?;
        tables.loading = None;
        match outcome {
            Ok(()) => {
                tracing::debug!(target: "script", host = %self.name, unit = label, "loaded");
                Ok(())
            }
            Err(err) => {
                for (name, previous) in shadowed {
                    match previous {
                        Some(unit) => tables.globals.insert(name, unit),
                        None => tables.globals.remove(&name),
                    };
                }
                let orphaned: Vec<EventId> =
                    tables.entries.iter().filter(|(_, entry)| entry.unit == index).map(|(id, _)| *id).collect();
                for id in orphaned {
                    tables.entries.remove(&id);
                    if let Ok(mut labels) = self.dispatcher.labels.try_borrow_mut() {
                        labels.remove(&id);
                    }
                }
                tables.units.truncate(index);
                drop(tables);
                let fault = ScriptError::load(label, err.to_string());
                self.report_error(None, &fault.to_string());
                Err(fault)
            }
        }
    }

    /// Takes a global function out of the table and makes it an entry point.
    pub fn register_entry_point(&mut self, name: &str) -> Option<EventId> {
        let mut tables = self.tables().ok()?;
        let unit = tables.globals.remove(name)?;
        Some(tables.allocate(&self.dispatcher.labels, unit, name))
    }

    pub fn label(&self, id: EventId) -> String {
        self.dispatcher
            .labels
            .try_borrow()
            .ok()
            .and_then(|labels| labels.get(&id).cloned())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }

    /// Calls an entry point with the context as it currently stands.
    pub fn invoke(&self, id: EventId, args: Vec<ScriptValue>) -> ScriptResult<ScriptValue> {
        let entry = self.tables()?.entry_ast(id);
        let Some((ast, function)) = entry else {
            let fault = ScriptError::interface(format!("entry point {id} is not registered"));
            self.report_error(None, &fault.to_string());
            return Err(fault);
        };
        self.call_function(&ast, &function, args)
    }

    fn call_function(&self, ast: &AST, function: &str, args: Vec<ScriptValue>) -> ScriptResult<ScriptValue> {
        let args: Vec<Dynamic> = args.into_iter().map(to_dynamic).collect();
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        match self.engine.call_fn_with_options::<Dynamic>(options, &mut Scope::new(), ast, function, args) {
            Ok(value) => Ok(from_dynamic(&value)),
            Err(err) => {
                let fault = ScriptError::runtime(err.to_string());
                self.report_error(None, &fault.to_string());
                Err(fault)
            }
        }
    }

    /// Starts a fresh call scope for `id`, lets `prepare` assign handles and build the
    /// arguments, then invokes the entry point.
    pub fn call_event<F>(&self, id: EventId, desc: &str, prepare: F) -> ScriptResult<ScriptValue>
    where
        F: FnOnce(&mut ScriptEnv, &dyn GameWorld) -> Vec<ScriptValue>,
    {
        let args = {
            let mut env = self.dispatcher.env.borrow_mut()?;
            env.reset(id, Some(self.binding()));
            env.set_event_desc(desc);
            let world = self
                .dispatcher
                .world
                .try_borrow()
                .map_err(|_| ScriptError::interface("game world is busy"))?;
            prepare(&mut env, &*world)
        };
        self.invoke(id, args)
    }

    /// Runs a registered callback inside the current call. Only one callback may run at a time.
    pub fn call_callback(&self, id: EventId, args: Vec<ScriptValue>) -> ScriptResult<ScriptValue> {
        {
            let mut env = self.dispatcher.env.borrow_mut()?;
            if let Err(err) = env.begin_callback(id) {
                env.report(None, &err.to_string());
                return Err(err);
            }
        }
        let result = self.invoke(id, args);
        if let Ok(mut env) = self.dispatcher.env.borrow_mut() {
            env.end_callback();
        }
        result
    }

    /// Runs a deferred `addEvent` callback in a fresh call scope labelled with the entry point
    /// that queued it.
    pub fn run_timer(&self, timer: &ScriptTimer) -> ScriptResult<ScriptValue> {
        let entry = self.tables()?.entry_ast(timer.unit);
        {
            let mut env = self.dispatcher.env.borrow_mut()?;
            env.reset(timer.unit, Some(self.binding()));
            env.set_event_desc(format!("timer {}", timer.function));
        }
        let Some((ast, _)) = entry else {
            let fault = ScriptError::interface(format!("timer {} names unknown entry point {}", timer.function, timer.unit));
            self.report_error(None, &fault.to_string());
            return Err(fault);
        };
        self.call_function(&ast, &timer.function, timer.args.clone())
    }

    /// The single funnel for host-side faults.
    pub fn report_error(&self, function: Option<&str>, message: &str) {
        match self.dispatcher.env.borrow_mut() {
            Ok(mut env) => env.report(function, message),
            Err(_) => tracing::error!(target: "script", host = %self.name, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::scheduler::{ManualClock, Scheduler};
    use crate::sim::{PlayerSpec, SimWorld};
    use crate::world::{ObjectDirectory, Position};

    fn host() -> (ScriptHost, EnvHandle, Rc<RefCell<SimWorld>>) {
        let mut world = SimWorld::new(3);
        world.add_tiles(Position::new(100, 100, 7), 4, 4);
        world.spawn_player(PlayerSpec::named("Alice", Position::new(100, 100, 7)));
        let world = Rc::new(RefCell::new(world));
        let env = EnvHandle::default();
        let timers = Scheduler::new(Arc::new(ManualClock::new(0)));
        let host = ScriptHost::new("actions", env.clone(), world.clone(), timers);
        (host, env, world)
    }

    fn last_report(env: &EnvHandle) -> String {
        env.with(|env| env.diagnostics().last().unwrap_or_default().to_string()).unwrap()
    }

    #[test]
    fn registration_moves_the_global_out() {
        let (mut host, ..) = host();
        host.load("door.rhai", "fn onUse(cid) { 1 }").unwrap();
        let id = host.register_entry_point("onUse").expect("onUse is defined");
        assert_eq!(id, EVENT_ID_USER);
        assert_eq!(host.label(id), "door.rhai:onUse");
        assert_eq!(host.register_entry_point("onUse"), None);

        host.load("lever.rhai", "fn onUse(cid) { 2 }").unwrap();
        let second = host.register_entry_point("onUse").unwrap();
        assert_eq!(host.invoke(id, vec![ScriptValue::Int(0)]).unwrap(), ScriptValue::Int(1));
        assert_eq!(host.invoke(second, vec![ScriptValue::Int(0)]).unwrap(), ScriptValue::Int(2));
    }

    #[test]
    fn parse_failure_is_a_load_fault() {
        let (mut host, env, _) = host();
        let err = host.load("broken.rhai", "fn onUse( {").unwrap_err();
        assert!(matches!(err, ScriptError::LoadFault { .. }));
        assert!(last_report(&env).contains("broken.rhai"));
        assert_eq!(host.unit_count(), 0);
    }

    #[test]
    fn runtime_failure_rolls_back_globals() {
        let (mut host, ..) = host();
        host.load("first.rhai", "fn onUse() { 1 }").unwrap();
        let err = host.load("second.rhai", "fn onUse() { 2 }\nthrow \"boom\";").unwrap_err();
        assert!(matches!(err, ScriptError::LoadFault { .. }));
        let id = host.register_entry_point("onUse").unwrap();
        assert_eq!(host.invoke(id, vec![]).unwrap(), ScriptValue::Int(1));
    }

    #[test]
    fn bootstrap_functions_are_visible_to_later_units() {
        let (mut host, ..) = host();
        assert!(host.init("global.rhai", "fn double(x) { x * 2 }"));
        host.load("quest.rhai", "fn onUse(x) { double(x) }").unwrap();
        let id = host.register_entry_point("onUse").unwrap();
        assert_eq!(host.invoke(id, vec![ScriptValue::Int(21)]).unwrap(), ScriptValue::Int(42));
    }

    #[test]
    fn failing_bootstrap_is_not_fatal() {
        let (mut host, ..) = host();
        assert!(!host.init("global.rhai", "let x = ;"));
        host.load("quest.rhai", "fn onUse() { 5 }").unwrap();
        assert!(host.register_entry_point("onUse").is_some());
    }

    #[test]
    fn natives_report_wrong_argument_counts() {
        let (mut host, env, _) = host();
        host.load("level.rhai", "fn onUse() { getPlayerLevel() }").unwrap();
        let id = host.register_entry_point("onUse").unwrap();
        let result = host.call_event(id, "use", |_, _| Vec::new()).unwrap();
        assert_eq!(result, ScriptValue::Int(-1));
        let report = last_report(&env);
        assert!(report.starts_with("Script error: [actions]\nlevel.rhai:onUse\nuse\n"), "{report}");
        assert!(report.ends_with("getPlayerLevel(). expected 1 arguments, got 0"));
    }

    #[test]
    fn call_event_assigns_handles_for_the_script() {
        let (mut host, _, world) = host();
        host.load("name.rhai", "fn onLogin(cid) { getPlayerName(cid) }").unwrap();
        let id = host.register_entry_point("onLogin").unwrap();
        let alice = world.borrow().player_by_name("Alice").unwrap();
        let result = host
            .call_event(id, "login", |env, world| vec![ScriptValue::from(env.assign(world, alice))])
            .unwrap();
        assert_eq!(result, ScriptValue::from("Alice"));
    }

    #[test]
    fn unknown_entry_point_is_an_interface_fault() {
        let (host, ..) = host();
        assert!(matches!(host.invoke(4242, vec![]), Err(ScriptError::InterfaceFault(_))));
        assert_eq!(host.label(4242), UNKNOWN_LABEL);
    }

    #[test]
    fn nested_callbacks_are_refused() {
        let (mut host, env, _) = host();
        host.load("cb.rhai", "fn onTick() { 1 }").unwrap();
        let id = host.register_entry_point("onTick").unwrap();
        env.borrow_mut().unwrap().begin_callback(id).unwrap();
        let err = host.call_callback(id, vec![]).unwrap_err();
        assert_eq!(err.to_string(), "Nested callbacks!");
        env.borrow_mut().unwrap().end_callback();
        assert_eq!(host.call_callback(id, vec![]).unwrap(), ScriptValue::Int(1));
        assert!(env.with(|env| env.context().callback_id().is_none()).unwrap());
    }

    #[test]
    fn combat_callbacks_register_during_loading() {
        let (mut host, env, _) = host();
        let source = r#"
            let combat = createCombatObject();
            setGlobalStorageValue(1, setCombatCallback(combat, 1, "onFormula"));
            fn onFormula(cid, level, mag) { [-level, -mag] }
        "#;
        host.load("spell.rhai", source).unwrap();
        assert_eq!(env.with(|env| env.global_storage(1)).unwrap(), Some(0));
        let event = env.with(|env| env.combat(1).and_then(|combat| combat.callback.clone())).unwrap().unwrap();
        assert_eq!(event.host, "actions");
        assert_eq!(host.label(event.event), "spell.rhai:onFormula");
        let values = host
            .call_callback(event.event, vec![ScriptValue::Int(0), ScriptValue::Int(20), ScriptValue::Int(5)])
            .unwrap();
        assert_eq!(values, ScriptValue::Array(vec![ScriptValue::Int(-20), ScriptValue::Int(-5)]));
    }
}
