//! Process-wide handle registry and per-call context.
//!
//! Scripts never hold native references. They hold numeric handles that resolve through a
//! call-local map, a persistent map of content tags, and finally the creature directory. Every
//! resolution re-checks liveness, so a handle to a removed object simply stops resolving.

mod id_registry;

use std::cell::{RefCell, RefMut};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

pub use id_registry::IdRegistry;

use crate::combat::{CombatArea, CombatSpec, ConditionSpec, Variant};
use crate::diagnostics::DiagnosticLog;
use crate::error::{ScriptError, ScriptResult};
use crate::world::{ObjectDirectory, Position, ThingClass, ThingKey, ThingView};

pub type Handle = u32;
pub type EventId = u32;

/// Entry-point id used while source units execute at load time.
pub const EVENT_ID_LOADING: EventId = 1;
/// First id handed out to registered entry points.
pub const EVENT_ID_USER: EventId = 1000;

/// Below this value a handle is a content tag.
pub const FIRST_SYNTHETIC_HANDLE: Handle = 70_000;
/// At or above this value a handle is a creature's persistent id.
pub const CREATURE_HANDLE_BASE: Handle = 0x1000_0000;

/// Entry-point labels owned by one script host, shared with the context for error reports.
pub type EventLabels = Rc<RefCell<BTreeMap<EventId, String>>>;

/// Identity of the host whose entry point is running.
#[derive(Debug, Clone)]
pub struct HostBinding {
    pub name: Rc<str>,
    pub labels: EventLabels,
}

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    script_id: EventId,
    callback_id: Option<EventId>,
    event_desc: String,
    host: Option<HostBinding>,
    real_pos: Position,
}

impl CallContext {
    pub fn script_id(&self) -> EventId {
        self.script_id
    }

    pub fn callback_id(&self) -> Option<EventId> {
        self.callback_id
    }

    /// Entry point whose unit the call belongs to: the callback when one is running.
    pub fn active_id(&self) -> EventId {
        self.callback_id.unwrap_or(self.script_id)
    }

    pub fn is_loading(&self) -> bool {
        self.script_id == EVENT_ID_LOADING
    }

    pub fn event_desc(&self) -> &str {
        &self.event_desc
    }

    pub fn host_name(&self) -> Option<&str> {
        self.host.as_ref().map(|host| host.name.as_ref())
    }

    pub fn label(&self, id: EventId) -> Option<String> {
        let host = self.host.as_ref()?;
        let labels = host.labels.try_borrow().ok()?;
        labels.get(&id).cloned()
    }

    pub fn real_pos(&self) -> Position {
        self.real_pos
    }
}

/// Registry of handles, combat resources and call state shared by every host.
#[derive(Debug)]
pub struct ScriptEnv {
    local: HashMap<Handle, ThingKey>,
    global: HashMap<Handle, ThingKey>,
    last_synthetic: Handle,
    duplicate_tags: usize,
    areas: IdRegistry<CombatArea>,
    combats: IdRegistry<CombatSpec>,
    conditions: IdRegistry<ConditionSpec>,
    variants: IdRegistry<Variant>,
    storage: HashMap<u32, i32>,
    context: CallContext,
    diagnostics: DiagnosticLog,
}

impl Default for ScriptEnv {
    fn default() -> Self {
        Self::new(DiagnosticLog::default())
    }
}

impl ScriptEnv {
    pub fn new(diagnostics: DiagnosticLog) -> Self {
        Self {
            local: HashMap::new(),
            global: HashMap::new(),
            last_synthetic: FIRST_SYNTHETIC_HANDLE - 1,
            duplicate_tags: 0,
            areas: IdRegistry::new(),
            combats: IdRegistry::new(),
            conditions: IdRegistry::new(),
            variants: IdRegistry::new(),
            storage: HashMap::new(),
            context: CallContext::default(),
            diagnostics,
        }
    }

    /// Starts a fresh call: call-local handles and variants are dropped, the persistent map and
    /// the combat registries survive.
    pub fn reset(&mut self, script_id: EventId, host: Option<HostBinding>) {
        self.local.clear();
        self.variants.clear();
        self.context = CallContext {
            script_id,
            callback_id: None,
            event_desc: String::new(),
            host,
            real_pos: Position::default(),
        };
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    pub fn set_event_desc(&mut self, desc: impl Into<String>) {
        self.context.event_desc = desc.into();
    }

    pub fn set_real_pos(&mut self, pos: Position) {
        self.context.real_pos = pos;
    }

    /// Marks a callback as running. Only one may run at a time.
    pub fn begin_callback(&mut self, id: EventId) -> ScriptResult<()> {
        if self.context.callback_id.is_some() {
            return Err(ScriptError::interface("Nested callbacks!"));
        }
        self.context.callback_id = Some(id);
        Ok(())
    }

    pub fn end_callback(&mut self) {
        self.context.callback_id = None;
    }

    /// Handle for `thing`, stable for the rest of the call.
    pub fn assign<W: ObjectDirectory + ?Sized>(&mut self, world: &W, thing: ThingKey) -> Handle {
        if let Some(handle) = self.local.iter().find_map(|(handle, key)| (*key == thing).then_some(*handle)) {
            return handle;
        }

        match world.thing(thing) {
            Some(ThingView::Creature(creature)) => {
                self.local.insert(creature.id, thing);
                return creature.id;
            }
            Some(ThingView::Item(item)) if item.unique_id != 0 && item.on_tile => {
                // A duplicate tag still names this object for the rest of the call.
                if !self.register_persistent(item.unique_id, thing) {
                    self.local.insert(item.unique_id, thing);
                }
                return item.unique_id;
            }
            _ => {}
        }

        let handle = self.next_synthetic();
        self.local.insert(handle, thing);
        handle
    }

    fn next_synthetic(&mut self) -> Handle {
        loop {
            self.last_synthetic = self.last_synthetic.wrapping_add(1);
            if !(FIRST_SYNTHETIC_HANDLE..CREATURE_HANDLE_BASE).contains(&self.last_synthetic) {
                self.last_synthetic = FIRST_SYNTHETIC_HANDLE;
            }
            if !self.local.contains_key(&self.last_synthetic) {
                return self.last_synthetic;
            }
        }
    }

    /// Records a content tag in the persistent map. The first registration of a tag wins.
    pub fn register_persistent(&mut self, tag: Handle, thing: ThingKey) -> bool {
        match self.global.get(&tag) {
            Some(existing) if *existing == thing => true,
            Some(_) => {
                self.duplicate_tags += 1;
                tracing::warn!(target: "script", tag, "Duplicate uniqueId {tag}");
                false
            }
            None => {
                self.global.insert(tag, thing);
                true
            }
        }
    }

    /// Registers every content-tagged item lying on a tile. Run once the world is built so tags
    /// resolve before any call has seen the item. Returns how many tags were accepted.
    pub fn register_tagged_items<W: ObjectDirectory + ?Sized>(&mut self, world: &W) -> usize {
        world
            .tagged_tile_items()
            .into_iter()
            .filter(|(tag, thing)| self.register_persistent(*tag, *thing))
            .count()
    }

    pub fn duplicate_tags(&self) -> usize {
        self.duplicate_tags
    }

    pub fn persistent_len(&self) -> usize {
        self.global.len()
    }

    /// Resolves a handle to a live object, or `None` when it names nothing that still exists.
    pub fn resolve<W: ObjectDirectory + ?Sized>(&mut self, world: &W, handle: Handle) -> Option<ThingKey> {
        if let Some(key) = self.local.get(&handle).copied() {
            if world.is_live(key) {
                return Some(key);
            }
        }
        if let Some(key) = self.global.get(&handle).copied() {
            if world.is_live(key) {
                return Some(key);
            }
        }
        if handle >= CREATURE_HANDLE_BASE {
            if let Some(key) = world.creature_by_id(handle).filter(|key| world.is_live(*key)) {
                self.local.insert(handle, key);
                return Some(key);
            }
        }
        None
    }

    fn resolve_class<W, F>(&mut self, world: &W, handle: Handle, accept: F) -> Option<ThingKey>
    where
        W: ObjectDirectory + ?Sized,
        F: Fn(ThingClass) -> bool,
    {
        let key = self.resolve(world, handle)?;
        world.class_of(key).filter(|class| accept(*class)).map(|_| key)
    }

    pub fn resolve_item<W: ObjectDirectory + ?Sized>(&mut self, world: &W, handle: Handle) -> Option<ThingKey> {
        self.resolve_class(world, handle, |class| matches!(class, ThingClass::Item { .. }))
    }

    pub fn resolve_container<W: ObjectDirectory + ?Sized>(&mut self, world: &W, handle: Handle) -> Option<ThingKey> {
        self.resolve_class(world, handle, |class| matches!(class, ThingClass::Item { container: true }))
    }

    pub fn resolve_creature<W: ObjectDirectory + ?Sized>(&mut self, world: &W, handle: Handle) -> Option<ThingKey> {
        self.resolve_class(world, handle, |class| matches!(class, ThingClass::Creature(_)))
    }

    pub fn resolve_player<W: ObjectDirectory + ?Sized>(&mut self, world: &W, handle: Handle) -> Option<ThingKey> {
        self.resolve_class(world, handle, |class| {
            matches!(class, ThingClass::Creature(crate::world::CreatureRole::Player))
        })
    }

    pub fn add_area(&mut self, area: CombatArea) -> u32 {
        self.areas.add(area)
    }

    pub fn area(&self, id: u32) -> Option<&CombatArea> {
        self.areas.get(id)
    }

    pub fn add_combat(&mut self, combat: CombatSpec) -> u32 {
        self.combats.add(combat)
    }

    pub fn combat(&self, id: u32) -> Option<&CombatSpec> {
        self.combats.get(id)
    }

    pub fn combat_mut(&mut self, id: u32) -> Option<&mut CombatSpec> {
        self.combats.get_mut(id)
    }

    pub fn add_condition(&mut self, condition: ConditionSpec) -> u32 {
        self.conditions.add(condition)
    }

    pub fn condition(&self, id: u32) -> Option<&ConditionSpec> {
        self.conditions.get(id)
    }

    pub fn condition_mut(&mut self, id: u32) -> Option<&mut ConditionSpec> {
        self.conditions.get_mut(id)
    }

    pub fn add_variant(&mut self, variant: Variant) -> u32 {
        self.variants.add(variant)
    }

    pub fn variant(&self, id: u32) -> Option<&Variant> {
        self.variants.get(id)
    }

    pub fn global_storage(&self, key: u32) -> Option<i32> {
        self.storage.get(&key).copied()
    }

    pub fn set_global_storage(&mut self, key: u32, value: i32) {
        self.storage.insert(key, value);
    }

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut DiagnosticLog {
        &mut self.diagnostics
    }

    /// Reports a script error against the current call context.
    pub fn report(&mut self, function: Option<&str>, message: &str) {
        self.diagnostics.report(&self.context, function, message);
    }
}

/// Shared, single-threaded handle to the environment.
#[derive(Debug, Clone, Default)]
pub struct EnvHandle(Rc<RefCell<ScriptEnv>>);

impl EnvHandle {
    pub fn new(env: ScriptEnv) -> Self {
        Self(Rc::new(RefCell::new(env)))
    }

    /// Mutable access, or an interface fault when a native call already holds the environment.
    pub fn borrow_mut(&self) -> ScriptResult<RefMut<'_, ScriptEnv>> {
        self.0.try_borrow_mut().map_err(|_| ScriptError::interface("script environment is busy"))
    }

    pub fn with<R>(&self, f: impl FnOnce(&ScriptEnv) -> R) -> ScriptResult<R> {
        let env = self.0.try_borrow().map_err(|_| ScriptError::interface("script environment is busy"))?;
        Ok(f(&env))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ItemSpec, PlayerSpec, SimWorld};

    fn world_with_player() -> (SimWorld, ThingKey) {
        let mut world = SimWorld::new(7);
        world.add_tiles(Position::new(100, 100, 7), 3, 3);
        let player = world.spawn_player(PlayerSpec::named("Alice", Position::new(100, 100, 7)));
        (world, player)
    }

    #[test]
    fn synthetic_handles_start_at_floor_and_repeat_for_same_object() {
        let (mut world, _) = world_with_player();
        let pos = Position::new(101, 100, 7);
        let first = world.place_item(pos, 2148, 10).unwrap();
        let second = world.place_item(pos, 1987, 1).unwrap();
        let mut env = ScriptEnv::default();
        let a = env.assign(&world, first);
        let b = env.assign(&world, second);
        assert!(a >= FIRST_SYNTHETIC_HANDLE && a < CREATURE_HANDLE_BASE);
        assert_ne!(a, b);
        assert_eq!(env.assign(&world, first), a);
        assert_eq!(env.resolve(&world, a), Some(first));
    }

    #[test]
    fn tagged_map_items_resolve_before_any_assignment() {
        let (mut world, _) = world_with_player();
        let lever = world.place_item_with(Position::new(102, 100, 7), &ItemSpec::new(1945).unique(5000)).unwrap();
        let mut env = ScriptEnv::default();
        assert_eq!(env.resolve(&world, 5000), None);
        assert_eq!(env.register_tagged_items(&world), 1);
        assert_eq!(env.resolve_item(&world, 5000), Some(lever));
    }

    #[test]
    fn creatures_use_their_own_id() {
        let (world, player) = world_with_player();
        let mut env = ScriptEnv::default();
        let handle = env.assign(&world, player);
        assert!(handle >= CREATURE_HANDLE_BASE);
        env.reset(EVENT_ID_USER, None);
        assert_eq!(env.resolve(&world, handle), Some(player));
        assert_eq!(env.resolve_player(&world, handle), Some(player));
        assert_eq!(env.resolve_item(&world, handle), None);
    }

    #[test]
    fn local_handles_die_with_the_call() {
        let (mut world, _) = world_with_player();
        let item = world.place_item(Position::new(100, 101, 7), 1987, 1).unwrap();
        let mut env = ScriptEnv::default();
        let handle = env.assign(&world, item);
        env.reset(EVENT_ID_USER, None);
        assert_eq!(env.resolve(&world, handle), None);
    }

    #[test]
    fn removed_objects_stop_resolving() {
        let (mut world, _) = world_with_player();
        let item = world.place_item(Position::new(100, 101, 7), 1987, 1).unwrap();
        let mut env = ScriptEnv::default();
        let handle = env.assign(&world, item);
        world.remove_thing(item);
        assert_eq!(env.resolve(&world, handle), None);
    }

    #[test]
    fn first_registration_of_a_tag_wins() {
        let (mut world, _) = world_with_player();
        let first = world.place_item(Position::new(100, 101, 7), 1987, 1).unwrap();
        let second = world.place_item(Position::new(100, 102, 7), 1987, 1).unwrap();
        let mut env = ScriptEnv::default();
        assert!(env.register_persistent(5000, first));
        assert!(!env.register_persistent(5000, second));
        assert_eq!(env.duplicate_tags(), 1);
        assert_eq!(env.resolve(&world, 5000), Some(first));
    }

    #[test]
    fn nested_callbacks_are_rejected() {
        let mut env = ScriptEnv::default();
        env.begin_callback(1001).unwrap();
        let err = env.begin_callback(1002).unwrap_err();
        assert_eq!(err.to_string(), "Nested callbacks!");
        env.end_callback();
        assert!(env.begin_callback(1002).is_ok());
    }

    #[test]
    fn variants_are_call_local_but_ids_keep_growing() {
        let mut env = ScriptEnv::default();
        let first = env.add_variant(Variant::Creature(0x1000_0000));
        env.reset(EVENT_ID_USER, None);
        assert!(env.variant(first).is_none());
        let second = env.add_variant(Variant::PlayerName("Alice".into()));
        assert!(second > first);
    }
}
