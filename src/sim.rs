//! Reference world backed by a `bevy_ecs` store.
//!
//! Creatures and items are entities; a removed object is despawned, so any [`ThingKey`] still
//! held for it fails the generation check and stops resolving.

mod actions;
mod catalog;
mod combat;
mod components;
mod events;
mod setup;

use std::collections::{BTreeMap, HashMap};

use bevy_ecs::prelude::*;
use bitflags::bitflags;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub use actions::MAX_LEVEL;
pub use catalog::{ItemCatalog, ItemType, MAX_STACK};
pub use components::{ActiveConditions, ContainerSlots, Creature, ItemState, Placement, PlayerState};
pub use events::WorldEvent;
pub use setup::{CreatureSpec, FloorSpec, GuildSpec, HouseSpec, ItemSpec, PlayerSpec, TileSpec, WorldSpec};

use crate::world::{
    ActionError, ActionResult, ContainerView, CreatureFilter, CreatureId, CreatureRole, CreatureView, ItemView,
    ObjectDirectory, PlayerStats, Position, StackSelector, ThingKey, ThingView, TileView, WorldInfo, SLOT_COUNT,
};

pub const FIRST_CREATURE_ID: CreatureId = 0x1000_0000;
pub const SLOT_BACKPACK: u8 = 3;
pub const SLOT_RIGHT: u8 = 5;
pub const SLOT_LEFT: u8 = 6;

const VIEW_RANGE_X: i32 = 8;
const VIEW_RANGE_Y: i32 = 6;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TileFlags: u8 {
        const PROTECTION_ZONE = 1;
        const BLOCKING = 2;
    }
}

#[derive(Debug, Clone, Default)]
struct Tile {
    flags: TileFlags,
    house: Option<u32>,
    /// Bottom to top.
    things: Vec<Entity>,
}

pub struct SimWorld {
    ecs: World,
    tiles: HashMap<Position, Tile>,
    catalog: ItemCatalog,
    creatures: BTreeMap<CreatureId, Entity>,
    next_creature_id: CreatureId,
    houses: BTreeMap<u32, String>,
    guilds: BTreeMap<String, u32>,
    info: WorldInfo,
    events: Vec<WorldEvent>,
    rng: StdRng,
}

impl std::fmt::Debug for SimWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimWorld")
            .field("tiles", &self.tiles.len())
            .field("creatures", &self.creatures.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl SimWorld {
    pub fn new(seed: u64) -> Self {
        Self {
            ecs: World::new(),
            tiles: HashMap::new(),
            catalog: ItemCatalog::default(),
            creatures: BTreeMap::new(),
            next_creature_id: FIRST_CREATURE_ID,
            houses: BTreeMap::new(),
            guilds: BTreeMap::new(),
            info: WorldInfo { time: 12 * 60, light_level: 250, light_color: 215, ..WorldInfo::default() },
            events: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_spec(spec: &WorldSpec) -> ActionResult<Self> {
        let mut world = Self::new(spec.seed);
        world.info.kind = spec.world_type;
        for item_type in &spec.item_types {
            world.catalog.insert(item_type.clone());
        }
        for floor in &spec.floors {
            for x in floor.from.x..=floor.to.x {
                for y in floor.from.y..=floor.to.y {
                    world.add_tile(Position::new(x, y, floor.from.z), TileFlags::empty(), None);
                }
            }
        }
        for tile in &spec.tiles {
            let flags = if tile.protection_zone { TileFlags::PROTECTION_ZONE } else { TileFlags::empty() };
            world.add_tile(tile.position, flags, tile.house);
            for item in &tile.items {
                world.place_item_with(tile.position, item)?;
            }
        }
        for house in &spec.houses {
            world.houses.insert(house.id, house.owner.clone());
        }
        for (name, id) in &spec.guilds {
            world.guilds.insert(name.clone(), *id);
        }
        for player in &spec.players {
            world.try_spawn_player(player)?;
        }
        for creature in &spec.creatures {
            world.spawn_creature(creature.role, &creature.name, creature.position, creature.health)?;
        }
        Ok(world)
    }

    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut ItemCatalog {
        &mut self.catalog
    }

    pub fn set_world_info(&mut self, info: WorldInfo) {
        self.info = info;
    }

    pub fn add_house(&mut self, id: u32, owner: &str) {
        self.houses.insert(id, owner.to_string());
    }

    pub fn add_guild(&mut self, name: &str, id: u32) {
        self.guilds.insert(name.to_string(), id);
    }

    pub fn add_tile(&mut self, pos: Position, flags: TileFlags, house: Option<u32>) {
        let tile = self.tiles.entry(pos).or_default();
        tile.flags = flags;
        tile.house = house;
    }

    /// Plain floor of `width` x `height` tiles starting at `origin`.
    pub fn add_tiles(&mut self, origin: Position, width: u16, height: u16) {
        for dx in 0..width {
            for dy in 0..height {
                self.add_tile(Position::new(origin.x + dx, origin.y + dy, origin.z), TileFlags::empty(), None);
            }
        }
    }

    pub fn events(&self) -> &[WorldEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn record(&mut self, event: WorldEvent) {
        tracing::debug!(target: "world", "{event}");
        self.events.push(event);
    }

    /// Spawns a player, creating a plain tile under it when none exists.
    pub fn spawn_player(&mut self, spec: PlayerSpec) -> ThingKey {
        self.tiles.entry(spec.position).or_default();
        self.insert_player(&spec)
    }

    pub fn try_spawn_player(&mut self, spec: &PlayerSpec) -> ActionResult<ThingKey> {
        if !self.tiles.contains_key(&spec.position) {
            return Err(ActionError::NoTile);
        }
        Ok(self.insert_player(spec))
    }

    fn insert_player(&mut self, spec: &PlayerSpec) -> ThingKey {
        let id = self.issue_creature_id();
        let mut stats = PlayerStats {
            level: spec.level,
            experience: actions::experience_for_level(spec.level),
            mag_level: spec.mag_level,
            mana: spec.mana,
            max_mana: spec.max_mana.max(spec.mana),
            food_seconds: spec.food_seconds,
            access: spec.access,
            vocation: spec.vocation,
            soul: spec.soul,
            free_capacity: spec.capacity,
            skills: spec.skills,
            light: spec.light,
            ..PlayerStats::default()
        };
        if let Some(guild) = &spec.guild {
            stats.guild_id = guild.id;
            stats.guild_name = guild.name.clone();
            stats.guild_rank = guild.rank.clone();
            stats.guild_nick = guild.nick.clone();
            self.guilds.entry(guild.name.clone()).or_insert(guild.id);
        }
        let state = PlayerState {
            stats,
            storage: spec.storage.iter().map(|(key, value)| (*key, *value)).collect(),
            ..PlayerState::default()
        };
        let creature = Creature {
            id,
            role: CreatureRole::Player,
            name: spec.name.clone(),
            health: spec.health,
            max_health: spec.health,
        };
        let key = self
            .ecs
            .spawn((creature, state, ActiveConditions::default(), Placement::Tile(spec.position)))
            .id();
        self.attach(key, Placement::Tile(spec.position));
        self.creatures.insert(id, key);

        if let Some(backpack) = spec.backpack {
            let mut bag = ItemSpec::new(backpack);
            bag.contents = spec.items.clone();
            self.spawn_item(&bag, Placement::Slot { owner: key, slot: SLOT_BACKPACK - 1 });
        }
        for (depot_id, items) in &spec.depots {
            let mut chest = ItemSpec::new(2594);
            chest.contents = items.clone();
            self.spawn_item(&chest, Placement::Depot { owner: key, depot_id: *depot_id });
        }
        key
    }

    pub fn spawn_creature(
        &mut self,
        role: CreatureRole,
        name: &str,
        pos: Position,
        health: i32,
    ) -> ActionResult<ThingKey> {
        if !self.tiles.contains_key(&pos) {
            return Err(ActionError::NoTile);
        }
        let id = self.issue_creature_id();
        let creature = Creature { id, role, name: name.to_string(), health, max_health: health };
        let key = self.ecs.spawn((creature, ActiveConditions::default(), Placement::Tile(pos))).id();
        self.attach(key, Placement::Tile(pos));
        self.creatures.insert(id, key);
        Ok(key)
    }

    fn issue_creature_id(&mut self) -> CreatureId {
        let id = self.next_creature_id;
        self.next_creature_id += 1;
        id
    }

    pub fn place_item(&mut self, pos: Position, type_id: u16, count: u16) -> ActionResult<ThingKey> {
        self.place_item_with(pos, &ItemSpec::new(type_id).count(count))
    }

    pub fn place_item_with(&mut self, pos: Position, spec: &ItemSpec) -> ActionResult<ThingKey> {
        if !self.tiles.contains_key(&pos) {
            return Err(ActionError::NoTile);
        }
        Ok(self.spawn_item(spec, Placement::Tile(pos)))
    }

    /// Puts an item into `slot` (1-based) of a player's inventory, replacing nothing.
    pub fn equip(&mut self, player: ThingKey, slot: u8, spec: &ItemSpec) -> ActionResult<ThingKey> {
        let index = slot.checked_sub(1).filter(|index| usize::from(*index) < SLOT_COUNT).ok_or(ActionError::NotPossible)?;
        let state = self.ecs.get::<PlayerState>(player).ok_or(ActionError::NotPossible)?;
        if state.slots[usize::from(index)].is_some() {
            return Err(ActionError::NotEnoughRoom);
        }
        Ok(self.spawn_item(spec, Placement::Slot { owner: player, slot: index }))
    }

    pub fn insert_into(&mut self, container: ThingKey, spec: &ItemSpec) -> ActionResult<ThingKey> {
        let slots = self.ecs.get::<ContainerSlots>(container).ok_or(ActionError::NotPossible)?;
        if slots.is_full() {
            return Err(ActionError::ContainerFull);
        }
        Ok(self.spawn_item(spec, Placement::Container(container)))
    }

    pub(crate) fn spawn_item(&mut self, spec: &ItemSpec, placement: Placement) -> Entity {
        let item_type = self.catalog.get(spec.type_id);
        let count = if item_type.counts_units() { spec.count } else { 1 };
        let capacity = item_type.container_capacity;
        let state = ItemState {
            type_id: spec.type_id,
            count,
            action_id: spec.action_id,
            unique_id: spec.unique_id,
            text: spec.text.clone(),
            ..ItemState::default()
        };
        let mut entity = self.ecs.spawn((state, placement));
        if let Some(capacity) = capacity {
            entity.insert(ContainerSlots::new(capacity));
        }
        let key = entity.id();
        self.attach(key, placement);
        for child in spec.contents.iter().rev() {
            self.spawn_item(child, Placement::Container(key));
        }
        key
    }

    pub(crate) fn attach(&mut self, key: Entity, placement: Placement) {
        match placement {
            Placement::Tile(pos) => {
                if let Some(tile) = self.tiles.get_mut(&pos) {
                    tile.things.push(key);
                }
            }
            Placement::Container(parent) => {
                if let Some(mut slots) = self.ecs.get_mut::<ContainerSlots>(parent) {
                    slots.items.insert(0, key);
                }
            }
            Placement::Slot { owner, slot } => {
                if let Some(mut state) = self.ecs.get_mut::<PlayerState>(owner) {
                    state.slots[usize::from(slot)] = Some(key);
                }
            }
            Placement::Depot { owner, depot_id } => {
                if let Some(mut state) = self.ecs.get_mut::<PlayerState>(owner) {
                    state.depots.insert(depot_id, key);
                }
            }
        }
        if let Some(mut current) = self.ecs.get_mut::<Placement>(key) {
            *current = placement;
        }
    }

    pub(crate) fn detach(&mut self, key: Entity) {
        let Some(placement) = self.ecs.get::<Placement>(key).copied() else {
            return;
        };
        match placement {
            Placement::Tile(pos) => {
                if let Some(tile) = self.tiles.get_mut(&pos) {
                    tile.things.retain(|thing| *thing != key);
                }
            }
            Placement::Container(parent) => {
                if let Some(mut slots) = self.ecs.get_mut::<ContainerSlots>(parent) {
                    slots.items.retain(|thing| *thing != key);
                }
            }
            Placement::Slot { owner, slot } => {
                if let Some(mut state) = self.ecs.get_mut::<PlayerState>(owner) {
                    if state.slots[usize::from(slot)] == Some(key) {
                        state.slots[usize::from(slot)] = None;
                    }
                }
            }
            Placement::Depot { owner, depot_id } => {
                if let Some(mut state) = self.ecs.get_mut::<PlayerState>(owner) {
                    state.depots.remove(&depot_id);
                }
            }
        }
    }

    /// Removes an object and everything it holds from the world.
    pub fn remove_thing(&mut self, key: ThingKey) -> bool {
        if !self.is_live(key) {
            return false;
        }
        self.detach(key);
        self.despawn_tree(key);
        true
    }

    fn despawn_tree(&mut self, key: Entity) {
        let mut children = self.ecs.get::<ContainerSlots>(key).map(|slots| slots.items.clone()).unwrap_or_default();
        if let Some(state) = self.ecs.get::<PlayerState>(key) {
            children.extend(state.slots.iter().flatten().copied());
            children.extend(state.depots.values().copied());
        }
        for child in children {
            self.despawn_tree(child);
        }
        if let Some(id) = self.ecs.get::<Creature>(key).map(|creature| creature.id) {
            self.creatures.remove(&id);
        }
        self.ecs.despawn(key);
    }

    pub(crate) fn item_type_of(&self, key: Entity) -> Option<&ItemType> {
        self.ecs.get::<ItemState>(key).map(|state| self.catalog.get(state.type_id))
    }

    pub(crate) fn name_of(&self, key: Entity) -> String {
        if let Some(creature) = self.ecs.get::<Creature>(key) {
            return creature.name.clone();
        }
        self.item_type_of(key).map(|item_type| item_type.name.clone()).unwrap_or_default()
    }

    pub(crate) fn creatures_at(&self, pos: Position) -> Vec<Entity> {
        self.tiles
            .get(&pos)
            .map(|tile| tile.things.iter().copied().filter(|thing| self.ecs.get::<Creature>(*thing).is_some()).collect())
            .unwrap_or_default()
    }

    pub(crate) fn tile_is_free(&self, pos: Position) -> ActionResult<()> {
        let tile = self.tiles.get(&pos).ok_or(ActionError::NoTile)?;
        if tile.flags.contains(TileFlags::BLOCKING) || !self.creatures_at(pos).is_empty() {
            return Err(ActionError::Blocked);
        }
        Ok(())
    }

    pub(crate) fn top_item_of_type(&self, pos: Position, type_id: u16) -> Option<Entity> {
        let tile = self.tiles.get(&pos)?;
        let top = *tile.things.iter().rev().find(|thing| self.ecs.get::<ItemState>(**thing).is_some())?;
        self.ecs.get::<ItemState>(top).filter(|state| state.type_id == type_id).map(|_| top)
    }

    /// Every item carried by a player, including nested container contents, outermost first.
    pub(crate) fn carried_items(&self, player: Entity) -> Vec<Entity> {
        let Some(state) = self.ecs.get::<PlayerState>(player) else {
            return Vec::new();
        };
        let mut items = Vec::new();
        for slot in state.slots.iter().flatten() {
            items.push(*slot);
            self.collect_contents(*slot, &mut items);
        }
        items
    }

    pub(crate) fn collect_contents(&self, container: Entity, out: &mut Vec<Entity>) {
        if let Some(slots) = self.ecs.get::<ContainerSlots>(container) {
            for child in &slots.items {
                out.push(*child);
                self.collect_contents(*child, out);
            }
        }
    }

    pub fn conditions_of(&self, creature: ThingKey) -> Vec<crate::combat::ConditionKind> {
        self.ecs.get::<ActiveConditions>(creature).map(|active| active.0.clone()).unwrap_or_default()
    }

    pub fn item_text(&self, item: ThingKey) -> Option<String> {
        self.ecs.get::<ItemState>(item).and_then(|state| state.text.clone())
    }

    pub fn special_description(&self, item: ThingKey) -> Option<String> {
        self.ecs.get::<ItemState>(item).and_then(|state| state.special_description.clone())
    }

    pub fn is_decaying(&self, item: ThingKey) -> bool {
        self.ecs.get::<ItemState>(item).is_some_and(|state| state.decaying)
    }

    pub fn skill_tries(&self, player: ThingKey, skill: usize) -> Option<u32> {
        self.ecs.get::<PlayerState>(player).and_then(|state| state.skill_tries.get(skill).copied())
    }
}

impl ObjectDirectory for SimWorld {
    fn is_live(&self, thing: ThingKey) -> bool {
        self.ecs.get::<Placement>(thing).is_some()
    }

    fn thing(&self, thing: ThingKey) -> Option<ThingView> {
        if let Some(creature) = self.ecs.get::<Creature>(thing) {
            let (position, stack_index) = self.position_of(thing).unwrap_or_default();
            return Some(ThingView::Creature(CreatureView {
                id: creature.id,
                role: creature.role,
                name: creature.name.clone(),
                health: creature.health,
                max_health: creature.max_health,
                position,
                stack_index,
                player: self.ecs.get::<PlayerState>(thing).map(|state| state.stats.clone()),
            }));
        }
        let state = self.ecs.get::<ItemState>(thing)?;
        let item_type = self.catalog.get(state.type_id);
        Some(ThingView::Item(ItemView {
            type_id: state.type_id,
            subtype: if item_type.counts_units() { state.count } else { 0 },
            action_id: state.action_id,
            unique_id: state.unique_id,
            on_tile: matches!(self.ecs.get::<Placement>(thing), Some(Placement::Tile(_))),
            rw_info: item_type.rw_info(),
            container: self
                .ecs
                .get::<ContainerSlots>(thing)
                .map(|slots| ContainerView { size: slots.items.len() as u32, capacity: slots.capacity }),
        }))
    }

    fn creature_by_id(&self, id: CreatureId) -> Option<ThingKey> {
        self.creatures.get(&id).copied()
    }

    fn player_by_name(&self, name: &str) -> Option<ThingKey> {
        self.creatures.values().copied().find(|key| {
            self.ecs.get::<PlayerState>(*key).is_some()
                && self.ecs.get::<Creature>(*key).is_some_and(|creature| creature.name.eq_ignore_ascii_case(name))
        })
    }

    fn tile(&self, pos: Position) -> Option<TileView> {
        self.tiles.get(&pos).map(|tile| TileView {
            protection_zone: tile.flags.contains(TileFlags::PROTECTION_ZONE),
            house_id: tile.house,
        })
    }

    fn thing_at(&self, pos: Position, selector: StackSelector) -> Option<ThingKey> {
        let tile = self.tiles.get(&pos)?;
        let top_creature = || tile.things.iter().rev().copied().find(|thing| self.ecs.get::<Creature>(*thing).is_some());
        match selector {
            StackSelector::TopCreature => top_creature(),
            StackSelector::TopMoveable => top_creature().or_else(|| {
                tile.things
                    .iter()
                    .rev()
                    .copied()
                    .find(|thing| self.item_type_of(*thing).is_some_and(|item_type| item_type.moveable))
            }),
            StackSelector::Field => tile
                .things
                .iter()
                .rev()
                .copied()
                .find(|thing| self.item_type_of(*thing).is_some_and(|item_type| item_type.magic_field)),
            StackSelector::Index(index) => tile.things.get(index as usize).copied(),
        }
    }

    fn position_of(&self, thing: ThingKey) -> Option<(Position, u32)> {
        match *self.ecs.get::<Placement>(thing)? {
            Placement::Tile(pos) => {
                let index = self.tiles.get(&pos)?.things.iter().position(|entry| *entry == thing)?;
                Some((pos, index as u32))
            }
            Placement::Container(parent) => self.position_of(parent),
            Placement::Slot { owner, .. } | Placement::Depot { owner, .. } => self.position_of(owner),
        }
    }

    fn spectators(&self, center: Position) -> Vec<ThingKey> {
        self.creatures
            .values()
            .copied()
            .filter(|key| self.ecs.get::<PlayerState>(*key).is_some())
            .filter(|key| {
                self.position_of(*key).is_some_and(|(pos, _)| {
                    pos.z == center.z
                        && (i32::from(pos.x) - i32::from(center.x)).abs() <= VIEW_RANGE_X
                        && (i32::from(pos.y) - i32::from(center.y)).abs() <= VIEW_RANGE_Y
                })
            })
            .collect()
    }

    fn creatures(&self, filter: CreatureFilter) -> Vec<ThingKey> {
        self.creatures
            .values()
            .copied()
            .filter(|key| self.ecs.get::<Creature>(*key).is_some_and(|creature| filter.matches(creature.role)))
            .collect()
    }

    fn container_item(&self, container: ThingKey, slot: u32) -> Option<ThingKey> {
        self.ecs.get::<ContainerSlots>(container)?.items.get(slot as usize).copied()
    }

    fn slot_item(&self, player: ThingKey, slot: u32) -> Option<ThingKey> {
        let index = (slot as usize).checked_sub(1)?;
        self.ecs.get::<PlayerState>(player)?.slots.get(index).copied().flatten()
    }

    fn item_count(&self, player: ThingKey, type_id: u16) -> u32 {
        self.carried_items(player)
            .into_iter()
            .filter_map(|item| self.ecs.get::<ItemState>(item))
            .filter(|state| state.type_id == type_id)
            .map(|state| u32::from(state.count.max(1)))
            .sum()
    }

    fn depot_item_count(&self, player: ThingKey, depot_id: u32) -> Option<u32> {
        let depot = *self.ecs.get::<PlayerState>(player)?.depots.get(&depot_id)?;
        let mut contents = Vec::new();
        self.collect_contents(depot, &mut contents);
        Some(contents.len() as u32)
    }

    fn house_owner(&self, house_id: u32) -> Option<String> {
        self.houses.get(&house_id).cloned()
    }

    fn guild_id(&self, name: &str) -> Option<u32> {
        self.guilds.get(name).copied()
    }

    fn world_info(&self) -> WorldInfo {
        self.info
    }

    fn tagged_tile_items(&self) -> Vec<(u32, ThingKey)> {
        let mut positions: Vec<_> = self.tiles.keys().copied().collect();
        positions.sort_unstable();
        positions
            .into_iter()
            .flat_map(|pos| self.tiles[&pos].things.iter().copied())
            .filter_map(|thing| {
                let state = self.ecs.get::<ItemState>(thing)?;
                (state.unique_id != 0).then_some((state.unique_id, thing))
            })
            .collect()
    }
}
