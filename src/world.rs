//! Contracts for the simulation collaborators the script bridge consumes.
//!
//! The bridge never owns game state. Everything it reads or mutates goes through the four traits in
//! this module; [`GameWorld`] bundles them for the native entry points.

use std::fmt;

use bevy_ecs::entity::Entity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::combat::{CombatArea, CombatSpec, ConditionKind, ConditionSpec, DamageType};

/// Generation-checked reference to a native object. A key whose slot has been reused or freed no
/// longer resolves, so liveness is a property of the key itself.
pub type ThingKey = Entity;

/// Persistent creature identifier issued by the simulation (always `>= 0x1000_0000`).
pub type CreatureId = u32;

pub const SKILL_COUNT: usize = 7;
pub const SLOT_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: u16,
    pub y: u16,
    pub z: u8,
}

impl Position {
    /// `x` value scripts use to mean "wherever the current call happened".
    pub const REAL_POS_MARKER: u16 = 0xFFFF;

    pub const fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn is_real_pos_marker(&self) -> bool {
        self.x == Self::REAL_POS_MARKER
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Option<Position> {
        let x = i32::from(self.x) + dx;
        let y = i32::from(self.y) + dy;
        if !(0..=i32::from(u16::MAX)).contains(&x) || !(0..=i32::from(u16::MAX)).contains(&y) {
            return None;
        }
        Some(Position { x: x as u16, y: y as u16, z: self.z })
    }

    pub fn step(&self, direction: Direction) -> Option<Position> {
        let (dx, dy) = direction.delta();
        self.offset(dx, dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
    SouthWest = 4,
    SouthEast = 5,
    NorthWest = 6,
    NorthEast = 7,
}

impl Direction {
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
            Direction::SouthWest => (-1, 1),
            Direction::SouthEast => (1, 1),
            Direction::NorthWest => (-1, -1),
            Direction::NorthEast => (1, -1),
        }
    }
}

impl TryFrom<i64> for Direction {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Direction::North,
            1 => Direction::East,
            2 => Direction::South,
            3 => Direction::West,
            4 => Direction::SouthWest,
            5 => Direction::SouthEast,
            6 => Direction::NorthWest,
            7 => Direction::NorthEast,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatureRole {
    Player,
    Monster,
    Npc,
}

impl CreatureRole {
    /// Role tag carried in the `type` field of a creature descriptor.
    pub fn tag(self) -> u16 {
        match self {
            CreatureRole::Player => 1,
            CreatureRole::Monster => 2,
            CreatureRole::Npc => 3,
        }
    }
}

/// Closed classification of every native object a handle can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThingClass {
    Creature(CreatureRole),
    Item { container: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skill {
    Fist = 0,
    Club = 1,
    Sword = 2,
    Axe = 3,
    Distance = 4,
    Shield = 5,
    Fishing = 6,
}

impl Skill {
    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<i64> for Skill {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Skill::Fist,
            1 => Skill::Club,
            2 => Skill::Sword,
            3 => Skill::Axe,
            4 => Skill::Distance,
            5 => Skill::Shield,
            6 => Skill::Fishing,
            other => return Err(other),
        })
    }
}

/// Light a creature gives off: intensity and palette color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Light {
    pub level: u8,
    pub color: u8,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerStats {
    pub level: u32,
    pub experience: i64,
    pub mag_level: u32,
    pub mana: i32,
    pub max_mana: i32,
    pub food_seconds: i32,
    pub access: u32,
    pub vocation: u32,
    pub soul: i32,
    pub free_capacity: u32,
    pub guild_id: u32,
    pub guild_name: String,
    pub guild_rank: String,
    pub guild_nick: String,
    pub master_pos: Position,
    pub skills: [u32; SKILL_COUNT],
    pub light: Light,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatureView {
    pub id: CreatureId,
    pub role: CreatureRole,
    pub name: String,
    pub health: i32,
    pub max_health: i32,
    pub position: Position,
    pub stack_index: u32,
    pub player: Option<PlayerStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerView {
    pub size: u32,
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemView {
    pub type_id: u16,
    /// Count for stackables, charges or fluid for subtyped items, zero otherwise.
    pub subtype: u16,
    pub action_id: u16,
    /// Content-authored persistent tag; zero when untagged.
    pub unique_id: u32,
    /// True when the item lies directly on a tile rather than inside a container or inventory.
    pub on_tile: bool,
    pub rw_info: u8,
    pub container: Option<ContainerView>,
}

/// Snapshot of a live object, split along the closed creature/item variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ThingView {
    Creature(CreatureView),
    Item(ItemView),
}

impl ThingView {
    pub fn class(&self) -> ThingClass {
        match self {
            ThingView::Creature(creature) => ThingClass::Creature(creature.role),
            ThingView::Item(item) => ThingClass::Item { container: item.container.is_some() },
        }
    }

    pub fn as_creature(&self) -> Option<&CreatureView> {
        match self {
            ThingView::Creature(creature) => Some(creature),
            ThingView::Item(_) => None,
        }
    }

    pub fn as_player(&self) -> Option<(&CreatureView, &PlayerStats)> {
        let creature = self.as_creature()?;
        creature.player.as_ref().map(|stats| (creature, stats))
    }

    pub fn as_item(&self) -> Option<&ItemView> {
        match self {
            ThingView::Item(item) => Some(item),
            ThingView::Creature(_) => None,
        }
    }

    pub fn as_container(&self) -> Option<(&ItemView, ContainerView)> {
        let item = self.as_item()?;
        item.container.map(|container| (item, container))
    }

    pub fn into_creature(self) -> Option<CreatureView> {
        match self {
            ThingView::Creature(creature) => Some(creature),
            ThingView::Item(_) => None,
        }
    }

    pub fn into_item(self) -> Option<ItemView> {
        match self {
            ThingView::Item(item) => Some(item),
            ThingView::Creature(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileView {
    pub protection_zone: bool,
    pub house_id: Option<u32>,
}

/// Which object on a tile a `stackpos` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSelector {
    /// Top creature, else the top moveable item (`255`).
    TopMoveable,
    /// Magic field (`254`).
    Field,
    /// Top creature only (`253`).
    TopCreature,
    Index(u32),
}

impl StackSelector {
    pub fn from_stackpos(stackpos: u32) -> Self {
        match stackpos {
            255 => StackSelector::TopMoveable,
            254 => StackSelector::Field,
            253 => StackSelector::TopCreature,
            index => StackSelector::Index(index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatureFilter {
    Players,
    Monsters,
    Npcs,
    All,
}

impl TryFrom<i64> for CreatureFilter {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => CreatureFilter::Players,
            1 => CreatureFilter::Monsters,
            2 => CreatureFilter::Npcs,
            3 => CreatureFilter::All,
            other => return Err(other),
        })
    }
}

impl CreatureFilter {
    pub fn matches(self, role: CreatureRole) -> bool {
        match self {
            CreatureFilter::Players => role == CreatureRole::Player,
            CreatureFilter::Monsters => role == CreatureRole::Monster,
            CreatureFilter::Npcs => role == CreatureRole::Npc,
            CreatureFilter::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorldType {
    #[default]
    NoPvp,
    Pvp,
    PvpEnforced,
}

impl WorldType {
    pub fn code(self) -> i64 {
        match self {
            WorldType::NoPvp => 1,
            WorldType::Pvp => 2,
            WorldType::PvpEnforced => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorldInfo {
    pub kind: WorldType,
    /// In-game minutes since midnight.
    pub time: u32,
    pub light_level: u8,
    pub light_color: u8,
    pub uptime_secs: u64,
}

/// Failures reported by world mutations; `code` is the status handed back to scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("Not possible.")]
    NotPossible,
    #[error("There is not enough room.")]
    NotEnoughRoom,
    #[error("Tile not found.")]
    NoTile,
    #[error("Destination is blocked.")]
    Blocked,
    #[error("Container is full.")]
    ContainerFull,
    #[error("Not moveable.")]
    NotMoveable,
}

impl ActionError {
    pub fn code(self) -> i64 {
        match self {
            ActionError::NotPossible => 1,
            ActionError::NotEnoughRoom => 2,
            ActionError::NoTile => 3,
            ActionError::Blocked => 4,
            ActionError::ContainerFull => 5,
            ActionError::NotMoveable => 6,
        }
    }
}

pub type ActionResult<T> = Result<T, ActionError>;

/// Lookup side of the world: resolution, liveness and observer enumeration.
pub trait ObjectDirectory {
    /// False once the object has been removed from the simulation, even if a key is still held.
    fn is_live(&self, thing: ThingKey) -> bool;

    fn thing(&self, thing: ThingKey) -> Option<ThingView>;

    fn creature_by_id(&self, id: CreatureId) -> Option<ThingKey>;

    fn player_by_name(&self, name: &str) -> Option<ThingKey>;

    fn tile(&self, pos: Position) -> Option<TileView>;

    fn thing_at(&self, pos: Position, selector: StackSelector) -> Option<ThingKey>;

    fn position_of(&self, thing: ThingKey) -> Option<(Position, u32)>;

    /// Players able to observe `center`.
    fn spectators(&self, center: Position) -> Vec<ThingKey>;

    fn creatures(&self, filter: CreatureFilter) -> Vec<ThingKey>;

    fn container_item(&self, container: ThingKey, slot: u32) -> Option<ThingKey>;

    fn slot_item(&self, player: ThingKey, slot: u32) -> Option<ThingKey>;

    fn item_count(&self, player: ThingKey, type_id: u16) -> u32;

    fn depot_item_count(&self, player: ThingKey, depot_id: u32) -> Option<u32>;

    fn house_owner(&self, house_id: u32) -> Option<String>;

    fn guild_id(&self, name: &str) -> Option<u32>;

    fn world_info(&self) -> WorldInfo;

    /// Content-tagged items lying on tiles, in a stable order, as `(tag, item)`.
    fn tagged_tile_items(&self) -> Vec<(u32, ThingKey)>;

    fn class_of(&self, thing: ThingKey) -> Option<ThingClass> {
        self.thing(thing).map(|view| view.class())
    }

    fn creature(&self, thing: ThingKey) -> Option<CreatureView> {
        self.thing(thing).and_then(ThingView::into_creature)
    }

    fn item(&self, thing: ThingKey) -> Option<ItemView> {
        self.thing(thing).and_then(ThingView::into_item)
    }
}

/// Game-specific mutations behind the named entry points. The bridge forwards arguments and never
/// decides what a mutation means.
pub trait GameActions {
    fn add_health(&mut self, creature: ThingKey, delta: i32);
    fn add_mana(&mut self, player: ThingKey, delta: i32);
    fn add_soul(&mut self, player: ThingKey, delta: i32);
    fn feed(&mut self, player: ThingKey, food_seconds: i32);
    fn add_experience(&mut self, player: ThingKey, amount: i64);
    fn add_skill_tries(&mut self, player: ThingKey, skill: Skill, tries: u32);
    fn set_vocation(&mut self, player: ThingKey, vocation: u32);
    fn set_master_pos(&mut self, player: ThingKey, pos: Position);
    fn set_guild_rank(&mut self, player: ThingKey, rank: &str);
    fn set_guild_nick(&mut self, player: ThingKey, nick: &str);

    fn send_cancel(&mut self, player: ThingKey, text: &str);
    fn send_text_message(&mut self, player: ThingKey, class: u8, text: &str);
    fn creature_say(&mut self, creature: ThingKey, class: u8, text: &str);
    fn send_magic_effect(&mut self, observer: ThingKey, pos: Position, effect: u8);
    fn send_animated_text(&mut self, observer: ThingKey, pos: Position, color: u8, text: &str);

    /// Removes `count` units of a stack, or the whole item when `count` is not positive.
    fn remove_item(&mut self, item: ThingKey, count: i32) -> bool;
    fn transform_item(&mut self, item: ThingKey, type_id: u16) -> bool;
    fn change_item_subtype(&mut self, item: ThingKey, subtype: u16) -> bool;
    fn set_action_id(&mut self, item: ThingKey, action_id: u16);
    fn set_item_text(&mut self, item: ThingKey, text: &str);
    fn set_special_description(&mut self, item: ThingKey, text: &str);
    fn start_decay(&mut self, item: ThingKey);

    /// `Ok(None)` means the new units merged into an existing stack.
    fn create_item(&mut self, pos: Position, type_id: u16, count: u16) -> ActionResult<Option<ThingKey>>;
    fn add_player_item(&mut self, player: ThingKey, type_id: u16, count: u16) -> ActionResult<Option<ThingKey>>;
    fn add_container_item(
        &mut self,
        container: ThingKey,
        type_id: u16,
        count: u16,
    ) -> ActionResult<Option<ThingKey>>;
    fn remove_player_items(&mut self, player: ThingKey, type_id: u16, count: u32) -> bool;
    fn remove_money(&mut self, player: ThingKey, amount: u32) -> bool;

    fn teleport(&mut self, thing: ThingKey, pos: Position) -> ActionResult<()>;
    fn move_creature(&mut self, creature: ThingKey, direction: Direction) -> ActionResult<()>;
    fn summon_creature(&mut self, name: &str, pos: Position) -> ActionResult<ThingKey>;
    fn set_house_owner(&mut self, house_id: u32, owner: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatTarget {
    Creature(ThingKey),
    Position(Position),
}

#[derive(Debug, Clone, Copy)]
pub enum CombatAction<'a> {
    /// Full combat descriptor built by scripts at load time.
    Descriptor { combat: &'a CombatSpec, condition: Option<&'a ConditionSpec> },
    /// Show the descriptor's effects without applying damage.
    EffectsOnly { combat: &'a CombatSpec },
    Health { damage: DamageType, min: i32, max: i32, effect: u8 },
    Mana { min: i32, max: i32, effect: u8 },
    Condition { condition: &'a ConditionSpec, effect: u8 },
}

#[derive(Debug, Clone, Copy)]
pub struct CombatRequest<'a> {
    pub caster: Option<ThingKey>,
    pub target: CombatTarget,
    pub area: Option<&'a CombatArea>,
    pub action: CombatAction<'a>,
}

/// Damage, mana and condition resolution. Returns nothing to the bridge.
pub trait CombatEngine {
    fn apply_combat(&mut self, request: CombatRequest<'_>);

    fn has_condition(&self, creature: ThingKey, kind: ConditionKind) -> bool;
}

/// Per-actor integer storage.
pub trait StatusStore {
    fn storage_value(&self, player: ThingKey, key: u32) -> Option<i32>;
    fn set_storage_value(&mut self, player: ThingKey, key: u32, value: i32);
}

/// Everything a native entry point may touch.
pub trait GameWorld: ObjectDirectory + GameActions + CombatEngine + StatusStore {}

impl<T: ObjectDirectory + GameActions + CombatEngine + StatusStore> GameWorld for T {}
