use std::collections::{BTreeMap, HashMap};

use bevy_ecs::prelude::*;

use crate::combat::ConditionKind;
use crate::world::{CreatureId, CreatureRole, PlayerStats, Position, SKILL_COUNT, SLOT_COUNT};

#[derive(Component, Debug, Clone)]
pub struct Creature {
    pub id: CreatureId,
    pub role: CreatureRole,
    pub name: String,
    pub health: i32,
    pub max_health: i32,
}

#[derive(Component, Debug, Clone, Default)]
pub struct PlayerState {
    pub stats: PlayerStats,
    pub skill_tries: [u32; SKILL_COUNT],
    pub storage: HashMap<u32, i32>,
    /// Inventory slots, indexed by slot number minus one.
    pub slots: [Option<Entity>; SLOT_COUNT],
    pub depots: BTreeMap<u32, Entity>,
}

#[derive(Component, Debug, Clone, Default)]
pub struct ItemState {
    pub type_id: u16,
    pub count: u16,
    pub action_id: u16,
    pub unique_id: u32,
    pub text: Option<String>,
    pub special_description: Option<String>,
    pub decaying: bool,
}

/// Contents of a container, newest first.
#[derive(Component, Debug, Clone, Default)]
pub struct ContainerSlots {
    pub capacity: u32,
    pub items: Vec<Entity>,
}

impl ContainerSlots {
    pub fn new(capacity: u32) -> Self {
        Self { capacity, items: Vec::new() }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() as u32 >= self.capacity
    }
}

/// Where a live object currently sits. Every live object carries one.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Tile(Position),
    Container(Entity),
    Slot { owner: Entity, slot: u8 },
    Depot { owner: Entity, depot_id: u32 },
}

#[derive(Component, Debug, Clone, Default)]
pub struct ActiveConditions(pub Vec<ConditionKind>);
