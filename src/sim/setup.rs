//! Serializable world descriptions used by fixtures and tests to build a [`SimWorld`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::catalog::ItemType;
use crate::world::{CreatureRole, Light, Position, WorldType, SKILL_COUNT};

const fn default_count() -> u16 {
    1
}

const fn default_level() -> u32 {
    1
}

const fn default_health() -> i32 {
    150
}

const fn default_soul() -> i32 {
    100
}

const fn default_capacity() -> u32 {
    400
}

const fn default_skills() -> [u32; SKILL_COUNT] {
    [10; SKILL_COUNT]
}

const fn default_backpack() -> Option<u16> {
    Some(1988)
}

const fn default_seed() -> u64 {
    0x5eed
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSpec {
    #[serde(rename = "id")]
    pub type_id: u16,
    #[serde(default = "default_count")]
    pub count: u16,
    #[serde(default)]
    pub action_id: u16,
    #[serde(default)]
    pub unique_id: u32,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub contents: Vec<ItemSpec>,
}

impl ItemSpec {
    pub fn new(type_id: u16) -> Self {
        Self { type_id, count: 1, action_id: 0, unique_id: 0, text: None, contents: Vec::new() }
    }

    pub fn count(mut self, count: u16) -> Self {
        self.count = count;
        self
    }

    pub fn unique(mut self, unique_id: u32) -> Self {
        self.unique_id = unique_id;
        self
    }

    pub fn action(mut self, action_id: u16) -> Self {
        self.action_id = action_id;
        self
    }

    pub fn containing(mut self, item: ItemSpec) -> Self {
        self.contents.push(item);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSpec {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub rank: String,
    #[serde(default)]
    pub nick: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSpec {
    pub name: String,
    pub position: Position,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub mag_level: u32,
    #[serde(default = "default_health")]
    pub health: i32,
    #[serde(default)]
    pub mana: i32,
    #[serde(default)]
    pub max_mana: i32,
    #[serde(default = "default_soul")]
    pub soul: i32,
    #[serde(default)]
    pub access: u32,
    #[serde(default)]
    pub vocation: u32,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default)]
    pub food_seconds: i32,
    #[serde(default = "default_skills")]
    pub skills: [u32; SKILL_COUNT],
    #[serde(default)]
    pub guild: Option<GuildSpec>,
    #[serde(default)]
    pub storage: BTreeMap<u32, i32>,
    /// Container placed in the backpack slot.
    #[serde(default = "default_backpack")]
    pub backpack: Option<u16>,
    /// Items carried inside the backpack.
    #[serde(default)]
    pub items: Vec<ItemSpec>,
    #[serde(default)]
    pub depots: BTreeMap<u32, Vec<ItemSpec>>,
    #[serde(default)]
    pub light: Light,
}

impl PlayerSpec {
    pub fn named(name: &str, position: Position) -> Self {
        Self {
            name: name.to_string(),
            position,
            level: default_level(),
            mag_level: 0,
            health: default_health(),
            mana: 0,
            max_mana: 0,
            soul: default_soul(),
            access: 0,
            vocation: 0,
            capacity: default_capacity(),
            food_seconds: 0,
            skills: default_skills(),
            guild: None,
            storage: BTreeMap::new(),
            backpack: default_backpack(),
            items: Vec::new(),
            depots: BTreeMap::new(),
            light: Light::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureSpec {
    pub name: String,
    pub position: Position,
    #[serde(default = "CreatureSpec::default_role")]
    pub role: CreatureRole,
    #[serde(default = "default_health")]
    pub health: i32,
}

impl CreatureSpec {
    fn default_role() -> CreatureRole {
        CreatureRole::Monster
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSpec {
    pub position: Position,
    #[serde(default)]
    pub protection_zone: bool,
    #[serde(default)]
    pub house: Option<u32>,
    #[serde(default)]
    pub items: Vec<ItemSpec>,
}

/// Rectangle of plain walkable tiles, inclusive on both corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorSpec {
    pub from: Position,
    pub to: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseSpec {
    pub id: u32,
    #[serde(default)]
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorldSpec {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub world_type: WorldType,
    #[serde(default)]
    pub floors: Vec<FloorSpec>,
    #[serde(default)]
    pub tiles: Vec<TileSpec>,
    #[serde(default)]
    pub players: Vec<PlayerSpec>,
    #[serde(default)]
    pub creatures: Vec<CreatureSpec>,
    #[serde(default)]
    pub houses: Vec<HouseSpec>,
    #[serde(default)]
    pub guilds: BTreeMap<String, u32>,
    #[serde(default)]
    pub item_types: Vec<ItemType>,
}
