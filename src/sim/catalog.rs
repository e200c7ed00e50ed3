use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const MAX_STACK: u16 = 100;

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemType {
    pub id: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stackable: bool,
    /// Fluid containers and charged items carry a subtype instead of a count.
    #[serde(default)]
    pub has_subtype: bool,
    #[serde(default)]
    pub container_capacity: Option<u32>,
    #[serde(default = "default_true")]
    pub moveable: bool,
    #[serde(default)]
    pub readable: bool,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub magic_field: bool,
    #[serde(default)]
    pub decay_to: Option<u16>,
    /// Coin value per unit; zero for anything that is not money.
    #[serde(default)]
    pub worth: u32,
}

impl ItemType {
    pub fn new(id: u16, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            stackable: false,
            has_subtype: false,
            container_capacity: None,
            moveable: true,
            readable: false,
            writable: false,
            magic_field: false,
            decay_to: None,
            worth: 0,
        }
    }

    fn stackable(mut self) -> Self {
        self.stackable = true;
        self
    }

    fn container(mut self, capacity: u32) -> Self {
        self.container_capacity = Some(capacity);
        self
    }

    fn fixed(mut self) -> Self {
        self.moveable = false;
        self
    }

    fn coin(mut self, worth: u32) -> Self {
        self.stackable = true;
        self.worth = worth;
        self
    }

    pub fn counts_units(&self) -> bool {
        self.stackable || self.has_subtype
    }

    pub fn rw_info(&self) -> u8 {
        u8::from(self.readable) | (u8::from(self.writable) << 1)
    }
}

/// Item type table the simulation consults for stacking, containers and money.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    types: HashMap<u16, ItemType>,
    fallback: ItemType,
}

impl Default for ItemCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        let defaults = [
            ItemType::new(1987, "bag").container(8),
            ItemType::new(1988, "backpack").container(20),
            ItemType::new(2594, "depot chest").container(30).fixed(),
            ItemType::new(2148, "gold coin").coin(1),
            ItemType::new(2152, "platinum coin").coin(100),
            ItemType::new(2160, "crystal coin").coin(10_000),
            ItemType::new(2666, "meat").stackable(),
            ItemType::new(2120, "rope"),
            ItemType::new(1945, "lever").fixed(),
            ItemType::new(1946, "lever").fixed(),
            ItemType::new(1209, "closed door").fixed(),
            ItemType::new(1211, "open door").fixed(),
            ItemType {
                has_subtype: true,
                ..ItemType::new(2006, "vial")
            },
            ItemType {
                readable: true,
                writable: true,
                ..ItemType::new(2599, "label")
            },
            ItemType {
                magic_field: true,
                moveable: false,
                decay_to: Some(1493),
                ..ItemType::new(1492, "fire field")
            },
        ];
        for item_type in defaults {
            catalog.insert(item_type);
        }
        catalog
    }
}

impl ItemCatalog {
    pub fn empty() -> Self {
        Self { types: HashMap::new(), fallback: ItemType::new(0, "item") }
    }

    pub fn insert(&mut self, item_type: ItemType) {
        self.types.insert(item_type.id, item_type);
    }

    /// Unknown ids behave like a plain moveable item.
    pub fn get(&self, id: u16) -> &ItemType {
        self.types.get(&id).unwrap_or(&self.fallback)
    }

    pub fn coins(&self) -> Vec<&ItemType> {
        let mut coins: Vec<_> = self.types.values().filter(|item_type| item_type.worth > 0).collect();
        coins.sort_by(|a, b| b.worth.cmp(&a.worth));
        coins
    }
}
