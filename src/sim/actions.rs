use bevy_ecs::prelude::*;

use super::{
    ContainerSlots, Creature, ItemSpec, ItemState, Placement, PlayerState, SimWorld, WorldEvent, MAX_STACK,
    SLOT_BACKPACK, SLOT_LEFT, SLOT_RIGHT,
};
use crate::world::{
    ActionError, ActionResult, CreatureRole, Direction, GameActions, ObjectDirectory, Position, Skill,
    StatusStore, ThingKey,
};

const MAX_SOUL: i32 = 200;
pub const MAX_LEVEL: u32 = 65_535;

/// Total experience needed to reach `level`, clamped to `MAX_LEVEL`.
pub fn experience_for_level(level: u32) -> i64 {
    let l = i64::from(level.clamp(1, MAX_LEVEL));
    50 * (l * l * l - 6 * l * l + 17 * l - 12) / 3
}

/// Highest level `experience` reaches, never above `MAX_LEVEL`.
fn level_for_experience(experience: i64) -> u32 {
    let (mut low, mut high) = (1, MAX_LEVEL);
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if experience_for_level(mid) <= experience {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}

fn tries_for_skill_level(level: u32) -> u32 {
    level.saturating_mul(10).saturating_add(50)
}

impl SimWorld {
    fn with_player<R>(&mut self, player: ThingKey, f: impl FnOnce(&mut PlayerState) -> R) -> Option<R> {
        self.ecs.get_mut::<PlayerState>(player).map(|mut state| f(&mut state))
    }

    fn with_item<R>(&mut self, item: ThingKey, f: impl FnOnce(&mut ItemState) -> R) -> Option<R> {
        self.ecs.get_mut::<ItemState>(item).map(|mut state| f(&mut state))
    }

    /// Merges into a matching stack among `candidates`, returning true when it fit.
    fn merge_into_stack(&mut self, candidates: &[Entity], type_id: u16, count: u16) -> bool {
        if !self.catalog.get(type_id).stackable {
            return false;
        }
        let target = candidates.iter().copied().find(|candidate| {
            self.ecs
                .get::<ItemState>(*candidate)
                .is_some_and(|state| state.type_id == type_id && state.count.checked_add(count).is_some_and(|total| total <= MAX_STACK))
        });
        match target {
            Some(stack) => {
                self.with_item(stack, |state| state.count += count);
                self.record(WorldEvent::ItemCreated { type_id, count });
                true
            }
            None => false,
        }
    }

    fn add_coins(&mut self, player: ThingKey, mut amount: u32) {
        let coins: Vec<_> = self.catalog.coins().into_iter().map(|coin| (coin.id, coin.worth)).collect();
        for (type_id, worth) in coins {
            let mut units = amount / worth;
            amount %= worth;
            while units > 0 {
                let chunk = units.min(u32::from(MAX_STACK)) as u16;
                units -= u32::from(chunk);
                if self.add_player_item(player, type_id, chunk).is_err() {
                    if let Some((pos, _)) = self.position_of(player) {
                        let _ = self.create_item(pos, type_id, chunk);
                    }
                }
            }
        }
    }
}

impl GameActions for SimWorld {
    fn add_health(&mut self, creature: ThingKey, delta: i32) {
        let (name, health, role) = {
            let Some(mut state) = self.ecs.get_mut::<Creature>(creature) else {
                return;
            };
            state.health = state.health.saturating_add(delta).clamp(0, state.max_health);
            (state.name.clone(), state.health, state.role)
        };
        self.record(WorldEvent::HealthChanged { name: name.clone(), delta, health });
        if health == 0 && role != CreatureRole::Player {
            self.record(WorldEvent::CreatureDied { name });
            self.remove_thing(creature);
        }
    }

    fn add_mana(&mut self, player: ThingKey, delta: i32) {
        let Some(mana) = self.with_player(player, |state| {
            state.stats.mana = state.stats.mana.saturating_add(delta).clamp(0, state.stats.max_mana);
            state.stats.mana
        }) else {
            return;
        };
        let name = self.name_of(player);
        self.record(WorldEvent::ManaChanged { name, delta, mana });
    }

    fn add_soul(&mut self, player: ThingKey, delta: i32) {
        self.with_player(player, |state| state.stats.soul = state.stats.soul.saturating_add(delta).clamp(0, MAX_SOUL));
    }

    fn feed(&mut self, player: ThingKey, food_seconds: i32) {
        self.with_player(player, |state| state.stats.food_seconds = state.stats.food_seconds.saturating_add(food_seconds).max(0));
    }

    fn add_experience(&mut self, player: ThingKey, amount: i64) {
        let Some(level) = self.with_player(player, |state| {
            state.stats.experience = state.stats.experience.saturating_add(amount).max(0);
            state.stats.level = level_for_experience(state.stats.experience);
            state.stats.level
        }) else {
            return;
        };
        let name = self.name_of(player);
        self.record(WorldEvent::ExperienceGained { name, amount, level });
    }

    fn add_skill_tries(&mut self, player: ThingKey, skill: Skill, tries: u32) {
        let index = skill.index();
        let advanced = self.with_player(player, |state| {
            state.skill_tries[index] = state.skill_tries[index].saturating_add(tries);
            let mut advanced = None;
            while state.skill_tries[index] >= tries_for_skill_level(state.stats.skills[index]) {
                state.skill_tries[index] -= tries_for_skill_level(state.stats.skills[index]);
                state.stats.skills[index] = state.stats.skills[index].saturating_add(1);
                advanced = Some(state.stats.skills[index]);
            }
            advanced
        });
        if let Some(Some(level)) = advanced {
            let name = self.name_of(player);
            self.record(WorldEvent::SkillAdvanced { name, skill: index, level });
        }
    }

    fn set_vocation(&mut self, player: ThingKey, vocation: u32) {
        self.with_player(player, |state| state.stats.vocation = vocation);
    }

    fn set_master_pos(&mut self, player: ThingKey, pos: Position) {
        self.with_player(player, |state| state.stats.master_pos = pos);
    }

    fn set_guild_rank(&mut self, player: ThingKey, rank: &str) {
        self.with_player(player, |state| state.stats.guild_rank = rank.to_string());
    }

    fn set_guild_nick(&mut self, player: ThingKey, nick: &str) {
        self.with_player(player, |state| state.stats.guild_nick = nick.to_string());
    }

    fn send_cancel(&mut self, player: ThingKey, text: &str) {
        let to = self.name_of(player);
        self.record(WorldEvent::Cancel { to, text: text.to_string() });
    }

    fn send_text_message(&mut self, player: ThingKey, class: u8, text: &str) {
        let to = self.name_of(player);
        self.record(WorldEvent::TextMessage { to, class, text: text.to_string() });
    }

    fn creature_say(&mut self, creature: ThingKey, class: u8, text: &str) {
        let speaker = self.name_of(creature);
        self.record(WorldEvent::Say { speaker, class, text: text.to_string() });
    }

    fn send_magic_effect(&mut self, observer: ThingKey, pos: Position, effect: u8) {
        let observer = self.name_of(observer);
        self.record(WorldEvent::MagicEffect { observer, pos, effect });
    }

    fn send_animated_text(&mut self, observer: ThingKey, pos: Position, color: u8, text: &str) {
        let observer = self.name_of(observer);
        self.record(WorldEvent::AnimatedText { observer, pos, color, text: text.to_string() });
    }

    fn remove_item(&mut self, item: ThingKey, count: i32) -> bool {
        let Some(state) = self.ecs.get::<ItemState>(item).cloned() else {
            return false;
        };
        let stackable = self.catalog.get(state.type_id).stackable;
        let partial = u16::try_from(count).ok().filter(|removed| *removed > 0 && *removed < state.count);
        if let (true, Some(removed)) = (stackable, partial) {
            self.with_item(item, |state| state.count -= removed);
            self.record(WorldEvent::ItemRemoved { type_id: state.type_id, count: removed });
            return true;
        }
        self.remove_thing(item);
        self.record(WorldEvent::ItemRemoved { type_id: state.type_id, count: state.count });
        true
    }

    fn transform_item(&mut self, item: ThingKey, type_id: u16) -> bool {
        let Some(from) = self.with_item(item, |state| std::mem::replace(&mut state.type_id, type_id)) else {
            return false;
        };
        self.record(WorldEvent::ItemTransformed { from, to: type_id });
        true
    }

    fn change_item_subtype(&mut self, item: ThingKey, subtype: u16) -> bool {
        let counts_units = self.item_type_of(item).is_some_and(|item_type| item_type.counts_units());
        if !counts_units {
            return false;
        }
        self.with_item(item, |state| state.count = subtype).is_some()
    }

    fn set_action_id(&mut self, item: ThingKey, action_id: u16) {
        self.with_item(item, |state| state.action_id = action_id);
    }

    fn set_item_text(&mut self, item: ThingKey, text: &str) {
        self.with_item(item, |state| state.text = Some(text.to_string()));
    }

    fn set_special_description(&mut self, item: ThingKey, text: &str) {
        self.with_item(item, |state| state.special_description = Some(text.to_string()));
    }

    fn start_decay(&mut self, item: ThingKey) {
        if let Some(type_id) = self.with_item(item, |state| {
            state.decaying = true;
            state.type_id
        }) {
            self.record(WorldEvent::ItemDecaying { type_id });
        }
    }

    fn create_item(&mut self, pos: Position, type_id: u16, count: u16) -> ActionResult<Option<ThingKey>> {
        if self.tile(pos).is_none() {
            return Err(ActionError::NoTile);
        }
        let top: Vec<_> = self.top_item_of_type(pos, type_id).into_iter().collect();
        if self.merge_into_stack(&top, type_id, count) {
            return Ok(None);
        }
        let key = self.spawn_item(&ItemSpec::new(type_id).count(count), Placement::Tile(pos));
        self.record(WorldEvent::ItemCreated { type_id, count });
        Ok(Some(key))
    }

    fn add_player_item(&mut self, player: ThingKey, type_id: u16, count: u16) -> ActionResult<Option<ThingKey>> {
        if self.ecs.get::<PlayerState>(player).is_none() {
            return Err(ActionError::NotPossible);
        }
        if let Some(backpack) = self.slot_item(player, u32::from(SLOT_BACKPACK)) {
            if self.ecs.get::<ContainerSlots>(backpack).is_some() {
                match self.add_container_item(backpack, type_id, count) {
                    Err(ActionError::ContainerFull) => {}
                    other => return other,
                }
            }
        }
        for slot in [SLOT_RIGHT, SLOT_LEFT] {
            if self.slot_item(player, u32::from(slot)).is_none() {
                let key = self.spawn_item(&ItemSpec::new(type_id).count(count), Placement::Slot { owner: player, slot: slot - 1 });
                self.record(WorldEvent::ItemCreated { type_id, count });
                return Ok(Some(key));
            }
        }
        Err(ActionError::NotEnoughRoom)
    }

    fn add_container_item(&mut self, container: ThingKey, type_id: u16, count: u16) -> ActionResult<Option<ThingKey>> {
        let Some(slots) = self.ecs.get::<ContainerSlots>(container) else {
            return Err(ActionError::NotPossible);
        };
        let contents = slots.items.clone();
        let full = slots.is_full();
        if self.merge_into_stack(&contents, type_id, count) {
            return Ok(None);
        }
        if full {
            return Err(ActionError::ContainerFull);
        }
        let key = self.spawn_item(&ItemSpec::new(type_id).count(count), Placement::Container(container));
        self.record(WorldEvent::ItemCreated { type_id, count });
        Ok(Some(key))
    }

    fn remove_player_items(&mut self, player: ThingKey, type_id: u16, count: u32) -> bool {
        if self.item_count(player, type_id) < count {
            return false;
        }
        let mut remaining = count;
        for item in self.carried_items(player) {
            if remaining == 0 {
                break;
            }
            let Some(state) = self.ecs.get::<ItemState>(item) else {
                continue;
            };
            if state.type_id != type_id {
                continue;
            }
            let units = u32::from(state.count.max(1));
            if units <= remaining {
                remaining -= units;
                self.remove_item(item, -1);
            } else {
                self.remove_item(item, remaining as i32);
                remaining = 0;
            }
        }
        true
    }

    fn remove_money(&mut self, player: ThingKey, amount: u32) -> bool {
        let coins: Vec<(Entity, u32)> = self
            .carried_items(player)
            .into_iter()
            .filter_map(|item| {
                let state = self.ecs.get::<ItemState>(item)?;
                let worth = self.catalog.get(state.type_id).worth;
                (worth > 0).then(|| (item, worth.saturating_mul(u32::from(state.count))))
            })
            .collect();
        let total = coins.iter().fold(0u32, |total, (_, value)| total.saturating_add(*value));
        if total < amount {
            return false;
        }
        for (coin, _) in &coins {
            self.remove_item(*coin, -1);
        }
        self.add_coins(player, total - amount);
        true
    }

    fn teleport(&mut self, thing: ThingKey, pos: Position) -> ActionResult<()> {
        if self.tile(pos).is_none() {
            return Err(ActionError::NoTile);
        }
        if !self.is_live(thing) {
            return Err(ActionError::NotPossible);
        }
        self.detach(thing);
        self.attach(thing, Placement::Tile(pos));
        let what = self.name_of(thing);
        self.record(WorldEvent::Teleported { what, to: pos });
        Ok(())
    }

    fn move_creature(&mut self, creature: ThingKey, direction: Direction) -> ActionResult<()> {
        let (from, _) = self.position_of(creature).ok_or(ActionError::NotPossible)?;
        let to = from.step(direction).ok_or(ActionError::NotPossible)?;
        self.tile_is_free(to)?;
        self.detach(creature);
        self.attach(creature, Placement::Tile(to));
        let name = self.name_of(creature);
        self.record(WorldEvent::CreatureMoved { name, to });
        Ok(())
    }

    fn summon_creature(&mut self, name: &str, pos: Position) -> ActionResult<ThingKey> {
        match self.tile_is_free(pos) {
            Err(ActionError::Blocked) => return Err(ActionError::NotEnoughRoom),
            other => other?,
        }
        let key = self.spawn_creature(CreatureRole::Monster, name, pos, 100)?;
        self.record(WorldEvent::Summoned { name: name.to_string(), pos });
        Ok(key)
    }

    fn set_house_owner(&mut self, house_id: u32, owner: &str) -> bool {
        let Some(current) = self.houses.get_mut(&house_id) else {
            return false;
        };
        *current = owner.to_string();
        self.record(WorldEvent::HouseOwnerChanged { house_id, owner: owner.to_string() });
        true
    }
}

impl StatusStore for SimWorld {
    fn storage_value(&self, player: ThingKey, key: u32) -> Option<i32> {
        self.ecs.get::<PlayerState>(player)?.storage.get(&key).copied()
    }

    fn set_storage_value(&mut self, player: ThingKey, key: u32, value: i32) {
        self.with_player(player, |state| {
            state.storage.insert(key, value);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::PlayerSpec;

    fn setup() -> (SimWorld, ThingKey) {
        let mut world = SimWorld::new(11);
        world.add_tiles(Position::new(10, 10, 7), 3, 3);
        let mut spec = PlayerSpec::named("Alice", Position::new(10, 10, 7));
        spec.items = vec![ItemSpec::new(2148).count(50), ItemSpec::new(2152).count(2)];
        let player = world.spawn_player(spec);
        (world, player)
    }

    #[test]
    fn experience_table_matches_known_levels() {
        assert_eq!(experience_for_level(1), 0);
        assert_eq!(experience_for_level(2), 100);
        assert_eq!(experience_for_level(8), 4200);
        assert_eq!(level_for_experience(4199), 7);
        assert_eq!(level_for_experience(4200), 8);
    }

    #[test]
    fn experience_and_levels_are_capped() {
        assert_eq!(experience_for_level(u32::MAX), experience_for_level(MAX_LEVEL));
        assert_eq!(level_for_experience(i64::MAX), MAX_LEVEL);
        assert_eq!(level_for_experience(-5), 1);
    }

    #[test]
    fn stat_changes_saturate() {
        let (mut world, player) = setup();
        world.add_health(player, i32::MAX);
        world.add_health(player, i32::MIN);
        world.add_soul(player, i32::MAX);
        world.feed(player, i32::MAX);
        world.feed(player, i32::MAX);
        world.add_experience(player, i64::MAX);
        world.add_experience(player, i64::MAX);
        world.add_skill_tries(player, Skill::Sword, u32::MAX);
        let view = world.thing(player).unwrap();
        let (creature, stats) = view.as_player().unwrap();
        assert_eq!(creature.health, 0);
        assert_eq!(stats.food_seconds, i32::MAX);
        assert_eq!(stats.soul, MAX_SOUL);
        assert_eq!(stats.level, MAX_LEVEL);
        assert_eq!(stats.experience, i64::MAX);
    }

    #[test]
    fn money_is_removed_with_change() {
        let (mut world, player) = setup();
        assert!(world.remove_money(player, 120));
        assert_eq!(world.item_count(player, 2152), 1);
        assert_eq!(world.item_count(player, 2148), 30);
        assert!(!world.remove_money(player, 1000));
    }

    #[test]
    fn creating_an_item_on_a_matching_stack_merges() {
        let (mut world, _) = setup();
        let pos = Position::new(11, 11, 7);
        let first = world.create_item(pos, 2148, 10).unwrap();
        assert!(first.is_some());
        assert_eq!(world.create_item(pos, 2148, 5).unwrap(), None);
        assert_eq!(world.item(first.unwrap()).unwrap().subtype, 15);
        assert_eq!(world.create_item(Position::new(99, 99, 7), 2148, 1), Err(ActionError::NoTile));
    }

    #[test]
    fn monsters_die_at_zero_health() {
        let (mut world, _) = setup();
        let rat = world.spawn_creature(CreatureRole::Monster, "Rat", Position::new(12, 12, 7), 20).unwrap();
        world.add_health(rat, -50);
        assert!(!world.is_live(rat));
        assert!(world.events().iter().any(|event| matches!(event, WorldEvent::CreatureDied { name } if name == "Rat")));
    }

    #[test]
    fn moving_into_an_occupied_tile_is_blocked() {
        let (mut world, player) = setup();
        world.spawn_creature(CreatureRole::Monster, "Rat", Position::new(11, 10, 7), 20).unwrap();
        assert_eq!(world.move_creature(player, Direction::East), Err(ActionError::Blocked));
        assert!(world.move_creature(player, Direction::South).is_ok());
        assert_eq!(world.position_of(player).unwrap().0, Position::new(10, 11, 7));
        assert_eq!(world.move_creature(player, Direction::West), Err(ActionError::NoTile));
    }
}
