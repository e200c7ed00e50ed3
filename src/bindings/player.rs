//! Player queries and mutations.

use super::{Binding, Failure, NativeCall};
use crate::error::{NotFoundKind, ScriptError, ScriptResult};
use crate::marshal::{ArgKind, ValueStack, RET_FALSE, RET_NULL, RET_OK, RET_TRUE};
use crate::world::{CreatureView, PlayerStats, Skill};

use ArgKind::{Number as N, Position as P, Text as T};

pub(super) const BINDINGS: &[Binding] = &[
    Binding::new("getPlayerFood", &[N], get_player_food),
    Binding::new("getPlayerHealth", &[N], get_player_health),
    Binding::new("getPlayerMana", &[N], get_player_mana),
    Binding::new("getPlayerLevel", &[N], get_player_level),
    Binding::new("getPlayerMagLevel", &[N], get_player_mag_level),
    Binding::new("getPlayerName", &[N], get_player_name),
    Binding::new("getPlayerAccess", &[N], get_player_access),
    Binding::new("getPlayerPosition", &[N], get_player_position),
    Binding::new("getPlayerMasterPos", &[N], get_player_master_pos),
    Binding::new("getPlayerVocation", &[N], get_player_vocation),
    Binding::new("getPlayerSoul", &[N], get_player_soul),
    Binding::new("getPlayerFreeCap", &[N], get_player_free_cap),
    Binding::new("getPlayerGuildId", &[N], get_player_guild_id),
    Binding::new("getPlayerGuildName", &[N], get_player_guild_name),
    Binding::new("getPlayerGuildRank", &[N], get_player_guild_rank),
    Binding::new("getPlayerGuildNick", &[N], get_player_guild_nick),
    Binding::new("getPlayerLight", &[N], get_player_light),
    Binding::new("getPlayerSkill", &[N, N], get_player_skill),
    Binding::new("getPlayerItemCount", &[N, N], get_player_item_count),
    Binding::new("getPlayerSlotItem", &[N, N], get_player_slot_item).fails_with(Failure::Descriptor),
    Binding::new("getPlayerDepotItems", &[N, N], get_player_depot_items),
    Binding::new("getPlayerStorageValue", &[N, N], get_player_storage_value),
    Binding::new("setPlayerStorageValue", &[N, N, N], set_player_storage_value),
    Binding::new("getPlayerByName", &[T], get_player_by_name).fails_with(Failure::Null),
    Binding::new("isPlayer", &[N], is_player).fails_with(Failure::Boolean),
    Binding::new("doPlayerFeed", &[N, N], do_player_feed),
    Binding::new("doPlayerSendCancel", &[N, T], do_player_send_cancel),
    Binding::new("doPlayerSendTextMessage", &[N, N, T], do_player_send_text_message),
    Binding::new("doPlayerSay", &[N, T, N], do_player_say).optional(1),
    Binding::new("doPlayerAddSkillTry", &[N, N, N], do_player_add_skill_try),
    Binding::new("doPlayerAddHealth", &[N, N], do_creature_add_health),
    Binding::new("doCreatureAddHealth", &[N, N], do_creature_add_health),
    Binding::new("doPlayerAddMana", &[N, N], do_player_add_mana),
    Binding::new("doPlayerAddSoul", &[N, N], do_player_add_soul),
    Binding::new("doPlayerAddExp", &[N, N], do_player_add_exp),
    Binding::new("doPlayerAddItem", &[N, N, N], do_player_add_item).optional(1),
    Binding::new("doPlayerRemoveItem", &[N, N, N], do_player_remove_item).fails_with(Failure::Boolean),
    Binding::new("doPlayerRemoveMoney", &[N, N], do_player_remove_money).fails_with(Failure::Boolean),
    Binding::new("doPlayerSetMasterPos", &[N, P], do_player_set_master_pos),
    Binding::new("doPlayerSetVocation", &[N, N], do_player_set_vocation),
    Binding::new("doPlayerSetGuildRank", &[N, T], do_player_set_guild_rank),
    Binding::new("doPlayerSetGuildNick", &[N, T], do_player_set_guild_nick),
];

/// Message class used by `doPlayerSay` when none is given.
const TALK_SAY: u8 = 1;

#[derive(Debug, Clone, Copy)]
enum PlayerInfo {
    Food,
    Health,
    Mana,
    Level,
    MagLevel,
    Name,
    Access,
    Position,
    MasterPos,
    Vocation,
    Soul,
    FreeCap,
    GuildId,
    GuildName,
    GuildRank,
    GuildNick,
}

fn push_player_info(creature: &CreatureView, stats: &PlayerStats, info: PlayerInfo, stack: &mut ValueStack) {
    match info {
        PlayerInfo::Food => stack.push(stats.food_seconds),
        PlayerInfo::Health => stack.push(creature.health),
        PlayerInfo::Mana => stack.push(stats.mana),
        PlayerInfo::Level => stack.push(stats.level),
        PlayerInfo::MagLevel => stack.push(stats.mag_level),
        PlayerInfo::Name => stack.push(creature.name.clone()),
        PlayerInfo::Access => stack.push(stats.access),
        PlayerInfo::Position => stack.push_position(creature.position, creature.stack_index),
        PlayerInfo::MasterPos => stack.push_position(stats.master_pos, 0),
        PlayerInfo::Vocation => stack.push(stats.vocation),
        PlayerInfo::Soul => stack.push(stats.soul),
        PlayerInfo::FreeCap => stack.push(stats.free_capacity),
        PlayerInfo::GuildId => stack.push(stats.guild_id),
        PlayerInfo::GuildName => stack.push(stats.guild_name.clone()),
        PlayerInfo::GuildRank => stack.push(stats.guild_rank.clone()),
        PlayerInfo::GuildNick => stack.push(stats.guild_nick.clone()),
    }
}

fn player_info(call: &mut NativeCall<'_>, stack: &mut ValueStack, info: PlayerInfo) -> ScriptResult<usize> {
    let cid = stack.pop_u32()?;
    let (_, creature, stats) = call.player(cid)?;
    push_player_info(&creature, &stats, info, stack);
    Ok(1)
}

macro_rules! player_info_fns {
    ($($name:ident => $info:ident),* $(,)?) => {
        $(
            fn $name(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
                player_info(call, stack, PlayerInfo::$info)
            }
        )*
    };
}

player_info_fns! {
    get_player_food => Food,
    get_player_health => Health,
    get_player_mana => Mana,
    get_player_level => Level,
    get_player_mag_level => MagLevel,
    get_player_name => Name,
    get_player_access => Access,
    get_player_position => Position,
    get_player_master_pos => MasterPos,
    get_player_vocation => Vocation,
    get_player_soul => Soul,
    get_player_free_cap => FreeCap,
    get_player_guild_id => GuildId,
    get_player_guild_name => GuildName,
    get_player_guild_rank => GuildRank,
    get_player_guild_nick => GuildNick,
}

/// Pushes the light level and then its color.
fn get_player_light(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let cid = stack.pop_u32()?;
    let (_, _, stats) = call.player(cid)?;
    stack.push(u32::from(stats.light.level));
    stack.push(u32::from(stats.light.color));
    Ok(2)
}

fn get_player_skill(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let skill = stack.pop_int()?;
    let cid = stack.pop_u32()?;
    let skill = Skill::try_from(skill).map_err(|value| ScriptError::invalid(format!("{value} is not a valid skill")))?;
    let (_, _, stats) = call.player(cid)?;
    stack.push(stats.skills[skill.index()]);
    Ok(1)
}

fn get_player_item_count(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let type_id = stack.pop_u16()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    stack.push(call.world.item_count(player, type_id));
    Ok(1)
}

fn get_player_slot_item(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let slot = stack.pop_u32()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    let item = call.world.slot_item(player, slot);
    let descriptor = call.describe(item);
    stack.push_thing(descriptor);
    Ok(1)
}

fn get_player_depot_items(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let depot_id = stack.pop_u32()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    let count = call.world.depot_item_count(player, depot_id).ok_or(NotFoundKind::Depot)?;
    stack.push(count);
    Ok(1)
}

/// Unset keys read as `-1`.
fn get_player_storage_value(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let key = stack.pop_u32()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    stack.push(call.world.storage_value(player, key).unwrap_or(-1));
    Ok(1)
}

fn set_player_storage_value(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let value = stack.pop_i32()?;
    let key = stack.pop_u32()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.set_storage_value(player, key, value);
    stack.push(RET_OK);
    Ok(1)
}

/// Missing players are not an error here: scripts look names up freely.
fn get_player_by_name(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let name = stack.pop_text()?;
    match call.world.player_by_name(&name) {
        Some(player) => {
            let handle = call.env.assign(&*call.world, player);
            stack.push(handle);
        }
        None => stack.push(RET_NULL),
    }
    Ok(1)
}

fn is_player(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let cid = stack.pop_u32()?;
    let found = call.env.resolve_player(&*call.world, cid).is_some();
    stack.push(if found { RET_TRUE } else { RET_FALSE });
    Ok(1)
}

fn do_player_feed(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let food = stack.pop_i32()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.feed(player, food);
    stack.push(RET_OK);
    Ok(1)
}

fn do_player_send_cancel(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let text = stack.pop_text()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.send_cancel(player, &text);
    stack.push(RET_OK);
    Ok(1)
}

fn do_player_send_text_message(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let text = stack.pop_text()?;
    let class = stack.pop_u8()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.send_text_message(player, class, &text);
    stack.push(RET_OK);
    Ok(1)
}

fn do_player_say(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let class = if stack.len() > 2 { stack.pop_u8()? } else { TALK_SAY };
    let text = stack.pop_text()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.creature_say(player, class, &text);
    stack.push(RET_OK);
    Ok(1)
}

fn do_player_add_skill_try(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let tries = stack.pop_u32()?;
    let skill = stack.pop_int()?;
    let cid = stack.pop_u32()?;
    let skill = Skill::try_from(skill).map_err(|value| ScriptError::invalid(format!("{value} is not a valid skill")))?;
    let (player, _, _) = call.player(cid)?;
    call.world.add_skill_tries(player, skill, tries);
    stack.push(RET_OK);
    Ok(1)
}

fn do_creature_add_health(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let delta = stack.pop_i32()?;
    let cid = stack.pop_u32()?;
    let (creature, _) = call.creature(cid)?;
    call.world.add_health(creature, delta);
    stack.push(RET_OK);
    Ok(1)
}

fn do_player_add_mana(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let delta = stack.pop_i32()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.add_mana(player, delta);
    stack.push(RET_OK);
    Ok(1)
}

fn do_player_add_soul(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let delta = stack.pop_i32()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.add_soul(player, delta);
    stack.push(RET_OK);
    Ok(1)
}

fn do_player_add_exp(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let amount = stack.pop_int()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.add_experience(player, amount);
    stack.push(RET_OK);
    Ok(1)
}

/// Returns the new item's handle, or `0` when it merged into a stack already carried.
fn do_player_add_item(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let count = if stack.len() > 2 { stack.pop_u16()? } else { 1 };
    let type_id = stack.pop_u16()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    match call.world.add_player_item(player, type_id, count.max(1)) {
        Ok(Some(item)) => {
            let handle = call.env.assign(&*call.world, item);
            stack.push(handle);
        }
        Ok(None) => stack.push(RET_NULL),
        Err(err) => return Err(ScriptError::invalid(format!("Could not add item: {err}"))),
    }
    Ok(1)
}

fn do_player_remove_item(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let count = stack.pop_u32()?;
    let type_id = stack.pop_u16()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    let removed = call.world.remove_player_items(player, type_id, count);
    stack.push(if removed { RET_TRUE } else { RET_FALSE });
    Ok(1)
}

fn do_player_remove_money(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let amount = stack.pop_u32()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    let paid = call.world.remove_money(player, amount);
    stack.push(if paid { RET_TRUE } else { RET_FALSE });
    Ok(1)
}

fn do_player_set_master_pos(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let (pos, _) = stack.pop_position()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.set_master_pos(player, pos);
    stack.push(RET_OK);
    Ok(1)
}

fn do_player_set_vocation(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let vocation = stack.pop_u32()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.set_vocation(player, vocation);
    stack.push(RET_OK);
    Ok(1)
}

fn do_player_set_guild_rank(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let rank = stack.pop_text()?;
    let cid = stack.pop_u32()?;
    let (player, _, stats) = call.player(cid)?;
    if stats.guild_id == 0 {
        return Err(ScriptError::invalid("Player is not in a guild"));
    }
    call.world.set_guild_rank(player, &rank);
    stack.push(RET_OK);
    Ok(1)
}

fn do_player_set_guild_nick(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let nick = stack.pop_text()?;
    let cid = stack.pop_u32()?;
    let (player, _, _) = call.player(cid)?;
    call.world.set_guild_nick(player, &nick);
    stack.push(RET_OK);
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::marshal::ScriptValue;
    use crate::sim::{ItemSpec, PlayerSpec, SimWorld};
    use crate::world::{Light, ObjectDirectory, Position};

    fn fixture() -> (Fixture, i64) {
        let mut world = SimWorld::new(2);
        world.add_tiles(Position::new(100, 100, 7), 3, 3);
        let mut spec = PlayerSpec::named("Alice", Position::new(100, 100, 7));
        spec.level = 12;
        spec.items = vec![ItemSpec::new(2148).count(40)];
        let player = world.spawn_player(spec);
        let cid = i64::from(world.creature(player).unwrap().id);
        (Fixture::new(world), cid)
    }

    #[test]
    fn getters_read_player_state() {
        let (mut fx, cid) = fixture();
        assert_eq!(fx.call("getPlayerLevel", vec![int(cid)]), int(12));
        assert_eq!(fx.call("getPlayerName", vec![int(cid)]), text("Alice"));
        let pos = fx.call("getPlayerPosition", vec![int(cid)]);
        assert_eq!(field(&pos, "x"), 100);
        assert_eq!(field(&pos, "stackpos"), 0);
        assert_eq!(fx.call("getPlayerItemCount", vec![int(cid), int(2148)]), int(40));
    }

    #[test]
    fn player_light_returns_level_and_color() {
        let mut world = SimWorld::new(2);
        world.add_tiles(Position::new(100, 100, 7), 1, 1);
        let mut spec = PlayerSpec::named("Torchbearer", Position::new(100, 100, 7));
        spec.light = Light { level: 6, color: 215 };
        let player = world.spawn_player(spec);
        let cid = i64::from(world.creature(player).unwrap().id);
        let mut fx = Fixture::new(world);

        assert_eq!(fx.call("getPlayerLight", vec![int(cid)]), ScriptValue::Array(vec![int(6), int(215)]));
        assert_eq!(fx.call("getPlayerLight", vec![int(cid + 1)]), int(-1));
        assert!(fx.last_error().unwrap().ends_with("getPlayerLight(). Player not found"));
    }

    #[test]
    fn extreme_amounts_saturate_instead_of_overflowing() {
        let (mut fx, cid) = fixture();
        assert_eq!(fx.call("doCreatureAddHealth", vec![int(cid), int(i64::from(i32::MAX))]), int(0));
        assert_eq!(fx.call("getPlayerHealth", vec![int(cid)]), int(150));
        assert_eq!(fx.call("doPlayerAddMana", vec![int(cid), int(i64::from(i32::MIN))]), int(0));
        assert_eq!(fx.call("getPlayerMana", vec![int(cid)]), int(0));
        assert_eq!(fx.call("doPlayerAddExp", vec![int(cid), int(i64::MAX)]), int(0));
        assert_eq!(fx.call("getPlayerLevel", vec![int(cid)]), int(i64::from(crate::sim::MAX_LEVEL)));
        assert_eq!(fx.call("doPlayerAddExp", vec![int(cid), int(i64::MAX)]), int(0), "already at the ceiling");
        assert!(fx.env.diagnostics().is_empty());
    }

    #[test]
    fn unknown_player_reports_and_returns_error() {
        let (mut fx, _) = fixture();
        assert_eq!(fx.call("getPlayerLevel", vec![int(0x1000_0500)]), int(-1));
        assert!(fx.last_error().unwrap().ends_with("getPlayerLevel(). Player not found"));
    }

    #[test]
    fn invalid_skill_is_rejected() {
        let (mut fx, cid) = fixture();
        assert_eq!(fx.call("getPlayerSkill", vec![int(cid), int(2)]), int(10));
        assert_eq!(fx.call("getPlayerSkill", vec![int(cid), int(9)]), int(-1));
        assert!(fx.last_error().unwrap().contains("9 is not a valid skill"));
    }

    #[test]
    fn storage_defaults_to_minus_one() {
        let (mut fx, cid) = fixture();
        assert_eq!(fx.call("getPlayerStorageValue", vec![int(cid), int(5000)]), int(-1));
        assert_eq!(fx.call("setPlayerStorageValue", vec![int(cid), int(5000), int(3)]), int(0));
        assert_eq!(fx.call("getPlayerStorageValue", vec![int(cid), int(5000)]), int(3));
    }

    #[test]
    fn player_lookup_by_name_and_kind_check() {
        let (mut fx, cid) = fixture();
        assert_eq!(fx.call("getPlayerByName", vec![text("alice")]), int(cid));
        assert_eq!(fx.call("getPlayerByName", vec![text("nobody")]), int(0));
        assert_eq!(fx.call("isPlayer", vec![int(cid)]), int(1));
        assert_eq!(fx.call("isPlayer", vec![int(70_000)]), int(0));
        assert!(fx.env.diagnostics().is_empty());
    }

    #[test]
    fn add_item_returns_handle_or_null_when_merged() {
        let (mut fx, cid) = fixture();
        let rope = fx.call("doPlayerAddItem", vec![int(cid), int(2120)]);
        let ScriptValue::Int(handle) = rope else { panic!("expected handle, got {rope:?}") };
        assert!(handle >= 70_000);
        assert_eq!(fx.call("doPlayerAddItem", vec![int(cid), int(2148), int(10)]), int(0));
        assert_eq!(fx.call("getPlayerItemCount", vec![int(cid), int(2148)]), int(50));
    }

    #[test]
    fn money_and_items_report_boolean_outcomes() {
        let (mut fx, cid) = fixture();
        assert_eq!(fx.call("doPlayerRemoveMoney", vec![int(cid), int(25)]), int(1));
        assert_eq!(fx.call("doPlayerRemoveMoney", vec![int(cid), int(25)]), int(0));
        assert_eq!(fx.call("doPlayerRemoveItem", vec![int(cid), int(2148), int(15)]), int(1));
        assert_eq!(fx.call("getPlayerItemCount", vec![int(cid), int(2148)]), int(0));
    }
}
