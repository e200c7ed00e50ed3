//! Things, tiles, containers, houses and world-wide queries.

use super::{Binding, Failure, NativeCall};
use crate::error::{NotFoundKind, ScriptError, ScriptResult};
use crate::marshal::{ArgKind, ValueStack, RET_FALSE, RET_NULL, RET_OK, RET_TRUE};
use crate::world::{ActionError, CreatureFilter, Direction, Position, StackSelector, ThingKey};

use ArgKind::{Number as N, Position as P, Text as T};

pub(super) const BINDINGS: &[Binding] = &[
    Binding::new("getThingfromPos", &[P], get_thing_from_pos).fails_with(Failure::Descriptor),
    Binding::new("getThing", &[N], get_thing).fails_with(Failure::Descriptor),
    Binding::new("getThingPos", &[N], get_thing_pos),
    Binding::new("getTilePzInfo", &[P], get_tile_pz_info),
    Binding::new("getTileHouseInfo", &[P], get_tile_house_info),
    Binding::new("getItemRWInfo", &[N], get_item_rw_info),
    Binding::new("doRemoveItem", &[N, N], do_remove_item).optional(1),
    Binding::new("doTransformItem", &[N, N], do_transform_item),
    Binding::new("doChangeTypeItem", &[N, N], do_change_type_item),
    Binding::new("doSetItemActionId", &[N, N], do_set_item_action_id),
    Binding::new("doSetItemText", &[N, T], do_set_item_text),
    Binding::new("doSetItemSpecialDescription", &[N, T], do_set_item_special_description),
    Binding::new("doDecayItem", &[N], do_decay_item),
    Binding::new("doCreateItem", &[N, N, P], do_create_item),
    Binding::new("isContainer", &[N], is_container).fails_with(Failure::Boolean),
    Binding::new("getContainerSize", &[N], get_container_size),
    Binding::new("getContainerCap", &[N], get_container_cap),
    Binding::new("getContainerItem", &[N, N], get_container_item).fails_with(Failure::Descriptor),
    Binding::new("doAddContainerItem", &[N, N, N], do_add_container_item).optional(1),
    Binding::new("doTeleportThing", &[N, P], do_teleport_thing),
    Binding::new("doMoveCreature", &[N, N], do_move_creature),
    Binding::new("doSummonCreature", &[T, P], do_summon_creature),
    Binding::new("doSendMagicEffect", &[P, N], do_send_magic_effect),
    Binding::new("doSendAnimatedText", &[P, T, N], do_send_animated_text),
    Binding::new("getHouseOwner", &[N], get_house_owner),
    Binding::new("setHouseOwner", &[N, T], set_house_owner),
    Binding::new("getGuildId", &[T], get_guild_id),
    Binding::new("getWorldType", &[], get_world_type),
    Binding::new("getWorldTime", &[], get_world_time),
    Binding::new("getWorldLight", &[], get_world_light),
    Binding::new("getWorldCreatures", &[N], get_world_creatures),
    Binding::new("getWorldUpTime", &[], get_world_up_time),
];

fn tile_error(err: ActionError) -> ScriptError {
    match err {
        ActionError::NoTile => ScriptError::NotFound(NotFoundKind::Tile),
        other => ScriptError::invalid(other.to_string()),
    }
}

/// Pops a position argument, substituting the call's real position for the marker.
fn pop_position(call: &NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<(Position, u32)> {
    let (pos, stackpos) = stack.pop_position()?;
    Ok((call.effective_position(pos), stackpos))
}

fn get_thing_from_pos(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let (pos, stackpos) = pop_position(call, stack)?;
    if call.world.tile(pos).is_none() {
        return Err(NotFoundKind::Tile.into());
    }
    let thing = call.world.thing_at(pos, StackSelector::from_stackpos(stackpos));
    let descriptor = call.describe(thing);
    stack.push_thing(descriptor);
    Ok(1)
}

fn get_thing(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let uid = stack.pop_u32()?;
    let (key, _) = call.thing(uid)?;
    let descriptor = call.describe(Some(key));
    stack.push_thing(descriptor);
    Ok(1)
}

fn get_thing_pos(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let uid = stack.pop_u32()?;
    let (key, _) = call.thing(uid)?;
    let (pos, stackpos) = call.world.position_of(key).ok_or(NotFoundKind::Thing)?;
    stack.push_position(pos, stackpos);
    Ok(1)
}

fn get_tile_pz_info(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let (pos, _) = pop_position(call, stack)?;
    let tile = call.world.tile(pos).ok_or(NotFoundKind::Tile)?;
    stack.push(if tile.protection_zone { RET_TRUE } else { RET_FALSE });
    Ok(1)
}

fn get_tile_house_info(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let (pos, _) = pop_position(call, stack)?;
    let tile = call.world.tile(pos).ok_or(NotFoundKind::Tile)?;
    stack.push(tile.house_id.map_or(RET_FALSE, i64::from));
    Ok(1)
}

fn get_item_rw_info(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let uid = stack.pop_u32()?;
    let (_, item) = call.item(uid)?;
    stack.push(u32::from(item.rw_info));
    Ok(1)
}

fn do_remove_item(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let count = if stack.len() > 1 { stack.pop_i32()? } else { -1 };
    let uid = stack.pop_u32()?;
    let (item, _) = call.item(uid)?;
    call.world.remove_item(item, count);
    stack.push(RET_OK);
    Ok(1)
}

fn do_transform_item(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let type_id = stack.pop_u16()?;
    let uid = stack.pop_u32()?;
    let (item, _) = call.item(uid)?;
    call.world.transform_item(item, type_id);
    stack.push(RET_OK);
    Ok(1)
}

fn do_change_type_item(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let subtype = stack.pop_u16()?;
    let uid = stack.pop_u32()?;
    let (item, _) = call.item(uid)?;
    call.world.change_item_subtype(item, subtype);
    stack.push(RET_OK);
    Ok(1)
}

fn do_set_item_action_id(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let action_id = stack.pop_u16()?;
    let uid = stack.pop_u32()?;
    let (item, _) = call.item(uid)?;
    call.world.set_action_id(item, action_id);
    stack.push(RET_OK);
    Ok(1)
}

fn do_set_item_text(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let text = stack.pop_text()?;
    let uid = stack.pop_u32()?;
    let (item, _) = call.item(uid)?;
    call.world.set_item_text(item, &text);
    stack.push(RET_OK);
    Ok(1)
}

fn do_set_item_special_description(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let text = stack.pop_text()?;
    let uid = stack.pop_u32()?;
    let (item, _) = call.item(uid)?;
    call.world.set_special_description(item, &text);
    stack.push(RET_OK);
    Ok(1)
}

fn do_decay_item(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let uid = stack.pop_u32()?;
    let (item, _) = call.item(uid)?;
    call.world.start_decay(item);
    stack.push(RET_OK);
    Ok(1)
}

/// Pushes the handle of a freshly created item, or null when the units merged into a stack.
fn push_created(call: &mut NativeCall<'_>, stack: &mut ValueStack, created: Option<ThingKey>) {
    match created {
        Some(item) => {
            let handle = call.env.assign(&*call.world, item);
            stack.push(handle);
        }
        None => stack.push(RET_NULL),
    }
}

fn do_create_item(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let (pos, _) = pop_position(call, stack)?;
    let count = stack.pop_u16()?;
    let type_id = stack.pop_u16()?;
    let created = call.world.create_item(pos, type_id, count.max(1)).map_err(tile_error)?;
    push_created(call, stack, created);
    Ok(1)
}

/// Unresolvable handles are simply "not a container".
fn is_container(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let uid = stack.pop_u32()?;
    let found = call.env.resolve_container(&*call.world, uid).is_some();
    stack.push(if found { RET_TRUE } else { RET_FALSE });
    Ok(1)
}

fn get_container_size(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let uid = stack.pop_u32()?;
    let (_, item) = call.container(uid)?;
    stack.push(item.container.map_or(0, |container| container.size));
    Ok(1)
}

fn get_container_cap(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let uid = stack.pop_u32()?;
    let (_, item) = call.container(uid)?;
    stack.push(item.container.map_or(0, |container| container.capacity));
    Ok(1)
}

fn get_container_item(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let slot = stack.pop_u32()?;
    let uid = stack.pop_u32()?;
    let (container, _) = call.container(uid)?;
    let item = call.world.container_item(container, slot);
    let descriptor = call.describe(item);
    stack.push_thing(descriptor);
    Ok(1)
}

fn do_add_container_item(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let count = if stack.len() > 2 { stack.pop_u16()? } else { 1 };
    let type_id = stack.pop_u16()?;
    let uid = stack.pop_u32()?;
    let (container, _) = call.container(uid)?;
    let created = call
        .world
        .add_container_item(container, type_id, count.max(1))
        .map_err(|err| ScriptError::invalid(format!("Could not add item: {err}")))?;
    push_created(call, stack, created);
    Ok(1)
}

fn do_teleport_thing(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let (pos, _) = pop_position(call, stack)?;
    let uid = stack.pop_u32()?;
    let (thing, _) = call.thing(uid)?;
    call.world.teleport(thing, pos).map_err(tile_error)?;
    stack.push(RET_OK);
    Ok(1)
}

/// Pushes `0` on success or the world's failure code; a blocked step is not a script error.
fn do_move_creature(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let direction = stack.pop_int()?;
    let cid = stack.pop_u32()?;
    let (creature, _) = call.creature(cid)?;
    let direction = Direction::try_from(direction).map_err(|_| ScriptError::invalid("No valid direction"))?;
    match call.world.move_creature(creature, direction) {
        Ok(()) => stack.push(RET_OK),
        Err(err) => stack.push(err.code()),
    }
    Ok(1)
}

fn do_summon_creature(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let (pos, _) = pop_position(call, stack)?;
    let name = stack.pop_text()?;
    let creature = call
        .world
        .summon_creature(&name, pos)
        .map_err(|err| ScriptError::invalid(format!("Can not summon {name}: {err}")))?;
    let handle = call.env.assign(&*call.world, creature);
    stack.push(handle);
    Ok(1)
}

fn do_send_magic_effect(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let effect = stack.pop_u8()?;
    let (pos, _) = pop_position(call, stack)?;
    for observer in call.world.spectators(pos) {
        call.world.send_magic_effect(observer, pos, effect);
    }
    stack.push(RET_OK);
    Ok(1)
}

fn do_send_animated_text(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let color = stack.pop_u8()?;
    let text = stack.pop_text()?;
    let (pos, _) = pop_position(call, stack)?;
    for observer in call.world.spectators(pos) {
        call.world.send_animated_text(observer, pos, color, &text);
    }
    stack.push(RET_OK);
    Ok(1)
}

fn get_house_owner(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let house_id = stack.pop_u32()?;
    let owner = call.world.house_owner(house_id).ok_or(NotFoundKind::House)?;
    stack.push(owner);
    Ok(1)
}

fn set_house_owner(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let owner = stack.pop_text()?;
    let house_id = stack.pop_u32()?;
    if !call.world.set_house_owner(house_id, &owner) {
        return Err(NotFoundKind::House.into());
    }
    stack.push(RET_OK);
    Ok(1)
}

fn get_guild_id(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let name = stack.pop_text()?;
    let id = call.world.guild_id(&name).ok_or(NotFoundKind::Guild)?;
    stack.push(id);
    Ok(1)
}

fn get_world_type(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    stack.push(call.world.world_info().kind.code());
    Ok(1)
}

fn get_world_time(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    stack.push(call.world.world_info().time);
    Ok(1)
}

/// Two results: light level, then light color.
fn get_world_light(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let info = call.world.world_info();
    stack.push(u32::from(info.light_level));
    stack.push(u32::from(info.light_color));
    Ok(2)
}

fn get_world_creatures(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let kind = stack.pop_int()?;
    let filter =
        CreatureFilter::try_from(kind).map_err(|value| ScriptError::invalid(format!("{value} is not a valid creature type")))?;
    stack.push(call.world.creatures(filter).len() as i64);
    Ok(1)
}

fn get_world_up_time(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    stack.push(call.world.world_info().uptime_secs as i64);
    Ok(1)
}
