//! Combat descriptors, areas, conditions and the calls that apply them.

use super::{Binding, NativeCall};
use crate::combat::{
    CallbackKind, CombatArea, CombatCallback, CombatFormula, CombatParam, CombatSpec, ConditionKind,
    ConditionSpec, DamageRound, DamageType, FormulaKind, Outfit, Variant,
};
use crate::env::ScriptEnv;
use crate::error::{NotFoundKind, ScriptError, ScriptResult};
use crate::marshal::{ArgKind, ValueStack, RET_ERROR, RET_OK};
use crate::world::{CombatAction, CombatRequest, CombatTarget, ThingKey};

use ArgKind::{Array as A, Callback as C, Number as N, Position as P};

pub(super) const BINDINGS: &[Binding] = &[
    Binding::new("createCombatObject", &[N], create_combat_object).optional(1),
    Binding::new("createCombatArea", &[A, A], create_combat_area).optional(1),
    Binding::new("createConditionObject", &[N], create_condition_object),
    Binding::new("setCombatArea", &[N, N], set_combat_area),
    Binding::new("setCombatCondition", &[N, N], set_combat_condition),
    Binding::new("setCombatParam", &[N, N, N], set_combat_param),
    Binding::new("setConditionParam", &[N, N, N], set_condition_param),
    Binding::new("addDamageCondition", &[N, N, N, N], add_damage_condition),
    Binding::new("addOutfitCondition", &[N, N, N, N, N, N, N], add_outfit_condition),
    Binding::new("setCombatCallback", &[N, N, C], set_combat_callback),
    Binding::new("setCombatFormula", &[N, N, N, N, N, N], set_combat_formula),
    Binding::new("numberToVariant", &[N], number_to_variant),
    Binding::new("positionToVariant", &[P], position_to_variant),
    Binding::new("targetPositionToVariant", &[P], target_position_to_variant),
    Binding::new("stringToVariant", &[ArgKind::Text], string_to_variant),
    Binding::new("doCombat", &[N, N, N], do_combat),
    Binding::new("doAreaCombatHealth", &[N, N, P, N, N, N, N], do_area_combat_health),
    Binding::new("doTargetCombatHealth", &[N, N, N, N, N, N], do_target_combat_health),
    Binding::new("doAreaCombatMana", &[N, P, N, N, N, N], do_area_combat_mana),
    Binding::new("doTargetCombatMana", &[N, N, N, N, N], do_target_combat_mana),
    Binding::new("doAreaCombatCondition", &[N, P, N, N, N], do_area_combat_condition),
    Binding::new("doTargetCombatCondition", &[N, N, N, N], do_target_combat_condition),
];

fn create_combat_object(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let mut combat = CombatSpec::default();
    if !stack.is_empty() {
        let kind = stack.pop_int()?;
        if kind != 0 {
            combat.set_param(CombatParam::CombatType, kind)?;
        }
    }
    let id = call.env.add_combat(combat);
    stack.push(id);
    Ok(1)
}

fn create_combat_area(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let ext = if stack.len() > 1 { Some(stack.pop_array()?) } else { None };
    let rows = stack.pop_array()?;
    let area = CombatArea::from_values(&rows, ext.as_deref())?;
    let id = call.env.add_area(area);
    stack.push(id);
    Ok(1)
}

fn create_condition_object(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let kind = ConditionKind::single(stack.pop_int()?)?;
    let id = call.env.add_condition(ConditionSpec::new(kind));
    stack.push(id);
    Ok(1)
}

fn combat_mut<'a>(call: &'a mut NativeCall<'_>, id: u32) -> ScriptResult<&'a mut CombatSpec> {
    call.env.combat_mut(id).ok_or(ScriptError::NotFound(NotFoundKind::Combat))
}

fn condition_mut<'a>(call: &'a mut NativeCall<'_>, id: u32) -> ScriptResult<&'a mut ConditionSpec> {
    call.env.condition_mut(id).ok_or(ScriptError::NotFound(NotFoundKind::Condition))
}

fn set_combat_area(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let area_id = stack.pop_u32()?;
    let combat_id = stack.pop_u32()?;
    combat_mut(call, combat_id)?;
    if call.env.area(area_id).is_none() {
        return Err(NotFoundKind::Area.into());
    }
    combat_mut(call, combat_id)?.area = Some(area_id);
    stack.push(RET_OK);
    Ok(1)
}

fn set_combat_condition(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let condition_id = stack.pop_u32()?;
    let combat_id = stack.pop_u32()?;
    combat_mut(call, combat_id)?;
    if call.env.condition(condition_id).is_none() {
        return Err(NotFoundKind::Condition.into());
    }
    combat_mut(call, combat_id)?.condition = Some(condition_id);
    stack.push(RET_OK);
    Ok(1)
}

fn set_combat_param(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let value = stack.pop_int()?;
    let param = stack.pop_int()?;
    let combat_id = stack.pop_u32()?;
    let combat = combat_mut(call, combat_id)?;
    combat.set_param(CombatParam::try_from(param)?, value)?;
    stack.push(RET_OK);
    Ok(1)
}

fn set_condition_param(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let value = stack.pop_int()?;
    let key = stack.pop_int()?;
    let condition_id = stack.pop_u32()?;
    condition_mut(call, condition_id)?.params.insert(key, value);
    stack.push(RET_OK);
    Ok(1)
}

/// Only damage-over-time conditions accept rounds.
fn add_damage_condition(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let value = stack.pop_i32()?;
    let interval_ms = stack.pop_i32()?;
    let rounds = stack.pop_i32()?;
    let condition_id = stack.pop_u32()?;
    let condition = condition_mut(call, condition_id)?;
    if !condition.kind.deals_damage() {
        return Err(NotFoundKind::Condition.into());
    }
    condition.damage_rounds.push(DamageRound { rounds, interval_ms, value });
    stack.push(RET_OK);
    Ok(1)
}

fn add_outfit_condition(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let feet = stack.pop_u8()?;
    let legs = stack.pop_u8()?;
    let body = stack.pop_u8()?;
    let head = stack.pop_u8()?;
    let look_type = stack.pop_u16()?;
    // Accepted for compatibility; outfit looks carry no separate type.
    let _look_type_ex = stack.pop_int()?;
    let condition_id = stack.pop_u32()?;
    let condition = condition_mut(call, condition_id)?;
    if condition.kind != ConditionKind::OUTFIT {
        return Err(NotFoundKind::Condition.into());
    }
    condition.outfits.push(Outfit { look_type, head, body, legs, feet });
    stack.push(RET_OK);
    Ok(1)
}

/// Binds a script function of the loading unit as a combat callback. Only valid while loading.
fn set_combat_callback(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let function = stack.pop_text()?;
    let key = stack.pop_int()?;
    let combat_id = stack.pop_u32()?;
    if !call.env.context().is_loading() {
        return Err(ScriptError::interface("Not called during script loading!"));
    }
    combat_mut(call, combat_id)?;
    let kind = CallbackKind::try_from(key)?;
    let host = call.env.context().host_name().unwrap_or_default().to_string();
    let event = call
        .callbacks
        .register_callback(&function)
        .ok_or_else(|| ScriptError::interface(format!("Can not load callback {function}")))?;
    combat_mut(call, combat_id)?.callback = Some(CombatCallback { kind, host, event });
    stack.push(RET_OK);
    Ok(1)
}

fn set_combat_formula(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let max_b = stack.pop_float()?;
    let max_a = stack.pop_float()?;
    let min_b = stack.pop_float()?;
    let min_a = stack.pop_float()?;
    let kind = FormulaKind::try_from(stack.pop_int()?)?;
    let combat_id = stack.pop_u32()?;
    combat_mut(call, combat_id)?.formula = Some(CombatFormula { kind, min_a, min_b, max_a, max_b });
    stack.push(RET_OK);
    Ok(1)
}

fn number_to_variant(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let cid = stack.pop_u32()?;
    let id = call.env.add_variant(Variant::Creature(cid));
    stack.push(id);
    Ok(1)
}

fn position_to_variant(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let (pos, _) = stack.pop_position()?;
    let pos = call.effective_position(pos);
    let id = call.env.add_variant(Variant::Position(pos));
    stack.push(id);
    Ok(1)
}

fn target_position_to_variant(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let (pos, _) = stack.pop_position()?;
    let pos = call.effective_position(pos);
    let id = call.env.add_variant(Variant::TargetPosition(pos));
    stack.push(id);
    Ok(1)
}

fn string_to_variant(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let name = stack.pop_text()?;
    let id = call.env.add_variant(Variant::PlayerName(name));
    stack.push(id);
    Ok(1)
}

/// Applies a stored descriptor to the target a variant names. A variant naming nobody yields
/// an error status without a report.
fn do_combat(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let variant_id = stack.pop_u32()?;
    let combat_id = stack.pop_u32()?;
    let cid = stack.pop_u32()?;
    let caster = call.caster(cid)?;
    let combat = call.env.combat(combat_id).ok_or(NotFoundKind::Combat)?;
    let variant = call.env.variant(variant_id).cloned().ok_or(NotFoundKind::Variant)?;

    let area = match combat.area {
        Some(area_id) => Some(call.env.area(area_id).ok_or(NotFoundKind::Area)?),
        None => None,
    };
    let condition = match combat.condition {
        Some(condition_id) => Some(call.env.condition(condition_id).ok_or(NotFoundKind::Condition)?),
        None => None,
    };

    let creature_target = |key: ThingKey| match area {
        Some(_) => call.world.position_of(key).map(|(pos, _)| CombatTarget::Position(pos)),
        None => Some(CombatTarget::Creature(key)),
    };
    let (target, action) = match variant {
        Variant::Creature(id) => {
            let target = call.world.creature_by_id(id).and_then(creature_target);
            (target, CombatAction::Descriptor { combat, condition })
        }
        Variant::PlayerName(name) => {
            let target = call.world.player_by_name(&name).and_then(creature_target);
            (target, CombatAction::Descriptor { combat, condition })
        }
        Variant::Position(pos) => (Some(CombatTarget::Position(pos)), CombatAction::Descriptor { combat, condition }),
        Variant::TargetPosition(pos) if area.is_some() => {
            (Some(CombatTarget::Position(pos)), CombatAction::Descriptor { combat, condition })
        }
        Variant::TargetPosition(pos) => (Some(CombatTarget::Position(pos)), CombatAction::EffectsOnly { combat }),
    };

    let Some(target) = target else {
        stack.push(RET_ERROR);
        return Ok(1);
    };
    call.world.apply_combat(CombatRequest { caster, target, area, action });
    stack.push(RET_OK);
    Ok(1)
}

/// Area id zero means the single tile at the position.
fn lookup_area(env: &ScriptEnv, area_id: u32) -> ScriptResult<Option<&CombatArea>> {
    if area_id == 0 {
        return Ok(None);
    }
    env.area(area_id).map(Some).ok_or(ScriptError::NotFound(NotFoundKind::Area))
}

fn do_area_combat_health(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let effect = stack.pop_u8()?;
    let max = stack.pop_i32()?;
    let min = stack.pop_i32()?;
    let area_id = stack.pop_u32()?;
    let (pos, _) = stack.pop_position()?;
    let damage = DamageType::single(stack.pop_int()?)?;
    let cid = stack.pop_u32()?;
    let caster = call.caster(cid)?;
    let pos = call.effective_position(pos);
    let area = lookup_area(call.env, area_id)?;
    call.world.apply_combat(CombatRequest {
        caster,
        target: CombatTarget::Position(pos),
        area,
        action: CombatAction::Health { damage, min, max, effect },
    });
    stack.push(RET_OK);
    Ok(1)
}

fn do_target_combat_health(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let effect = stack.pop_u8()?;
    let max = stack.pop_i32()?;
    let min = stack.pop_i32()?;
    let damage = DamageType::single(stack.pop_int()?)?;
    let target = stack.pop_u32()?;
    let cid = stack.pop_u32()?;
    let caster = call.caster(cid)?;
    let (target, _) = call.creature(target)?;
    call.world.apply_combat(CombatRequest {
        caster,
        target: CombatTarget::Creature(target),
        area: None,
        action: CombatAction::Health { damage, min, max, effect },
    });
    stack.push(RET_OK);
    Ok(1)
}

fn do_area_combat_mana(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let effect = stack.pop_u8()?;
    let max = stack.pop_i32()?;
    let min = stack.pop_i32()?;
    let area_id = stack.pop_u32()?;
    let (pos, _) = stack.pop_position()?;
    let cid = stack.pop_u32()?;
    let caster = call.caster(cid)?;
    let pos = call.effective_position(pos);
    let area = lookup_area(call.env, area_id)?;
    call.world.apply_combat(CombatRequest {
        caster,
        target: CombatTarget::Position(pos),
        area,
        action: CombatAction::Mana { min, max, effect },
    });
    stack.push(RET_OK);
    Ok(1)
}

fn do_target_combat_mana(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let effect = stack.pop_u8()?;
    let max = stack.pop_i32()?;
    let min = stack.pop_i32()?;
    let target = stack.pop_u32()?;
    let cid = stack.pop_u32()?;
    let caster = call.caster(cid)?;
    let (target, _) = call.creature(target)?;
    call.world.apply_combat(CombatRequest {
        caster,
        target: CombatTarget::Creature(target),
        area: None,
        action: CombatAction::Mana { min, max, effect },
    });
    stack.push(RET_OK);
    Ok(1)
}

fn do_area_combat_condition(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let effect = stack.pop_u8()?;
    let condition_id = stack.pop_u32()?;
    let area_id = stack.pop_u32()?;
    let (pos, _) = stack.pop_position()?;
    let cid = stack.pop_u32()?;
    let caster = call.caster(cid)?;
    let pos = call.effective_position(pos);
    let condition = call.env.condition(condition_id).ok_or(NotFoundKind::Condition)?;
    let area = lookup_area(call.env, area_id)?;
    call.world.apply_combat(CombatRequest {
        caster,
        target: CombatTarget::Position(pos),
        area,
        action: CombatAction::Condition { condition, effect },
    });
    stack.push(RET_OK);
    Ok(1)
}

fn do_target_combat_condition(call: &mut NativeCall<'_>, stack: &mut ValueStack) -> ScriptResult<usize> {
    let effect = stack.pop_u8()?;
    let condition_id = stack.pop_u32()?;
    let target = stack.pop_u32()?;
    let cid = stack.pop_u32()?;
    let caster = call.caster(cid)?;
    let (target, _) = call.creature(target)?;
    let condition = call.env.condition(condition_id).ok_or(NotFoundKind::Condition)?;
    call.world.apply_combat(CombatRequest {
        caster,
        target: CombatTarget::Creature(target),
        area: None,
        action: CombatAction::Condition { condition, effect },
    });
    stack.push(RET_OK);
    Ok(1)
}
