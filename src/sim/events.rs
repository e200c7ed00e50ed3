use std::fmt;

use crate::combat::{ConditionKind, DamageType};
use crate::world::Position;

/// Observable side effects of world mutations, recorded in order.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    TextMessage { to: String, class: u8, text: String },
    Cancel { to: String, text: String },
    Say { speaker: String, class: u8, text: String },
    MagicEffect { observer: String, pos: Position, effect: u8 },
    AnimatedText { observer: String, pos: Position, color: u8, text: String },
    HealthChanged { name: String, delta: i32, health: i32 },
    ManaChanged { name: String, delta: i32, mana: i32 },
    ExperienceGained { name: String, amount: i64, level: u32 },
    SkillAdvanced { name: String, skill: usize, level: u32 },
    CreatureDied { name: String },
    CreatureMoved { name: String, to: Position },
    Summoned { name: String, pos: Position },
    Teleported { what: String, to: Position },
    ItemCreated { type_id: u16, count: u16 },
    ItemRemoved { type_id: u16, count: u16 },
    ItemTransformed { from: u16, to: u16 },
    ItemDecaying { type_id: u16 },
    CombatHit { target: String, damage: DamageType, amount: i32 },
    ConditionApplied { target: String, kind: ConditionKind },
    HouseOwnerChanged { house_id: u32, owner: String },
}

impl fmt::Display for WorldEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldEvent::TextMessage { to, class, text } => write!(f, "message[{class}] to {to}: {text}"),
            WorldEvent::Cancel { to, text } => write!(f, "cancel to {to}: {text}"),
            WorldEvent::Say { speaker, class, text } => write!(f, "{speaker} says[{class}]: {text}"),
            WorldEvent::MagicEffect { observer, pos, effect } => {
                write!(f, "effect {effect} at {pos} seen by {observer}")
            }
            WorldEvent::AnimatedText { observer, pos, color, text } => {
                write!(f, "text '{text}' color {color} at {pos} seen by {observer}")
            }
            WorldEvent::HealthChanged { name, delta, health } => write!(f, "{name} health {delta:+} -> {health}"),
            WorldEvent::ManaChanged { name, delta, mana } => write!(f, "{name} mana {delta:+} -> {mana}"),
            WorldEvent::ExperienceGained { name, amount, level } => {
                write!(f, "{name} gained {amount} experience (level {level})")
            }
            WorldEvent::SkillAdvanced { name, skill, level } => write!(f, "{name} skill {skill} advanced to {level}"),
            WorldEvent::CreatureDied { name } => write!(f, "{name} died"),
            WorldEvent::CreatureMoved { name, to } => write!(f, "{name} moved to {to}"),
            WorldEvent::Summoned { name, pos } => write!(f, "summoned {name} at {pos}"),
            WorldEvent::Teleported { what, to } => write!(f, "teleported {what} to {to}"),
            WorldEvent::ItemCreated { type_id, count } => write!(f, "created item {type_id} x{count}"),
            WorldEvent::ItemRemoved { type_id, count } => write!(f, "removed item {type_id} x{count}"),
            WorldEvent::ItemTransformed { from, to } => write!(f, "transformed item {from} into {to}"),
            WorldEvent::ItemDecaying { type_id } => write!(f, "item {type_id} started decaying"),
            WorldEvent::CombatHit { target, damage, amount } => {
                write!(f, "{target} hit by {:?} for {amount}", damage)
            }
            WorldEvent::ConditionApplied { target, kind } => write!(f, "{target} gained condition {:?}", kind),
            WorldEvent::HouseOwnerChanged { house_id, owner } => write!(f, "house {house_id} now owned by {owner}"),
        }
    }
}
