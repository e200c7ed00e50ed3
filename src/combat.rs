//! Combat descriptors, areas and condition templates that scripts build during loading and
//! reference later by numeric id.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::env::EventId;
use crate::error::{ScriptError, ScriptResult};
use crate::marshal::ScriptValue;
use crate::world::{CreatureId, Position};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DamageType: u32 {
        const PHYSICAL = 1;
        const ENERGY = 2;
        const POISON = 4;
        const FIRE = 8;
        const UNDEFINED = 16;
        const LIFE_DRAIN = 32;
        const MANA_DRAIN = 64;
        const HEALING = 128;
    }
}

impl DamageType {
    /// Accepts exactly one known damage kind.
    pub fn single(code: i64) -> ScriptResult<DamageType> {
        u32::try_from(code)
            .ok()
            .and_then(DamageType::from_bits)
            .filter(|kind| kind.bits().count_ones() == 1)
            .ok_or_else(|| ScriptError::invalid(format!("{code} is not a valid combat type")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CombatParam {
    CombatType = 1,
    Effect = 2,
    DistanceEffect = 3,
    BlockedByShield = 4,
    BlockedByArmor = 5,
    TargetCasterOrTopmost = 6,
    CreateItem = 7,
    Aggressive = 8,
    Dispel = 9,
}

impl TryFrom<i64> for CombatParam {
    type Error = ScriptError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => CombatParam::CombatType,
            2 => CombatParam::Effect,
            3 => CombatParam::DistanceEffect,
            4 => CombatParam::BlockedByShield,
            5 => CombatParam::BlockedByArmor,
            6 => CombatParam::TargetCasterOrTopmost,
            7 => CombatParam::CreateItem,
            8 => CombatParam::Aggressive,
            9 => CombatParam::Dispel,
            other => return Err(ScriptError::invalid(format!("{other} is not a valid combat param"))),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    LevelMagicValue = 1,
    SkillValue = 2,
    TargetTile = 3,
    TargetCreature = 4,
}

impl TryFrom<i64> for CallbackKind {
    type Error = ScriptError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => CallbackKind::LevelMagicValue,
            2 => CallbackKind::SkillValue,
            3 => CallbackKind::TargetTile,
            4 => CallbackKind::TargetCreature,
            other => return Err(ScriptError::invalid(format!("{other} is not a valid callback key"))),
        })
    }
}

/// Script function a combat descriptor calls back into, owned by the host that loaded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatCallback {
    pub kind: CallbackKind,
    pub host: String,
    pub event: EventId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaKind {
    LevelMagic = 1,
    Skill = 2,
}

impl TryFrom<i64> for FormulaKind {
    type Error = ScriptError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FormulaKind::LevelMagic),
            2 => Ok(FormulaKind::Skill),
            other => Err(ScriptError::invalid(format!("{other} is not a valid formula type"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatFormula {
    pub kind: FormulaKind,
    pub min_a: f64,
    pub min_b: f64,
    pub max_a: f64,
    pub max_b: f64,
}

impl CombatFormula {
    /// Damage bounds for a caster whose formula input evaluates to `value`.
    pub fn bounds(&self, value: f64) -> (i32, i32) {
        let min = (self.min_a * value + self.min_b) as i32;
        let max = (self.max_a * value + self.max_b) as i32;
        if min <= max {
            (min, max)
        } else {
            (max, min)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CombatSpec {
    pub kind: Option<DamageType>,
    pub params: BTreeMap<CombatParam, i64>,
    pub area: Option<u32>,
    pub condition: Option<u32>,
    pub formula: Option<CombatFormula>,
    pub callback: Option<CombatCallback>,
}

impl CombatSpec {
    pub fn param(&self, param: CombatParam) -> Option<i64> {
        self.params.get(&param).copied()
    }

    pub fn set_param(&mut self, param: CombatParam, value: i64) -> ScriptResult<()> {
        if param == CombatParam::CombatType {
            self.kind = Some(DamageType::single(value)?);
        }
        self.params.insert(param, value);
        Ok(())
    }

    pub fn effect(&self) -> u8 {
        self.param(CombatParam::Effect).unwrap_or(0) as u8
    }
}

/// Affected-cell matrix. A cell holding `2` or `3` marks the centre; any other non-zero cell is hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatArea {
    rows: Vec<Vec<u8>>,
    ext_rows: Option<Vec<Vec<u8>>>,
}

impl CombatArea {
    pub fn new(rows: Vec<Vec<u8>>, ext_rows: Option<Vec<Vec<u8>>>) -> ScriptResult<Self> {
        if rows.is_empty() || rows.iter().all(Vec::is_empty) {
            return Err(ScriptError::invalid("combat area has no rows"));
        }
        Ok(Self { rows, ext_rows })
    }

    /// Builds an area from nested script arrays.
    pub fn from_values(rows: &[ScriptValue], ext_rows: Option<&[ScriptValue]>) -> ScriptResult<Self> {
        let ext = ext_rows.map(parse_matrix).transpose()?;
        Self::new(parse_matrix(rows)?, ext)
    }

    pub fn has_extended(&self) -> bool {
        self.ext_rows.is_some()
    }

    /// Offsets of every affected cell relative to the centre.
    pub fn offsets(&self) -> Vec<(i32, i32)> {
        matrix_offsets(&self.rows)
    }

    pub fn extended_offsets(&self) -> Option<Vec<(i32, i32)>> {
        self.ext_rows.as_deref().map(matrix_offsets)
    }

    pub fn affected_positions(&self, center: Position) -> Vec<Position> {
        self.offsets()
            .into_iter()
            .filter_map(|(dx, dy)| center.offset(dx, dy))
            .collect()
    }
}

fn parse_matrix(rows: &[ScriptValue]) -> ScriptResult<Vec<Vec<u8>>> {
    rows.iter()
        .map(|row| match row {
            ScriptValue::Array(cells) => cells
                .iter()
                .map(|cell| {
                    cell.as_number()
                        .map(|value| value as u8)
                        .ok_or_else(|| ScriptError::invalid("combat area cells must be numbers"))
                })
                .collect(),
            other => Err(ScriptError::invalid(format!("combat area row must be an array, got {}", other.type_name()))),
        })
        .collect()
}

fn matrix_offsets(rows: &[Vec<u8>]) -> Vec<(i32, i32)> {
    let center = rows
        .iter()
        .enumerate()
        .find_map(|(y, row)| row.iter().position(|cell| *cell == 2 || *cell == 3).map(|x| (x, y)))
        .unwrap_or_else(|| {
            let width = rows.iter().map(Vec::len).max().unwrap_or(0);
            (width / 2, rows.len() / 2)
        });
    let mut offsets = Vec::new();
    for (y, row) in rows.iter().enumerate() {
        for (x, cell) in row.iter().enumerate() {
            if *cell != 0 {
                offsets.push((x as i32 - center.0 as i32, y as i32 - center.1 as i32));
            }
        }
    }
    offsets
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConditionKind: u32 {
        const POISON = 1;
        const FIRE = 2;
        const ENERGY = 4;
        const HASTE = 8;
        const PARALYZE = 16;
        const OUTFIT = 32;
        const INVISIBLE = 64;
        const LIGHT = 128;
        const MANA_SHIELD = 256;
        const IN_FIGHT = 512;
        const DRUNK = 1024;
        const EXHAUSTED = 2048;
        const REGENERATION = 4096;
    }
}

impl ConditionKind {
    pub fn single(code: i64) -> ScriptResult<ConditionKind> {
        u32::try_from(code)
            .ok()
            .and_then(ConditionKind::from_bits)
            .filter(|kind| kind.bits().count_ones() == 1)
            .ok_or_else(|| ScriptError::invalid(format!("{code} is not a valid condition type")))
    }

    pub fn deals_damage(self) -> bool {
        self.intersects(ConditionKind::POISON | ConditionKind::FIRE | ConditionKind::ENERGY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageRound {
    pub rounds: i32,
    pub interval_ms: i32,
    pub value: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outfit {
    pub look_type: u16,
    pub head: u8,
    pub body: u8,
    pub legs: u8,
    pub feet: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSpec {
    pub kind: ConditionKind,
    pub params: BTreeMap<i64, i64>,
    pub damage_rounds: Vec<DamageRound>,
    pub outfits: Vec<Outfit>,
}

impl ConditionSpec {
    pub fn new(kind: ConditionKind) -> Self {
        Self { kind, params: BTreeMap::new(), damage_rounds: Vec::new(), outfits: Vec::new() }
    }

    pub fn total_damage(&self) -> i64 {
        self.damage_rounds
            .iter()
            .map(|round| i64::from(round.rounds.max(0)) * i64::from(round.value))
            .sum()
    }
}

/// Script-authored combat target, stored per call and referenced by id from `doCombat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    Creature(CreatureId),
    Position(Position),
    TargetPosition(Position),
    PlayerName(String),
}
