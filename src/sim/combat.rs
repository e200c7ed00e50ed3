use bevy_ecs::prelude::*;
use rand::Rng;

use super::{ActiveConditions, PlayerState, SimWorld, WorldEvent};
use crate::combat::{CombatSpec, ConditionKind, ConditionSpec, DamageType, FormulaKind};
use crate::world::{
    CombatAction, CombatEngine, CombatRequest, CombatTarget, GameActions, ObjectDirectory, Position, ThingKey,
};

impl SimWorld {
    fn roll(&mut self, min: i32, max: i32) -> i32 {
        let (low, high) = if min <= max { (min, max) } else { (max, min) };
        self.rng.gen_range(low..=high)
    }

    fn combat_center(&self, target: CombatTarget) -> Option<Position> {
        match target {
            CombatTarget::Creature(creature) => self.position_of(creature).map(|(pos, _)| pos),
            CombatTarget::Position(pos) => Some(pos),
        }
    }

    fn combat_targets(&self, request: &CombatRequest<'_>, center: Position) -> Vec<Entity> {
        match (request.area, request.target) {
            (Some(area), _) => area
                .affected_positions(center)
                .into_iter()
                .flat_map(|pos| self.creatures_at(pos))
                .collect(),
            (None, CombatTarget::Creature(creature)) => vec![creature],
            (None, CombatTarget::Position(pos)) => self.creatures_at(pos),
        }
    }

    fn show_effect(&mut self, pos: Position, effect: u8) {
        if effect == 0 {
            return;
        }
        for observer in self.spectators(pos) {
            self.send_magic_effect(observer, pos, effect);
        }
    }

    fn hit(&mut self, target: Entity, damage: DamageType, amount: i32) {
        if !self.is_live(target) || amount == 0 {
            return;
        }
        let amount = if damage == DamageType::HEALING { amount.abs() } else { amount };
        let name = self.name_of(target);
        self.record(WorldEvent::CombatHit { target: name, damage, amount });
        self.add_health(target, amount);
    }

    fn apply_condition(&mut self, target: Entity, condition: &ConditionSpec) {
        let applied = self.ecs.get_mut::<ActiveConditions>(target).map(|mut active| {
            if !active.0.contains(&condition.kind) {
                active.0.push(condition.kind);
            }
        });
        if applied.is_some() {
            let name = self.name_of(target);
            self.record(WorldEvent::ConditionApplied { target: name, kind: condition.kind });
        }
    }

    /// Formula input for a caster: magic-driven for level/magic formulas, melee skill otherwise.
    fn formula_value(&self, caster: Option<ThingKey>, kind: FormulaKind) -> f64 {
        let Some(state) = caster.and_then(|caster| self.ecs.get::<PlayerState>(caster)) else {
            return 0.0;
        };
        match kind {
            FormulaKind::LevelMagic => f64::from(state.stats.level) * 2.0 + f64::from(state.stats.mag_level) * 3.0,
            FormulaKind::Skill => f64::from(state.stats.skills.iter().copied().max().unwrap_or(0)),
        }
    }

    fn apply_descriptor(
        &mut self,
        caster: Option<ThingKey>,
        targets: &[Entity],
        combat: &CombatSpec,
        condition: Option<&ConditionSpec>,
    ) {
        let damage = combat.kind.unwrap_or(DamageType::PHYSICAL);
        let bounds = combat
            .formula
            .map(|formula| formula.bounds(self.formula_value(caster, formula.kind)));
        for target in targets {
            if let Some((min, max)) = bounds {
                let amount = self.roll(min, max);
                self.hit(*target, damage, amount);
            }
            if let Some(condition) = condition {
                if self.is_live(*target) {
                    self.apply_condition(*target, condition);
                }
            }
        }
    }
}

impl CombatEngine for SimWorld {
    fn apply_combat(&mut self, request: CombatRequest<'_>) {
        let Some(center) = self.combat_center(request.target) else {
            return;
        };
        let targets = self.combat_targets(&request, center);
        match request.action {
            CombatAction::Health { damage, min, max, effect } => {
                self.show_effect(center, effect);
                for target in targets {
                    let amount = self.roll(min, max);
                    self.hit(target, damage, amount);
                }
            }
            CombatAction::Mana { min, max, effect } => {
                self.show_effect(center, effect);
                for target in targets {
                    let amount = self.roll(min, max);
                    self.add_mana(target, amount);
                }
            }
            CombatAction::Condition { condition, effect } => {
                self.show_effect(center, effect);
                for target in targets {
                    self.apply_condition(target, condition);
                }
            }
            CombatAction::Descriptor { combat, condition } => {
                self.show_effect(center, combat.effect());
                self.apply_descriptor(request.caster, &targets, combat, condition);
            }
            CombatAction::EffectsOnly { combat } => self.show_effect(center, combat.effect()),
        }
    }

    fn has_condition(&self, creature: ThingKey, kind: ConditionKind) -> bool {
        self.ecs.get::<ActiveConditions>(creature).is_some_and(|active| active.0.contains(&kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::{CombatArea, CombatFormula, CombatParam};
    use crate::sim::PlayerSpec;
    use crate::world::CreatureRole;

    fn arena() -> (SimWorld, ThingKey, ThingKey, ThingKey) {
        let mut world = SimWorld::new(5);
        world.add_tiles(Position::new(0, 0, 7), 5, 5);
        let mut spec = PlayerSpec::named("Mage", Position::new(0, 0, 7));
        spec.level = 20;
        spec.mag_level = 10;
        let mage = world.spawn_player(spec);
        let near = world.spawn_creature(CreatureRole::Monster, "Troll", Position::new(2, 2, 7), 100).unwrap();
        let edge = world.spawn_creature(CreatureRole::Monster, "Orc", Position::new(3, 2, 7), 100).unwrap();
        (world, mage, near, edge)
    }

    #[test]
    fn area_health_hits_every_creature_in_the_pattern() {
        let (mut world, mage, near, edge) = arena();
        let area = CombatArea::new(vec![vec![1, 1, 1], vec![1, 3, 1], vec![1, 1, 1]], None).unwrap();
        world.apply_combat(CombatRequest {
            caster: Some(mage),
            target: CombatTarget::Position(Position::new(2, 2, 7)),
            area: Some(&area),
            action: CombatAction::Health { damage: DamageType::FIRE, min: -10, max: -10, effect: 7 },
        });
        assert_eq!(world.creature(near).unwrap().health, 90);
        assert_eq!(world.creature(edge).unwrap().health, 90);
        assert_eq!(world.creature(mage).unwrap().health, 150);
    }

    #[test]
    fn descriptor_uses_caster_formula_and_condition() {
        let (mut world, mage, near, _) = arena();
        let mut combat = CombatSpec::default();
        combat.set_param(CombatParam::CombatType, 4).unwrap();
        combat.formula = Some(CombatFormula { kind: FormulaKind::LevelMagic, min_a: -0.1, min_b: 0.0, max_a: -0.1, max_b: 0.0 });
        let poison = ConditionSpec::new(ConditionKind::POISON);
        world.apply_combat(CombatRequest {
            caster: Some(mage),
            target: CombatTarget::Creature(near),
            area: None,
            action: CombatAction::Descriptor { combat: &combat, condition: Some(&poison) },
        });
        // level 20 * 2 + magic 10 * 3 = 70, scaled by -0.1
        assert_eq!(world.creature(near).unwrap().health, 93);
        assert!(world.has_condition(near, ConditionKind::POISON));
    }
}
