//! Stat formula pipeline.
//!
//! Every statistic is composed in a fixed order:
//!
//! ```text
//! item base value  ->  + named equation  ->  + highest weapon rank bonus
//!   -> + item/skill modifier hooks  ->  + weapon triangle deltas
//!   -> - opposing stat  ->  clamp
//! ```
//!
//! The first three steps are the per-unit statistics (`accuracy`, `damage`,
//! ...). The `compute_*` functions add the situational steps for a concrete
//! attacker/target pairing. A missing base value is "not applicable" and is
//! returned as `None`, never as a sentinel number.

use crate::components::CombatMode;
use crate::data::{Database, WeaponRank};
use crate::equations::{self, EquationSystem};
use crate::error::Result;
use crate::hooks::{product_multipliers, sum_modifiers, CombatModifier, Component, HookResult, ModifierContext};
use crate::item::Item;
use crate::math::{scale, Fixed};
use crate::skill::Skill;
use crate::triangle::{triangle_bonus, TriangleBonus};
use crate::unit::Unit;
use crate::world::World;

/// Read-only calculator over a database and world.
///
/// Every method is referentially transparent for a given database and world.
#[derive(Clone, Copy)]
pub struct CombatCalculator<'a> {
    db: &'a Database,
    world: &'a World,
}

impl<'a> CombatCalculator<'a> {
    /// Create a calculator.
    #[must_use]
    pub const fn new(db: &'a Database, world: &'a World) -> Self {
        Self { db, world }
    }

    fn equation(&self, name: &str, unit: &Unit) -> Result<i32> {
        let stats = self.world.stats_of(unit);
        self.db.equations.evaluate(name, &stats)
    }

    /// Highest rank the unit qualifies for in the item's weapon type.
    #[must_use]
    pub fn weapon_rank_bonus(&self, unit: &Unit, item: &Item) -> Option<&'a WeaponRank> {
        let weapon_type = item.weapon_type.as_deref()?;
        self.db.rank_for_wexp(unit.wexp_for(weapon_type))
    }

    // ========================================================================
    // Per-unit statistics
    // ========================================================================

    /// Item hit plus the accuracy equation and rank bonus.
    ///
    /// # Errors
    ///
    /// Returns an error if the accuracy equation is not registered.
    pub fn accuracy(&self, unit: &Unit, item: &Item) -> Result<Option<i32>> {
        let Some(hit) = item.hit else {
            return Ok(None);
        };
        let rank = self.weapon_rank_bonus(unit, item).map_or(0, |rank| rank.accuracy);
        Ok(Some(hit + self.equation(item.accuracy_formula(), unit)? + rank))
    }

    /// Avoid against `item_to_avoid` (the `AVOID` equation unless the item
    /// overrides it).
    ///
    /// # Errors
    ///
    /// Returns an error if the equation is not registered.
    pub fn avoid(&self, unit: &Unit, item_to_avoid: Option<&Item>) -> Result<i32> {
        let name = item_to_avoid.map_or(equations::AVOID, Item::avoid_formula);
        self.equation(name, unit)
    }

    /// Item crit plus the crit equation and rank bonus.
    ///
    /// # Errors
    ///
    /// Returns an error if the crit equation is not registered.
    pub fn crit_accuracy(&self, unit: &Unit, item: &Item) -> Result<Option<i32>> {
        let Some(crit) = item.crit else {
            return Ok(None);
        };
        let rank = self.weapon_rank_bonus(unit, item).map_or(0, |rank| rank.crit);
        Ok(Some(crit + self.equation(item.crit_accuracy_formula(), unit)? + rank))
    }

    /// Crit avoid against `item_to_avoid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the equation is not registered.
    pub fn crit_avoid(&self, unit: &Unit, item_to_avoid: Option<&Item>) -> Result<i32> {
        let name = item_to_avoid.map_or(equations::CRIT_AVOID, Item::crit_avoid_formula);
        self.equation(name, unit)
    }

    /// Item might plus the damage equation and rank bonus.
    ///
    /// # Errors
    ///
    /// Returns an error if the damage equation is not registered.
    pub fn damage(&self, unit: &Unit, item: &Item) -> Result<Option<i32>> {
        let Some(might) = item.might else {
            return Ok(None);
        };
        let rank = self.weapon_rank_bonus(unit, item).map_or(0, |rank| rank.damage);
        Ok(Some(might + self.equation(item.damage_formula(), unit)? + rank))
    }

    /// Defense against `item_to_avoid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the equation is not registered.
    pub fn defense(&self, unit: &Unit, item_to_avoid: Option<&Item>) -> Result<i32> {
        let name = item_to_avoid.map_or(equations::DEFENSE, Item::defense_formula);
        self.equation(name, unit)
    }

    /// Attack speed with `item`.
    ///
    /// # Errors
    ///
    /// Returns an error if the equation is not registered.
    pub fn attack_speed(&self, unit: &Unit, item: &Item) -> Result<i32> {
        let rank = self.weapon_rank_bonus(unit, item).map_or(0, |rank| rank.attack_speed);
        Ok(self.equation(item.attack_speed_formula(), unit)? + rank)
    }

    /// Defense speed against `item_to_avoid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the equation is not registered.
    pub fn defense_speed(&self, unit: &Unit, item_to_avoid: Option<&Item>) -> Result<i32> {
        let name = item_to_avoid.map_or(equations::DEFENSE_SPEED, Item::defense_speed_formula);
        self.equation(name, unit)
    }

    // ========================================================================
    // Situational hooks
    // ========================================================================

    fn hook_sources<'s>(&'s self, unit: &'s Unit, item: &'s Item) -> Vec<&'s dyn Component> {
        item.hook_sources().chain(self.world.skills_of(unit).flat_map(Skill::hook_sources)).collect()
    }

    fn modifier(
        &self,
        unit: &Unit,
        item: &Item,
        target: &Unit,
        mode: CombatMode,
        hook: &'static str,
        call: impl Fn(&dyn CombatModifier, &ModifierContext<'_>) -> HookResult<i32>,
    ) -> i32 {
        let stats = self.world.stats_of(unit);
        let ctx = ModifierContext { unit, item, target, mode, stats: &stats, equations: &self.db.equations };
        sum_modifiers(self.hook_sources(unit, item), hook, |modifier| call(modifier, &ctx))
    }

    fn damage_multiplier(&self, unit: &Unit, item: &Item, target: &Unit, mode: CombatMode) -> Fixed {
        let stats = self.world.stats_of(unit);
        let ctx = ModifierContext { unit, item, target, mode, stats: &stats, equations: &self.db.equations };
        product_multipliers(self.hook_sources(unit, item), "damage_multiplier", |modifier| {
            modifier.damage_multiplier(&ctx)
        })
    }

    /// Triangle deltas for `unit` striking `target` with `item`: the
    /// striker's own side and the target's side against `item`. Both are
    /// neutral in self-targeted combat.
    fn triangle(&self, unit: &Unit, item: &Item, target: &Unit) -> (TriangleBonus, TriangleBonus) {
        if unit.nid == target.nid {
            return (TriangleBonus::default(), TriangleBonus::default());
        }
        let target_weapon = self.world.weapon_of(target);
        (
            triangle_bonus(self.db, unit, Some(item), target_weapon),
            triangle_bonus(self.db, target, target_weapon, Some(item)),
        )
    }

    // ========================================================================
    // Strike figures
    // ========================================================================

    /// Chance in `[0, 100]` that `unit` hits `target` with `item`.
    ///
    /// Healing items without a hit value always land.
    ///
    /// # Errors
    ///
    /// Returns an error if an equation is not registered.
    pub fn compute_hit(&self, unit: &Unit, target: &Unit, item: &Item, mode: CombatMode) -> Result<Option<i32>> {
        let Some(accuracy) = self.accuracy(unit, item)? else {
            return Ok(item.is_heal().then_some(100));
        };
        let bonus = self.modifier(unit, item, target, mode, "modify_accuracy", |m, ctx| m.modify_accuracy(ctx));
        let (own, theirs) = self.triangle(unit, item, target);
        let avoid = self.avoid(target, Some(item))?;
        let hit = accuracy + bonus + own.accuracy - theirs.avoid - avoid;
        tracing::trace!(unit = %unit.nid, target = %target.nid, accuracy, bonus, avoid, hit, "compute_hit");
        Ok(Some(hit.clamp(0, 100)))
    }

    /// Chance in `[0, 100]` that a landed strike crits.
    ///
    /// # Errors
    ///
    /// Returns an error if an equation is not registered.
    pub fn compute_crit(&self, unit: &Unit, target: &Unit, item: &Item, mode: CombatMode) -> Result<Option<i32>> {
        let Some(crit_accuracy) = self.crit_accuracy(unit, item)? else {
            return Ok(None);
        };
        let bonus =
            self.modifier(unit, item, target, mode, "modify_crit_accuracy", |m, ctx| m.modify_crit_accuracy(ctx));
        let (own, theirs) = self.triangle(unit, item, target);
        let crit_avoid = self.crit_avoid(target, Some(item))?;
        let crit = crit_accuracy + bonus + own.crit - theirs.dodge - crit_avoid;
        Ok(Some(crit.clamp(0, 100)))
    }

    /// Damage of one strike, floored at the configured minimum.
    ///
    /// # Errors
    ///
    /// Returns an error if an equation is not registered.
    pub fn compute_damage(
        &self,
        unit: &Unit,
        target: &Unit,
        item: &Item,
        mode: CombatMode,
        crit: bool,
    ) -> Result<Option<i32>> {
        let constants = &self.db.constants;

        // Step 1: Base might (equation and rank included)
        let Some(base) = self.damage(unit, item)? else {
            return Ok(None);
        };

        // Step 2: Situational modifiers and weapon triangle
        let bonus = self.modifier(unit, item, target, mode, "modify_damage", |m, ctx| m.modify_damage(ctx));
        let (own, theirs) = self.triangle(unit, item, target);
        let total_might = base + bonus + own.damage - theirs.resist;

        // Step 3: Crit amplification, before any mitigation
        let mut might = total_might;
        if crit {
            might = might
                .saturating_mul(constants.crit_mult)
                .saturating_add(total_might.saturating_mul(constants.crit_add));
        }

        // Step 4: Defense is subtracted exactly once
        let defense = self.defense(target, Some(item))?;
        let mitigated = might - defense;

        // Step 5: Multipliers on the post-mitigation value, truncated
        let multiplier = self.damage_multiplier(unit, item, target, mode);
        let damage = scale(mitigated, multiplier).max(constants.min_damage);
        tracing::trace!(unit = %unit.nid, target = %target.nid, total_might, might, defense, damage, crit, "compute_damage");
        Ok(Some(damage))
    }

    /// HP restored by a healing item, `None` if the item does not heal.
    ///
    /// # Errors
    ///
    /// Returns an error if the heal formula fails.
    pub fn compute_heal(&self, unit: &Unit, item: &Item) -> Result<Option<i32>> {
        let Some((amount, formula)) = item.heal() else {
            return Ok(None);
        };
        let extra = match formula {
            Some(formula) => formula.evaluate(&self.world.stats_of(unit), &self.db.equations)?,
            None => 0,
        };
        Ok(Some((amount + extra).max(0)))
    }

    /// Strikes per initiative slot: 2 when the speed lead reaches
    /// `speed_to_double`, otherwise 1.
    ///
    /// # Errors
    ///
    /// Returns an error if an equation is not registered.
    pub fn outspeed(&self, unit: &Unit, target: &Unit, item: &Item, mode: CombatMode) -> Result<u8> {
        if !item.can_double() {
            return Ok(1);
        }
        let bonus =
            self.modifier(unit, item, target, mode, "modify_attack_speed", |m, ctx| m.modify_attack_speed(ctx));
        let (own, theirs) = self.triangle(unit, item, target);
        let speed = self.attack_speed(unit, item)? + bonus + own.attack_speed - theirs.defense_speed
            - self.defense_speed(target, Some(item))?;
        Ok(if speed >= self.db.constants.speed_to_double { 2 } else { 1 })
    }

    /// Whether `defender` may strike back at `attacker` who used
    /// `attacker_item`.
    #[must_use]
    pub fn can_counterattack(&self, attacker: &Unit, attacker_item: &Item, defender: &Unit) -> bool {
        if attacker.nid == defender.nid || !defender.is_alive() || defender.is_dying {
            return false;
        }
        if !attacker_item.can_be_countered() || attacker_item.targets_allies() {
            return false;
        }
        if !attacker.team.is_enemy_of(defender.team) {
            return false;
        }
        let Some(weapon) = self.world.weapon_of(defender) else {
            return false;
        };
        if !weapon.is_weapon() || !weapon.can_counter() || weapon.hit.is_none() {
            return false;
        }
        match (attacker.position, defender.position) {
            (Some(a), Some(b)) => weapon.in_range(a.distance(b)),
            _ => true,
        }
    }
}
