//! Items and their capability components.
//!
//! Numeric attributes are explicit options: an absent `hit` means the item
//! cannot be used to attack at all, not that it has zero hit.

use serde::{Deserialize, Serialize};

use crate::components::{ItemId, UnitId};
use crate::equations::{self, Formula};
use crate::hooks::{CombatModifier, Component, HookResult, ModifierContext};
use crate::math::{from_percent, Fixed};

/// Remaining durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uses {
    /// Uses left.
    pub current: i32,
    /// Uses when new.
    pub max: i32,
}

impl Uses {
    /// Fresh durability.
    #[must_use]
    pub const fn new(max: i32) -> Self {
        Self { current: max, max }
    }
}

/// Behaviour attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemComponent {
    /// Physical weapon that can be equipped and countered with.
    Weapon,
    /// Spell; used from the inventory, never equipped.
    Spell,
    /// Accessory slot item.
    Accessory,
    /// Restores HP: `amount` plus an optional formula of the user's stats.
    Heal {
        /// Flat amount.
        amount: i32,
        /// Additional scaling.
        #[serde(default)]
        formula: Option<Formula>,
    },
    /// Targets allies instead of enemies.
    TargetAlly,
    /// Bonus damage against targets carrying any of the tags.
    Effective {
        /// Tags that trigger the bonus.
        tags: Vec<String>,
        /// Extra might.
        bonus: i32,
    },
    /// Adds a formula to accuracy.
    ModifyAccuracy(Formula),
    /// Adds a formula to crit accuracy.
    ModifyCritAccuracy(Formula),
    /// Adds a formula to damage.
    ModifyDamage(Formula),
    /// Adds a formula to attack speed.
    ModifyAttackSpeed(Formula),
    /// Scales final damage, in percent.
    DamageMultiplier {
        /// Multiplier percent (150 = 1.5x).
        percent: i32,
    },
    /// Replaces the `HIT` equation.
    AccuracyFormula(String),
    /// Replaces the `AVOID` equation when this is the unit's weapon.
    AvoidFormula(String),
    /// Replaces the `CRIT_HIT` equation.
    CritAccuracyFormula(String),
    /// Replaces the `CRIT_AVOID` equation when this is the unit's weapon.
    CritAvoidFormula(String),
    /// Replaces the `DAMAGE` equation (e.g. magic damage).
    DamageFormula(String),
    /// Replaces the `DEFENSE` equation used against this item (e.g. resistance).
    DefenseFormula(String),
    /// Replaces the `ATTACK_SPEED` equation.
    AttackSpeedFormula(String),
    /// Replaces the `DEFENSE_SPEED` equation used against this item.
    DefenseSpeedFormula(String),
    /// Weapon experience gained per use.
    Wexp(i32),
    /// Fixed experience gained per use.
    Exp(i32),
    /// The holder cannot counter with this item.
    CannotCounter,
    /// Targets of this item cannot counter.
    CannotBeCountered,
    /// Never strikes twice.
    NoDouble,
    /// Return to the action menu after combat.
    MenuAfterCombat,
    /// Mana spent per strike.
    ManaCost(i32),
    /// Spell animation forwarded to presentation.
    CastAnim(String),
    /// Spell sound forwarded to presentation.
    CastSound(String),
    /// Cannot be equipped even if it is a weapon.
    Unequippable,
}

impl Component for ItemComponent {
    fn name(&self) -> &'static str {
        match self {
            Self::Weapon => "weapon",
            Self::Spell => "spell",
            Self::Accessory => "accessory",
            Self::Heal { .. } => "heal",
            Self::TargetAlly => "target_ally",
            Self::Effective { .. } => "effective",
            Self::ModifyAccuracy(_) => "modify_accuracy",
            Self::ModifyCritAccuracy(_) => "modify_crit_accuracy",
            Self::ModifyDamage(_) => "modify_damage",
            Self::ModifyAttackSpeed(_) => "modify_attack_speed",
            Self::DamageMultiplier { .. } => "damage_multiplier",
            Self::AccuracyFormula(_) => "accuracy_formula",
            Self::AvoidFormula(_) => "avoid_formula",
            Self::CritAccuracyFormula(_) => "crit_accuracy_formula",
            Self::CritAvoidFormula(_) => "crit_avoid_formula",
            Self::DamageFormula(_) => "damage_formula",
            Self::DefenseFormula(_) => "defense_formula",
            Self::AttackSpeedFormula(_) => "attack_speed_formula",
            Self::DefenseSpeedFormula(_) => "defense_speed_formula",
            Self::Wexp(_) => "wexp",
            Self::Exp(_) => "exp",
            Self::CannotCounter => "cannot_counter",
            Self::CannotBeCountered => "cannot_be_countered",
            Self::NoDouble => "no_double",
            Self::MenuAfterCombat => "menu_after_combat",
            Self::ManaCost(_) => "mana_cost",
            Self::CastAnim(_) => "cast_anim",
            Self::CastSound(_) => "cast_sound",
            Self::Unequippable => "unequippable",
        }
    }

    fn as_modifier(&self) -> Option<&dyn CombatModifier> {
        match self {
            Self::Effective { .. }
            | Self::ModifyAccuracy(_)
            | Self::ModifyCritAccuracy(_)
            | Self::ModifyDamage(_)
            | Self::ModifyAttackSpeed(_)
            | Self::DamageMultiplier { .. } => Some(self),
            _ => None,
        }
    }
}

impl CombatModifier for ItemComponent {
    fn modify_accuracy(&self, ctx: &ModifierContext<'_>) -> HookResult<i32> {
        match self {
            Self::ModifyAccuracy(formula) => Ok(ctx.evaluate(formula)?),
            _ => Ok(0),
        }
    }

    fn modify_crit_accuracy(&self, ctx: &ModifierContext<'_>) -> HookResult<i32> {
        match self {
            Self::ModifyCritAccuracy(formula) => Ok(ctx.evaluate(formula)?),
            _ => Ok(0),
        }
    }

    fn modify_damage(&self, ctx: &ModifierContext<'_>) -> HookResult<i32> {
        match self {
            Self::ModifyDamage(formula) => Ok(ctx.evaluate(formula)?),
            Self::Effective { tags, bonus } if tags.iter().any(|tag| ctx.target.has_tag(tag)) => {
                Ok(*bonus)
            }
            _ => Ok(0),
        }
    }

    fn modify_attack_speed(&self, ctx: &ModifierContext<'_>) -> HookResult<i32> {
        match self {
            Self::ModifyAttackSpeed(formula) => Ok(ctx.evaluate(formula)?),
            _ => Ok(0),
        }
    }

    fn damage_multiplier(&self, _ctx: &ModifierContext<'_>) -> HookResult<Fixed> {
        match self {
            Self::DamageMultiplier { percent } => Ok(from_percent(*percent)),
            _ => Ok(Fixed::ONE),
        }
    }
}

/// An item instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier.
    pub nid: ItemId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Holder, if any.
    #[serde(default)]
    pub owner: Option<UnitId>,
    /// Weapon type classification (e.g. `Sword`).
    #[serde(default)]
    pub weapon_type: Option<String>,
    /// Weapon rank required to wield it.
    #[serde(default)]
    pub weapon_rank: Option<String>,
    /// Might.
    #[serde(default)]
    pub might: Option<i32>,
    /// Hit.
    #[serde(default)]
    pub hit: Option<i32>,
    /// Crit.
    #[serde(default)]
    pub crit: Option<i32>,
    /// Weight.
    #[serde(default)]
    pub weight: Option<i32>,
    /// Minimum range.
    #[serde(default)]
    pub min_range: Option<u32>,
    /// Maximum range.
    #[serde(default)]
    pub max_range: Option<u32>,
    /// Durability; `None` is unbreakable.
    #[serde(default)]
    pub uses: Option<Uses>,
    /// Transferred to the killer when the holder dies.
    #[serde(default)]
    pub droppable: bool,
    /// Capability components.
    #[serde(default)]
    pub components: Vec<ItemComponent>,
}

impl Item {
    /// Create a bare item.
    pub fn new(nid: impl Into<ItemId>) -> Self {
        let nid = nid.into();
        Self {
            name: nid.to_string(),
            nid,
            owner: None,
            weapon_type: None,
            weapon_rank: None,
            might: None,
            hit: None,
            crit: None,
            weight: None,
            min_range: None,
            max_range: None,
            uses: None,
            droppable: false,
            components: Vec::new(),
        }
    }

    /// Create a weapon with the usual numeric attributes.
    pub fn weapon(nid: impl Into<ItemId>, weapon_type: &str, might: i32, hit: i32, crit: i32) -> Self {
        let mut item = Self::new(nid);
        item.weapon_type = Some(weapon_type.to_owned());
        item.might = Some(might);
        item.hit = Some(hit);
        item.crit = Some(crit);
        item.min_range = Some(1);
        item.max_range = Some(1);
        item.components.push(ItemComponent::Weapon);
        item
    }

    /// Set the attack range.
    #[must_use]
    pub const fn with_range(mut self, min: u32, max: u32) -> Self {
        self.min_range = Some(min);
        self.max_range = Some(max);
        self
    }

    /// Set durability.
    #[must_use]
    pub const fn with_uses(mut self, uses: i32) -> Self {
        self.uses = Some(Uses::new(uses));
        self
    }

    /// Set the required rank.
    #[must_use]
    pub fn with_rank(mut self, rank: &str) -> Self {
        self.weapon_rank = Some(rank.to_owned());
        self
    }

    /// Set the weight.
    #[must_use]
    pub const fn with_weight(mut self, weight: i32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Add a component.
    #[must_use]
    pub fn with_component(mut self, component: ItemComponent) -> Self {
        self.components.push(component);
        self
    }

    /// Mark as droppable.
    #[must_use]
    pub const fn droppable(mut self) -> Self {
        self.droppable = true;
        self
    }

    fn has(&self, predicate: impl Fn(&ItemComponent) -> bool) -> bool {
        self.components.iter().any(predicate)
    }

    /// Components as hook sources.
    pub fn hook_sources(&self) -> impl Iterator<Item = &dyn Component> {
        self.components.iter().map(|c| c as &dyn Component)
    }

    /// Whether the item is a weapon.
    #[must_use]
    pub fn is_weapon(&self) -> bool {
        self.has(|c| matches!(c, ItemComponent::Weapon))
    }

    /// Whether the item is a spell.
    #[must_use]
    pub fn is_spell(&self) -> bool {
        self.has(|c| matches!(c, ItemComponent::Spell))
    }

    /// Whether the item is an accessory.
    #[must_use]
    pub fn is_accessory(&self) -> bool {
        self.has(|c| matches!(c, ItemComponent::Accessory))
    }

    /// Whether the item can go in the weapon slot (rank permitting).
    #[must_use]
    pub fn is_equippable_kind(&self) -> bool {
        (self.is_weapon() || self.is_accessory()) && !self.has(|c| matches!(c, ItemComponent::Unequippable))
    }

    /// Whether durability has run out.
    #[must_use]
    pub const fn is_broken(&self) -> bool {
        matches!(self.uses, Some(Uses { current, .. }) if current <= 0)
    }

    /// Whether the item can be used right now.
    #[must_use]
    pub const fn available(&self) -> bool {
        !self.is_broken()
    }

    /// Whether the item heals.
    #[must_use]
    pub fn is_heal(&self) -> bool {
        self.has(|c| matches!(c, ItemComponent::Heal { .. }))
    }

    /// Flat heal amount and optional scaling formula.
    #[must_use]
    pub fn heal(&self) -> Option<(i32, Option<&Formula>)> {
        self.components.iter().find_map(|c| match c {
            ItemComponent::Heal { amount, formula } => Some((*amount, formula.as_ref())),
            _ => None,
        })
    }

    /// Whether the item is aimed at allies.
    #[must_use]
    pub fn targets_allies(&self) -> bool {
        self.has(|c| matches!(c, ItemComponent::TargetAlly | ItemComponent::Heal { .. }))
    }

    /// Whether the holder may counter with it.
    #[must_use]
    pub fn can_counter(&self) -> bool {
        !self.has(|c| matches!(c, ItemComponent::CannotCounter))
    }

    /// Whether targets may counter it.
    #[must_use]
    pub fn can_be_countered(&self) -> bool {
        !self.has(|c| matches!(c, ItemComponent::CannotBeCountered))
    }

    /// Whether the item may strike twice. Support items never do.
    #[must_use]
    pub fn can_double(&self) -> bool {
        !self.targets_allies() && !self.has(|c| matches!(c, ItemComponent::NoDouble))
    }

    /// Whether the holder returns to the menu after combat.
    #[must_use]
    pub fn menu_after_combat(&self) -> bool {
        self.has(|c| matches!(c, ItemComponent::MenuAfterCombat))
    }

    /// Weapon experience per use, if authored.
    #[must_use]
    pub fn wexp(&self) -> Option<i32> {
        self.components.iter().find_map(|c| match c {
            ItemComponent::Wexp(value) => Some(*value),
            _ => None,
        })
    }

    /// Experience per use, if authored.
    #[must_use]
    pub fn exp(&self) -> Option<i32> {
        self.components.iter().find_map(|c| match c {
            ItemComponent::Exp(value) => Some(*value),
            _ => None,
        })
    }

    /// Mana spent per strike.
    #[must_use]
    pub fn mana_cost(&self) -> i32 {
        self.components
            .iter()
            .map(|c| match c {
                ItemComponent::ManaCost(cost) => *cost,
                _ => 0,
            })
            .sum()
    }

    /// Spell animation, if any.
    #[must_use]
    pub fn cast_anim(&self) -> Option<&str> {
        self.components.iter().find_map(|c| match c {
            ItemComponent::CastAnim(anim) => Some(anim.as_str()),
            _ => None,
        })
    }

    /// Spell sound, if any.
    #[must_use]
    pub fn cast_sound(&self) -> Option<&str> {
        self.components.iter().find_map(|c| match c {
            ItemComponent::CastSound(sound) => Some(sound.as_str()),
            _ => None,
        })
    }

    /// Whether `distance` is inside the attack range.
    #[must_use]
    pub fn in_range(&self, distance: u32) -> bool {
        let min = self.min_range.unwrap_or(1);
        let max = self.max_range.unwrap_or(min);
        (min..=max).contains(&distance)
    }

    fn override_or<'a>(&'a self, default: &'a str, pick: impl Fn(&'a ItemComponent) -> Option<&'a String>) -> &'a str {
        self.components.iter().find_map(pick).map_or(default, String::as_str)
    }

    /// Equation used for accuracy.
    #[must_use]
    pub fn accuracy_formula(&self) -> &str {
        self.override_or(equations::HIT, |c| match c {
            ItemComponent::AccuracyFormula(name) => Some(name),
            _ => None,
        })
    }

    /// Equation used for avoid when this is the holder's weapon.
    #[must_use]
    pub fn avoid_formula(&self) -> &str {
        self.override_or(equations::AVOID, |c| match c {
            ItemComponent::AvoidFormula(name) => Some(name),
            _ => None,
        })
    }

    /// Equation used for crit accuracy.
    #[must_use]
    pub fn crit_accuracy_formula(&self) -> &str {
        self.override_or(equations::CRIT_HIT, |c| match c {
            ItemComponent::CritAccuracyFormula(name) => Some(name),
            _ => None,
        })
    }

    /// Equation used for crit avoid when this is the holder's weapon.
    #[must_use]
    pub fn crit_avoid_formula(&self) -> &str {
        self.override_or(equations::CRIT_AVOID, |c| match c {
            ItemComponent::CritAvoidFormula(name) => Some(name),
            _ => None,
        })
    }

    /// Equation used for damage.
    #[must_use]
    pub fn damage_formula(&self) -> &str {
        self.override_or(equations::DAMAGE, |c| match c {
            ItemComponent::DamageFormula(name) => Some(name),
            _ => None,
        })
    }

    /// Equation the target uses for defense against this item.
    #[must_use]
    pub fn defense_formula(&self) -> &str {
        self.override_or(equations::DEFENSE, |c| match c {
            ItemComponent::DefenseFormula(name) => Some(name),
            _ => None,
        })
    }

    /// Equation used for attack speed.
    #[must_use]
    pub fn attack_speed_formula(&self) -> &str {
        self.override_or(equations::ATTACK_SPEED, |c| match c {
            ItemComponent::AttackSpeedFormula(name) => Some(name),
            _ => None,
        })
    }

    /// Equation the target uses for defense speed against this item.
    #[must_use]
    pub fn defense_speed_formula(&self) -> &str {
        self.override_or(equations::DEFENSE_SPEED, |c| match c {
            ItemComponent::DefenseSpeedFormula(name) => Some(name),
            _ => None,
        })
    }

    /// Every equation name this item may request.
    #[must_use]
    pub fn formula_names(&self) -> [&str; 8] {
        [
            self.accuracy_formula(),
            self.avoid_formula(),
            self.crit_accuracy_formula(),
            self.crit_avoid_formula(),
            self.damage_formula(),
            self.defense_formula(),
            self.attack_speed_formula(),
            self.defense_speed_formula(),
        ]
    }
}
