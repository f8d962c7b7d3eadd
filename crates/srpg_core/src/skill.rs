//! Skills and their capability components.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::components::{SkillId, UnitId};
use crate::equations::Formula;
use crate::hooks::{
    CombatLifecycle, CombatModifier, Component, DeathHook, ExpModifier, HookResult, LifecycleContext,
    ModifierContext, StatModifier,
};
use crate::math::{from_percent, Fixed};
use crate::playback::Playback;
use crate::unit::Unit;

/// Mutable charge state of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SkillData {
    /// Current charge.
    #[serde(default)]
    pub charge: i32,
    /// Charge needed (or held) when full.
    #[serde(default)]
    pub total_charge: i32,
    /// Whether the skill was activated for the current encounter.
    #[serde(default)]
    pub active: bool,
}

/// Behaviour attached to a skill.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillComponent {
    /// Flat stat bonus.
    StatChange {
        /// Stat name.
        stat: String,
        /// Amount added.
        value: i32,
    },
    /// Flat bonuses while fighting.
    CombatBonus {
        /// Added to accuracy.
        #[serde(default)]
        accuracy: i32,
        /// Added to crit accuracy.
        #[serde(default)]
        crit: i32,
        /// Added to might.
        #[serde(default)]
        damage: i32,
        /// Added to attack speed.
        #[serde(default)]
        attack_speed: i32,
    },
    /// Adds a formula of the owner's stats to might.
    ModifyDamage(Formula),
    /// Scales final damage, in percent.
    DamageMultiplier {
        /// Multiplier percent.
        percent: i32,
    },
    /// Scales experience the owner gains, in percent.
    ExpMultiplier {
        /// Multiplier percent.
        percent: i32,
    },
    /// Scales experience opponents gain from the owner, in percent.
    EnemyExpMultiplier {
        /// Multiplier percent.
        percent: i32,
    },
    /// Owner may move again after combat.
    Canto,
    /// Owner strikes first when defending.
    Vantage,
    /// Message spoken when the owner dies.
    LastWords(String),
    /// Charge builds from 0 to the value; spending it resets to 0.
    BuildCharge(i32),
    /// Starts full at the value; each activation drains one.
    DrainCharge(i32),
    /// Gains charge after a combat in which the owner acted.
    CombatChargeIncrease(i32),
    /// Like `CombatChargeIncrease`, using a stat as the amount.
    CombatChargeIncreaseByStat(String),
    /// Gains mana at the start of combat.
    GainMana(Formula),
    /// Spends mana at the start of combat while active.
    CostMana(i32),
}

impl SkillComponent {
    /// Initial charge state implied by this component, if it is a charge component.
    #[must_use]
    pub const fn initial_data(&self) -> Option<SkillData> {
        match self {
            Self::BuildCharge(total) => Some(SkillData { charge: 0, total_charge: *total, active: false }),
            Self::DrainCharge(total) => Some(SkillData { charge: *total, total_charge: *total, active: false }),
            _ => None,
        }
    }

    fn charge_gain(&self, unit: &Unit, ctx: &LifecycleContext<'_>) -> Option<i32> {
        match self {
            Self::CombatChargeIncrease(value) => Some(*value),
            Self::CombatChargeIncreaseByStat(stat) => Some(ctx.world.stats_of(unit).stat_value(stat)),
            _ => None,
        }
    }
}

impl Component for SkillComponent {
    fn name(&self) -> &'static str {
        match self {
            Self::StatChange { .. } => "stat_change",
            Self::CombatBonus { .. } => "combat_bonus",
            Self::ModifyDamage(_) => "modify_damage",
            Self::DamageMultiplier { .. } => "damage_multiplier",
            Self::ExpMultiplier { .. } => "exp_multiplier",
            Self::EnemyExpMultiplier { .. } => "enemy_exp_multiplier",
            Self::Canto => "canto",
            Self::Vantage => "vantage",
            Self::LastWords(_) => "last_words",
            Self::BuildCharge(_) => "build_charge",
            Self::DrainCharge(_) => "drain_charge",
            Self::CombatChargeIncrease(_) => "combat_charge_increase",
            Self::CombatChargeIncreaseByStat(_) => "combat_charge_increase_by_stat",
            Self::GainMana(_) => "gain_mana",
            Self::CostMana(_) => "cost_mana",
        }
    }

    fn as_modifier(&self) -> Option<&dyn CombatModifier> {
        match self {
            Self::CombatBonus { .. } | Self::ModifyDamage(_) | Self::DamageMultiplier { .. } => Some(self),
            _ => None,
        }
    }

    fn as_lifecycle(&self) -> Option<&dyn CombatLifecycle> {
        match self {
            Self::BuildCharge(_)
            | Self::DrainCharge(_)
            | Self::CombatChargeIncrease(_)
            | Self::CombatChargeIncreaseByStat(_)
            | Self::GainMana(_)
            | Self::CostMana(_) => Some(self),
            _ => None,
        }
    }

    fn as_exp_modifier(&self) -> Option<&dyn ExpModifier> {
        match self {
            Self::ExpMultiplier { .. } | Self::EnemyExpMultiplier { .. } => Some(self),
            _ => None,
        }
    }

    fn as_stat_modifier(&self) -> Option<&dyn StatModifier> {
        match self {
            Self::StatChange { .. } => Some(self),
            _ => None,
        }
    }

    fn as_death_hook(&self) -> Option<&dyn DeathHook> {
        match self {
            Self::LastWords(_) => Some(self),
            _ => None,
        }
    }
}

impl CombatModifier for SkillComponent {
    fn modify_accuracy(&self, _ctx: &ModifierContext<'_>) -> HookResult<i32> {
        match self {
            Self::CombatBonus { accuracy, .. } => Ok(*accuracy),
            _ => Ok(0),
        }
    }

    fn modify_crit_accuracy(&self, _ctx: &ModifierContext<'_>) -> HookResult<i32> {
        match self {
            Self::CombatBonus { crit, .. } => Ok(*crit),
            _ => Ok(0),
        }
    }

    fn modify_damage(&self, ctx: &ModifierContext<'_>) -> HookResult<i32> {
        match self {
            Self::CombatBonus { damage, .. } => Ok(*damage),
            Self::ModifyDamage(formula) => Ok(ctx.evaluate(formula)?),
            _ => Ok(0),
        }
    }

    fn modify_attack_speed(&self, _ctx: &ModifierContext<'_>) -> HookResult<i32> {
        match self {
            Self::CombatBonus { attack_speed, .. } => Ok(*attack_speed),
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

impl CombatLifecycle for SkillComponent {
    fn start_combat(&self, ctx: &LifecycleContext<'_>) -> HookResult<Vec<Action>> {
        let unit = ctx.unit;
        match self {
            Self::GainMana(formula) if ctx.target.is_some() => {
                let stats = ctx.world.stats_of(unit);
                let gain = formula.evaluate(&stats, &ctx.db.equations)?;
                Ok(vec![Action::change_mana(unit, gain)])
            }
            Self::CostMana(cost) if ctx.skill.data.active => Ok(vec![Action::change_mana(unit, -cost)]),
            _ => Ok(Vec::new()),
        }
    }

    fn end_combat(&self, ctx: &LifecycleContext<'_>) -> HookResult<Vec<Action>> {
        let Some(gain) = self.charge_gain(ctx.unit, ctx) else {
            return Ok(Vec::new());
        };
        if ctx.skill.data.active {
            return Ok(Vec::new());
        }
        let miss_counts = ctx.db.constants.miss_wexp;
        let acted = Playback::marks_in(ctx.playback, miss_counts)
            .any(|mark| {
                mark.attacker == ctx.unit.nid
                    && mark.defender != ctx.unit.nid
                    && ctx.item.is_some_and(|item| item.nid == mark.item)
            });
        if !acted {
            return Ok(Vec::new());
        }
        let data = ctx.skill.data;
        let charge = data.charge.saturating_add(gain).min(data.total_charge);
        Ok(vec![Action::set_skill_charge(ctx.skill, charge, data.active)])
    }

    fn post_combat(&self, ctx: &LifecycleContext<'_>) -> HookResult<Vec<Action>> {
        let data = ctx.skill.data;
        if !data.active {
            return Ok(Vec::new());
        }
        match self {
            Self::BuildCharge(_) => Ok(vec![Action::set_skill_charge(ctx.skill, 0, false)]),
            Self::DrainCharge(_) => {
                Ok(vec![Action::set_skill_charge(ctx.skill, (data.charge - 1).max(0), false)])
            }
            _ => Ok(Vec::new()),
        }
    }
}

impl ExpModifier for SkillComponent {
    fn exp_multiplier(&self, _unit: &Unit, _target: &Unit) -> Fixed {
        match self {
            Self::ExpMultiplier { percent } => from_percent(*percent),
            _ => Fixed::ONE,
        }
    }

    fn enemy_exp_multiplier(&self, _unit: &Unit, _opponent: &Unit) -> Fixed {
        match self {
            Self::EnemyExpMultiplier { percent } => from_percent(*percent),
            _ => Fixed::ONE,
        }
    }
}

impl StatModifier for SkillComponent {
    fn stat_change(&self, stat: &str) -> i32 {
        match self {
            Self::StatChange { stat: changed, value } if changed == stat => *value,
            _ => 0,
        }
    }
}

impl DeathHook for SkillComponent {
    fn on_death(&self, unit: &Unit) -> Vec<Action> {
        match self {
            Self::LastWords(text) => vec![Action::message(format!("{}: {text}", unit.name))],
            _ => Vec::new(),
        }
    }
}

/// A skill instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Skill {
    /// Unique identifier.
    pub nid: SkillId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Owning unit.
    #[serde(default)]
    pub owner: Option<UnitId>,
    /// Charge state.
    #[serde(default)]
    pub data: SkillData,
    /// Capability components.
    #[serde(default)]
    pub components: Vec<SkillComponent>,
}

impl Skill {
    /// Create a skill; charge components seed its initial data.
    pub fn new(nid: impl Into<SkillId>, components: Vec<SkillComponent>) -> Self {
        let nid = nid.into();
        let data = components.iter().find_map(SkillComponent::initial_data).unwrap_or_default();
        Self { name: nid.to_string(), nid, owner: None, data, components }
    }

    /// Components as hook sources.
    pub fn hook_sources(&self) -> impl Iterator<Item = &dyn Component> {
        self.components.iter().map(|c| c as &dyn Component)
    }

    /// Whether the skill grants canto.
    #[must_use]
    pub fn has_canto(&self) -> bool {
        self.components.iter().any(|c| matches!(c, SkillComponent::Canto))
    }

    /// Whether the skill grants vantage.
    #[must_use]
    pub fn has_vantage(&self) -> bool {
        self.components.iter().any(|c| matches!(c, SkillComponent::Vantage))
    }

    /// Whether a charge skill is full.
    #[must_use]
    pub const fn is_charged(&self) -> bool {
        self.data.total_charge > 0 && self.data.charge >= self.data.total_charge
    }
}
