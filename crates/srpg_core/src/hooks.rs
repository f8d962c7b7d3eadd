//! Capability interfaces exposed by item and skill components.
//!
//! Each hook family is its own trait. A component advertises the families it
//! implements through the `as_*` accessors on [`Component`]; a `None` means
//! the component is skipped for that family rather than called with a
//! default. Hooks return [`HookResult`]; the dispatch helpers in this module
//! log failures and substitute the neutral contribution.

use thiserror::Error;

use crate::action::Action;
use crate::components::CombatMode;
use crate::data::Database;
use crate::equations::{EquationSystem, Formula, StatSource};
use crate::error::CombatError;
use crate::item::Item;
use crate::math::Fixed;
use crate::playback::CombatEvent;
use crate::skill::Skill;
use crate::unit::Unit;
use crate::world::World;

/// Failure raised inside a single hook.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl From<CombatError> for HookError {
    fn from(err: CombatError) -> Self {
        Self(err.to_string())
    }
}

/// Result type for hook calls.
pub type HookResult<T> = std::result::Result<T, HookError>;

// ============================================================================
// Contexts
// ============================================================================

/// Inputs to a combat modifier hook.
pub struct ModifierContext<'a> {
    /// Unit performing the strike.
    pub unit: &'a Unit,
    /// Item used for the strike.
    pub item: &'a Item,
    /// Unit being struck.
    pub target: &'a Unit,
    /// Role of `unit` in this strike.
    pub mode: CombatMode,
    /// Effective stats of `unit`.
    pub stats: &'a dyn StatSource,
    /// Equation registry for formula components.
    pub equations: &'a dyn EquationSystem,
}

impl ModifierContext<'_> {
    /// Evaluate a formula against the acting unit.
    ///
    /// # Errors
    ///
    /// Propagates formula evaluation failures.
    pub fn evaluate(&self, formula: &Formula) -> crate::error::Result<i32> {
        formula.evaluate(self.stats, self.equations)
    }
}

/// Inputs to a lifecycle hook. Always owned by a skill.
pub struct LifecycleContext<'a> {
    /// Content database.
    pub db: &'a Database,
    /// World state at the time the hook runs.
    pub world: &'a World,
    /// Encounter playback so far.
    pub playback: &'a [CombatEvent],
    /// Skill the component belongs to.
    pub skill: &'a Skill,
    /// Owner of the skill.
    pub unit: &'a Unit,
    /// Item the owner used in this encounter, if any.
    pub item: Option<&'a Item>,
    /// The owner's opponent, if any.
    pub target: Option<&'a Unit>,
    /// Role of the owner in the encounter.
    pub mode: CombatMode,
}

// ============================================================================
// Hook families
// ============================================================================

/// Situational adjustments to strike statistics.
pub trait CombatModifier {
    /// Added to accuracy.
    fn modify_accuracy(&self, _ctx: &ModifierContext<'_>) -> HookResult<i32> {
        Ok(0)
    }

    /// Added to crit accuracy.
    fn modify_crit_accuracy(&self, _ctx: &ModifierContext<'_>) -> HookResult<i32> {
        Ok(0)
    }

    /// Added to pre-mitigation might.
    fn modify_damage(&self, _ctx: &ModifierContext<'_>) -> HookResult<i32> {
        Ok(0)
    }

    /// Added to attack speed.
    fn modify_attack_speed(&self, _ctx: &ModifierContext<'_>) -> HookResult<i32> {
        Ok(0)
    }

    /// Multiplies post-mitigation damage.
    fn damage_multiplier(&self, _ctx: &ModifierContext<'_>) -> HookResult<Fixed> {
        Ok(Fixed::ONE)
    }
}

/// Hooks bracketing the phase loop: pre, start, ...phases..., end, post.
pub trait CombatLifecycle {
    /// Before any hook of the encounter.
    fn pre_combat(&self, _ctx: &LifecycleContext<'_>) -> HookResult<Vec<Action>> {
        Ok(Vec::new())
    }

    /// Right before the first phase.
    fn start_combat(&self, _ctx: &LifecycleContext<'_>) -> HookResult<Vec<Action>> {
        Ok(Vec::new())
    }

    /// Right after the last phase.
    fn end_combat(&self, _ctx: &LifecycleContext<'_>) -> HookResult<Vec<Action>> {
        Ok(Vec::new())
    }

    /// After end-of-combat hooks of every participant.
    fn post_combat(&self, _ctx: &LifecycleContext<'_>) -> HookResult<Vec<Action>> {
        Ok(Vec::new())
    }
}

/// Experience scaling.
pub trait ExpModifier {
    /// Scales experience the owner gains from fighting `target`.
    fn exp_multiplier(&self, _unit: &Unit, _target: &Unit) -> Fixed {
        Fixed::ONE
    }

    /// Scales experience an opponent gains from fighting the owner.
    fn enemy_exp_multiplier(&self, _unit: &Unit, _opponent: &Unit) -> Fixed {
        Fixed::ONE
    }
}

/// Flat stat adjustments visible to equations.
pub trait StatModifier {
    /// Amount added to `stat`.
    fn stat_change(&self, stat: &str) -> i32;
}

/// Runs when the owner is confirmed dying.
pub trait DeathHook {
    /// Actions to append for the owner's death.
    fn on_death(&self, unit: &Unit) -> Vec<Action>;
}

/// A value that implements some subset of the hook families.
pub trait Component {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Combat modifier capability.
    fn as_modifier(&self) -> Option<&dyn CombatModifier> {
        None
    }

    /// Lifecycle capability.
    fn as_lifecycle(&self) -> Option<&dyn CombatLifecycle> {
        None
    }

    /// Experience capability.
    fn as_exp_modifier(&self) -> Option<&dyn ExpModifier> {
        None
    }

    /// Stat capability.
    fn as_stat_modifier(&self) -> Option<&dyn StatModifier> {
        None
    }

    /// Death capability.
    fn as_death_hook(&self) -> Option<&dyn DeathHook> {
        None
    }
}

// ============================================================================
// Guarded dispatch
// ============================================================================

/// Unwrap a hook result, logging a failure and returning `neutral` instead.
pub fn guarded<T>(hook: &'static str, component: &dyn Component, result: HookResult<T>, neutral: T) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(hook, component = component.name(), error = %err, "Hook failed, ignoring its contribution");
            neutral
        }
    }
}

/// Sum an additive modifier hook over every source that implements it.
pub fn sum_modifiers<'a>(
    sources: impl IntoIterator<Item = &'a dyn Component>,
    hook: &'static str,
    call: impl Fn(&dyn CombatModifier) -> HookResult<i32>,
) -> i32 {
    sources
        .into_iter()
        .filter_map(|component| component.as_modifier().map(|m| guarded(hook, component, call(m), 0)))
        .fold(0i32, i32::saturating_add)
}

/// Multiply a multiplier hook over every source that implements it.
pub fn product_multipliers<'a>(
    sources: impl IntoIterator<Item = &'a dyn Component>,
    hook: &'static str,
    call: impl Fn(&dyn CombatModifier) -> HookResult<Fixed>,
) -> Fixed {
    sources
        .into_iter()
        .filter_map(|component| component.as_modifier().map(|m| guarded(hook, component, call(m), Fixed::ONE)))
        .fold(Fixed::ONE, Fixed::saturating_mul)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl CombatModifier for Broken {
        fn modify_damage(&self, _ctx: &ModifierContext<'_>) -> HookResult<i32> {
            Err(HookError("malformed script".into()))
        }
    }

    impl Component for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn as_modifier(&self) -> Option<&dyn CombatModifier> {
            Some(self)
        }
    }

    struct Plain;

    impl Component for Plain {
        fn name(&self) -> &'static str {
            "plain"
        }
    }

    #[test]
    fn test_guarded_uses_neutral_on_error() {
        let value = guarded("modify_damage", &Broken, Err(HookError("bad".into())), 0);
        assert_eq!(value, 0);
        assert_eq!(guarded("modify_damage", &Broken, Ok(5), 0), 5);
    }

    #[test]
    fn test_missing_capability_is_skipped() {
        let sources: Vec<&dyn Component> = vec![&Plain, &Plain];
        let total = sum_modifiers(sources, "modify_damage", |_| Ok(100));
        assert_eq!(total, 0);
    }

    #[test]
    fn test_failing_hook_contributes_nothing() {
        let sources: Vec<&dyn Component> = vec![&Broken, &Plain];
        let total = sum_modifiers(sources, "modify_damage", |_| Err(HookError("boom".into())));
        assert_eq!(total, 0);
        let sources: Vec<&dyn Component> = vec![&Broken];
        let product = product_multipliers(sources, "damage_multiplier", |_| Err(HookError("boom".into())));
        assert_eq!(product, Fixed::ONE);
    }
}
