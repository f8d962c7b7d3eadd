//! Tunable combat constants.

use serde::{Deserialize, Serialize};

use crate::math::{from_percent, Fixed};

/// How hit rolls are made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RngMode {
    /// One roll against the displayed hit.
    #[default]
    Classic,
    /// Average of two rolls against the displayed hit.
    TrueHit,
}

/// Global combat constants.
///
/// # Example RON
///
/// ```ron
/// CombatConstants(
///     min_damage: 0,
///     speed_to_double: 4,
///     crit_mult: 3,
///     crit_add: 0,
///     miss_wexp: false,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatConstants {
    /// Lowest damage a strike can deal.
    #[serde(default)]
    pub min_damage: i32,
    /// Attack speed lead needed to strike twice.
    #[serde(default = "default_speed_to_double")]
    pub speed_to_double: i32,
    /// Might multiplier on a critical hit.
    #[serde(default = "default_crit_mult")]
    pub crit_mult: i32,
    /// Extra copies of might added on a critical hit.
    #[serde(default)]
    pub crit_add: i32,
    /// Experience multiplier for a kill, in percent.
    #[serde(default = "default_kill_multiplier")]
    pub kill_multiplier: i32,
    /// Flat experience for killing a `Boss` unit.
    #[serde(default = "default_boss_bonus")]
    pub boss_bonus: i32,
    /// Minimum experience for fighting a hostile unit.
    #[serde(default = "default_min_exp")]
    pub min_exp: i32,
    /// Experience base when the item has no `Exp` component.
    #[serde(default = "default_base_exp")]
    pub base_exp: i32,
    /// Experience per level of difference when the item has no `Exp` component.
    #[serde(default = "default_exp_level_factor")]
    pub exp_level_factor: i32,
    /// Weapon experience when the item has no `Wexp` component.
    #[serde(default = "default_wexp")]
    pub default_wexp: i32,
    /// Whether misses grant weapon experience.
    #[serde(default)]
    pub miss_wexp: bool,
    /// Whether weapon experience is granted per strike.
    #[serde(default)]
    pub double_wexp: bool,
    /// Whether a kill doubles weapon experience.
    #[serde(default = "default_true")]
    pub kill_wexp: bool,
    /// Hit roll mode.
    #[serde(default)]
    pub rng_mode: RngMode,
}

const fn default_speed_to_double() -> i32 {
    4
}

const fn default_crit_mult() -> i32 {
    3
}

const fn default_kill_multiplier() -> i32 {
    300
}

const fn default_boss_bonus() -> i32 {
    40
}

const fn default_min_exp() -> i32 {
    1
}

const fn default_base_exp() -> i32 {
    10
}

const fn default_exp_level_factor() -> i32 {
    3
}

const fn default_wexp() -> i32 {
    1
}

const fn default_true() -> bool {
    true
}

impl Default for CombatConstants {
    fn default() -> Self {
        Self {
            min_damage: 0,
            speed_to_double: default_speed_to_double(),
            crit_mult: default_crit_mult(),
            crit_add: 0,
            kill_multiplier: default_kill_multiplier(),
            boss_bonus: default_boss_bonus(),
            min_exp: default_min_exp(),
            base_exp: default_base_exp(),
            exp_level_factor: default_exp_level_factor(),
            default_wexp: default_wexp(),
            miss_wexp: false,
            double_wexp: false,
            kill_wexp: true,
            rng_mode: RngMode::Classic,
        }
    }
}

impl CombatConstants {
    /// Set the damage floor.
    #[must_use]
    pub const fn with_min_damage(mut self, min_damage: i32) -> Self {
        self.min_damage = min_damage;
        self
    }

    /// Set the doubling threshold.
    #[must_use]
    pub const fn with_speed_to_double(mut self, threshold: i32) -> Self {
        self.speed_to_double = threshold;
        self
    }

    /// Set crit amplification.
    #[must_use]
    pub const fn with_crit(mut self, crit_mult: i32, crit_add: i32) -> Self {
        self.crit_mult = crit_mult;
        self.crit_add = crit_add;
        self
    }

    /// Set the hit roll mode.
    #[must_use]
    pub const fn with_rng_mode(mut self, rng_mode: RngMode) -> Self {
        self.rng_mode = rng_mode;
        self
    }

    /// Kill multiplier as a fixed-point factor.
    #[must_use]
    pub fn kill_factor(&self) -> Fixed {
        from_percent(self.kill_multiplier)
    }
}
