//! Unit state owned by the host and borrowed by an encounter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{ItemId, Position, SkillId, Team, UnitId};

/// Stat that holds a unit's maximum HP.
pub const HP_STAT: &str = "HP";

/// Experience needed for one level.
pub const EXP_PER_LEVEL: i32 = 100;

/// A combatant.
///
/// Combat never writes these fields directly; every change goes through an
/// [`Action`](crate::action::Action) so it can be undone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Unique identifier.
    pub nid: UnitId,
    /// Display name used in messages.
    #[serde(default)]
    pub name: String,
    /// Allegiance.
    #[serde(default)]
    pub team: Team,
    /// Tile the unit stands on, if it is on the map.
    #[serde(default)]
    pub position: Option<Position>,
    /// Current level.
    #[serde(default = "default_level")]
    pub level: i32,
    /// Experience toward the next level (0..100).
    #[serde(default)]
    pub exp: i32,
    /// Base stats by name.
    #[serde(default)]
    pub stats: BTreeMap<String, i32>,
    /// Growth rates by stat name, in percent.
    #[serde(default)]
    pub growths: BTreeMap<String, i32>,
    /// Current HP.
    pub current_hp: i32,
    /// Current mana.
    #[serde(default)]
    pub current_mana: i32,
    /// Current fatigue.
    #[serde(default)]
    pub current_fatigue: i32,
    /// Weapon experience by weapon type.
    #[serde(default)]
    pub wexp: BTreeMap<String, i32>,
    /// Held items in inventory order.
    #[serde(default)]
    pub items: Vec<ItemId>,
    /// Equipped weapon, if any.
    #[serde(default)]
    pub equipped_weapon: Option<ItemId>,
    /// Equipped accessory, if any.
    #[serde(default)]
    pub equipped_accessory: Option<ItemId>,
    /// Owned skills.
    #[serde(default)]
    pub skills: Vec<SkillId>,
    /// Classification tags such as `Boss` or `Tile`.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Set once lethal damage has been confirmed at the end of combat.
    #[serde(default)]
    pub is_dying: bool,
    /// Whether the unit has attacked this turn.
    #[serde(default)]
    pub has_attacked: bool,
}

const fn default_level() -> i32 {
    1
}

impl Unit {
    /// Create a unit with no stats on the given team.
    pub fn new(nid: impl Into<UnitId>, team: Team) -> Self {
        let nid = nid.into();
        Self {
            name: nid.to_string(),
            nid,
            team,
            position: None,
            level: default_level(),
            exp: 0,
            stats: BTreeMap::new(),
            growths: BTreeMap::new(),
            current_hp: 0,
            current_mana: 0,
            current_fatigue: 0,
            wexp: BTreeMap::new(),
            items: Vec::new(),
            equipped_weapon: None,
            equipped_accessory: None,
            skills: Vec::new(),
            tags: Vec::new(),
            is_dying: false,
            has_attacked: false,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set a base stat. Setting `HP` also fills current HP.
    #[must_use]
    pub fn with_stat(mut self, stat: &str, value: i32) -> Self {
        if stat == HP_STAT {
            self.current_hp = value;
        }
        self.stats.insert(stat.to_owned(), value);
        self
    }

    /// Set the level.
    #[must_use]
    pub const fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Place the unit on the map.
    #[must_use]
    pub const fn at(mut self, x: i32, y: i32) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    /// Set weapon experience for a weapon type.
    #[must_use]
    pub fn with_wexp(mut self, weapon_type: &str, value: i32) -> Self {
        self.wexp.insert(weapon_type.to_owned(), value);
        self
    }

    /// Add a classification tag.
    #[must_use]
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_owned());
        self
    }

    /// Base value of a stat (0 when absent).
    #[must_use]
    pub fn base_stat(&self, stat: &str) -> i32 {
        self.stats.get(stat).copied().unwrap_or(0)
    }

    /// Maximum HP.
    #[must_use]
    pub fn max_hp(&self) -> i32 {
        self.base_stat(HP_STAT)
    }

    /// HP clamped into `[0, max_hp]`.
    #[must_use]
    pub fn clamp_hp(&self, hp: i32) -> i32 {
        hp.clamp(0, self.max_hp().max(0))
    }

    /// Whether the unit has taken lethal damage.
    #[must_use]
    pub const fn is_lethal(&self) -> bool {
        self.current_hp <= 0
    }

    /// Whether the unit can still act in this encounter.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        !self.is_dying && !self.is_lethal()
    }

    /// Weapon experience in a weapon type.
    #[must_use]
    pub fn wexp_for(&self, weapon_type: &str) -> i32 {
        self.wexp.get(weapon_type).copied().unwrap_or(0)
    }

    /// Whether the unit carries a classification tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_hp() {
        let unit = Unit::new("eirika", Team::Player).with_stat(HP_STAT, 18).with_stat("STR", 5);
        assert_eq!(unit.max_hp(), 18);
        assert_eq!(unit.current_hp, 18);
        assert_eq!(unit.base_stat("STR"), 5);
        assert_eq!(unit.base_stat("MAG"), 0);
    }

    #[test]
    fn test_clamp_hp() {
        let unit = Unit::new("seth", Team::Player).with_stat(HP_STAT, 30);
        assert_eq!(unit.clamp_hp(45), 30);
        assert_eq!(unit.clamp_hp(-4), 0);
        assert_eq!(unit.clamp_hp(12), 12);
    }

    #[test]
    fn test_lethal_and_alive() {
        let mut unit = Unit::new("o_neill", Team::Enemy).with_stat(HP_STAT, 10);
        assert!(unit.is_alive());
        unit.current_hp = 0;
        assert!(unit.is_lethal());
        assert!(!unit.is_alive());
    }
}
