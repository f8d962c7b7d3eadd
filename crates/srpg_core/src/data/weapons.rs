//! Weapon ranks, weapon types and the advantage matrix.

use serde::{Deserialize, Serialize};

/// A weapon rank tier.
///
/// A unit qualifies for a rank once its weapon experience in the weapon's
/// type reaches `requirement`. Only the highest qualifying rank's bonus
/// applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeaponRank {
    /// Rank name (e.g. `"C"`).
    pub nid: String,
    /// Weapon experience needed.
    pub requirement: i32,
    /// Accuracy bonus.
    #[serde(default)]
    pub accuracy: i32,
    /// Crit bonus.
    #[serde(default)]
    pub crit: i32,
    /// Damage bonus.
    #[serde(default)]
    pub damage: i32,
    /// Attack speed bonus.
    #[serde(default)]
    pub attack_speed: i32,
}

impl WeaponRank {
    /// A rank with no bonuses.
    pub fn new(nid: impl Into<String>, requirement: i32) -> Self {
        Self { nid: nid.into(), requirement, accuracy: 0, crit: 0, damage: 0, attack_speed: 0 }
    }

    /// Set every bonus at once.
    #[must_use]
    pub const fn with_bonus(mut self, accuracy: i32, crit: i32, damage: i32, attack_speed: i32) -> Self {
        self.accuracy = accuracy;
        self.crit = crit;
        self.damage = damage;
        self.attack_speed = attack_speed;
        self
    }
}

/// Weapon type selector in an advantage entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeMatch {
    /// Matches every weapon type.
    All,
    /// Matches one weapon type.
    Type(String),
}

impl TypeMatch {
    /// Whether this selector matches `weapon_type`.
    #[must_use]
    pub fn matches(&self, weapon_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::Type(t) => t == weapon_type,
        }
    }
}

/// Rank requirement in an advantage entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankMatch {
    /// Always satisfied.
    All,
    /// Satisfied when the unit qualifies for this rank.
    Rank(String),
}

/// Deltas granted by an advantage or disadvantage entry.
///
/// Disadvantage entries carry their penalties as negative values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdvantageEntry {
    /// Opposing weapon type.
    pub weapon_type: TypeMatch,
    /// Rank the owner must have reached.
    pub weapon_rank: RankMatch,
    /// Added to the owner's accuracy.
    #[serde(default)]
    pub accuracy: i32,
    /// Subtracted from the opponent's accuracy.
    #[serde(default)]
    pub avoid: i32,
    /// Added to the owner's crit.
    #[serde(default)]
    pub crit: i32,
    /// Subtracted from the opponent's crit.
    #[serde(default)]
    pub dodge: i32,
    /// Added to the owner's might.
    #[serde(default)]
    pub damage: i32,
    /// Subtracted from the opponent's might.
    #[serde(default)]
    pub resist: i32,
    /// Added to the owner's attack speed.
    #[serde(default)]
    pub attack_speed: i32,
    /// Subtracted from the opponent's attack speed.
    #[serde(default)]
    pub defense_speed: i32,
}

impl AdvantageEntry {
    /// An entry against `weapon_type` at any rank with no deltas.
    pub fn against(weapon_type: &str) -> Self {
        Self {
            weapon_type: TypeMatch::Type(weapon_type.to_owned()),
            weapon_rank: RankMatch::All,
            accuracy: 0,
            avoid: 0,
            crit: 0,
            dodge: 0,
            damage: 0,
            resist: 0,
            attack_speed: 0,
            defense_speed: 0,
        }
    }

    /// Require a rank.
    #[must_use]
    pub fn at_rank(mut self, rank: &str) -> Self {
        self.weapon_rank = RankMatch::Rank(rank.to_owned());
        self
    }

    /// Set accuracy and damage deltas.
    #[must_use]
    pub const fn with_offense(mut self, accuracy: i32, damage: i32) -> Self {
        self.accuracy = accuracy;
        self.damage = damage;
        self
    }

    /// Set avoid and resist deltas.
    #[must_use]
    pub const fn with_defense(mut self, avoid: i32, resist: i32) -> Self {
        self.avoid = avoid;
        self.resist = resist;
        self
    }
}

/// A weapon type with its advantage tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeaponTypeData {
    /// Type name (e.g. `"Sword"`).
    pub nid: String,
    /// Entries applied when this type has the upper hand.
    #[serde(default)]
    pub advantage: Vec<AdvantageEntry>,
    /// Entries applied when this type is at a disadvantage.
    #[serde(default)]
    pub disadvantage: Vec<AdvantageEntry>,
}

impl WeaponTypeData {
    /// A weapon type with empty tables.
    pub fn new(nid: impl Into<String>) -> Self {
        Self { nid: nid.into(), advantage: Vec::new(), disadvantage: Vec::new() }
    }

    /// Append an advantage entry.
    #[must_use]
    pub fn with_advantage(mut self, entry: AdvantageEntry) -> Self {
        self.advantage.push(entry);
        self
    }

    /// Append a disadvantage entry.
    #[must_use]
    pub fn with_disadvantage(mut self, entry: AdvantageEntry) -> Self {
        self.disadvantage.push(entry);
        self
    }
}
