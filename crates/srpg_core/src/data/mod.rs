//! Content data: constants, weapon ranks, weapon types and equations.
//!
//! Everything here is plain serde data loaded from RON. Content errors
//! (unregistered equations, unknown ranks or weapon types) are reported at
//! load time through [`Database::validate`] and never defaulted mid-combat.

mod constants;
mod weapons;

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use constants::{CombatConstants, RngMode};
pub use weapons::{AdvantageEntry, RankMatch, TypeMatch, WeaponRank, WeaponTypeData};

use crate::equations::{EquationSystem, EquationTable, STANDARD_EQUATIONS};
use crate::error::{CombatError, Result};
use crate::item::Item;

/// The content database an encounter runs against.
///
/// # Example RON
///
/// ```ron
/// Database(
///     constants: CombatConstants(speed_to_double: 4),
///     weapon_ranks: [WeaponRank(nid: "E", requirement: 1)],
///     weapons: [WeaponTypeData(nid: "Sword")],
///     equations: {"HIT": Stat("SKL"), ...},
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    /// Global constants.
    #[serde(default)]
    pub constants: CombatConstants,
    /// Weapon ranks in ascending requirement order.
    #[serde(default)]
    pub weapon_ranks: Vec<WeaponRank>,
    /// Weapon types.
    #[serde(default)]
    pub weapons: Vec<WeaponTypeData>,
    /// Named equations.
    #[serde(default)]
    pub equations: EquationTable,
}

impl Database {
    /// Load and validate a database from a RON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| CombatError::DataParseError {
            path: path_str.clone(),
            message: e.to_string(),
        })?;
        let database = Self::parse(&contents, &path_str)?.validated()?;
        tracing::info!(
            "Loaded database '{}' with {} weapon types, {} ranks, {} equations",
            path_str,
            database.weapons.len(),
            database.weapon_ranks.len(),
            database.equations.iter().count()
        );
        Ok(database)
    }

    /// Parse and validate a database from a RON string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        Self::parse(ron, "<inline>")?.validated()
    }

    fn parse(ron: &str, path: &str) -> Result<Self> {
        ron::from_str(ron).map_err(|e: ron::error::SpannedError| CombatError::DataParseError {
            path: path.to_owned(),
            message: e.to_string(),
        })
    }

    /// Return `self` if it passes [`Self::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::ContentValidation`] listing every problem.
    pub fn validated(self) -> Result<Self> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(CombatError::ContentValidation(errors))
        }
    }

    /// Collect content problems.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for name in STANDARD_EQUATIONS {
            if !self.equations.contains(name) {
                errors.push(format!("Missing required equation '{name}'"));
            }
        }
        for name in self.equations.dangling_references() {
            errors.push(format!("Equation reference '{name}' is not registered"));
        }

        let mut rank_names = BTreeSet::new();
        for rank in &self.weapon_ranks {
            if !rank_names.insert(rank.nid.as_str()) {
                errors.push(format!("Duplicate weapon rank '{}'", rank.nid));
            }
        }
        if self.weapon_ranks.windows(2).any(|w| w[0].requirement > w[1].requirement) {
            errors.push("Weapon ranks must be listed in ascending requirement order".to_string());
        }

        let mut type_names = BTreeSet::new();
        for weapon in &self.weapons {
            if !type_names.insert(weapon.nid.as_str()) {
                errors.push(format!("Duplicate weapon type '{}'", weapon.nid));
            }
        }

        for weapon in &self.weapons {
            for entry in weapon.advantage.iter().chain(&weapon.disadvantage) {
                if let TypeMatch::Type(t) = &entry.weapon_type {
                    if !type_names.contains(t.as_str()) {
                        errors.push(format!("Weapon type '{}' has an entry against unknown type '{t}'", weapon.nid));
                    }
                }
                if let RankMatch::Rank(r) = &entry.weapon_rank {
                    if !rank_names.contains(r.as_str()) {
                        errors.push(format!("Weapon type '{}' has an entry requiring unknown rank '{r}'", weapon.nid));
                    }
                }
            }
        }

        errors
    }

    /// Collect problems in items that reference this database.
    #[must_use]
    pub fn validate_items<'a>(&self, items: impl IntoIterator<Item = &'a Item>) -> Vec<String> {
        let mut errors = Vec::new();
        for item in items {
            if let Some(weapon_type) = &item.weapon_type {
                if self.weapon_type(weapon_type).is_none() {
                    errors.push(format!("Item '{}' uses unknown weapon type '{weapon_type}'", item.nid));
                }
            }
            if let Some(rank) = &item.weapon_rank {
                if self.weapon_rank(rank).is_none() {
                    errors.push(format!("Item '{}' requires unknown weapon rank '{rank}'", item.nid));
                }
            }
            for name in item.formula_names() {
                if !self.equations.contains(name) {
                    errors.push(format!("Item '{}' uses unregistered equation '{name}'", item.nid));
                }
            }
        }
        errors
    }

    /// Look up a weapon type.
    #[must_use]
    pub fn weapon_type(&self, nid: &str) -> Option<&WeaponTypeData> {
        self.weapons.iter().find(|w| w.nid == nid)
    }

    /// Look up a weapon rank.
    #[must_use]
    pub fn weapon_rank(&self, nid: &str) -> Option<&WeaponRank> {
        self.weapon_ranks.iter().find(|r| r.nid == nid)
    }

    /// Highest rank whose requirement `wexp` meets.
    #[must_use]
    pub fn rank_for_wexp(&self, wexp: i32) -> Option<&WeaponRank> {
        self.weapon_ranks.iter().filter(|r| wexp >= r.requirement).max_by_key(|r| r.requirement)
    }
}
