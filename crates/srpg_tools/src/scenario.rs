//! Scenario loading.
//!
//! A scenario is a small battlefield snapshot plus one encounter to run on
//! it. Items and skills name their owner; units name their equipped weapon.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use srpg_core::components::UnitId;
use srpg_core::data::Database;
use srpg_core::error::CombatError;
use srpg_core::item::Item;
use srpg_core::skill::Skill;
use srpg_core::solver::CombatSetup;
use srpg_core::unit::Unit;
use srpg_core::world::World;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Scenario content is inconsistent with itself or the database.
    #[error("Invalid scenario: {}", .0.join("; "))]
    Invalid(Vec<String>),
    /// Core error while building the world or resolving the encounter.
    #[error(transparent)]
    Combat(#[from] CombatError),
}

/// A complete encounter scenario.
///
/// # Example RON
///
/// ```ron
/// Scenario(
///     name: "Duel",
///     seed: 7,
///     units: [Unit(nid: "eirika", team: Player, current_hp: 16, equipped_weapon: Some("rapier"))],
///     items: [Item(nid: "rapier", owner: Some("eirika"), weapon_type: Some("Sword"), might: Some(7))],
///     skills: [],
///     setup: CombatSetup(attacker: "eirika", item: "rapier", defenders: ["bandit"]),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Default RNG seed.
    #[serde(default)]
    pub seed: u64,
    /// Units on the field. Their `items` and `skills` lists are rebuilt from
    /// the owners named in `items` and `skills`.
    pub units: Vec<Unit>,
    /// Items with their owners.
    #[serde(default)]
    pub items: Vec<Item>,
    /// Skills with their owners.
    #[serde(default)]
    pub skills: Vec<Skill>,
    /// The encounter to run.
    pub setup: CombatSetup,
}

impl Scenario {
    /// Load a scenario from a RON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    ///
    /// # Errors
    ///
    /// Returns an error if the text is malformed.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Collect problems with this scenario against `db`.
    #[must_use]
    pub fn validate(&self, db: &Database) -> Vec<String> {
        let mut errors = db.validate_items(&self.items);
        let has_unit = |nid: &UnitId| self.units.iter().any(|u| &u.nid == nid);

        for item in &self.items {
            match &item.owner {
                Some(owner) if !has_unit(owner) => {
                    errors.push(format!("Item '{}' is owned by unknown unit '{owner}'", item.nid));
                }
                _ => {}
            }
        }
        for skill in &self.skills {
            match &skill.owner {
                Some(owner) if has_unit(owner) => {}
                Some(owner) => errors.push(format!("Skill '{}' is owned by unknown unit '{owner}'", skill.nid)),
                None => errors.push(format!("Skill '{}' has no owner", skill.nid)),
            }
        }
        for unit in &self.units {
            if let Some(weapon) = &unit.equipped_weapon {
                let held = self.items.iter().any(|i| &i.nid == weapon && i.owner.as_ref() == Some(&unit.nid));
                if !held {
                    errors.push(format!("Unit '{}' equips '{weapon}' but does not hold it", unit.nid));
                }
            }
        }

        let setup = &self.setup;
        for nid in setup.participants() {
            if !has_unit(&nid) {
                errors.push(format!("Setup references unknown unit '{nid}'"));
            }
        }
        let item_held = self
            .items
            .iter()
            .any(|i| i.nid == setup.item && i.owner.as_ref() == Some(&setup.attacker));
        if !item_held {
            errors.push(format!("Attacker '{}' does not hold '{}'", setup.attacker, setup.item));
        }
        errors
    }

    /// Build the world this scenario describes.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Invalid`] if validation fails, or a core
    /// error if an equip is refused.
    pub fn build_world(&self, db: &Database) -> Result<World, ScenarioError> {
        let errors = self.validate(db);
        if !errors.is_empty() {
            return Err(ScenarioError::Invalid(errors));
        }

        let mut world = World::new();
        for unit in &self.units {
            let mut unit = unit.clone();
            unit.items.clear();
            unit.skills.clear();
            unit.equipped_weapon = None;
            unit.equipped_accessory = None;
            world.add_unit(unit);
        }
        for item in &self.items {
            match &item.owner {
                Some(owner) => {
                    world.give_item(owner, item.clone())?;
                }
                None => {
                    world.items.insert(item.nid.clone(), item.clone());
                }
            }
        }
        for skill in &self.skills {
            if let Some(owner) = &skill.owner {
                world.give_skill(owner, skill.clone())?;
            }
        }
        for unit in &self.units {
            for slot in [&unit.equipped_weapon, &unit.equipped_accessory].into_iter().flatten() {
                world.equip(db, &unit.nid, slot)?;
            }
        }

        tracing::debug!(
            scenario = %self.name,
            units = world.units.len(),
            items = world.items.len(),
            skills = world.skills.len(),
            "Scenario world built"
        );
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srpg_core::components::ItemId;
    use srpg_test_utils::fixtures::test_database;

    const DUEL: &str = r#"
Scenario(
    name: "Duel",
    seed: 3,
    units: [
        Unit(nid: "eirika", name: "Eirika", team: Player, position: Some((x: 0, y: 0)),
             stats: {"HP": 16, "STR": 4, "SKL": 8, "SPD": 9}, current_hp: 16,
             equipped_weapon: Some("rapier")),
        Unit(nid: "bandit", name: "Bandit", team: Enemy, position: Some((x: 1, y: 0)),
             stats: {"HP": 20, "STR": 5}, current_hp: 20),
    ],
    items: [
        Item(nid: "rapier", name: "Rapier", owner: Some("eirika"), weapon_type: Some("Sword"),
             might: Some(7), hit: Some(95), crit: Some(10), min_range: Some(1), max_range: Some(1),
             uses: Some((current: 40, max: 40)), components: [Weapon]),
    ],
    setup: CombatSetup(attacker: "eirika", item: "rapier", defenders: ["bandit"]),
)
"#;

    #[test]
    fn test_parse_and_build() {
        let scenario = Scenario::from_ron_str(DUEL).unwrap();
        assert_eq!(scenario.name, "Duel");
        assert!(scenario.skills.is_empty());
        let world = scenario.build_world(&test_database()).unwrap();
        let eirika = world.unit(&"eirika".into()).unwrap();
        assert_eq!(eirika.items, vec![ItemId::from("rapier")]);
        assert_eq!(eirika.equipped_weapon, Some(ItemId::from("rapier")));
    }

    #[test]
    fn test_unknown_participant_rejected() {
        let mut scenario = Scenario::from_ron_str(DUEL).unwrap();
        scenario.setup.defenders = vec!["ghost".into()];
        let errors = scenario.validate(&test_database());
        assert!(errors.iter().any(|e| e.contains("ghost")));
        assert!(matches!(scenario.build_world(&test_database()), Err(ScenarioError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = Scenario::load("definitely/not/here.ron");
        assert!(matches!(result, Err(ScenarioError::FileNotFound(_))));
    }
}
