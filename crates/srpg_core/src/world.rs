//! The unit, item and skill registry an encounter reads and mutates.
//!
//! All collections are `BTreeMap`s so iteration, hashing and serialization
//! are deterministic.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::{ItemId, Position, SkillId, UnitId};
use crate::data::Database;
use crate::equations::StatSource;
use crate::error::{CombatError, Result};
use crate::item::Item;
use crate::playback::Mark;
use crate::records::Records;
use crate::skill::Skill;
use crate::unit::Unit;

/// Host-owned game state visible to combat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct World {
    /// Units by id.
    #[serde(default)]
    pub units: BTreeMap<UnitId, Unit>,
    /// Items by id.
    #[serde(default)]
    pub items: BTreeMap<ItemId, Item>,
    /// Skills by id.
    #[serde(default)]
    pub skills: BTreeMap<SkillId, Skill>,
    /// Record book.
    #[serde(default)]
    pub records: Records,
    /// Narrative message log.
    #[serde(default)]
    pub messages: Vec<String>,
    /// To-hit outcomes of every resolved strike.
    #[serde(default)]
    pub marks: Vec<Mark>,
}

impl World {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit.
    pub fn add_unit(&mut self, unit: Unit) {
        self.units.insert(unit.nid.clone(), unit);
    }

    /// Give a new item to a unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit does not exist.
    pub fn give_item(&mut self, owner: &UnitId, mut item: Item) -> Result<ItemId> {
        let unit = self.units.get_mut(owner).ok_or_else(|| CombatError::UnitNotFound(owner.to_string()))?;
        let nid = item.nid.clone();
        item.owner = Some(owner.clone());
        unit.items.push(nid.clone());
        self.items.insert(nid.clone(), item);
        Ok(nid)
    }

    /// Give a new skill to a unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit does not exist.
    pub fn give_skill(&mut self, owner: &UnitId, mut skill: Skill) -> Result<SkillId> {
        let unit = self.units.get_mut(owner).ok_or_else(|| CombatError::UnitNotFound(owner.to_string()))?;
        let nid = skill.nid.clone();
        skill.owner = Some(owner.clone());
        unit.skills.push(nid.clone());
        self.skills.insert(nid.clone(), skill);
        Ok(nid)
    }

    /// Put a held weapon in the weapon slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit or item is missing, the unit does not
    /// hold the item, or the unit cannot equip it.
    pub fn equip(&mut self, db: &Database, unit_id: &UnitId, item_id: &ItemId) -> Result<()> {
        let unit = self.unit(unit_id)?;
        let item = self.item(item_id)?;
        if !unit.items.contains(item_id) {
            return Err(CombatError::InvalidState(format!("{unit_id} does not hold {item_id}")));
        }
        if !self.equippable(db, unit, item) {
            return Err(CombatError::InvalidState(format!("{unit_id} cannot equip {item_id}")));
        }
        let is_accessory = item.is_accessory();
        let unit = self.unit_mut(unit_id)?;
        if is_accessory {
            unit.equipped_accessory = Some(item_id.clone());
        } else {
            unit.equipped_weapon = Some(item_id.clone());
        }
        Ok(())
    }

    /// Whether `unit` may wield `item`: it must be an equippable kind and the
    /// unit must meet the item's rank requirement.
    #[must_use]
    pub fn equippable(&self, db: &Database, unit: &Unit, item: &Item) -> bool {
        if !item.is_equippable_kind() {
            return false;
        }
        match (&item.weapon_type, &item.weapon_rank) {
            (Some(weapon_type), Some(rank)) => db
                .weapon_rank(rank)
                .is_some_and(|rank| unit.wexp_for(weapon_type) >= rank.requirement),
            _ => true,
        }
    }

    /// Look up a unit.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::UnitNotFound`] if absent.
    pub fn unit(&self, id: &UnitId) -> Result<&Unit> {
        self.units.get(id).ok_or_else(|| CombatError::UnitNotFound(id.to_string()))
    }

    /// Look up a unit mutably.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::UnitNotFound`] if absent.
    pub fn unit_mut(&mut self, id: &UnitId) -> Result<&mut Unit> {
        self.units.get_mut(id).ok_or_else(|| CombatError::UnitNotFound(id.to_string()))
    }

    /// Look up an item.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::ItemNotFound`] if absent.
    pub fn item(&self, id: &ItemId) -> Result<&Item> {
        self.items.get(id).ok_or_else(|| CombatError::ItemNotFound(id.to_string()))
    }

    /// Look up an item mutably.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::ItemNotFound`] if absent.
    pub fn item_mut(&mut self, id: &ItemId) -> Result<&mut Item> {
        self.items.get_mut(id).ok_or_else(|| CombatError::ItemNotFound(id.to_string()))
    }

    /// Look up a skill.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::SkillNotFound`] if absent.
    pub fn skill(&self, id: &SkillId) -> Result<&Skill> {
        self.skills.get(id).ok_or_else(|| CombatError::SkillNotFound(id.to_string()))
    }

    /// Look up a skill mutably.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::SkillNotFound`] if absent.
    pub fn skill_mut(&mut self, id: &SkillId) -> Result<&mut Skill> {
        self.skills.get_mut(id).ok_or_else(|| CombatError::SkillNotFound(id.to_string()))
    }

    /// The unit's equipped weapon, if it still holds it and it is usable.
    #[must_use]
    pub fn weapon_of(&self, unit: &Unit) -> Option<&Item> {
        let id = unit.equipped_weapon.as_ref()?;
        if !unit.items.contains(id) {
            return None;
        }
        self.items.get(id).filter(|item| item.available())
    }

    /// Skills owned by a unit, in the unit's order.
    pub fn skills_of<'a>(&'a self, unit: &'a Unit) -> impl Iterator<Item = &'a Skill> + 'a {
        unit.skills.iter().filter_map(|id| self.skills.get(id))
    }

    /// Effective stats of a unit.
    #[must_use]
    pub fn stats_of<'a>(&'a self, unit: &'a Unit) -> UnitStats<'a> {
        UnitStats { unit, skills: self.skills_of(unit).collect() }
    }

    /// Living unit standing on a tile.
    #[must_use]
    pub fn unit_at(&self, position: Position) -> Option<&Unit> {
        self.units.values().find(|u| u.position == Some(position) && !u.is_dying)
    }

    /// Hash of all state, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Serialize to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CombatError::InvalidState(format!("Failed to serialize world: {e}")))
    }

    /// Deserialize from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| CombatError::InvalidState(format!("Failed to deserialize world: {e}")))
    }
}

/// Base stats plus skill stat changes.
pub struct UnitStats<'a> {
    unit: &'a Unit,
    skills: Vec<&'a Skill>,
}

impl UnitStats<'_> {
    /// Effective value of `stat`.
    #[must_use]
    pub fn stat_value(&self, stat: &str) -> i32 {
        let bonus: i32 = self
            .skills
            .iter()
            .flat_map(|skill| skill.hook_sources())
            .filter_map(|component| component.as_stat_modifier())
            .map(|modifier| modifier.stat_change(stat))
            .sum();
        self.unit.base_stat(stat) + bonus
    }
}

impl StatSource for UnitStats<'_> {
    fn stat(&self, name: &str) -> i32 {
        self.stat_value(name)
    }

    fn level(&self) -> i32 {
        self.unit.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Team;
    use crate::skill::SkillComponent;

    fn world() -> World {
        let mut world = World::new();
        world.add_unit(Unit::new("ross", Team::Player).with_stat("HP", 15).with_stat("STR", 5).at(0, 0));
        world
    }

    #[test]
    fn test_give_item_sets_owner() {
        let mut world = world();
        let id = world.give_item(&"ross".into(), Item::weapon("axe", "Axe", 8, 70, 0)).unwrap();
        assert_eq!(world.item(&id).unwrap().owner, Some(UnitId::from("ross")));
        assert_eq!(world.unit(&"ross".into()).unwrap().items, vec![id]);
        assert!(world.give_item(&"nobody".into(), Item::new("x")).is_err());
    }

    #[test]
    fn test_weapon_of_skips_broken() {
        let mut world = world();
        let db = Database::default();
        let id = world.give_item(&"ross".into(), Item::weapon("axe", "Axe", 8, 70, 0).with_uses(1)).unwrap();
        world.equip(&db, &"ross".into(), &id).unwrap();
        let unit = world.unit(&"ross".into()).unwrap().clone();
        assert!(world.weapon_of(&unit).is_some());

        if let Some(uses) = world.item_mut(&id).unwrap().uses.as_mut() {
            uses.current = 0;
        }
        assert!(world.weapon_of(&unit).is_none());
    }

    #[test]
    fn test_stat_changes_apply() {
        let mut world = world();
        world
            .give_skill(&"ross".into(), Skill::new("str_plus", vec![SkillComponent::StatChange { stat: "STR".into(), value: 2 }]))
            .unwrap();
        let unit = world.unit(&"ross".into()).unwrap();
        assert_eq!(world.stats_of(unit).stat_value("STR"), 7);
        assert_eq!(world.stats_of(unit).stat_value("SPD"), 0);
    }

    #[test]
    fn test_serialize_round_trip() {
        let world = world();
        let bytes = world.serialize().unwrap();
        let restored = World::deserialize(&bytes).unwrap();
        assert_eq!(restored, world);
        assert_eq!(restored.state_hash(), world.state_hash());
    }

    #[test]
    fn test_unit_at() {
        let world = world();
        assert!(world.unit_at(Position::new(0, 0)).is_some());
        assert!(world.unit_at(Position::new(1, 0)).is_none());
    }
}
