//! Reversible state changes.
//!
//! Combat never mutates the [`World`] directly. Every change is an
//! [`Action`] that stores the values it overwrites, so applying a sequence
//! and undoing it in reverse restores the exact prior state. The
//! [`ActionLog`] keeps applied actions until the host prunes them.

use serde::{Deserialize, Serialize};

use crate::components::{ItemId, SkillId, UnitId};
use crate::error::{CombatError, Result};
use crate::playback::Mark;
use crate::records::RecordEntry;
use crate::skill::Skill;
use crate::unit::{Unit, EXP_PER_LEVEL};
use crate::world::World;

/// Slot flags of an item before it left a unit's inventory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemSlot {
    /// Position in the inventory.
    pub index: usize,
    /// Whether it was the equipped weapon.
    pub equipped_weapon: bool,
    /// Whether it was the equipped accessory.
    pub equipped_accessory: bool,
}

/// A single reversible change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Set current HP.
    SetHp {
        /// Unit.
        unit: UnitId,
        /// Previous HP.
        old: i32,
        /// New HP.
        new: i32,
    },
    /// Set current mana.
    ChangeMana {
        /// Unit.
        unit: UnitId,
        /// Previous mana.
        old: i32,
        /// New mana.
        new: i32,
    },
    /// Set remaining uses.
    UseItem {
        /// Item.
        item: ItemId,
        /// Previous uses.
        old: i32,
        /// New uses.
        new: i32,
    },
    /// Record a to-hit outcome.
    Mark(Mark),
    /// Flag a unit as having attacked.
    HasAttacked {
        /// Unit.
        unit: UnitId,
        /// Previous flag.
        old: bool,
    },
    /// Flag a unit as dying.
    SetDying {
        /// Unit.
        unit: UnitId,
        /// Previous flag.
        old: bool,
    },
    /// Set weapon experience in a type.
    GainWexp {
        /// Unit.
        unit: UnitId,
        /// Weapon type.
        weapon_type: String,
        /// Previous value, absent if the unit had no entry.
        old: Option<i32>,
        /// New value.
        new: i32,
    },
    /// Set level and experience.
    GainExp {
        /// Unit.
        unit: UnitId,
        /// Previous (level, exp).
        old: (i32, i32),
        /// New (level, exp).
        new: (i32, i32),
    },
    /// Move an item from one unit to another.
    DropItem {
        /// Item.
        item: ItemId,
        /// Previous holder.
        from: UnitId,
        /// New holder.
        to: UnitId,
        /// Where it sat in the previous holder's inventory.
        slot: ItemSlot,
    },
    /// Take an item out of a unit's inventory.
    RemoveItem {
        /// Item.
        item: ItemId,
        /// Holder.
        unit: UnitId,
        /// Where it sat.
        slot: ItemSlot,
    },
    /// Set skill charge state.
    SetSkillCharge {
        /// Skill.
        skill: SkillId,
        /// Previous (charge, active).
        old: (i32, bool),
        /// New (charge, active).
        new: (i32, bool),
    },
    /// Append a record entry.
    UpdateRecords(RecordEntry),
    /// Append a narrative message.
    Message(String),
}

impl Action {
    /// HP change clamped to `[0, max_hp]`.
    #[must_use]
    pub fn change_hp(unit: &Unit, delta: i32) -> Self {
        Self::SetHp {
            unit: unit.nid.clone(),
            old: unit.current_hp,
            new: unit.clamp_hp(unit.current_hp.saturating_add(delta)),
        }
    }

    /// Mana change floored at 0.
    #[must_use]
    pub fn change_mana(unit: &Unit, delta: i32) -> Self {
        Self::ChangeMana {
            unit: unit.nid.clone(),
            old: unit.current_mana,
            new: unit.current_mana.saturating_add(delta).max(0),
        }
    }

    /// Mark a unit as having attacked.
    #[must_use]
    pub fn has_attacked(unit: &Unit) -> Self {
        Self::HasAttacked { unit: unit.nid.clone(), old: unit.has_attacked }
    }

    /// Mark a unit as dying.
    #[must_use]
    pub fn set_dying(unit: &Unit) -> Self {
        Self::SetDying { unit: unit.nid.clone(), old: unit.is_dying }
    }

    /// Add weapon experience.
    #[must_use]
    pub fn gain_wexp(unit: &Unit, weapon_type: &str, amount: i32) -> Self {
        let old = unit.wexp.get(weapon_type).copied();
        Self::GainWexp {
            unit: unit.nid.clone(),
            weapon_type: weapon_type.to_owned(),
            old,
            new: old.unwrap_or(0).saturating_add(amount),
        }
    }

    /// Add experience, rolling every 100 points into a level.
    #[must_use]
    pub fn gain_exp(unit: &Unit, amount: i32) -> Self {
        let total = unit.exp.saturating_add(amount.max(0));
        let levels = total / EXP_PER_LEVEL;
        Self::GainExp {
            unit: unit.nid.clone(),
            old: (unit.level, unit.exp),
            new: (unit.level + levels, total % EXP_PER_LEVEL),
        }
    }

    /// Set a skill's charge state.
    #[must_use]
    pub fn set_skill_charge(skill: &Skill, charge: i32, active: bool) -> Self {
        Self::SetSkillCharge {
            skill: skill.nid.clone(),
            old: (skill.data.charge, skill.data.active),
            new: (charge, active),
        }
    }

    /// Append a message.
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }

    /// Consume one use of an item, if it has durability.
    ///
    /// # Errors
    ///
    /// Returns an error if the item does not exist.
    pub fn use_item(world: &World, item: &ItemId) -> Result<Option<Self>> {
        let uses = world.item(item)?.uses;
        Ok(uses.map(|uses| Self::UseItem { item: item.clone(), old: uses.current, new: (uses.current - 1).max(0) }))
    }

    /// Move an item between units.
    ///
    /// # Errors
    ///
    /// Returns an error if either unit is missing or `from` does not hold the item.
    pub fn drop_item(world: &World, item: &ItemId, from: &UnitId, to: &UnitId) -> Result<Self> {
        world.unit(to)?;
        let slot = slot_of(world.unit(from)?, item)?;
        Ok(Self::DropItem { item: item.clone(), from: from.clone(), to: to.clone(), slot })
    }

    /// Remove an item from its holder.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit is missing or does not hold the item.
    pub fn remove_item(world: &World, item: &ItemId, unit: &UnitId) -> Result<Self> {
        let slot = slot_of(world.unit(unit)?, item)?;
        Ok(Self::RemoveItem { item: item.clone(), unit: unit.clone(), slot })
    }

    /// Apply the change.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced entity is missing.
    pub fn apply(&self, world: &mut World) -> Result<()> {
        match self {
            Self::SetHp { unit, new, .. } => world.unit_mut(unit)?.current_hp = *new,
            Self::ChangeMana { unit, new, .. } => world.unit_mut(unit)?.current_mana = *new,
            Self::UseItem { item, new, .. } => set_uses(world, item, *new)?,
            Self::Mark(mark) => world.marks.push(mark.clone()),
            Self::HasAttacked { unit, .. } => world.unit_mut(unit)?.has_attacked = true,
            Self::SetDying { unit, .. } => world.unit_mut(unit)?.is_dying = true,
            Self::GainWexp { unit, weapon_type, new, .. } => {
                world.unit_mut(unit)?.wexp.insert(weapon_type.clone(), *new);
            }
            Self::GainExp { unit, new, .. } => {
                let unit = world.unit_mut(unit)?;
                (unit.level, unit.exp) = *new;
            }
            Self::DropItem { item, from, to, slot } => {
                take_item(world, from, item, *slot)?;
                world.unit_mut(to)?.items.push(item.clone());
                world.item_mut(item)?.owner = Some(to.clone());
            }
            Self::RemoveItem { item, unit, slot } => {
                take_item(world, unit, item, *slot)?;
                world.item_mut(item)?.owner = None;
            }
            Self::SetSkillCharge { skill, new, .. } => {
                let skill = world.skill_mut(skill)?;
                (skill.data.charge, skill.data.active) = *new;
            }
            Self::UpdateRecords(entry) => world.records.push(entry.clone()),
            Self::Message(text) => world.messages.push(text.clone()),
        }
        Ok(())
    }

    /// Revert the change.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced entity is missing or an appended
    /// entry is not the newest one.
    pub fn undo(&self, world: &mut World) -> Result<()> {
        match self {
            Self::SetHp { unit, old, .. } => world.unit_mut(unit)?.current_hp = *old,
            Self::ChangeMana { unit, old, .. } => world.unit_mut(unit)?.current_mana = *old,
            Self::UseItem { item, old, .. } => set_uses(world, item, *old)?,
            Self::Mark(mark) => pop_matching(&mut world.marks, mark, "mark")?,
            Self::HasAttacked { unit, old } => world.unit_mut(unit)?.has_attacked = *old,
            Self::SetDying { unit, old } => world.unit_mut(unit)?.is_dying = *old,
            Self::GainWexp { unit, weapon_type, old, .. } => {
                let unit = world.unit_mut(unit)?;
                match old {
                    Some(value) => unit.wexp.insert(weapon_type.clone(), *value),
                    None => unit.wexp.remove(weapon_type),
                };
            }
            Self::GainExp { unit, old, .. } => {
                let unit = world.unit_mut(unit)?;
                (unit.level, unit.exp) = *old;
            }
            Self::DropItem { item, from, to, slot } => {
                let receiver = world.unit_mut(to)?;
                let index = receiver
                    .items
                    .iter()
                    .rposition(|held| held == item)
                    .ok_or_else(|| CombatError::InvalidState(format!("{to} no longer holds {item}")))?;
                receiver.items.remove(index);
                restore_item(world, from, item, *slot)?;
            }
            Self::RemoveItem { item, unit, slot } => restore_item(world, unit, item, *slot)?,
            Self::SetSkillCharge { skill, old, .. } => {
                let skill = world.skill_mut(skill)?;
                (skill.data.charge, skill.data.active) = *old;
            }
            Self::UpdateRecords(entry) => {
                if world.records.entries().last() != Some(entry) {
                    return Err(CombatError::InvalidState("record entry is not the newest".into()));
                }
                world.records.pop();
            }
            Self::Message(text) => pop_matching(&mut world.messages, text, "message")?,
        }
        Ok(())
    }
}

fn slot_of(unit: &Unit, item: &ItemId) -> Result<ItemSlot> {
    let index = unit
        .items
        .iter()
        .position(|held| held == item)
        .ok_or_else(|| CombatError::InvalidState(format!("{} does not hold {item}", unit.nid)))?;
    Ok(ItemSlot {
        index,
        equipped_weapon: unit.equipped_weapon.as_ref() == Some(item),
        equipped_accessory: unit.equipped_accessory.as_ref() == Some(item),
    })
}

fn set_uses(world: &mut World, item: &ItemId, value: i32) -> Result<()> {
    let target = world.item_mut(item)?;
    let uses = target
        .uses
        .as_mut()
        .ok_or_else(|| CombatError::InvalidState(format!("{item} has no durability")))?;
    uses.current = value;
    Ok(())
}

fn take_item(world: &mut World, unit_id: &UnitId, item: &ItemId, slot: ItemSlot) -> Result<()> {
    let unit = world.unit_mut(unit_id)?;
    if unit.items.get(slot.index) != Some(item) {
        return Err(CombatError::InvalidState(format!("{unit_id} does not hold {item} at slot {}", slot.index)));
    }
    unit.items.remove(slot.index);
    if slot.equipped_weapon {
        unit.equipped_weapon = None;
    }
    if slot.equipped_accessory {
        unit.equipped_accessory = None;
    }
    Ok(())
}

fn restore_item(world: &mut World, unit_id: &UnitId, item: &ItemId, slot: ItemSlot) -> Result<()> {
    let unit = world.unit_mut(unit_id)?;
    let index = slot.index.min(unit.items.len());
    unit.items.insert(index, item.clone());
    if slot.equipped_weapon {
        unit.equipped_weapon = Some(item.clone());
    }
    if slot.equipped_accessory {
        unit.equipped_accessory = Some(item.clone());
    }
    world.item_mut(item)?.owner = Some(unit_id.clone());
    Ok(())
}

fn pop_matching<T: PartialEq>(log: &mut Vec<T>, expected: &T, what: &str) -> Result<()> {
    if log.last() != Some(expected) {
        return Err(CombatError::InvalidState(format!("{what} is not the newest entry")));
    }
    log.pop();
    Ok(())
}

// ============================================================================
// Action log
// ============================================================================

/// Applied actions, newest last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLog {
    actions: Vec<Action>,
    pruned: usize,
}

impl ActionLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an action and record it.
    ///
    /// # Errors
    ///
    /// Returns an error if the action cannot be applied; it is not recorded.
    pub fn apply(&mut self, world: &mut World, action: Action) -> Result<()> {
        action.apply(world)?;
        self.actions.push(action);
        Ok(())
    }

    /// Undo the newest action.
    ///
    /// # Errors
    ///
    /// Returns an error if the undo fails; the action stays in the log.
    pub fn undo_last(&mut self, world: &mut World) -> Result<Option<Action>> {
        let Some(action) = self.actions.last() else {
            return Ok(None);
        };
        action.undo(world)?;
        Ok(self.actions.pop())
    }

    /// Undo until `len` actions remain (a [`Self::checkpoint`] value).
    ///
    /// # Errors
    ///
    /// Returns an error if the target was pruned or an undo fails.
    pub fn rewind_to(&mut self, world: &mut World, checkpoint: usize) -> Result<()> {
        if checkpoint < self.pruned {
            return Err(CombatError::InvalidState(format!(
                "cannot rewind to {checkpoint}: history before {} was pruned",
                self.pruned
            )));
        }
        while self.checkpoint() > checkpoint {
            self.undo_last(world)?;
        }
        Ok(())
    }

    /// Undo every retained action.
    ///
    /// # Errors
    ///
    /// Returns an error if an undo fails.
    pub fn undo_all(&mut self, world: &mut World) -> Result<()> {
        self.rewind_to(world, self.pruned)
    }

    /// Forget all but the newest `keep` actions; they can no longer be undone.
    pub fn prune(&mut self, keep: usize) {
        let excess = self.actions.len().saturating_sub(keep);
        self.actions.drain(..excess);
        self.pruned += excess;
    }

    /// Total actions ever applied and not undone, including pruned ones.
    #[must_use]
    pub fn checkpoint(&self) -> usize {
        self.pruned + self.actions.len()
    }

    /// Retained actions, oldest first.
    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Retained actions since a checkpoint.
    #[must_use]
    pub fn since(&self, checkpoint: usize) -> &[Action] {
        let start = checkpoint.saturating_sub(self.pruned).min(self.actions.len());
        &self.actions[start..]
    }

    /// Number of retained actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Team;
    use crate::item::Item;
    use crate::playback::MarkKind;
    use crate::records::RecordKind;

    fn world() -> World {
        let mut world = World::new();
        world.add_unit(Unit::new("a", Team::Player).with_stat("HP", 20));
        world.add_unit(Unit::new("b", Team::Enemy).with_stat("HP", 20));
        world.give_item(&"a".into(), Item::weapon("sword", "Sword", 5, 90, 0).with_uses(3)).unwrap();
        world.give_item(&"b".into(), Item::weapon("axe", "Axe", 8, 70, 0).droppable()).unwrap();
        world.give_item(&"b".into(), Item::new("vulnerary")).unwrap();
        let db = crate::data::Database::default();
        world.equip(&db, &"b".into(), &"axe".into()).unwrap();
        world
    }

    #[test]
    fn test_change_hp_clamps() {
        let world = world();
        let unit = world.unit(&"a".into()).unwrap();
        assert_eq!(Action::change_hp(unit, -50), Action::SetHp { unit: "a".into(), old: 20, new: 0 });
        assert_eq!(Action::change_hp(unit, 50), Action::SetHp { unit: "a".into(), old: 20, new: 20 });
    }

    #[test]
    fn test_gain_exp_levels_up() {
        let mut unit = Unit::new("a", Team::Player).with_level(4);
        unit.exp = 90;
        assert_eq!(Action::gain_exp(&unit, 25), Action::GainExp { unit: "a".into(), old: (4, 90), new: (5, 15) });
    }

    #[test]
    fn test_drop_item_round_trip() {
        let mut world = world();
        let before = world.clone();
        let action = Action::drop_item(&world, &"axe".into(), &"b".into(), &"a".into()).unwrap();
        action.apply(&mut world).unwrap();
        assert!(world.unit(&"a".into()).unwrap().items.contains(&"axe".into()));
        assert_eq!(world.unit(&"b".into()).unwrap().equipped_weapon, None);
        assert_eq!(world.item(&"axe".into()).unwrap().owner, Some("a".into()));
        action.undo(&mut world).unwrap();
        assert_eq!(world, before);
    }

    #[test]
    fn test_log_round_trip() {
        let mut world = world();
        let before = world.clone();
        let mut log = ActionLog::new();
        let a = world.unit(&"a".into()).unwrap().clone();
        let b = world.unit(&"b".into()).unwrap().clone();
        let mark = Mark { attacker: "a".into(), defender: "b".into(), item: "sword".into(), kind: MarkKind::Hit };
        let actions = vec![
            Action::Mark(mark),
            Action::use_item(&world, &"sword".into()).unwrap().unwrap(),
            Action::change_hp(&b, -25),
            Action::set_dying(&b),
            Action::has_attacked(&a),
            Action::gain_wexp(&a, "Sword", 2),
            Action::gain_exp(&a, 30),
            Action::UpdateRecords(RecordEntry::new(RecordKind::Kill, "a".into(), "b".into(), None)),
            Action::message("a attacked b"),
            Action::remove_item(&world, &"vulnerary".into(), &"b".into()).unwrap(),
        ];
        for action in actions {
            log.apply(&mut world, action).unwrap();
        }
        assert_eq!(world.unit(&"b".into()).unwrap().current_hp, 0);
        assert_eq!(world.item(&"sword".into()).unwrap().uses.unwrap().current, 2);
        assert_eq!(log.len(), 10);

        log.undo_all(&mut world).unwrap();
        assert_eq!(world, before);
        assert!(log.is_empty());
    }

    #[test]
    fn test_rewind_and_prune() {
        let mut world = world();
        let mut log = ActionLog::new();
        for text in ["one", "two", "three"] {
            log.apply(&mut world, Action::message(text)).unwrap();
        }
        log.rewind_to(&mut world, 1).unwrap();
        assert_eq!(world.messages, vec!["one".to_string()]);

        log.apply(&mut world, Action::message("four")).unwrap();
        log.prune(1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.checkpoint(), 2);
        assert!(log.rewind_to(&mut world, 0).is_err());
        log.undo_all(&mut world).unwrap();
        assert_eq!(world.messages, vec!["one".to_string()]);
    }

    #[test]
    fn test_failed_apply_not_recorded() {
        let mut world = world();
        let mut log = ActionLog::new();
        let bad = Action::SetHp { unit: "ghost".into(), old: 1, new: 0 };
        assert!(log.apply(&mut world, bad).is_err());
        assert!(log.is_empty());
    }
}
