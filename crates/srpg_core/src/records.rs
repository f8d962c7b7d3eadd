//! Aggregate combat records and per-encounter tallies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{ItemId, UnitId};
use crate::playback::{CombatEvent, Playback};

/// What a record entry counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// A strike hit.
    Hit,
    /// A strike missed.
    Miss,
    /// A strike crit.
    Crit,
    /// Damage dealt.
    Damage {
        /// Computed damage.
        damage: i32,
        /// Damage actually removed.
        true_damage: i32,
        /// Whether it came from a crit.
        crit: bool,
    },
    /// HP restored.
    Heal {
        /// HP actually restored.
        amount: i32,
    },
    /// `actor` killed `target`.
    Kill,
    /// `actor` died to `target`.
    Death,
}

/// One record line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordEntry {
    /// What happened.
    pub kind: RecordKind,
    /// Unit the record is about.
    pub actor: UnitId,
    /// Other unit involved.
    pub target: UnitId,
    /// Item involved, if any.
    pub item: Option<ItemId>,
}

impl RecordEntry {
    /// Create an entry.
    #[must_use]
    pub const fn new(kind: RecordKind, actor: UnitId, target: UnitId, item: Option<ItemId>) -> Self {
        Self { kind, actor, target, item }
    }
}

/// Campaign-wide record book.
///
/// `entries` is maintained through undoable actions. `persistent` holds
/// records that survive rewinding (player deaths).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Records {
    entries: Vec<RecordEntry>,
    persistent: Vec<RecordEntry>,
}

impl Records {
    /// Append an undoable entry.
    pub fn push(&mut self, entry: RecordEntry) {
        self.entries.push(entry);
    }

    /// Remove the newest undoable entry.
    pub fn pop(&mut self) -> Option<RecordEntry> {
        self.entries.pop()
    }

    /// Append an entry that ignores rewinds.
    pub fn push_persistent(&mut self, entry: RecordEntry) {
        self.persistent.push(entry);
    }

    /// Undoable entries.
    #[must_use]
    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    /// Rewind-proof entries.
    #[must_use]
    pub fn persistent(&self) -> &[RecordEntry] {
        &self.persistent
    }

    /// Kills credited to `unit`.
    #[must_use]
    pub fn kills_by(&self, unit: &UnitId) -> usize {
        self.entries.iter().filter(|e| e.kind == RecordKind::Kill && &e.actor == unit).count()
    }

    /// Total true damage dealt by `unit`.
    #[must_use]
    pub fn damage_by(&self, unit: &UnitId) -> i32 {
        self.entries
            .iter()
            .filter(|e| &e.actor == unit)
            .map(|e| match e.kind {
                RecordKind::Damage { true_damage, .. } => true_damage,
                _ => 0,
            })
            .sum()
    }

    /// Deaths of `unit`, including rewound ones.
    #[must_use]
    pub fn deaths_of(&self, unit: &UnitId) -> usize {
        self.entries
            .iter()
            .chain(&self.persistent)
            .filter(|e| e.kind == RecordKind::Death && &e.actor == unit)
            .count()
    }
}

/// Record entries implied by an encounter's playback, in playback order.
#[must_use]
pub fn entries_from_playback(playback: &Playback) -> Vec<RecordEntry> {
    playback
        .iter()
        .filter_map(|event| {
            let entry = match event {
                CombatEvent::MarkHit { attacker, defender, item } => {
                    RecordEntry::new(RecordKind::Hit, attacker.clone(), defender.clone(), Some(item.clone()))
                }
                CombatEvent::MarkCrit { attacker, defender, item } => {
                    RecordEntry::new(RecordKind::Crit, attacker.clone(), defender.clone(), Some(item.clone()))
                }
                CombatEvent::MarkMiss { attacker, defender, item } => {
                    RecordEntry::new(RecordKind::Miss, attacker.clone(), defender.clone(), Some(item.clone()))
                }
                CombatEvent::DamageHit { attacker, item, defender, damage, true_damage } => RecordEntry::new(
                    RecordKind::Damage { damage: *damage, true_damage: *true_damage, crit: false },
                    attacker.clone(),
                    defender.clone(),
                    Some(item.clone()),
                ),
                CombatEvent::DamageCrit { attacker, item, defender, damage, true_damage } => RecordEntry::new(
                    RecordKind::Damage { damage: *damage, true_damage: *true_damage, crit: true },
                    attacker.clone(),
                    defender.clone(),
                    Some(item.clone()),
                ),
                CombatEvent::HealHit { attacker, item, defender, true_amount, .. } => RecordEntry::new(
                    RecordKind::Heal { amount: *true_amount },
                    attacker.clone(),
                    defender.clone(),
                    Some(item.clone()),
                ),
                _ => return None,
            };
            Some(entry)
        })
        .collect()
}

/// Key of an encounter tally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TallyKey {
    /// Acting unit.
    pub actor: UnitId,
    /// Other unit.
    pub target: UnitId,
    /// Item used.
    pub item: Option<ItemId>,
}

/// Counts for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tally {
    /// Hits.
    pub hits: u32,
    /// Crits.
    pub crits: u32,
    /// Misses.
    pub misses: u32,
    /// True damage.
    pub damage: i32,
    /// HP restored.
    pub healing: i32,
    /// Kills.
    pub kills: u32,
    /// Deaths.
    pub deaths: u32,
}

/// Finalized statistics for one encounter, keyed by (actor, target, item).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncounterTallies {
    tallies: BTreeMap<TallyKey, Tally>,
}

impl EncounterTallies {
    /// Fold record entries into tallies.
    #[must_use]
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a RecordEntry>) -> Self {
        let mut tallies = Self::default();
        for entry in entries {
            let key = TallyKey { actor: entry.actor.clone(), target: entry.target.clone(), item: entry.item.clone() };
            let tally = tallies.tallies.entry(key).or_default();
            match entry.kind {
                RecordKind::Hit => tally.hits += 1,
                RecordKind::Crit => tally.crits += 1,
                RecordKind::Miss => tally.misses += 1,
                RecordKind::Damage { true_damage, .. } => tally.damage += true_damage,
                RecordKind::Heal { amount } => tally.healing += amount,
                RecordKind::Kill => tally.kills += 1,
                RecordKind::Death => tally.deaths += 1,
            }
        }
        tallies
    }

    /// Tally for a key.
    #[must_use]
    pub fn get(&self, actor: &UnitId, target: &UnitId, item: Option<&ItemId>) -> Option<&Tally> {
        let key = TallyKey { actor: actor.clone(), target: target.clone(), item: item.cloned() };
        self.tallies.get(&key)
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&TallyKey, &Tally)> {
        self.tallies.iter()
    }

    /// Whether no tally was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }
}
