//! Semantic combat events ("playback").
//!
//! Playback describes what happens in an encounter in enough detail to
//! replay it without re-reading mutable unit state. The solver produces one
//! batch per phase; the orchestrator accumulates batches into the full
//! encounter log that reconciliation reads. Presentation-only events (sounds,
//! animations, tints) are forwarded but never interpreted by the core.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::{ItemId, UnitId};

/// RGB tint colour.
pub type Color = [u8; 3];

/// Tint flashed on a unit that was hit.
pub const HIT_TINT: Color = [255, 255, 255];
/// Tint flashed on a unit that was critically hit.
pub const CRIT_TINT: Color = [255, 64, 64];
/// Tint flashed on a healed unit.
pub const HEAL_TINT: Color = [96, 255, 96];

/// Outcome of a to-hit roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkKind {
    /// Normal hit.
    Hit,
    /// Critical hit.
    Crit,
    /// Miss.
    Miss,
}

/// A recorded to-hit outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mark {
    /// Striking unit.
    pub attacker: UnitId,
    /// Struck unit.
    pub defender: UnitId,
    /// Item used.
    pub item: ItemId,
    /// Outcome.
    pub kind: MarkKind,
}

/// One playback record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatEvent {
    /// A strike hit.
    MarkHit {
        /// Striking unit.
        attacker: UnitId,
        /// Struck unit.
        defender: UnitId,
        /// Item used.
        item: ItemId,
    },
    /// A strike crit.
    MarkCrit {
        /// Striking unit.
        attacker: UnitId,
        /// Struck unit.
        defender: UnitId,
        /// Item used.
        item: ItemId,
    },
    /// A strike missed.
    MarkMiss {
        /// Striking unit.
        attacker: UnitId,
        /// Struck unit.
        defender: UnitId,
        /// Item used.
        item: ItemId,
    },
    /// Damage from a normal hit.
    DamageHit {
        /// Striking unit.
        attacker: UnitId,
        /// Item used.
        item: ItemId,
        /// Struck unit.
        defender: UnitId,
        /// Computed damage.
        damage: i32,
        /// Damage actually removed (bounded by remaining HP).
        true_damage: i32,
    },
    /// Damage from a critical hit.
    DamageCrit {
        /// Striking unit.
        attacker: UnitId,
        /// Item used.
        item: ItemId,
        /// Struck unit.
        defender: UnitId,
        /// Computed damage.
        damage: i32,
        /// Damage actually removed.
        true_damage: i32,
    },
    /// Healing.
    HealHit {
        /// Healer.
        attacker: UnitId,
        /// Item used.
        item: ItemId,
        /// Healed unit.
        defender: UnitId,
        /// Computed heal.
        amount: i32,
        /// HP actually restored (bounded by missing HP).
        true_amount: i32,
    },
    /// Spell animation.
    CastAnim {
        /// Casting unit.
        attacker: UnitId,
        /// Animation name.
        anim: String,
    },
    /// Spell sound.
    CastSound {
        /// Sound name.
        sound: String,
    },
    /// Impact sound.
    HitSound {
        /// Sound name.
        sound: String,
    },
    /// Impact animation on the struck unit.
    HitAnim {
        /// Animation name.
        anim: String,
        /// Struck unit.
        defender: UnitId,
    },
    /// Screen shake.
    Shake {
        /// Strength.
        magnitude: u8,
    },
    /// Additive tint flash.
    UnitTintAdd {
        /// Tinted unit.
        unit: UnitId,
        /// Colour.
        color: Color,
    },
    /// Subtractive tint flash.
    UnitTintSub {
        /// Tinted unit.
        unit: UnitId,
        /// Colour.
        color: Color,
    },
    /// Crit flash.
    CritTint {
        /// Tinted unit.
        unit: UnitId,
        /// Colour.
        color: Color,
    },
    /// Crit vibration.
    CritVibrate {
        /// Vibrating unit.
        unit: UnitId,
    },
    /// The defender is the acting unit in this phase.
    DefenderPhase {
        /// Acting defender.
        defender: UnitId,
    },
}

impl CombatEvent {
    /// Stable tag name.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::MarkHit { .. } => "mark_hit",
            Self::MarkCrit { .. } => "mark_crit",
            Self::MarkMiss { .. } => "mark_miss",
            Self::DamageHit { .. } => "damage_hit",
            Self::DamageCrit { .. } => "damage_crit",
            Self::HealHit { .. } => "heal_hit",
            Self::CastAnim { .. } => "cast_anim",
            Self::CastSound { .. } => "cast_sound",
            Self::HitSound { .. } => "hit_sound",
            Self::HitAnim { .. } => "hit_anim",
            Self::Shake { .. } => "shake",
            Self::UnitTintAdd { .. } => "unit_tint_add",
            Self::UnitTintSub { .. } => "unit_tint_sub",
            Self::CritTint { .. } => "crit_tint",
            Self::CritVibrate { .. } => "crit_vibrate",
            Self::DefenderPhase { .. } => "defender_phase",
        }
    }

    /// Build the mark event for an outcome.
    #[must_use]
    pub fn from_mark(mark: &Mark) -> Self {
        let (attacker, defender, item) = (mark.attacker.clone(), mark.defender.clone(), mark.item.clone());
        match mark.kind {
            MarkKind::Hit => Self::MarkHit { attacker, defender, item },
            MarkKind::Crit => Self::MarkCrit { attacker, defender, item },
            MarkKind::Miss => Self::MarkMiss { attacker, defender, item },
        }
    }

    /// The outcome recorded by a mark event.
    #[must_use]
    pub fn as_mark(&self) -> Option<Mark> {
        let (attacker, defender, item, kind) = match self {
            Self::MarkHit { attacker, defender, item } => (attacker, defender, item, MarkKind::Hit),
            Self::MarkCrit { attacker, defender, item } => (attacker, defender, item, MarkKind::Crit),
            Self::MarkMiss { attacker, defender, item } => (attacker, defender, item, MarkKind::Miss),
            _ => return None,
        };
        Some(Mark { attacker: attacker.clone(), defender: defender.clone(), item: item.clone(), kind })
    }

    /// `(attacker, defender, true_damage)` for damage events.
    #[must_use]
    pub fn as_damage(&self) -> Option<(&UnitId, &UnitId, i32)> {
        match self {
            Self::DamageHit { attacker, defender, true_damage, .. }
            | Self::DamageCrit { attacker, defender, true_damage, .. } => Some((attacker, defender, *true_damage)),
            _ => None,
        }
    }

    /// Whether only presentation cares about this event.
    #[must_use]
    pub const fn is_presentation_only(&self) -> bool {
        matches!(
            self,
            Self::CastAnim { .. }
                | Self::CastSound { .. }
                | Self::HitSound { .. }
                | Self::HitAnim { .. }
                | Self::Shake { .. }
                | Self::UnitTintAdd { .. }
                | Self::UnitTintSub { .. }
                | Self::CritTint { .. }
                | Self::CritVibrate { .. }
                | Self::DefenderPhase { .. }
        )
    }
}

/// Append-only event log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Playback {
    events: Vec<CombatEvent>,
}

impl Playback {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event.
    pub fn push(&mut self, event: CombatEvent) {
        self.events.push(event);
    }

    /// Append a batch.
    pub fn extend(&mut self, events: impl IntoIterator<Item = CombatEvent>) {
        self.events.extend(events);
    }

    /// Drop every event (used for the per-phase log).
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// All events in order.
    #[must_use]
    pub fn events(&self) -> &[CombatEvent] {
        &self.events
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate events.
    pub fn iter(&self) -> std::slice::Iter<'_, CombatEvent> {
        self.events.iter()
    }

    /// Events carrying a given tag.
    pub fn with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a CombatEvent> + 'a {
        self.events.iter().filter(move |e| e.tag() == tag)
    }

    /// Count events carrying a given tag.
    #[must_use]
    pub fn count_tag(&self, tag: &str) -> usize {
        self.with_tag(tag).count()
    }

    /// Hit and crit marks, plus misses when `include_miss` is set.
    pub fn marks(&self, include_miss: bool) -> impl Iterator<Item = Mark> + '_ {
        Self::marks_in(&self.events, include_miss)
    }

    /// [`Self::marks`] over a raw slice.
    pub fn marks_in(events: &[CombatEvent], include_miss: bool) -> impl Iterator<Item = Mark> + '_ {
        events
            .iter()
            .filter_map(CombatEvent::as_mark)
            .filter(move |mark| include_miss || mark.kind != MarkKind::Miss)
    }

    /// Stable digest of the whole log.
    #[must_use]
    pub fn digest(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.events.hash(&mut hasher);
        hasher.finish()
    }
}

impl<'a> IntoIterator for &'a Playback {
    type Item = &'a CombatEvent;
    type IntoIter = std::slice::Iter<'a, CombatEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
