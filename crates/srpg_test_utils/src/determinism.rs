//! Determinism testing utilities.
//!
//! Provides a harness for verifying that encounters produce identical
//! playback and world state given identical inputs, and that the action log
//! rewinds an encounter exactly.
//!
//! # Testing Strategy
//!
//! Encounter resolution must be reproducible for replays and for the
//! turnwheel. Sources of non-determinism include:
//!
//! - **Floating-point math**: multipliers use [`srpg_core::math::Fixed`].
//! - **HashMap iteration order**: the world stores everything in `BTreeMap`s.
//! - **System randomness**: rolls only come from an injected
//!   [`srpg_core::rng::CombatRng`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use srpg_core::action::ActionLog;
use srpg_core::combat::{CombatContext, MapCombat};
use srpg_core::data::Database;
use srpg_core::rng::PcgRng;
use srpg_core::solver::CombatSetup;
use srpg_core::world::World;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Combined playback and world hash from each run.
    pub hashes: Vec<u64>,
    /// Phases resolved by the first run.
    pub phases: u32,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic encounter).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the encounter was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the encounter produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Encounter is non-deterministic!\n\
                 Runs: {}\n\
                 Phases: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.phases,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Resolve the same encounter `runs` times from fresh inputs and compare.
///
/// # Example
///
/// ```ignore
/// use srpg_test_utils::determinism::verify_encounter_determinism;
/// use srpg_test_utils::fixtures::{duel_world, test_database};
///
/// let db = test_database();
/// let result = verify_encounter_determinism(
///     3,
///     &db,
///     || duel_world(&db),
///     || CombatSetup::new("eirika", "eirika_sword", "bandit"),
///     42,
/// );
/// result.assert_deterministic();
/// ```
///
/// # Panics
///
/// Panics if an encounter fails to resolve.
pub fn verify_encounter_determinism<W, S>(runs: usize, db: &Database, world: W, setup: S, seed: u64) -> DeterminismResult
where
    W: Fn() -> World,
    S: Fn() -> CombatSetup,
{
    let mut hashes = Vec::with_capacity(runs);
    let mut phases = 0;

    for run in 0..runs {
        let mut world = world();
        let mut log = ActionLog::new();
        let mut rng = PcgRng::new(seed);
        let mut combat = MapCombat::new(setup());
        let summary = {
            let mut ctx = CombatContext::new(db, &mut world, &mut log, &mut rng);
            combat.run_to_completion(&mut ctx).unwrap_or_else(|e| panic!("encounter failed: {e}"))
        };
        if run == 0 {
            phases = summary.phases;
        }
        let hash = compute_hash(&(combat.full_playback().digest(), world.state_hash()));
        tracing::debug!(run, hash, phases = summary.phases, "Determinism run finished");
        hashes.push(hash);
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult { is_deterministic, hashes, phases }
}

/// Resolve an encounter, undo every action, and check the world is back to
/// its starting state.
///
/// Player death records are deliberately kept across rewinds, so the
/// comparison ignores [`srpg_core::records::Records::persistent`].
///
/// # Panics
///
/// Panics if the encounter fails to resolve or an undo fails.
pub fn verify_undo_round_trip(db: &Database, world: &World, setup: CombatSetup, seed: u64) -> bool {
    let mut state = world.clone();
    let mut log = ActionLog::new();
    let mut rng = PcgRng::new(seed);
    {
        let mut ctx = CombatContext::new(db, &mut state, &mut log, &mut rng);
        MapCombat::new(setup).run_to_completion(&mut ctx).unwrap_or_else(|e| panic!("encounter failed: {e}"));
    }
    log.undo_all(&mut state).unwrap_or_else(|e| panic!("undo failed: {e}"));
    if state.records.entries() != world.records.entries() {
        return false;
    }
    state.records = world.records.clone();
    state == *world
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for combat inputs.
///
/// These strategies generate random but reproducible stat lines, weapons and
/// constants for property-based testing of the calculator and solver.
pub mod strategies {
    use proptest::prelude::*;
    use srpg_core::components::Team;
    use srpg_core::data::CombatConstants;
    use srpg_core::item::Item;
    use srpg_core::unit::Unit;

    /// A stat value in the usual 0..30 range.
    pub fn arb_stat() -> impl Strategy<Value = i32> {
        0i32..30
    }

    /// A full stat line: HP, STR, SKL, SPD, LCK, DEF.
    pub fn arb_stat_line() -> impl Strategy<Value = [i32; 6]> {
        (1i32..60, arb_stat(), arb_stat(), arb_stat(), arb_stat(), arb_stat())
            .prop_map(|(hp, str_, skl, spd, lck, def)| [hp, str_, skl, spd, lck, def])
    }

    /// A unit on `team` at `(x, 0)` with an arbitrary stat line.
    pub fn arb_unit(nid: &'static str, team: Team, x: i32) -> impl Strategy<Value = Unit> {
        arb_stat_line().prop_map(move |[hp, str_, skl, spd, lck, def]| {
            Unit::new(nid, team)
                .with_stat("HP", hp)
                .with_stat("STR", str_)
                .with_stat("SKL", skl)
                .with_stat("SPD", spd)
                .with_stat("LCK", lck)
                .with_stat("DEF", def)
                .at(x, 0)
        })
    }

    /// A melee weapon of one of the triangle types.
    pub fn arb_weapon(nid: &'static str) -> impl Strategy<Value = Item> {
        (prop::sample::select(vec!["Sword", "Lance", "Axe"]), 0i32..20, 0i32..120, 0i32..30, 1i32..50)
            .prop_map(move |(weapon_type, might, hit, crit, uses)| {
                Item::weapon(nid, weapon_type, might, hit, crit).with_uses(uses)
            })
    }

    /// Constants with arbitrary damage floor, doubling threshold and crit
    /// amplification.
    pub fn arb_constants() -> impl Strategy<Value = CombatConstants> {
        (0i32..5, 1i32..8, 1i32..4, 0i32..3).prop_map(|(min_damage, speed_to_double, crit_mult, crit_add)| {
            CombatConstants::default()
                .with_min_damage(min_damage)
                .with_speed_to_double(speed_to_double)
                .with_crit(crit_mult, crit_add)
        })
    }

    /// A seed for [`srpg_core::rng::PcgRng`].
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{duel_world, test_database};

    #[test]
    fn test_duel_is_deterministic() {
        let db = test_database();
        let result = verify_encounter_determinism(
            3,
            &db,
            || duel_world(&db),
            || CombatSetup::new("eirika", "eirika_sword", "bandit"),
            42,
        );
        result.assert_deterministic();
        assert_eq!(result.unique_hashes().len(), 1);
        assert!(result.phases >= 2);
    }

    #[test]
    fn test_duel_rewinds() {
        let db = test_database();
        let world = duel_world(&db);
        assert!(verify_undo_round_trip(&db, &world, CombatSetup::new("eirika", "eirika_sword", "bandit"), 7));
    }

    #[test]
    fn test_hash_helper() {
        assert_eq!(compute_hash(&(1u64, 2u64)), compute_hash(&(1u64, 2u64)));
        assert_ne!(compute_hash(&1u64), compute_hash(&2u64));
    }
}
