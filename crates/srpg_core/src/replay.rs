//! Encounter replays.
//!
//! A replay stores the world as it was before the encounter, the encounter
//! setup and the RNG seed. Because resolution is deterministic, re-running
//! those inputs must reproduce the recorded playback and final world hash.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::action::ActionLog;
use crate::combat::{CombatContext, CombatSummary, MapCombat};
use crate::data::Database;
use crate::error::{CombatError, Result};
use crate::playback::Playback;
use crate::rng::PcgRng;
use crate::solver::CombatSetup;
use crate::world::World;

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Result of resolving an encounter from replay inputs.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    /// World after the encounter.
    pub world: World,
    /// Full encounter playback.
    pub playback: Playback,
    /// Reconciliation summary.
    pub summary: CombatSummary,
    /// Actions committed by the encounter, in order.
    pub log: ActionLog,
}

/// A recorded encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterReplay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier or name.
    pub scenario: String,
    /// Seed of the [`PcgRng`] the encounter rolled with.
    pub seed: u64,
    /// Participants.
    pub setup: CombatSetup,
    /// Serialized world before the encounter.
    pub initial_world: Vec<u8>,
    /// Phases resolved.
    pub phases: u32,
    /// Digest of the full playback.
    pub playback_hash: u64,
    /// World hash after reconciliation.
    pub final_hash: u64,
}

impl EncounterReplay {
    /// Resolve an encounter on a copy of `world` and record it.
    ///
    /// # Errors
    ///
    /// Returns an error if the world cannot be serialized or the encounter
    /// fails to resolve.
    pub fn record(
        scenario: impl Into<String>,
        seed: u64,
        db: &Database,
        world: &World,
        setup: CombatSetup,
    ) -> Result<(Self, ReplayOutcome)> {
        let initial_world = world.serialize()?;
        let outcome = play(db, world.clone(), &setup, seed)?;
        let replay = Self {
            version: REPLAY_VERSION,
            scenario: scenario.into(),
            seed,
            setup,
            initial_world,
            phases: outcome.summary.phases,
            playback_hash: outcome.playback.digest(),
            final_hash: outcome.world.state_hash(),
        };
        Ok((replay, outcome))
    }

    /// World before the encounter.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored bytes do not decode.
    pub fn restore_initial_world(&self) -> Result<World> {
        World::deserialize(&self.initial_world)
    }

    /// Resolve the recorded encounter again.
    ///
    /// # Errors
    ///
    /// Returns an error if the world cannot be restored or the encounter
    /// fails to resolve.
    pub fn run(&self, db: &Database) -> Result<ReplayOutcome> {
        play(db, self.restore_initial_world()?, &self.setup, self.seed)
    }

    /// Whether re-running reproduces the recorded playback and final world.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run`].
    pub fn verify(&self, db: &Database) -> Result<bool> {
        let outcome = self.run(db)?;
        let playback_hash = outcome.playback.digest();
        let final_hash = outcome.world.state_hash();
        let matches = playback_hash == self.playback_hash && final_hash == self.final_hash;
        if !matches {
            tracing::warn!(
                scenario = %self.scenario,
                expected_playback = self.playback_hash,
                playback_hash,
                expected_final = self.final_hash,
                final_hash,
                "Replay diverged"
            );
        }
        Ok(matches)
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| CombatError::InvalidState(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| CombatError::InvalidState(format!("Failed to write replay file: {e}")))?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if file reading or deserialization fails, or the
    /// file was written by another format version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| CombatError::InvalidState(format!("Failed to read replay file: {e}")))?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| CombatError::InvalidState(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(CombatError::InvalidState(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }

        Ok(replay)
    }
}

fn play(db: &Database, mut world: World, setup: &CombatSetup, seed: u64) -> Result<ReplayOutcome> {
    let mut log = ActionLog::new();
    let mut rng = PcgRng::new(seed);
    let mut combat = MapCombat::new(setup.clone());
    let summary = {
        let mut ctx = CombatContext::new(db, &mut world, &mut log, &mut rng);
        combat.run_to_completion(&mut ctx)?
    };
    Ok(ReplayOutcome { world, playback: combat.full_playback().clone(), summary, log })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Team;
    use crate::equations::{self, EquationTable, Formula};
    use crate::item::Item;
    use crate::unit::Unit;

    fn db() -> Database {
        let stat = |name: &str| Formula::Stat(name.into());
        Database {
            equations: EquationTable::new()
                .with(equations::HIT, stat("SKL"))
                .with(equations::AVOID, stat("SPD"))
                .with(equations::CRIT_HIT, stat("SKL"))
                .with(equations::CRIT_AVOID, stat("LCK"))
                .with(equations::DAMAGE, stat("STR"))
                .with(equations::DEFENSE, stat("DEF"))
                .with(equations::ATTACK_SPEED, stat("SPD"))
                .with(equations::DEFENSE_SPEED, stat("SPD")),
            ..Database::default()
        }
    }

    fn world() -> World {
        let db = db();
        let mut world = World::new();
        for (nid, team, x) in [("ross", Team::Player, 0), ("fighter", Team::Enemy, 1)] {
            world.add_unit(
                Unit::new(nid, team)
                    .with_stat("HP", 24)
                    .with_stat("STR", 6)
                    .with_stat("SKL", 20)
                    .with_stat("SPD", 4)
                    .with_stat("LCK", 2)
                    .at(x, 0),
            );
            let axe = world.give_item(&nid.into(), Item::weapon(format!("{nid}_axe"), "Axe", 8, 60, 10)).unwrap();
            world.equip(&db, &nid.into(), &axe).unwrap();
        }
        world
    }

    #[test]
    fn test_record_then_verify() {
        let db = db();
        let world = world();
        let (replay, outcome) =
            EncounterReplay::record("duel", 77, &db, &world, CombatSetup::new("ross", "ross_axe", "fighter")).unwrap();
        assert_eq!(replay.version, REPLAY_VERSION);
        assert_eq!(replay.phases, outcome.summary.phases);
        assert_eq!(replay.restore_initial_world().unwrap(), world);
        assert!(replay.verify(&db).unwrap());
    }

    #[test]
    fn test_tampered_replay_fails_verification() {
        let db = db();
        let (mut replay, _) =
            EncounterReplay::record("duel", 77, &db, &world(), CombatSetup::new("ross", "ross_axe", "fighter")).unwrap();
        replay.final_hash ^= 1;
        assert!(!replay.verify(&db).unwrap());
    }

    #[test]
    fn test_save_load() {
        let db = db();
        let (replay, _) =
            EncounterReplay::record("duel", 5, &db, &world(), CombatSetup::new("ross", "ross_axe", "fighter")).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duel.replay");
        replay.save(&path).unwrap();
        assert_eq!(EncounterReplay::load(&path).unwrap(), replay);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let db = db();
        let (mut replay, _) =
            EncounterReplay::record("duel", 5, &db, &world(), CombatSetup::new("ross", "ross_axe", "fighter")).unwrap();
        replay.version = REPLAY_VERSION + 1;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.replay");
        replay.save(&path).unwrap();
        assert!(matches!(EncounterReplay::load(&path), Err(CombatError::InvalidState(_))));
    }
}
