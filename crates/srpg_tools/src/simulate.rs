//! Headless encounter simulation.

use std::path::Path;

use serde::Serialize;

use srpg_core::combat::{AfterCombat, CombatSummary};
use srpg_core::components::UnitId;
use srpg_core::data::Database;
use srpg_core::playback::CombatEvent;
use srpg_core::replay::EncounterReplay;
use srpg_core::world::World;

use crate::scenario::{Scenario, ScenarioError};

/// Unit state after the encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    /// Unit.
    pub nid: UnitId,
    /// Current HP.
    pub hp: i32,
    /// Maximum HP.
    pub max_hp: i32,
    /// Level.
    pub level: i32,
    /// Experience.
    pub exp: i32,
    /// Whether the unit is dying.
    pub dying: bool,
}

/// Everything a simulation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Scenario name.
    pub scenario: String,
    /// Seed the encounter rolled with.
    pub seed: u64,
    /// Full encounter playback.
    pub playback: Vec<CombatEvent>,
    /// Reconciliation summary.
    pub summary: CombatSummary,
    /// Narrative messages added by the encounter.
    pub messages: Vec<String>,
    /// Participants after the encounter.
    pub units: Vec<UnitReport>,
    /// World hash after the encounter.
    pub final_hash: u64,
}

impl SimulationReport {
    fn new(
        scenario: &Scenario,
        replay: &EncounterReplay,
        world: &World,
        playback: Vec<CombatEvent>,
        summary: CombatSummary,
    ) -> Self {
        let units = scenario
            .setup
            .participants()
            .iter()
            .filter_map(|nid| world.units.get(nid))
            .map(|unit| UnitReport {
                nid: unit.nid.clone(),
                hp: unit.current_hp,
                max_hp: unit.max_hp(),
                level: unit.level,
                exp: unit.exp,
                dying: unit.is_dying,
            })
            .collect();
        Self {
            scenario: scenario.name.clone(),
            seed: replay.seed,
            playback,
            summary,
            messages: world.messages.clone(),
            units,
            final_hash: replay.final_hash,
        }
    }

    /// Human-readable lines: one per semantic event, then messages and
    /// the participants' final state.
    #[must_use]
    pub fn to_text(&self) -> Vec<String> {
        let mut lines = vec![format!("== {} (seed {}) ==", self.scenario, self.seed)];
        lines.extend(self.playback.iter().filter_map(describe));
        lines.extend(self.messages.iter().map(|m| format!("* {m}")));
        for award in &self.summary.exp_awards {
            lines.push(format!("{} gains {} exp", award.unit, award.amount));
        }
        for award in &self.summary.wexp_awards {
            lines.push(format!("{} gains {} {} wexp", award.unit, award.amount, award.weapon_type));
        }
        lines.extend(self.summary.alerts.iter().map(|a| format!("! {a}")));
        for unit in &self.units {
            let state = if unit.dying { " (dying)" } else { "" };
            lines.push(format!("{}: {}/{} HP{state}", unit.nid, unit.hp, unit.max_hp));
        }
        let after = match self.summary.after {
            AfterCombat::Menu => "menu",
            AfterCombat::Canto => "canto",
            AfterCombat::Wait => "wait",
            AfterCombat::Event => "event",
        };
        lines.push(format!("{} phases, then {after}", self.summary.phases));
        lines
    }
}

fn describe(event: &CombatEvent) -> Option<String> {
    let line = match event {
        CombatEvent::MarkMiss { attacker, defender, .. } => format!("{attacker} misses {defender}"),
        CombatEvent::DamageHit { attacker, defender, damage, .. } => {
            format!("{attacker} hits {defender} for {damage}")
        }
        CombatEvent::DamageCrit { attacker, defender, damage, .. } => {
            format!("{attacker} crits {defender} for {damage}")
        }
        CombatEvent::HealHit { attacker, defender, amount, .. } => {
            format!("{attacker} heals {defender} for {amount}")
        }
        _ => return None,
    };
    Some(line)
}

/// Run a scenario's encounter. `seed` overrides the scenario's seed. When
/// `replay_path` is given the encounter is also saved as a replay file.
///
/// # Errors
///
/// Returns an error if the scenario is invalid, the encounter fails or the
/// replay cannot be written.
pub fn simulate(
    db: &Database,
    scenario: &Scenario,
    seed: Option<u64>,
    replay_path: Option<&Path>,
) -> Result<SimulationReport, ScenarioError> {
    let world = scenario.build_world(db)?;
    let seed = seed.unwrap_or(scenario.seed);
    let (replay, outcome) = EncounterReplay::record(&scenario.name, seed, db, &world, scenario.setup.clone())?;
    if let Some(path) = replay_path {
        replay.save(path)?;
        tracing::info!("Replay written to {}", path.display());
    }
    let messages_before = world.messages.len();
    let mut report =
        SimulationReport::new(scenario, &replay, &outcome.world, outcome.playback.events().to_vec(), outcome.summary);
    report.messages = report.messages.split_off(messages_before);
    Ok(report)
}

/// Re-run a replay file and check it reproduces its recorded result.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the encounter fails.
pub fn verify_replay(db: &Database, path: &Path) -> Result<bool, ScenarioError> {
    let replay = EncounterReplay::load(path)?;
    Ok(replay.verify(db)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use srpg_test_utils::fixtures::test_database;

    const DUEL: &str = r#"
Scenario(
    name: "Duel",
    seed: 11,
    units: [
        Unit(nid: "eirika", name: "Eirika", team: Player, position: Some((x: 0, y: 0)),
             stats: {"HP": 16, "STR": 6, "SKL": 8, "SPD": 9, "LCK": 5, "DEF": 3}, current_hp: 16,
             equipped_weapon: Some("rapier")),
        Unit(nid: "bandit", name: "Bandit", team: Enemy, position: Some((x: 1, y: 0)),
             stats: {"HP": 21, "STR": 5, "SKL": 1, "SPD": 3, "DEF": 2}, current_hp: 21,
             equipped_weapon: Some("hand_axe")),
    ],
    items: [
        Item(nid: "rapier", name: "Rapier", owner: Some("eirika"), weapon_type: Some("Sword"),
             might: Some(7), hit: Some(95), crit: Some(10), min_range: Some(1), max_range: Some(1),
             uses: Some((current: 40, max: 40)), components: [Weapon]),
        Item(nid: "hand_axe", name: "Hand Axe", owner: Some("bandit"), weapon_type: Some("Axe"),
             might: Some(7), hit: Some(60), crit: Some(0), min_range: Some(1), max_range: Some(2),
             uses: Some((current: 20, max: 20)), components: [Weapon]),
    ],
    setup: CombatSetup(attacker: "eirika", item: "rapier", defenders: ["bandit"]),
)
"#;

    #[test]
    fn test_simulate_is_repeatable() {
        let db = test_database();
        let scenario = Scenario::from_ron_str(DUEL).unwrap();
        let first = simulate(&db, &scenario, None, None).unwrap();
        let second = simulate(&db, &scenario, None, None).unwrap();
        assert_eq!(first.seed, 11);
        assert_eq!(first.final_hash, second.final_hash);
        assert_eq!(first.playback, second.playback);
        assert!(first.summary.phases >= 1);
        assert_eq!(first.messages.first().map(String::as_str), Some("Eirika attacked Bandit"));
    }

    #[test]
    fn test_text_report_mentions_participants() {
        let db = test_database();
        let scenario = Scenario::from_ron_str(DUEL).unwrap();
        let report = simulate(&db, &scenario, Some(5), None).unwrap();
        let text = report.to_text().join("\n");
        assert!(text.contains("seed 5"));
        assert!(text.contains("eirika:"));
        assert!(text.contains("bandit:"));
    }

    #[test]
    fn test_replay_written_and_verified() {
        let db = test_database();
        let scenario = Scenario::from_ron_str(DUEL).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duel.replay");
        simulate(&db, &scenario, None, Some(&path)).unwrap();
        assert!(verify_replay(&db, &path).unwrap());
    }
}
