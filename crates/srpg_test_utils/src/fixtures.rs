//! Test fixtures and helpers.
//!
//! Pre-built content databases, units and weapons for consistent testing.

use fixed::types::I32F32;
use srpg_core::action::ActionLog;
use srpg_core::combat::{CombatContext, CombatSummary, MapCombat};
use srpg_core::components::{ItemId, Team, UnitId};
use srpg_core::data::{AdvantageEntry, Database, WeaponRank, WeaponTypeData};
use srpg_core::equations::{self, EquationTable, Formula};
use srpg_core::error::Result;
use srpg_core::item::{Item, ItemComponent};
use srpg_core::playback::Playback;
use srpg_core::rng::CombatRng;
use srpg_core::solver::CombatSetup;
use srpg_core::unit::Unit;
use srpg_core::world::World;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

// ============================================================================
// Content
// ============================================================================

/// Equations where every statistic reads exactly one stat.
///
/// `HIT = SKL`, `AVOID = SPD`, `CRIT_HIT = SKL`, `CRIT_AVOID = LCK`,
/// `DAMAGE = STR`, `DEFENSE = DEF`, `ATTACK_SPEED = SPD`, `DEFENSE_SPEED = SPD`.
#[must_use]
pub fn flat_equations() -> EquationTable {
    let stat = |name: &str| Formula::Stat(name.to_owned());
    EquationTable::new()
        .with(equations::HIT, stat("SKL"))
        .with(equations::AVOID, stat("SPD"))
        .with(equations::CRIT_HIT, stat("SKL"))
        .with(equations::CRIT_AVOID, stat("LCK"))
        .with(equations::DAMAGE, stat("STR"))
        .with(equations::DEFENSE, stat("DEF"))
        .with(equations::ATTACK_SPEED, stat("SPD"))
        .with(equations::DEFENSE_SPEED, stat("SPD"))
}

/// Equations shaped like a typical tactics game.
///
/// Hit is `SKL * 2 + LCK / 2`, avoid is `ATTACK_SPEED * 2 + LCK`, crit is
/// `SKL / 2`, magic damage items override with `MAGIC_DAMAGE`.
#[must_use]
pub fn standard_equations() -> EquationTable {
    let stat = |name: &str| Formula::Stat(name.to_owned());
    let half = |formula: Formula| Formula::Scaled { formula: Box::new(formula), percent: 50 };
    flat_equations()
        .with(
            equations::HIT,
            Formula::Sum(vec![Formula::Scaled { formula: Box::new(stat("SKL")), percent: 200 }, half(stat("LCK"))]),
        )
        .with(
            equations::AVOID,
            Formula::Sum(vec![
                Formula::Scaled { formula: Box::new(Formula::Equation(equations::ATTACK_SPEED.to_owned())), percent: 200 },
                stat("LCK"),
            ]),
        )
        .with(equations::CRIT_HIT, half(stat("SKL")))
        .with("MAGIC_DAMAGE", stat("MAG"))
        .with("MAGIC_DEFENSE", stat("RES"))
}

/// Database with flat equations and no ranks or triangle.
#[must_use]
pub fn flat_database() -> Database {
    Database { equations: flat_equations(), ..Database::default() }
}

/// Database with standard equations, ranks E..S and the
/// Sword > Axe > Lance > Sword triangle (+15 hit / +1 damage, mirrored).
#[must_use]
pub fn test_database() -> Database {
    let beats = |winner: &str, loser: &str| {
        (
            AdvantageEntry::against(loser).with_offense(15, 1),
            AdvantageEntry::against(winner).with_offense(-15, -1),
        )
    };
    let (sword_axe, axe_sword) = beats("Sword", "Axe");
    let (axe_lance, lance_axe) = beats("Axe", "Lance");
    let (lance_sword, sword_lance) = beats("Lance", "Sword");
    Database {
        weapon_ranks: vec![
            WeaponRank::new("E", 1),
            WeaponRank::new("D", 31),
            WeaponRank::new("C", 71).with_bonus(0, 0, 1, 0),
            WeaponRank::new("B", 121).with_bonus(5, 0, 1, 0),
            WeaponRank::new("A", 181).with_bonus(5, 0, 2, 0),
            WeaponRank::new("S", 251).with_bonus(10, 5, 2, 0),
        ],
        weapons: vec![
            WeaponTypeData::new("Sword").with_advantage(sword_axe).with_disadvantage(sword_lance),
            WeaponTypeData::new("Lance").with_advantage(lance_sword).with_disadvantage(lance_axe),
            WeaponTypeData::new("Axe").with_advantage(axe_lance).with_disadvantage(axe_sword),
            WeaponTypeData::new("Bow"),
            WeaponTypeData::new("Staff"),
        ],
        equations: standard_equations(),
        ..Database::default()
    }
}

/// Parse a database from RON text.
///
/// # Panics
///
/// Panics if the text is not a valid database.
#[must_use]
pub fn database_from_ron(text: &str) -> Database {
    ron::from_str(text).unwrap_or_else(|e| panic!("invalid test database: {e}"))
}

// ============================================================================
// Units and items
// ============================================================================

/// A unit with the given stats, on the map at `(x, 0)`.
#[must_use]
pub fn unit(nid: &str, team: Team, x: i32, stats: &[(&str, i32)]) -> Unit {
    stats
        .iter()
        .fold(Unit::new(nid, team).at(x, 0), |unit, (stat, value)| unit.with_stat(stat, *value))
}

/// A middling unit: 20 HP, 5 STR, 5 SKL, 5 SPD, 2 LCK, 2 DEF.
#[must_use]
pub fn soldier(nid: &str, team: Team, x: i32) -> Unit {
    unit(nid, team, x, &[("HP", 20), ("STR", 5), ("SKL", 5), ("SPD", 5), ("LCK", 2), ("DEF", 2)])
}

/// Iron sword: 5 might, 90 hit, 0 crit, 46 uses.
#[must_use]
pub fn iron_sword(nid: &str) -> Item {
    Item::weapon(nid, "Sword", 5, 90, 0).with_uses(46)
}

/// Iron lance: 7 might, 80 hit, 0 crit, 45 uses.
#[must_use]
pub fn iron_lance(nid: &str) -> Item {
    Item::weapon(nid, "Lance", 7, 80, 0).with_uses(45)
}

/// Iron axe: 8 might, 75 hit, 0 crit, 45 uses.
#[must_use]
pub fn iron_axe(nid: &str) -> Item {
    Item::weapon(nid, "Axe", 8, 75, 0).with_uses(45)
}

/// Javelin: 6 might, 65 hit, range 1-2.
#[must_use]
pub fn javelin(nid: &str) -> Item {
    Item::weapon(nid, "Lance", 6, 65, 0).with_uses(20).with_range(1, 2)
}

/// Heal staff: restores 10 HP, 11 exp per use.
#[must_use]
pub fn heal_staff(nid: &str) -> Item {
    let mut staff = Item::new(nid)
        .with_uses(30)
        .with_range(1, 1)
        .with_component(ItemComponent::Heal { amount: 10, formula: None })
        .with_component(ItemComponent::TargetAlly)
        .with_component(ItemComponent::Exp(11));
    staff.weapon_type = Some("Staff".to_owned());
    staff
}

/// Give `item` to `unit` and equip it if it is a weapon.
///
/// # Panics
///
/// Panics if the unit is missing or cannot wield the weapon.
pub fn arm(world: &mut World, db: &Database, unit: &str, item: Item) -> ItemId {
    let owner = UnitId::from(unit);
    let equip = item.is_weapon();
    let id = world.give_item(&owner, item).unwrap_or_else(|e| panic!("give item: {e}"));
    if equip {
        world.equip(db, &owner, &id).unwrap_or_else(|e| panic!("equip: {e}"));
    }
    id
}

/// Player `eirika` with an iron sword next to enemy `bandit` with an iron
/// axe, one weapon experience each.
#[must_use]
pub fn duel_world(db: &Database) -> World {
    let mut world = World::new();
    world.add_unit(soldier("eirika", Team::Player, 0).with_name("Eirika").with_wexp("Sword", 1));
    world.add_unit(soldier("bandit", Team::Enemy, 1).with_name("Bandit").with_wexp("Axe", 1));
    arm(&mut world, db, "eirika", iron_sword("eirika_sword"));
    arm(&mut world, db, "bandit", iron_axe("bandit_axe"));
    world
}

// ============================================================================
// Encounters
// ============================================================================

/// Everything an encounter left behind.
#[derive(Debug, Clone)]
pub struct EncounterRun {
    /// Reconciliation summary.
    pub summary: CombatSummary,
    /// Full encounter playback.
    pub playback: Playback,
    /// Committed actions.
    pub log: ActionLog,
}

/// Resolve an encounter without presentation.
///
/// # Errors
///
/// Propagates resolution errors.
pub fn run_encounter(db: &Database, world: &mut World, setup: CombatSetup, rng: &mut dyn CombatRng) -> Result<EncounterRun> {
    let mut log = ActionLog::new();
    let mut combat = MapCombat::new(setup);
    let summary = {
        let mut ctx = CombatContext::new(db, world, &mut log, rng);
        combat.run_to_completion(&mut ctx)?
    };
    Ok(EncounterRun { summary, playback: combat.full_playback().clone(), log })
}
