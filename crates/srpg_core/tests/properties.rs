//! Property tests for the calculator, the solver and the action log.

use proptest::prelude::*;

use srpg_core::action::ActionLog;
use srpg_core::calcs::CombatCalculator;
use srpg_core::components::{CombatMode, Team};
use srpg_core::data::{CombatConstants, Database};
use srpg_core::item::Item;
use srpg_core::rng::PcgRng;
use srpg_core::solver::{CombatPhaseSolver, CombatSetup, PhaseResult};
use srpg_core::unit::Unit;
use srpg_core::world::World;
use srpg_test_utils::determinism::strategies::{arb_constants, arb_seed, arb_unit, arb_weapon};
use srpg_test_utils::determinism::{verify_encounter_determinism, verify_undo_round_trip};
use srpg_test_utils::fixtures::{arm, flat_database, test_database};

fn duel(db: &Database, a: Unit, b: Unit, a_weapon: Item, b_weapon: Item) -> World {
    let mut world = World::new();
    world.add_unit(a);
    world.add_unit(b);
    arm(&mut world, db, "a", a_weapon);
    arm(&mut world, db, "b", b_weapon);
    world
}

fn duel_setup() -> CombatSetup {
    CombatSetup::new("a", "a_weapon", "b")
}

proptest! {
    /// Without triangle, rank or modifier effects, hit is accuracy minus
    /// avoid, clamped to a percentage.
    #[test]
    fn prop_hit_is_clamped_accuracy_minus_avoid(
        a in arb_unit("a", Team::Player, 0),
        b in arb_unit("b", Team::Enemy, 1),
        weapon in arb_weapon("a_weapon"),
    ) {
        let db = flat_database();
        let mut world = World::new();
        world.add_unit(a);
        world.add_unit(b);
        let id = arm(&mut world, &db, "a", weapon);

        let calc = CombatCalculator::new(&db, &world);
        let (a, b) = (world.unit(&"a".into()).unwrap(), world.unit(&"b".into()).unwrap());
        let item = world.item(&id).unwrap();
        let accuracy = calc.accuracy(a, item).unwrap().unwrap();
        let avoid = calc.avoid(b, Some(item)).unwrap();
        let hit = calc.compute_hit(a, b, item, CombatMode::Attack).unwrap();
        prop_assert_eq!(hit, Some((accuracy - avoid).clamp(0, 100)));
    }

    /// Damage never drops below the configured floor.
    #[test]
    fn prop_damage_respects_floor(
        a in arb_unit("a", Team::Player, 0),
        b in arb_unit("b", Team::Enemy, 1),
        a_weapon in arb_weapon("a_weapon"),
        b_weapon in arb_weapon("b_weapon"),
        constants in arb_constants(),
        crit in any::<bool>(),
    ) {
        let min_damage = constants.min_damage;
        let db = Database { constants, ..test_database() };
        let world = duel(&db, a, b, a_weapon, b_weapon);

        let calc = CombatCalculator::new(&db, &world);
        let (a, b) = (world.unit(&"a".into()).unwrap(), world.unit(&"b".into()).unwrap());
        let item = world.item(&"a_weapon".into()).unwrap();
        let damage = calc.compute_damage(a, b, item, CombatMode::Attack, crit).unwrap().unwrap();
        prop_assert!(damage >= min_damage);
    }

    /// Doubling switches on exactly at the speed threshold.
    #[test]
    fn prop_doubling_threshold_boundary(
        threshold in 1i32..8,
        target_speed in 0i32..20,
        short in any::<bool>(),
    ) {
        let db = Database {
            constants: CombatConstants::default().with_speed_to_double(threshold),
            ..flat_database()
        };
        let lead = if short { threshold - 1 } else { threshold };
        let mut world = World::new();
        world.add_unit(Unit::new("a", Team::Player).with_stat("HP", 20).with_stat("SPD", target_speed + lead).at(0, 0));
        world.add_unit(Unit::new("b", Team::Enemy).with_stat("HP", 20).with_stat("SPD", target_speed).at(1, 0));
        let id = arm(&mut world, &db, "a", Item::weapon("a_weapon", "Sword", 3, 80, 0));

        let calc = CombatCalculator::new(&db, &world);
        let (a, b) = (world.unit(&"a".into()).unwrap(), world.unit(&"b".into()).unwrap());
        let strikes = calc.outspeed(a, b, world.item(&id).unwrap(), CombatMode::Attack).unwrap();
        prop_assert_eq!(strikes, if short { 1 } else { 2 });
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Undoing one phase's actions restores the pre-phase world, for every
    /// phase of the encounter.
    #[test]
    fn prop_each_phase_undoes_exactly(
        a in arb_unit("a", Team::Player, 0),
        b in arb_unit("b", Team::Enemy, 1),
        a_weapon in arb_weapon("a_weapon"),
        b_weapon in arb_weapon("b_weapon"),
        seed in arb_seed(),
    ) {
        let db = test_database();
        let mut world = duel(&db, a, b, a_weapon, b_weapon);
        let mut log = ActionLog::new();
        let mut rng = PcgRng::new(seed);
        let mut solver = CombatPhaseSolver::new(duel_setup());

        while let PhaseResult::Continue(outcome) = solver.step(&db, &world, &mut rng).unwrap() {
            let snapshot = world.clone();
            let checkpoint = log.checkpoint();
            for action in &outcome.actions {
                log.apply(&mut world, action.clone()).unwrap();
            }
            log.rewind_to(&mut world, checkpoint).unwrap();
            prop_assert_eq!(&world, &snapshot);
            for action in outcome.actions {
                log.apply(&mut world, action).unwrap();
            }
        }
    }

    /// A whole encounter, reconciliation included, rewinds to its start.
    #[test]
    fn prop_encounter_rewinds(
        a in arb_unit("a", Team::Player, 0),
        b in arb_unit("b", Team::Enemy, 1),
        a_weapon in arb_weapon("a_weapon"),
        b_weapon in arb_weapon("b_weapon"),
        seed in arb_seed(),
    ) {
        let db = test_database();
        let world = duel(&db, a, b, a_weapon, b_weapon);
        prop_assert!(verify_undo_round_trip(&db, &world, duel_setup(), seed));
    }

    /// Identical inputs and seed give identical playback and world state.
    #[test]
    fn prop_encounters_are_deterministic(
        a in arb_unit("a", Team::Player, 0),
        b in arb_unit("b", Team::Enemy, 1),
        a_weapon in arb_weapon("a_weapon"),
        b_weapon in arb_weapon("b_weapon"),
        seed in arb_seed(),
    ) {
        let db = test_database();
        let world = duel(&db, a, b, a_weapon, b_weapon);
        let result = verify_encounter_determinism(2, &db, || world.clone(), duel_setup, seed);
        prop_assert!(result.is_deterministic);
    }
}
