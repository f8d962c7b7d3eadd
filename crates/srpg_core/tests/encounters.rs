//! Full encounters resolved through `MapCombat`.

use srpg_core::calcs::CombatCalculator;
use srpg_core::combat::AfterCombat;
use srpg_core::components::{CombatMode, Team, UnitId};
use srpg_core::data::{CombatConstants, Database};
use srpg_core::item::Item;
use srpg_core::playback::CombatEvent;
use srpg_core::rng::FixedRolls;
use srpg_core::solver::CombatSetup;
use srpg_core::triangle::triangle_bonus;
use srpg_core::world::World;
use srpg_test_utils::fixtures::{arm, flat_database, run_encounter, test_database, unit};

fn no_crit(item: Item) -> Item {
    Item { crit: None, ..item }
}

fn damage_events<'a>(events: &'a [CombatEvent], attacker: &'a str) -> impl Iterator<Item = &'a CombatEvent> + 'a {
    events.iter().filter(move |e| e.as_damage().is_some_and(|(a, _, _)| a.as_str() == attacker))
}

#[test]
fn ranged_strike_against_unarmed_target() {
    let db = flat_database();
    let mut world = World::new();
    world.add_unit(unit("a", Team::Player, 0, &[("HP", 20), ("SKL", 70)]));
    world.add_unit(unit("b", Team::Enemy, 2, &[("HP", 20), ("SPD", 20), ("DEF", 3)]));
    let bow = arm(&mut world, &db, "a", no_crit(Item::weapon("longbow", "Bow", 8, 0, 0).with_range(2, 2)));

    let a = world.unit(&"a".into()).unwrap();
    let b = world.unit(&"b".into()).unwrap();
    let calc = CombatCalculator::new(&db, &world);
    let item = world.item(&bow).unwrap();
    assert_eq!(calc.compute_hit(a, b, item, CombatMode::Attack).unwrap(), Some(50));
    assert_eq!(calc.compute_damage(a, b, item, CombatMode::Attack, false).unwrap(), Some(5));

    let run = run_encounter(&db, &mut world, CombatSetup::new("a", "longbow", "b"), &mut FixedRolls::new([49], 99))
        .unwrap();
    assert_eq!(run.summary.phases, 1);
    assert_eq!(world.unit(&"b".into()).unwrap().current_hp, 15);
    assert_eq!(run.summary.after, AfterCombat::Wait);
}

#[test]
fn roll_at_hit_chance_misses() {
    let db = flat_database();
    let mut world = World::new();
    world.add_unit(unit("a", Team::Player, 0, &[("HP", 20), ("SKL", 70)]));
    world.add_unit(unit("b", Team::Enemy, 2, &[("HP", 20), ("SPD", 20), ("DEF", 3)]));
    arm(&mut world, &db, "a", no_crit(Item::weapon("longbow", "Bow", 8, 0, 0).with_range(2, 2)));

    let run =
        run_encounter(&db, &mut world, CombatSetup::new("a", "longbow", "b"), &mut FixedRolls::always(50)).unwrap();
    assert_eq!(run.playback.count_tag("mark_miss"), 1);
    assert_eq!(world.unit(&"b".into()).unwrap().current_hp, 20);
}

#[test]
fn faster_attacker_strikes_twice_before_counter() {
    let db = flat_database();
    let mut world = World::new();
    world.add_unit(unit("a", Team::Player, 0, &[("HP", 30), ("STR", 3), ("SKL", 100), ("SPD", 9)]));
    world.add_unit(unit("b", Team::Enemy, 1, &[("HP", 30), ("SPD", 4)]));
    arm(&mut world, &db, "a", no_crit(Item::weapon("sword", "Sword", 2, 0, 0)));

    let run = run_encounter(&db, &mut world, CombatSetup::new("a", "sword", "b"), &mut FixedRolls::always(0)).unwrap();
    let events = run.playback.events();
    assert_eq!(run.summary.phases, 2);
    assert_eq!(damage_events(events, "a").count(), 2);
    assert_eq!(damage_events(events, "b").count(), 0);
    assert!(!events.iter().any(|e| matches!(e, CombatEvent::DefenderPhase { .. })));
    assert_eq!(world.unit(&"b".into()).unwrap().current_hp, 20);
}

#[test]
fn crit_amplifies_before_defense() {
    let db = Database { constants: CombatConstants::default().with_crit(3, 1), ..flat_database() };
    let mut world = World::new();
    world.add_unit(unit("a", Team::Player, 0, &[("HP", 30), ("SKL", 100)]));
    world.add_unit(unit("b", Team::Enemy, 1, &[("HP", 60), ("DEF", 2)]));
    arm(&mut world, &db, "a", Item::weapon("killer", "Sword", 10, 0, 30));

    let run =
        run_encounter(&db, &mut world, CombatSetup::new("a", "killer", "b"), &mut FixedRolls::always(0)).unwrap();
    let crits: Vec<i32> = run
        .playback
        .iter()
        .filter_map(|e| match e {
            CombatEvent::DamageCrit { damage, .. } => Some(*damage),
            _ => None,
        })
        .collect();
    assert_eq!(crits, vec![38]);
    assert_eq!(world.unit(&"b".into()).unwrap().current_hp, 22);
}

#[test]
fn splash_only_exchange() {
    let db = flat_database();
    let mut world = World::new();
    world.add_unit(unit("a", Team::Player, 0, &[("HP", 30), ("STR", 2), ("SKL", 100), ("SPD", 30)]));
    world.add_unit(unit("b", Team::Enemy, 2, &[("HP", 30)]));
    world.add_unit(unit("c", Team::Enemy, 3, &[("HP", 30)]));
    arm(&mut world, &db, "a", no_crit(Item::weapon("meteor", "Dark", 5, 0, 0).with_range(2, 3)));
    arm(&mut world, &db, "b", Item::weapon("bow", "Bow", 4, 100, 0).with_range(2, 2));

    let mut setup = CombatSetup::new("a", "meteor", "b").with_splash([UnitId::from("b"), UnitId::from("c")]);
    setup.defenders.clear();
    let run = run_encounter(&db, &mut world, setup, &mut FixedRolls::always(0)).unwrap();

    assert_eq!(run.summary.phases, 2);
    assert_eq!(damage_events(run.playback.events(), "b").count(), 0);
    assert_eq!(world.unit(&"a".into()).unwrap().current_hp, 30);
    assert_eq!(world.unit(&"b".into()).unwrap().current_hp, 23);
    assert_eq!(world.unit(&"c".into()).unwrap().current_hp, 23);
}

#[test]
fn triangle_pairings_mirror() {
    let db = test_database();
    let holder = unit("u", Team::Player, 0, &[]);
    let types = ["Sword", "Lance", "Axe"];
    for own in types {
        for theirs in types {
            let mine = Item::weapon("mine", own, 5, 80, 0);
            let other = Item::weapon("other", theirs, 5, 80, 0);
            let forward = triangle_bonus(&db, &holder, Some(&mine), Some(&other));
            let backward = triangle_bonus(&db, &holder, Some(&other), Some(&mine));
            assert_eq!(forward.accuracy, -backward.accuracy, "{own} vs {theirs}");
            assert_eq!(forward.damage, -backward.damage, "{own} vs {theirs}");
        }
    }
    let sword = Item::weapon("s", "Sword", 5, 80, 0);
    let axe = Item::weapon("a", "Axe", 5, 80, 0);
    let bonus = triangle_bonus(&db, &holder, Some(&sword), Some(&axe));
    assert_eq!((bonus.accuracy, bonus.damage), (15, 1));
}

#[test]
fn kill_then_rewind_restores_everything() {
    let db = test_database();
    let mut world = World::new();
    world.add_unit(unit("seth", Team::Player, 0, &[("HP", 30), ("STR", 20), ("SKL", 20), ("SPD", 12)]).with_name("Seth"));
    world.add_unit(unit("grunt", Team::Enemy, 1, &[("HP", 10)]).with_name("Grunt"));
    arm(&mut world, &db, "seth", Item::weapon("silver", "Lance", 14, 100, 0));
    let before = world.clone();

    let mut run =
        run_encounter(&db, &mut world, CombatSetup::new("seth", "silver", "grunt"), &mut FixedRolls::always(0))
            .unwrap();
    assert!(world.unit(&"grunt".into()).unwrap().is_dying);
    assert_eq!(world.records.kills_by(&"seth".into()), 1);
    assert!(run.summary.exp_awards.iter().any(|a| a.unit.as_str() == "seth" && a.amount > 0));

    run.log.undo_all(&mut world).unwrap();
    assert_eq!(world, before);
}
