//! Phase state machine for one encounter.
//!
//! The solver plans the strike order once, then resolves one strike per
//! [`CombatPhaseSolver::step`]. Each step returns the phase's playback
//! events and the actions that commit it; the solver itself never mutates
//! the world, so the caller applies the actions before the next step. The
//! whole machine is plain data and can be serialized between steps.
//!
//! Strike plan for a single defender:
//!
//! ```text
//! attacker x1, splash x N, attacker x (count - 1), defender x count
//! ```
//!
//! `Vantage` on the defender moves the defender block in front. Several
//! primary defenders get one strike each with no counters. Splash strikes
//! never double and are never countered.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::calcs::CombatCalculator;
use crate::components::{CombatMode, ItemId, Position, UnitId};
use crate::data::{Database, RngMode};
use crate::error::{CombatError, Result};
use crate::item::Item;
use crate::playback::{CombatEvent, Mark, MarkKind, CRIT_TINT, HEAL_TINT, HIT_TINT};
use crate::rng::CombatRng;
use crate::unit::Unit;
use crate::world::World;

/// Who takes part in an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatSetup {
    /// Initiating unit.
    pub attacker: UnitId,
    /// Item the attacker uses.
    pub item: ItemId,
    /// Primary targets. Empty for a splash-only attack; the attacker itself
    /// for self-targeted items.
    #[serde(default)]
    pub defenders: Vec<UnitId>,
    /// Secondary targets of an area attack.
    #[serde(default)]
    pub splash: Vec<UnitId>,
    /// Started by the AI.
    #[serde(default)]
    pub ai_combat: bool,
    /// Started by a scripted event.
    #[serde(default)]
    pub event_combat: bool,
}

impl CombatSetup {
    /// Attack one defender.
    pub fn new(attacker: impl Into<UnitId>, item: impl Into<ItemId>, defender: impl Into<UnitId>) -> Self {
        Self {
            attacker: attacker.into(),
            item: item.into(),
            defenders: vec![defender.into()],
            splash: Vec::new(),
            ai_combat: false,
            event_combat: false,
        }
    }

    /// Add splash targets.
    #[must_use]
    pub fn with_splash(mut self, splash: impl IntoIterator<Item = UnitId>) -> Self {
        self.splash.extend(splash);
        self
    }

    /// Resolve engagement positions into participants. Empty tiles are
    /// ignored and a unit caught on several splash tiles is counted once.
    ///
    /// # Errors
    ///
    /// Returns an error if the attacker or item does not exist.
    pub fn from_positions(
        world: &World,
        attacker: &UnitId,
        item: &ItemId,
        main_positions: &[Position],
        splash_positions: &[Position],
    ) -> Result<Self> {
        world.unit(attacker)?;
        world.item(item)?;
        let defenders: Vec<UnitId> =
            main_positions.iter().filter_map(|pos| world.unit_at(*pos)).map(|unit| unit.nid.clone()).collect();
        let mut splash: Vec<UnitId> = Vec::new();
        for unit in splash_positions.iter().filter_map(|pos| world.unit_at(*pos)) {
            if !splash.contains(&unit.nid) && !defenders.contains(&unit.nid) {
                splash.push(unit.nid.clone());
            }
        }
        Ok(Self {
            attacker: attacker.clone(),
            item: item.clone(),
            defenders,
            splash,
            ai_combat: false,
            event_combat: false,
        })
    }

    /// The single primary defender, if there is exactly one.
    #[must_use]
    pub fn defender(&self) -> Option<&UnitId> {
        match self.defenders.as_slice() {
            [defender] => Some(defender),
            _ => None,
        }
    }

    /// Whether the attacker targets itself.
    #[must_use]
    pub fn is_self_target(&self) -> bool {
        self.defender() == Some(&self.attacker)
    }

    /// Every participant, attacker first, without duplicates.
    #[must_use]
    pub fn participants(&self) -> Vec<UnitId> {
        let mut units = vec![self.attacker.clone()];
        for unit in self.defenders.iter().chain(&self.splash) {
            if !units.contains(unit) {
                units.push(unit.clone());
            }
        }
        units
    }
}

/// Machine state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverState {
    /// Strike plan not built yet.
    #[default]
    Init,
    /// Choosing the next strike.
    BeginPhase,
    /// Resolving an attacker strike.
    Attack,
    /// Resolving a defender strike.
    Counter,
    /// Resolving a splash strike.
    Splash,
    /// Deciding whether any strike remains.
    CheckContinue,
    /// No strikes remain.
    Done,
}

/// Which side a strike belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrikeRole {
    /// The initiating unit.
    Attacker,
    /// The primary defender striking back.
    Defender,
    /// The attacker hitting a splash target.
    Splash,
}

impl StrikeRole {
    /// Combat mode of the acting unit.
    #[must_use]
    pub const fn mode(self) -> CombatMode {
        match self {
            Self::Attacker => CombatMode::Attack,
            Self::Defender => CombatMode::Defense,
            Self::Splash => CombatMode::Splash,
        }
    }

    const fn state(self) -> SolverState {
        match self {
            Self::Attacker => SolverState::Attack,
            Self::Defender => SolverState::Counter,
            Self::Splash => SolverState::Splash,
        }
    }
}

/// One planned strike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Strike {
    /// Side.
    pub role: StrikeRole,
    /// Acting unit.
    pub actor: UnitId,
    /// Item the actor strikes with, fixed when the plan is built.
    pub item: ItemId,
    /// Struck unit.
    pub target: UnitId,
}

/// Description of a resolved phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseDescriptor {
    /// The strike that was resolved.
    pub strike: Strike,
    /// Whether the actor targeted itself.
    pub mutual: bool,
    /// Attacker and splash strikes still planned.
    pub remaining_attacker: u32,
    /// Defender strikes still planned.
    pub remaining_defender: u32,
}

/// Everything one phase produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    /// The phase.
    pub descriptor: PhaseDescriptor,
    /// State changes, in application order.
    pub actions: Vec<Action>,
    /// Playback for this phase.
    pub events: Vec<CombatEvent>,
}

/// Result of a solver step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult {
    /// A phase was resolved.
    Continue(PhaseOutcome),
    /// The encounter has no more phases.
    Done,
}

/// The phase state machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatPhaseSolver {
    setup: CombatSetup,
    state: SolverState,
    queue: VecDeque<Strike>,
    current: Option<Strike>,
    cancelled: BTreeSet<UnitId>,
    phases: u32,
}

impl CombatPhaseSolver {
    /// Create a solver. The strike plan is built on the first step.
    #[must_use]
    pub fn new(setup: CombatSetup) -> Self {
        Self {
            setup,
            state: SolverState::Init,
            queue: VecDeque::new(),
            current: None,
            cancelled: BTreeSet::new(),
            phases: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SolverState {
        self.state
    }

    /// Participants.
    #[must_use]
    pub const fn setup(&self) -> &CombatSetup {
        &self.setup
    }

    /// Strikes not yet resolved.
    pub fn pending(&self) -> impl Iterator<Item = &Strike> {
        self.queue.iter()
    }

    /// Phases resolved so far.
    #[must_use]
    pub const fn phases(&self) -> u32 {
        self.phases
    }

    /// Whether no more phases will be produced.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == SolverState::Done
    }

    /// Resolve the next phase against the current world.
    ///
    /// # Errors
    ///
    /// Returns an error if a participant is missing or an equation is not
    /// registered.
    pub fn step(&mut self, db: &Database, world: &World, rng: &mut dyn CombatRng) -> Result<PhaseResult> {
        loop {
            match self.state {
                SolverState::Init => {
                    self.queue = self.plan(db, world)?;
                    tracing::debug!(strikes = self.queue.len(), "Strike plan built");
                    self.state = SolverState::BeginPhase;
                }
                SolverState::BeginPhase => {
                    let Some(strike) = self.queue.pop_front() else {
                        self.state = SolverState::Done;
                        continue;
                    };
                    if self.is_legal(world, &strike)? {
                        self.state = strike.role.state();
                        self.current = Some(strike);
                    } else {
                        self.state = SolverState::CheckContinue;
                    }
                }
                SolverState::Attack | SolverState::Counter | SolverState::Splash => {
                    let strike = self
                        .current
                        .take()
                        .ok_or_else(|| CombatError::InvalidState("Strike state without a strike".into()))?;
                    self.state = SolverState::CheckContinue;
                    if let Some(outcome) = self.resolve(db, world, rng, strike)? {
                        self.phases += 1;
                        return Ok(PhaseResult::Continue(outcome));
                    }
                }
                SolverState::CheckContinue => {
                    self.state = if self.queue.is_empty() { SolverState::Done } else { SolverState::BeginPhase };
                }
                SolverState::Done => return Ok(PhaseResult::Done),
            }
        }
    }

    fn strike(role: StrikeRole, actor: &UnitId, item: &ItemId, target: &UnitId) -> Strike {
        Strike { role, actor: actor.clone(), item: item.clone(), target: target.clone() }
    }

    fn plan(&self, db: &Database, world: &World) -> Result<VecDeque<Strike>> {
        let setup = &self.setup;
        let attacker = world.unit(&setup.attacker)?;
        let item = world.item(&setup.item)?;
        let splash: Vec<Strike> = setup
            .splash
            .iter()
            .map(|target| Self::strike(StrikeRole::Splash, &attacker.nid, &item.nid, target))
            .collect();

        let mut queue = VecDeque::new();
        match setup.defenders.as_slice() {
            [] => queue.extend(splash),
            [defender_id] if *defender_id == attacker.nid => {
                queue.push_back(Self::strike(StrikeRole::Attacker, &attacker.nid, &item.nid, &attacker.nid));
                queue.extend(splash);
            }
            [defender_id] => {
                let defender = world.unit(defender_id)?;
                let calc = CombatCalculator::new(db, world);

                let count = calc.outspeed(attacker, defender, item, CombatMode::Attack)?;
                let mut attacks = vec![Self::strike(StrikeRole::Attacker, &attacker.nid, &item.nid, &defender.nid)];
                attacks.extend(splash);
                for _ in 1..count {
                    attacks.push(Self::strike(StrikeRole::Attacker, &attacker.nid, &item.nid, &defender.nid));
                }

                let mut counters = Vec::new();
                let weapon = world.weapon_of(defender);
                if let Some(weapon) = weapon.filter(|_| calc.can_counterattack(attacker, item, defender)) {
                    let count = calc.outspeed(defender, attacker, weapon, CombatMode::Defense)?;
                    for _ in 0..count {
                        counters.push(Self::strike(StrikeRole::Defender, &defender.nid, &weapon.nid, &attacker.nid));
                    }
                }

                let vantage = world.skills_of(defender).any(|skill| skill.has_vantage());
                if vantage && !counters.is_empty() {
                    queue.extend(counters);
                    queue.extend(attacks);
                } else {
                    queue.extend(attacks);
                    queue.extend(counters);
                }
            }
            defenders => {
                for defender in defenders {
                    queue.push_back(Self::strike(StrikeRole::Attacker, &attacker.nid, &item.nid, defender));
                }
                queue.extend(splash);
            }
        }
        Ok(queue)
    }

    /// Whether the next strike may run. An actor that can no longer act
    /// loses every remaining strike; a fallen target only skips this one.
    fn is_legal(&mut self, world: &World, strike: &Strike) -> Result<bool> {
        if self.cancelled.contains(&strike.actor) {
            return Ok(false);
        }
        let actor = world.unit(&strike.actor)?;
        let item = world.item(&strike.item)?;
        if !actor.is_alive() || actor.is_dying || !item.available() || !actor.items.contains(&item.nid) {
            tracing::debug!(actor = %actor.nid, item = %item.nid, "Actor can no longer strike");
            self.cancel(&strike.actor);
            return Ok(false);
        }
        let target = world.unit(&strike.target)?;
        Ok(target.is_alive() && !target.is_dying)
    }

    fn cancel(&mut self, actor: &UnitId) {
        self.cancelled.insert(actor.clone());
        self.queue.retain(|strike| &strike.actor != actor);
    }

    fn roll_hit(mode: RngMode, rng: &mut dyn CombatRng, hit: i32) -> bool {
        match mode {
            RngMode::Classic => rng.roll() < hit,
            RngMode::TrueHit => {
                let first = rng.roll();
                let second = rng.roll();
                (first + second) / 2 < hit
            }
        }
    }

    fn resolve(
        &mut self,
        db: &Database,
        world: &World,
        rng: &mut dyn CombatRng,
        strike: Strike,
    ) -> Result<Option<PhaseOutcome>> {
        let calc = CombatCalculator::new(db, world);
        let actor = world.unit(&strike.actor)?;
        let target = world.unit(&strike.target)?;
        let item = world.item(&strike.item)?;
        let mode = strike.role.mode();

        let Some(hit) = calc.compute_hit(actor, target, item, mode)? else {
            tracing::debug!(actor = %actor.nid, item = %item.nid, "Item cannot strike, cancelling");
            self.cancel(&strike.actor);
            return Ok(None);
        };

        let mut events = Vec::new();
        let mut actions = Vec::new();
        if strike.role == StrikeRole::Defender {
            events.push(CombatEvent::DefenderPhase { defender: actor.nid.clone() });
        }
        if let Some(anim) = item.cast_anim() {
            events.push(CombatEvent::CastAnim { attacker: actor.nid.clone(), anim: anim.to_owned() });
        }
        if let Some(sound) = item.cast_sound() {
            events.push(CombatEvent::CastSound { sound: sound.to_owned() });
        }

        let heal = item.is_heal();
        let landed = Self::roll_hit(db.constants.rng_mode, rng, hit);
        let crit = landed
            && !heal
            && match calc.compute_crit(actor, target, item, mode)? {
                Some(chance) => rng.roll() < chance,
                None => false,
            };
        let kind = match (landed, crit) {
            (false, _) => MarkKind::Miss,
            (true, false) => MarkKind::Hit,
            (true, true) => MarkKind::Crit,
        };
        let mark = Mark { attacker: actor.nid.clone(), defender: target.nid.clone(), item: item.nid.clone(), kind };
        events.push(CombatEvent::from_mark(&mark));
        actions.push(Action::Mark(mark));

        let mut damage_dealt = None;
        if kind == MarkKind::Miss {
            events.push(CombatEvent::HitSound { sound: "Attack Miss".into() });
        } else if heal {
            if let Some(amount) = calc.compute_heal(actor, item)? {
                let true_amount = amount.min(target.max_hp() - target.current_hp).max(0);
                events.extend(heal_events(actor, item, target, amount, true_amount));
                actions.push(Action::change_hp(target, amount));
            }
        } else if let Some(damage) = calc.compute_damage(actor, target, item, mode, crit)? {
            let true_damage = damage.min(target.current_hp).max(0);
            events.extend(damage_events(actor, item, target, damage, true_damage, crit));
            actions.push(Action::change_hp(target, -damage));
            damage_dealt = Some(damage);
        }

        if let Some(action) = Action::use_item(world, &item.nid)? {
            actions.push(action);
        }
        let cost = item.mana_cost();
        if cost > 0 {
            actions.push(Action::change_mana(actor, -cost));
        }

        tracing::debug!(
            actor = %actor.nid,
            target = %target.nid,
            item = %item.nid,
            hit,
            outcome = ?kind,
            damage = ?damage_dealt,
            "Phase resolved"
        );

        let descriptor = PhaseDescriptor {
            mutual: strike.actor == strike.target,
            remaining_attacker: self.remaining(|role| role != StrikeRole::Defender),
            remaining_defender: self.remaining(|role| role == StrikeRole::Defender),
            strike,
        };
        Ok(Some(PhaseOutcome { descriptor, actions, events }))
    }

    fn remaining(&self, role: impl Fn(StrikeRole) -> bool) -> u32 {
        let count = self.queue.iter().filter(|strike| role(strike.role)).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

fn heal_events(actor: &Unit, item: &Item, target: &Unit, amount: i32, true_amount: i32) -> Vec<CombatEvent> {
    vec![
        CombatEvent::HealHit {
            attacker: actor.nid.clone(),
            item: item.nid.clone(),
            defender: target.nid.clone(),
            amount,
            true_amount,
        },
        CombatEvent::HitSound { sound: "MapHeal".into() },
        CombatEvent::HitAnim { anim: "MapHeal".into(), defender: target.nid.clone() },
        CombatEvent::UnitTintAdd { unit: target.nid.clone(), color: HEAL_TINT },
    ]
}

fn damage_events(actor: &Unit, item: &Item, target: &Unit, damage: i32, true_damage: i32, crit: bool) -> Vec<CombatEvent> {
    let (attacker, item, defender) = (actor.nid.clone(), item.nid.clone(), target.nid.clone());
    let mut events = Vec::new();
    if crit {
        events.push(CombatEvent::DamageCrit { attacker, item, defender: defender.clone(), damage, true_damage });
        events.push(CombatEvent::HitSound { sound: "Critical Hit".into() });
        events.push(CombatEvent::HitAnim { anim: "MapCritHit".into(), defender: defender.clone() });
        events.push(CombatEvent::Shake { magnitude: 3 });
        events.push(CombatEvent::CritTint { unit: defender.clone(), color: CRIT_TINT });
        events.push(CombatEvent::CritVibrate { unit: defender });
    } else if damage > 0 {
        events.push(CombatEvent::DamageHit { attacker, item, defender: defender.clone(), damage, true_damage });
        events.push(CombatEvent::HitSound { sound: "Attack Hit".into() });
        events.push(CombatEvent::HitAnim { anim: "MapHit".into(), defender: defender.clone() });
        events.push(CombatEvent::Shake { magnitude: 1 });
        events.push(CombatEvent::UnitTintAdd { unit: defender, color: HIT_TINT });
    } else {
        events.push(CombatEvent::DamageHit { attacker, item, defender: defender.clone(), damage, true_damage });
        events.push(CombatEvent::HitSound { sound: "No Damage".into() });
        events.push(CombatEvent::UnitTintSub { unit: defender, color: HIT_TINT });
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionLog;
    use crate::components::Team;
    use crate::equations::{self, EquationTable, Formula};
    use crate::item::ItemComponent;
    use crate::rng::{FixedRolls, PcgRng};
    use crate::skill::{Skill, SkillComponent};

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

    fn fighter(nid: &str, team: Team, spd: i32, x: i32) -> Unit {
        Unit::new(nid, team).with_stat("HP", 30).with_stat("STR", 5).with_stat("SPD", spd).at(x, 0)
    }

    fn armed(world: &mut World, db: &Database, unit: &str, item: Item) -> ItemId {
        let id = world.give_item(&unit.into(), item).unwrap();
        world.equip(db, &unit.into(), &id).unwrap();
        id
    }

    fn run(db: &Database, world: &mut World, setup: CombatSetup, rng: &mut dyn CombatRng) -> Vec<PhaseOutcome> {
        let mut solver = CombatPhaseSolver::new(setup);
        let mut log = ActionLog::new();
        let mut phases = Vec::new();
        while let PhaseResult::Continue(outcome) = solver.step(db, world, rng).unwrap() {
            for action in &outcome.actions {
                log.apply(world, action.clone()).unwrap();
            }
            phases.push(outcome);
        }
        assert!(solver.is_done());
        phases
    }

    fn roles(phases: &[PhaseOutcome]) -> Vec<StrikeRole> {
        phases.iter().map(|p| p.descriptor.strike.role).collect()
    }

    #[test]
    fn test_double_before_counter() {
        let db = db();
        let mut world = World::new();
        world.add_unit(fighter("a", Team::Player, 9, 0));
        world.add_unit(fighter("b", Team::Enemy, 4, 1));
        armed(&mut world, &db, "a", Item::weapon("sword", "Sword", 3, 100, 0));
        armed(&mut world, &db, "b", Item::weapon("axe", "Axe", 3, 100, 0));

        let phases = run(&db, &mut world, CombatSetup::new("a", "sword", "b"), &mut FixedRolls::always(0));
        assert_eq!(roles(&phases), vec![StrikeRole::Attacker, StrikeRole::Attacker, StrikeRole::Defender]);
        assert_eq!(phases[0].descriptor.remaining_attacker, 1);
        assert_eq!(phases[0].descriptor.remaining_defender, 1);
        assert!(matches!(phases[2].events[0], CombatEvent::DefenderPhase { .. }));
    }

    #[test]
    fn test_no_counter_without_weapon() {
        let db = db();
        let mut world = World::new();
        world.add_unit(fighter("a", Team::Player, 5, 0));
        world.add_unit(fighter("b", Team::Enemy, 5, 1));
        armed(&mut world, &db, "a", Item::weapon("sword", "Sword", 3, 100, 0));

        let phases = run(&db, &mut world, CombatSetup::new("a", "sword", "b"), &mut FixedRolls::always(0));
        assert_eq!(roles(&phases), vec![StrikeRole::Attacker]);
    }

    #[test]
    fn test_miss_still_marks() {
        let db = db();
        let mut world = World::new();
        world.add_unit(fighter("a", Team::Player, 5, 0));
        world.add_unit(fighter("b", Team::Enemy, 5, 1));
        armed(&mut world, &db, "a", Item::weapon("sword", "Sword", 3, 50, 0));

        let phases = run(&db, &mut world, CombatSetup::new("a", "sword", "b"), &mut FixedRolls::always(99));
        let outcome = &phases[0];
        assert!(matches!(outcome.actions[0], Action::Mark(Mark { kind: MarkKind::Miss, .. })));
        assert!(!outcome.actions.iter().any(|a| matches!(a, Action::SetHp { .. })));
        assert_eq!(world.unit(&"b".into()).unwrap().current_hp, 30);
    }

    #[test]
    fn test_dead_defender_loses_counter() {
        let db = db();
        let mut world = World::new();
        world.add_unit(fighter("a", Team::Player, 5, 0).with_stat("STR", 40));
        world.add_unit(fighter("b", Team::Enemy, 5, 1));
        armed(&mut world, &db, "a", Item::weapon("sword", "Sword", 3, 100, 0));
        armed(&mut world, &db, "b", Item::weapon("axe", "Axe", 3, 100, 0));

        let phases = run(&db, &mut world, CombatSetup::new("a", "sword", "b"), &mut FixedRolls::always(0));
        assert_eq!(roles(&phases), vec![StrikeRole::Attacker]);
        assert!(world.unit(&"b".into()).unwrap().is_lethal());
    }

    #[test]
    fn test_broken_item_cancels_remaining_strikes() {
        let db = db();
        let mut world = World::new();
        world.add_unit(fighter("a", Team::Player, 9, 0));
        world.add_unit(fighter("b", Team::Enemy, 4, 1));
        armed(&mut world, &db, "a", Item::weapon("sword", "Sword", 1, 100, 0).with_uses(1));

        let phases = run(&db, &mut world, CombatSetup::new("a", "sword", "b"), &mut FixedRolls::always(0));
        assert_eq!(phases.len(), 1);
        assert!(world.item(&"sword".into()).unwrap().is_broken());
    }

    #[test]
    fn test_vantage_swaps_order() {
        let db = db();
        let mut world = World::new();
        world.add_unit(fighter("a", Team::Player, 5, 0));
        world.add_unit(fighter("b", Team::Enemy, 5, 1));
        armed(&mut world, &db, "a", Item::weapon("sword", "Sword", 1, 100, 0));
        armed(&mut world, &db, "b", Item::weapon("axe", "Axe", 1, 100, 0));
        world.give_skill(&"b".into(), Skill::new("vantage", vec![SkillComponent::Vantage])).unwrap();

        let phases = run(&db, &mut world, CombatSetup::new("a", "sword", "b"), &mut FixedRolls::always(0));
        assert_eq!(roles(&phases), vec![StrikeRole::Defender, StrikeRole::Attacker]);
    }

    #[test]
    fn test_splash_only_has_no_counter_or_double() {
        let db = db();
        let mut world = World::new();
        world.add_unit(fighter("a", Team::Player, 20, 0));
        world.add_unit(fighter("b", Team::Enemy, 0, 2));
        world.add_unit(fighter("c", Team::Enemy, 0, 3));
        armed(&mut world, &db, "a", Item::weapon("bolting", "Dark", 2, 100, 0).with_range(2, 3));
        armed(&mut world, &db, "b", Item::weapon("bow", "Bow", 1, 100, 0).with_range(2, 2));

        let mut setup = CombatSetup::new("a", "bolting", "b").with_splash([UnitId::from("b"), UnitId::from("c")]);
        setup.defenders.clear();
        let phases = run(&db, &mut world, setup, &mut FixedRolls::always(0));
        assert_eq!(roles(&phases), vec![StrikeRole::Splash, StrikeRole::Splash]);
        assert_eq!(phases[1].descriptor.strike.target, UnitId::from("c"));
    }

    #[test]
    fn test_splash_follows_first_strike() {
        let db = db();
        let mut world = World::new();
        world.add_unit(fighter("a", Team::Player, 10, 0));
        world.add_unit(fighter("b", Team::Enemy, 0, 1));
        world.add_unit(fighter("c", Team::Enemy, 0, 2));
        armed(&mut world, &db, "a", Item::weapon("sword", "Sword", 1, 100, 0));

        let setup = CombatSetup::new("a", "sword", "b").with_splash([UnitId::from("c")]);
        let phases = run(&db, &mut world, setup, &mut FixedRolls::always(0));
        assert_eq!(roles(&phases), vec![StrikeRole::Attacker, StrikeRole::Splash, StrikeRole::Attacker]);
    }

    #[test]
    fn test_self_target_heal() {
        let db = db();
        let mut world = World::new();
        let mut unit = fighter("a", Team::Player, 5, 0);
        unit.current_hp = 10;
        world.add_unit(unit);
        world
            .give_item(
                &"a".into(),
                Item::new("vulnerary").with_uses(3).with_component(ItemComponent::Heal { amount: 10, formula: None }),
            )
            .unwrap();

        let phases = run(&db, &mut world, CombatSetup::new("a", "vulnerary", "a"), &mut FixedRolls::always(99));
        assert_eq!(phases.len(), 1);
        assert!(phases[0].descriptor.mutual);
        assert_eq!(world.unit(&"a".into()).unwrap().current_hp, 20);
        assert_eq!(world.item(&"vulnerary".into()).unwrap().uses.map(|u| u.current), Some(2));
    }

    #[test]
    fn test_true_hit_averages_two_rolls() {
        let mut rng = FixedRolls::new([90, 10, 90, 30], 0);
        assert!(CombatPhaseSolver::roll_hit(RngMode::TrueHit, &mut rng, 51));
        assert!(!CombatPhaseSolver::roll_hit(RngMode::TrueHit, &mut rng, 60));
        assert!(CombatPhaseSolver::roll_hit(RngMode::Classic, &mut rng, 1));
    }

    #[test]
    fn test_same_seed_same_playback() {
        let db = db();
        let mut base = World::new();
        base.add_unit(fighter("a", Team::Player, 9, 0).with_stat("SKL", 10));
        base.add_unit(fighter("b", Team::Enemy, 4, 1).with_stat("SKL", 10));
        armed(&mut base, &db, "a", Item::weapon("sword", "Sword", 3, 60, 10));
        armed(&mut base, &db, "b", Item::weapon("axe", "Axe", 3, 60, 10));

        let mut first = base.clone();
        let mut second = base.clone();
        let a = run(&db, &mut first, CombatSetup::new("a", "sword", "b"), &mut PcgRng::new(7));
        let b = run(&db, &mut second, CombatSetup::new("a", "sword", "b"), &mut PcgRng::new(7));
        assert_eq!(a, b);
        assert_eq!(first.state_hash(), second.state_hash());
    }

    #[test]
    fn test_from_positions() {
        let mut world = World::new();
        world.add_unit(fighter("a", Team::Player, 5, 0));
        world.add_unit(fighter("b", Team::Enemy, 5, 1));
        world.add_unit(fighter("c", Team::Enemy, 5, 2));
        world.give_item(&"a".into(), Item::weapon("sword", "Sword", 1, 100, 0)).unwrap();
        let setup = CombatSetup::from_positions(
            &world,
            &"a".into(),
            &"sword".into(),
            &[Position::new(1, 0)],
            &[Position::new(1, 0), Position::new(2, 0), Position::new(2, 0), Position::new(5, 5)],
        )
        .unwrap();
        assert_eq!(setup.defenders, vec![UnitId::from("b")]);
        assert_eq!(setup.splash, vec![UnitId::from("c")]);
        assert_eq!(setup.participants().len(), 3);
    }
}
