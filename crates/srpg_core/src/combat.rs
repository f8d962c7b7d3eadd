//! Encounter orchestration.
//!
//! [`MapCombat`] drives a [`CombatPhaseSolver`] to exhaustion, one phase per
//! tick. Every phase's playback is appended to the encounter log and pushed
//! to the presentation observer before its actions are committed through
//! the [`ActionLog`]. Once the solver is done, reconciliation runs in a fixed
//! order (see [`MapCombat::update`]), again only by appending actions, so
//! the whole encounter can be rewound to [`MapCombat::checkpoint`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionLog};
use crate::components::{CombatMode, ItemId, SkillId, Team, UnitId};
use crate::data::Database;
use crate::error::Result;
use crate::hooks::{guarded, Component, LifecycleContext};
use crate::item::Item;
use crate::math::{truncate, Fixed};
use crate::playback::{CombatEvent, Playback};
use crate::records::{entries_from_playback, EncounterTallies, RecordEntry, RecordKind};
use crate::rng::CombatRng;
use crate::skill::Skill;
use crate::solver::{CombatPhaseSolver, CombatSetup, PhaseOutcome, PhaseResult};
use crate::unit::Unit;
use crate::world::World;

/// Experience awards never exceed one level.
pub const MAX_EXP_AWARD: i32 = 100;

// ============================================================================
// Collaborators
// ============================================================================

/// Push-only consumer of playback and committed actions.
pub trait PlaybackObserver {
    /// A phase's playback, before its actions are committed.
    fn on_phase(&mut self, events: &[CombatEvent]);

    /// Actions just committed.
    fn on_actions(&mut self, _actions: &[Action]) {}
}

/// Push-only consumer of finalized encounter statistics.
pub trait RecordKeeper {
    /// Called once per encounter during reconciliation.
    fn on_tallies(&mut self, tallies: &EncounterTallies);
}

/// Everything an encounter borrows from the host for one tick.
pub struct CombatContext<'a> {
    /// Content.
    pub db: &'a Database,
    /// Game state.
    pub world: &'a mut World,
    /// Undo history.
    pub log: &'a mut ActionLog,
    /// Roll source.
    pub rng: &'a mut dyn CombatRng,
    /// Presentation observer.
    pub presentation: Option<&'a mut dyn PlaybackObserver>,
    /// Statistics consumer.
    pub record_keeper: Option<&'a mut dyn RecordKeeper>,
}

impl<'a> CombatContext<'a> {
    /// Context without collaborators.
    pub fn new(db: &'a Database, world: &'a mut World, log: &'a mut ActionLog, rng: &'a mut dyn CombatRng) -> Self {
        Self { db, world, log, rng, presentation: None, record_keeper: None }
    }

    /// Attach a presentation observer.
    #[must_use]
    pub fn with_presentation(mut self, observer: &'a mut dyn PlaybackObserver) -> Self {
        self.presentation = Some(observer);
        self
    }

    /// Attach a record keeper.
    #[must_use]
    pub fn with_record_keeper(mut self, keeper: &'a mut dyn RecordKeeper) -> Self {
        self.record_keeper = Some(keeper);
        self
    }

    fn commit(&mut self, actions: Vec<Action>) -> Result<()> {
        if actions.is_empty() {
            return Ok(());
        }
        for action in &actions {
            self.log.apply(self.world, action.clone())?;
        }
        if let Some(observer) = self.presentation.as_deref_mut() {
            observer.on_actions(&actions);
        }
        Ok(())
    }

    fn commit_one(&mut self, action: Action) -> Result<()> {
        self.commit(vec![action])
    }
}

// ============================================================================
// Results
// ============================================================================

/// What the acting unit does after combat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AfterCombat {
    /// Back to the action menu.
    Menu,
    /// Move again with the remaining movement.
    Canto,
    /// Turn over for this unit.
    #[default]
    Wait,
    /// Control returns to the scripted event.
    Event,
}

/// Experience granted to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpAward {
    /// Unit.
    pub unit: UnitId,
    /// Experience.
    pub amount: i32,
}

/// Weapon experience granted to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WexpAward {
    /// Unit.
    pub unit: UnitId,
    /// Weapon type.
    pub weapon_type: String,
    /// Weapon experience.
    pub amount: i32,
}

/// Outcome of a finished encounter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatSummary {
    /// Phases resolved.
    pub phases: u32,
    /// Units now dying.
    pub dying: Vec<UnitId>,
    /// Experience granted.
    pub exp_awards: Vec<ExpAward>,
    /// Weapon experience granted.
    pub wexp_awards: Vec<WexpAward>,
    /// Items that broke and were removed.
    pub broken_items: Vec<ItemId>,
    /// Player-facing alerts (acquired and broken items).
    pub alerts: Vec<String>,
    /// Next step for the attacker.
    pub after: AfterCombat,
    /// Statistics of this encounter.
    pub tallies: EncounterTallies,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Orchestrator stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatStage {
    /// Pre- and start-of-combat hooks not run yet.
    #[default]
    Init,
    /// Asking the solver for the next phase.
    BeginPhase,
    /// Waiting for presentation before committing the pending phase.
    Anim,
    /// Reconciliation.
    Cleanup,
    /// Finished.
    Done,
}

#[derive(Debug, Clone, Copy)]
enum LifecycleHook {
    Pre,
    Start,
    End,
    Post,
}

impl LifecycleHook {
    const fn name(self) -> &'static str {
        match self {
            Self::Pre => "pre_combat",
            Self::Start => "start_combat",
            Self::End => "end_combat",
            Self::Post => "post_combat",
        }
    }
}

/// A unit taking part in lifecycle hooks.
#[derive(Debug, Clone)]
struct Participant {
    unit: UnitId,
    item: Option<ItemId>,
    target: Option<UnitId>,
    mode: CombatMode,
}

/// One encounter, driven tick by tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapCombat {
    setup: CombatSetup,
    solver: CombatPhaseSolver,
    stage: CombatStage,
    skip: bool,
    defender_items: Vec<(UnitId, Option<ItemId>)>,
    playback: Playback,
    full_playback: Playback,
    pending: Option<PhaseOutcome>,
    checkpoint: Option<usize>,
    summary: Option<CombatSummary>,
}

impl MapCombat {
    /// Create an encounter.
    #[must_use]
    pub fn new(setup: CombatSetup) -> Self {
        Self {
            solver: CombatPhaseSolver::new(setup.clone()),
            setup,
            stage: CombatStage::Init,
            skip: false,
            defender_items: Vec::new(),
            playback: Playback::new(),
            full_playback: Playback::new(),
            pending: None,
            checkpoint: None,
            summary: None,
        }
    }

    /// Participants.
    #[must_use]
    pub const fn setup(&self) -> &CombatSetup {
        &self.setup
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> CombatStage {
        self.stage
    }

    /// Playback of the most recent phase.
    #[must_use]
    pub const fn playback(&self) -> &Playback {
        &self.playback
    }

    /// Playback of the whole encounter so far.
    #[must_use]
    pub const fn full_playback(&self) -> &Playback {
        &self.full_playback
    }

    /// Action log position before the encounter's first action.
    #[must_use]
    pub const fn checkpoint(&self) -> Option<usize> {
        self.checkpoint
    }

    /// Summary once finished.
    #[must_use]
    pub const fn summary(&self) -> Option<&CombatSummary> {
        self.summary.as_ref()
    }

    /// Whether reconciliation has run.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.stage == CombatStage::Done
    }

    /// Stop waiting on presentation. Numeric outcomes are unaffected.
    pub fn skip(&mut self) {
        self.skip = true;
    }

    /// Advance the encounter. `can_advance` is the presentation gate for the
    /// pending phase; it is ignored once [`Self::skip`] was called. Returns
    /// `true` once the encounter is finished.
    ///
    /// Reconciliation order: has-attacked, messages, dying units, item drops,
    /// weapon experience, experience, records, end- and post-combat hooks,
    /// broken items, death hooks.
    ///
    /// # Errors
    ///
    /// Returns an error if a participant is missing, an equation is not
    /// registered or an action cannot be applied.
    pub fn update(&mut self, ctx: &mut CombatContext<'_>, can_advance: bool) -> Result<bool> {
        loop {
            match self.stage {
                CombatStage::Init => {
                    self.begin(ctx)?;
                    self.stage = CombatStage::BeginPhase;
                }
                CombatStage::BeginPhase => match self.solver.step(ctx.db, ctx.world, &mut *ctx.rng)? {
                    PhaseResult::Continue(outcome) => {
                        self.playback.clear();
                        self.playback.extend(outcome.events.iter().cloned());
                        self.full_playback.extend(outcome.events.iter().cloned());
                        if let Some(observer) = ctx.presentation.as_deref_mut() {
                            observer.on_phase(&outcome.events);
                        }
                        self.pending = Some(outcome);
                        self.stage = CombatStage::Anim;
                    }
                    PhaseResult::Done => self.stage = CombatStage::Cleanup,
                },
                CombatStage::Anim => {
                    if !(self.skip || can_advance) {
                        return Ok(false);
                    }
                    if let Some(outcome) = self.pending.take() {
                        ctx.commit(outcome.actions)?;
                    }
                    self.stage = CombatStage::BeginPhase;
                    if !self.skip {
                        return Ok(false);
                    }
                }
                CombatStage::Cleanup => {
                    let summary = self.clean_up(ctx)?;
                    tracing::info!(
                        attacker = %self.setup.attacker,
                        phases = summary.phases,
                        dying = summary.dying.len(),
                        "Combat finished"
                    );
                    self.summary = Some(summary);
                    self.stage = CombatStage::Done;
                }
                CombatStage::Done => return Ok(true),
            }
        }
    }

    /// Skip presentation and run to the end.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update`].
    pub fn run_to_completion(&mut self, ctx: &mut CombatContext<'_>) -> Result<CombatSummary> {
        self.skip();
        while !self.update(ctx, true)? {}
        Ok(self.summary.clone().unwrap_or_default())
    }

    fn begin(&mut self, ctx: &mut CombatContext<'_>) -> Result<()> {
        self.checkpoint = Some(ctx.log.checkpoint());
        ctx.world.unit(&self.setup.attacker)?;
        ctx.world.item(&self.setup.item)?;
        self.defender_items = self
            .setup
            .defenders
            .iter()
            .map(|id| {
                let defender = ctx.world.unit(id)?;
                Ok((id.clone(), ctx.world.weapon_of(defender).map(|item| item.nid.clone())))
            })
            .collect::<Result<_>>()?;
        tracing::info!(
            attacker = %self.setup.attacker,
            item = %self.setup.item,
            defenders = ?self.setup.defenders,
            splash = ?self.setup.splash,
            "Combat started"
        );
        self.run_hooks(ctx, LifecycleHook::Pre)?;
        self.run_hooks(ctx, LifecycleHook::Start)
    }

    // ========================================================================
    // Lifecycle hooks
    // ========================================================================

    fn participants(&self) -> Vec<Participant> {
        let setup = &self.setup;
        let mut participants = vec![Participant {
            unit: setup.attacker.clone(),
            item: Some(setup.item.clone()),
            target: setup.defender().cloned(),
            mode: CombatMode::Attack,
        }];
        for (defender, item) in &self.defender_items {
            if *defender != setup.attacker {
                participants.push(Participant {
                    unit: defender.clone(),
                    item: item.clone(),
                    target: Some(setup.attacker.clone()),
                    mode: CombatMode::Defense,
                });
            }
        }
        for unit in &setup.splash {
            if participants.iter().all(|p| &p.unit != unit) {
                participants.push(Participant { unit: unit.clone(), item: None, target: None, mode: CombatMode::Defense });
            }
        }
        participants
    }

    fn run_hooks(&self, ctx: &mut CombatContext<'_>, hook: LifecycleHook) -> Result<()> {
        for participant in self.participants() {
            let skills = ctx.world.unit(&participant.unit)?.skills.clone();
            for skill_id in skills {
                let count = ctx.world.skill(&skill_id)?.components.len();
                // Each component sees the state left by the previous one.
                for index in 0..count {
                    let actions = self.hook_actions(ctx, hook, &participant, &skill_id, index)?;
                    ctx.commit(actions)?;
                }
            }
        }
        Ok(())
    }

    fn hook_actions(
        &self,
        ctx: &CombatContext<'_>,
        hook: LifecycleHook,
        participant: &Participant,
        skill_id: &SkillId,
        index: usize,
    ) -> Result<Vec<Action>> {
        let world: &World = &*ctx.world;
        let skill: &Skill = world.skill(skill_id)?;
        let Some(component) = skill.components.get(index) else {
            return Ok(Vec::new());
        };
        let component: &dyn Component = component;
        let Some(lifecycle) = component.as_lifecycle() else {
            return Ok(Vec::new());
        };
        let lc = LifecycleContext {
            db: ctx.db,
            world,
            playback: self.full_playback.events(),
            skill,
            unit: world.unit(&participant.unit)?,
            item: participant.item.as_ref().and_then(|id| world.items.get(id)),
            target: participant.target.as_ref().and_then(|id| world.units.get(id)),
            mode: participant.mode,
        };
        let result = match hook {
            LifecycleHook::Pre => lifecycle.pre_combat(&lc),
            LifecycleHook::Start => lifecycle.start_combat(&lc),
            LifecycleHook::End => lifecycle.end_combat(&lc),
            LifecycleHook::Post => lifecycle.post_combat(&lc),
        };
        Ok(guarded(hook.name(), component, result, Vec::new()))
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    fn clean_up(&self, ctx: &mut CombatContext<'_>) -> Result<CombatSummary> {
        let mut summary = CombatSummary { phases: self.solver.phases(), ..CombatSummary::default() };
        let attacker_id = self.setup.attacker.clone();

        // 1. The attacker has acted.
        let action = Action::has_attacked(ctx.world.unit(&attacker_id)?);
        ctx.commit_one(action)?;

        // 2. Narrative.
        let message = self.combat_message(ctx.world)?;
        ctx.commit_one(Action::message(message))?;

        // 3. Lethal HP becomes dying.
        let all_units = self.setup.participants();
        for id in &all_units {
            let unit = ctx.world.unit(id)?;
            if unit.is_lethal() && !unit.is_dying {
                let action = Action::set_dying(unit);
                ctx.commit_one(action)?;
            }
        }
        summary.dying = all_units.iter().filter(|id| ctx.world.units.get(*id).is_some_and(|u| u.is_dying)).cloned().collect();
        let messages = death_messages(ctx.world, &summary.dying)?;
        ctx.commit(messages)?;
        summary.after = self.after_combat(ctx.world)?;

        // 4. Drops.
        self.handle_item_gain(ctx, &all_units, &mut summary)?;

        // 5. Weapon experience.
        let defender = self.setup.defender().filter(|id| **id != attacker_id).cloned();
        if !ctx.world.unit(&attacker_id)?.is_dying {
            self.handle_wexp(ctx, &attacker_id, &self.setup.item, &mut summary)?;
        }
        if let Some(defender) = &defender {
            if let Some(item) = self.defender_item(defender) {
                if !ctx.world.unit(defender)?.is_dying {
                    self.handle_wexp(ctx, defender, &item, &mut summary)?;
                }
            }
        }

        // 6. Experience.
        self.award_exp(ctx, &mut summary)?;

        // 7. Records.
        summary.tallies = self.handle_records(ctx)?;
        if let Some(keeper) = ctx.record_keeper.as_deref_mut() {
            keeper.on_tallies(&summary.tallies);
        }

        // 8. Hooks bracketing the phase loop.
        self.run_hooks(ctx, LifecycleHook::End)?;
        self.run_hooks(ctx, LifecycleHook::Post)?;

        // 9. Broken items.
        self.handle_broken_items(ctx, &mut summary)?;

        // 10. Death hooks.
        for id in &summary.dying {
            let unit = ctx.world.unit(id)?.clone();
            let actions: Vec<Action> = ctx
                .world
                .skills_of(&unit)
                .flat_map(Skill::hook_sources)
                .filter_map(|component| component.as_death_hook())
                .flat_map(|hook| hook.on_death(&unit))
                .collect();
            ctx.commit(actions)?;
        }
        Ok(summary)
    }

    fn defender_item(&self, defender: &UnitId) -> Option<ItemId> {
        self.defender_items.iter().find(|(id, _)| id == defender).and_then(|(_, item)| item.clone())
    }

    fn combat_message(&self, world: &World) -> Result<String> {
        let attacker = world.unit(&self.setup.attacker)?;
        let Some(defender_id) = self.setup.defender() else {
            return Ok(format!("{} attacked", attacker.name));
        };
        let defender = world.unit(defender_id)?;
        Ok(if attacker.team.is_enemy_of(defender.team) {
            format!("{} attacked {}", attacker.name, defender.name)
        } else if attacker.nid != defender.nid {
            format!("{} helped {}", attacker.name, defender.name)
        } else {
            format!("{} used {}", attacker.name, world.item(&self.setup.item)?.name)
        })
    }

    fn after_combat(&self, world: &World) -> Result<AfterCombat> {
        let attacker = world.unit(&self.setup.attacker)?;
        let canto = world.skills_of(attacker).any(Skill::has_canto);
        let after = if self.setup.event_combat {
            AfterCombat::Event
        } else if self.setup.ai_combat {
            if canto {
                AfterCombat::Canto
            } else {
                AfterCombat::Wait
            }
        } else if attacker.is_dying {
            AfterCombat::Wait
        } else if !attacker.has_attacked || world.item(&self.setup.item)?.menu_after_combat() {
            AfterCombat::Menu
        } else if canto {
            AfterCombat::Canto
        } else {
            AfterCombat::Wait
        };
        Ok(after)
    }

    fn handle_item_gain(&self, ctx: &mut CombatContext<'_>, all_units: &[UnitId], summary: &mut CombatSummary) -> Result<()> {
        let attacker_id = &self.setup.attacker;
        for id in all_units.iter().filter(|id| *id != attacker_id) {
            if ctx.world.unit(id)?.is_dying {
                drop_items(ctx, id, attacker_id, summary)?;
            }
        }
        if ctx.world.unit(attacker_id)?.is_dying {
            if let Some(defender) = self.setup.defender().filter(|id| *id != attacker_id) {
                drop_items(ctx, attacker_id, defender, summary)?;
            }
        }
        Ok(())
    }

    fn handle_wexp(&self, ctx: &mut CombatContext<'_>, unit_id: &UnitId, item_id: &ItemId, summary: &mut CombatSummary) -> Result<()> {
        let db = ctx.db;
        let constants = &db.constants;
        let item = ctx.world.item(item_id)?;
        let Some(weapon_type) = item.weapon_type.clone() else {
            return Ok(());
        };
        let wexp = item.wexp().unwrap_or(constants.default_wexp);
        if wexp == 0 {
            return Ok(());
        }
        let kills: Vec<bool> = self
            .full_playback
            .marks(constants.miss_wexp)
            .filter(|mark| &mark.attacker == unit_id)
            .map(|mark| ctx.world.units.get(&mark.defender).is_some_and(|u| u.is_dying))
            .collect();
        let gains: Vec<i32> = if constants.double_wexp {
            kills.iter().map(|&kill| if kill && constants.kill_wexp { wexp * 2 } else { wexp }).collect()
        } else if kills.is_empty() {
            Vec::new()
        } else if constants.kill_wexp && kills.iter().any(|&kill| kill) {
            vec![wexp * 2]
        } else {
            vec![wexp]
        };
        for amount in gains {
            let action = Action::gain_wexp(ctx.world.unit(unit_id)?, &weapon_type, amount);
            ctx.commit_one(action)?;
            summary.wexp_awards.push(WexpAward { unit: unit_id.clone(), weapon_type: weapon_type.clone(), amount });
        }
        Ok(())
    }

    fn award_exp(&self, ctx: &mut CombatContext<'_>, summary: &mut CombatSummary) -> Result<()> {
        let min_exp = ctx.db.constants.min_exp;
        let attacker = ctx.world.unit(&self.setup.attacker)?;
        let defender = self.setup.defender().map(|id| ctx.world.unit(id)).transpose()?;

        let award = if attacker.team.is_player() && !attacker.is_dying {
            let item = ctx.world.items.get(&self.setup.item);
            let exp = self.encounter_exp(ctx.db, ctx.world, attacker, item);
            let non_hostile =
                defender.is_some_and(|d| attacker.team.is_allied_with(d.team) || d.has_tag("Tile"));
            let floor = if non_hostile { 0 } else { min_exp };
            Some((attacker.nid.clone(), exp.clamp(floor, MAX_EXP_AWARD)))
        } else {
            match defender {
                Some(defender) if defender.team.is_player() && !defender.is_dying => {
                    let item = self.defender_item(&defender.nid).and_then(|id| ctx.world.items.get(&id));
                    let exp = self.encounter_exp(ctx.db, ctx.world, defender, item);
                    Some((defender.nid.clone(), exp.clamp(min_exp, MAX_EXP_AWARD)))
                }
                _ => None,
            }
        };

        if let Some((unit_id, amount)) = award.filter(|(_, amount)| *amount > 0) {
            let action = Action::gain_exp(ctx.world.unit(&unit_id)?, amount);
            ctx.commit_one(action)?;
            tracing::debug!(unit = %unit_id, amount, "Experience awarded");
            summary.exp_awards.push(ExpAward { unit: unit_id, amount });
        }
        Ok(())
    }

    /// Experience `unit` earned from its landed strikes, counting each
    /// opponent once.
    fn encounter_exp(&self, db: &Database, world: &World, unit: &Unit, item: Option<&Item>) -> i32 {
        let constants = &db.constants;
        let mut seen = BTreeSet::new();
        let mut total = Fixed::ZERO;
        for mark in self.full_playback.marks(false).filter(|mark| mark.attacker == unit.nid) {
            if !seen.insert(mark.defender.clone()) {
                continue;
            }
            let Some(target) = world.units.get(&mark.defender) else {
                continue;
            };
            let base = match item.and_then(Item::exp) {
                Some(exp) => exp,
                None if unit.team.is_enemy_of(target.team) => {
                    (constants.base_exp + (target.level - unit.level) * constants.exp_level_factor).max(0)
                }
                None => 0,
            };
            let mut exp = Fixed::from_num(base);
            for skill in world.skills_of(unit) {
                for modifier in skill.hook_sources().filter_map(|c| c.as_exp_modifier()) {
                    exp = exp.saturating_mul(modifier.exp_multiplier(unit, target));
                }
            }
            for skill in world.skills_of(target) {
                for modifier in skill.hook_sources().filter_map(|c| c.as_exp_modifier()) {
                    exp = exp.saturating_mul(modifier.enemy_exp_multiplier(target, unit));
                }
            }
            if target.is_dying {
                exp = exp.saturating_mul(constants.kill_factor());
                if target.has_tag("Boss") {
                    exp = exp.saturating_add(Fixed::from_num(constants.boss_bonus));
                }
            }
            total = total.saturating_add(exp);
        }
        truncate(total)
    }

    fn handle_records(&self, ctx: &mut CombatContext<'_>) -> Result<EncounterTallies> {
        let mut entries = entries_from_playback(&self.full_playback);

        let mut pairs = BTreeSet::new();
        let mut deaths = Vec::new();
        for mark in self.full_playback.marks(true) {
            for (killer, victim) in [(&mark.attacker, &mark.defender), (&mark.defender, &mark.attacker)] {
                let Some(victim_unit) = ctx.world.units.get(victim) else {
                    continue;
                };
                if !victim_unit.is_dying || !pairs.insert((killer.clone(), victim.clone())) {
                    continue;
                }
                // Kills and deaths are credited to the pair, not a weapon.
                entries.push(RecordEntry::new(RecordKind::Kill, killer.clone(), victim.clone(), None));
                deaths.push((
                    RecordEntry::new(RecordKind::Death, victim.clone(), killer.clone(), None),
                    victim_unit.team == Team::Player,
                ));
            }
        }

        let tallies =
            EncounterTallies::from_entries(entries.iter().chain(deaths.iter().map(|(entry, _)| entry)));
        ctx.commit(entries.into_iter().map(Action::UpdateRecords).collect())?;
        for (entry, persistent) in deaths {
            if persistent {
                ctx.world.records.push_persistent(entry);
            } else {
                ctx.commit_one(Action::UpdateRecords(entry))?;
            }
        }
        Ok(tallies)
    }

    fn handle_broken_items(&self, ctx: &mut CombatContext<'_>, summary: &mut CombatSummary) -> Result<()> {
        let mut held: Vec<(UnitId, ItemId)> = vec![(self.setup.attacker.clone(), self.setup.item.clone())];
        if let Some(defender) = self.setup.defender().filter(|id| **id != self.setup.attacker) {
            if let Some(item) = self.defender_item(defender) {
                held.push((defender.clone(), item));
            }
        }
        let self_target = self.setup.is_self_target();
        for (unit_id, item_id) in held {
            let item = ctx.world.item(&item_id)?;
            let unit = ctx.world.unit(&unit_id)?;
            if !item.is_broken() || !unit.items.contains(&item_id) {
                continue;
            }
            let alert = (!self_target && unit.team.is_player() && !unit.is_dying)
                .then(|| format!("{} broke", item.name));
            let action = Action::remove_item(ctx.world, &item_id, &unit_id)?;
            ctx.commit_one(action)?;
            summary.broken_items.push(item_id);
            summary.alerts.extend(alert);
        }
        Ok(())
    }
}

fn death_messages(world: &World, dying: &[UnitId]) -> Result<Vec<Action>> {
    let units = dying.iter().map(|id| world.unit(id)).collect::<Result<Vec<_>>>()?;
    let player_side_lost = units.iter().any(|u| u.team.is_allied_with(Team::Player));
    Ok(units
        .iter()
        .map(|unit| {
            if !unit.team.is_allied_with(Team::Player) && !player_side_lost {
                Action::message(format!("Prevailed over {}", unit.name))
            } else {
                Action::message(format!("{} was defeated", unit.name))
            }
        })
        .collect())
}

fn drop_items(ctx: &mut CombatContext<'_>, from: &UnitId, to: &UnitId, summary: &mut CombatSummary) -> Result<()> {
    let droppable: Vec<ItemId> = ctx
        .world
        .unit(from)?
        .items
        .iter()
        .filter(|id| ctx.world.items.get(*id).is_some_and(|item| item.droppable))
        .cloned()
        .collect();
    for item_id in droppable {
        let action = Action::drop_item(ctx.world, &item_id, from, to)?;
        ctx.commit_one(action)?;
        let receiver = &ctx.world.unit(to)?.name;
        let item = &ctx.world.item(&item_id)?.name;
        summary.alerts.push(format!("{receiver} acquired {item}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equations::{self, EquationTable, Formula};
    use crate::item::ItemComponent;
    use crate::rng::FixedRolls;
    use crate::skill::SkillComponent;

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

    fn world(attacker_str: i32) -> World {
        let db = db();
        let mut world = World::new();
        world.add_unit(
            Unit::new("eirika", Team::Player)
                .with_name("Eirika")
                .with_stat("HP", 20)
                .with_stat("STR", attacker_str)
                .with_stat("SPD", 5)
                .at(0, 0),
        );
        world.add_unit(
            Unit::new("bandit", Team::Enemy)
                .with_name("Bandit")
                .with_stat("HP", 20)
                .with_stat("STR", 2)
                .with_stat("SPD", 5)
                .at(1, 0),
        );
        let sword = world.give_item(&"eirika".into(), Item::weapon("rapier", "Sword", 5, 100, 0).with_uses(2)).unwrap();
        world.equip(&db, &"eirika".into(), &sword).unwrap();
        let axe = world.give_item(&"bandit".into(), Item::weapon("iron_axe", "Axe", 5, 100, 0)).unwrap();
        world.equip(&db, &"bandit".into(), &axe).unwrap();
        world.give_item(&"bandit".into(), Item::new("gold").droppable()).unwrap();
        world
    }

    fn run(db: &Database, world: &mut World, log: &mut ActionLog, setup: CombatSetup) -> CombatSummary {
        let mut rng = FixedRolls::always(0);
        let mut ctx = CombatContext::new(db, world, log, &mut rng);
        MapCombat::new(setup).run_to_completion(&mut ctx).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        phases: usize,
        tallies: usize,
        last_tallies: EncounterTallies,
    }

    impl PlaybackObserver for Recorder {
        fn on_phase(&mut self, _events: &[CombatEvent]) {
            self.phases += 1;
        }
    }

    impl RecordKeeper for Recorder {
        fn on_tallies(&mut self, tallies: &EncounterTallies) {
            self.tallies += 1;
            self.last_tallies = tallies.clone();
        }
    }

    #[test]
    fn test_exchange_without_kill() {
        let db = db();
        let mut world = world(0);
        let mut log = ActionLog::new();
        let summary = run(&db, &mut world, &mut log, CombatSetup::new("eirika", "rapier", "bandit"));

        assert_eq!(summary.phases, 2);
        assert!(summary.dying.is_empty());
        assert_eq!(world.unit(&"bandit".into()).unwrap().current_hp, 15);
        assert_eq!(world.unit(&"eirika".into()).unwrap().current_hp, 13);
        assert!(world.unit(&"eirika".into()).unwrap().has_attacked);
        assert_eq!(world.messages, vec!["Eirika attacked Bandit".to_string()]);
        // Same level, no kill: base exp.
        assert_eq!(summary.exp_awards, vec![ExpAward { unit: "eirika".into(), amount: 10 }]);
        assert_eq!(world.unit(&"eirika".into()).unwrap().wexp_for("Sword"), 1);
        assert_eq!(summary.after, AfterCombat::Wait);
    }

    #[test]
    fn test_kill_reconciliation() {
        let db = db();
        let mut world = world(20);
        let mut log = ActionLog::new();
        let summary = run(&db, &mut world, &mut log, CombatSetup::new("eirika", "rapier", "bandit"));

        assert_eq!(summary.dying, vec![UnitId::from("bandit")]);
        assert!(world.unit(&"bandit".into()).unwrap().is_dying);
        assert!(world.messages.contains(&"Prevailed over Bandit".to_string()));
        assert_eq!(world.item(&"gold".into()).unwrap().owner, Some(UnitId::from("eirika")));
        assert_eq!(summary.alerts, vec!["Eirika acquired gold".to_string()]);
        assert_eq!(world.unit(&"eirika".into()).unwrap().wexp_for("Sword"), 2);
        assert_eq!(summary.exp_awards[0].amount, 30);
        assert_eq!(world.records.kills_by(&"eirika".into()), 1);
        assert_eq!(world.records.deaths_of(&"bandit".into()), 1);
    }

    #[test]
    fn test_rewind_restores_world() {
        let db = db();
        let mut world = world(20);
        let before = world.clone();
        let mut log = ActionLog::new();
        run(&db, &mut world, &mut log, CombatSetup::new("eirika", "rapier", "bandit"));
        assert_ne!(world, before);
        log.undo_all(&mut world).unwrap();
        assert_eq!(world, before);
    }

    #[test]
    fn test_broken_item_removed_with_alert() {
        let db = db();
        let mut world = world(0);
        if let Some(uses) = world.item_mut(&"rapier".into()).unwrap().uses.as_mut() {
            uses.current = 1;
        }
        let mut log = ActionLog::new();
        let summary = run(&db, &mut world, &mut log, CombatSetup::new("eirika", "rapier", "bandit"));
        assert_eq!(summary.broken_items, vec![ItemId::from("rapier")]);
        assert_eq!(summary.alerts, vec!["rapier broke".to_string()]);
        assert!(!world.unit(&"eirika".into()).unwrap().items.contains(&"rapier".into()));
    }

    #[test]
    fn test_gate_holds_until_advance() {
        let db = db();
        let mut world = world(0);
        let mut log = ActionLog::new();
        let mut rng = FixedRolls::always(0);
        let mut recorder = Recorder::default();
        let mut keeper = Recorder::default();
        let mut ctx = CombatContext::new(&db, &mut world, &mut log, &mut rng)
            .with_presentation(&mut recorder)
            .with_record_keeper(&mut keeper);
        let mut combat = MapCombat::new(CombatSetup::new("eirika", "rapier", "bandit"));

        assert!(!combat.update(&mut ctx, false).unwrap());
        assert_eq!(combat.stage(), CombatStage::Anim);
        assert!(!combat.update(&mut ctx, false).unwrap());
        assert_eq!(ctx.world.unit(&"bandit".into()).unwrap().current_hp, 20);

        assert!(!combat.update(&mut ctx, true).unwrap());
        assert_eq!(ctx.world.unit(&"bandit".into()).unwrap().current_hp, 15);
        while !combat.update(&mut ctx, true).unwrap() {}
        drop(ctx);
        assert_eq!(recorder.phases, 2);
        assert_eq!(keeper.tallies, 1);
    }

    #[test]
    fn test_skip_matches_gated_run() {
        let db = db();
        let mut skipped = world(7);
        let mut log = ActionLog::new();
        run(&db, &mut skipped, &mut log, CombatSetup::new("eirika", "rapier", "bandit"));

        let mut gated = world(7);
        let mut log = ActionLog::new();
        let mut rng = FixedRolls::always(0);
        let mut ctx = CombatContext::new(&db, &mut gated, &mut log, &mut rng);
        let mut combat = MapCombat::new(CombatSetup::new("eirika", "rapier", "bandit"));
        let mut ticks = 0;
        while !combat.update(&mut ctx, ticks % 3 == 2).unwrap() {
            ticks += 1;
        }
        assert_eq!(gated, skipped);
    }

    #[test]
    fn test_charge_and_last_words() {
        let db = db();
        let mut world = world(20);
        world
            .give_skill(
                &"eirika".into(),
                Skill::new("sol", vec![SkillComponent::BuildCharge(5), SkillComponent::CombatChargeIncrease(2)]),
            )
            .unwrap();
        world
            .give_skill(&"bandit".into(), Skill::new("farewell", vec![SkillComponent::LastWords("Argh".into())]))
            .unwrap();
        let mut log = ActionLog::new();
        run(&db, &mut world, &mut log, CombatSetup::new("eirika", "rapier", "bandit"));
        assert_eq!(world.skill(&"sol".into()).unwrap().data.charge, 2);
        assert_eq!(world.messages.last().map(String::as_str), Some("Bandit: Argh"));
    }

    #[test]
    fn test_heal_ally_message_and_no_counter() {
        let db = db();
        let mut world = World::new();
        world.add_unit(Unit::new("natasha", Team::Player).with_name("Natasha").with_stat("HP", 18).at(0, 0));
        let mut hurt = Unit::new("seth", Team::Player).with_name("Seth").with_stat("HP", 30).at(1, 0);
        hurt.current_hp = 12;
        world.add_unit(hurt);
        world
            .give_item(
                &"natasha".into(),
                Item::new("heal")
                    .with_uses(10)
                    .with_component(ItemComponent::Heal { amount: 10, formula: None })
                    .with_component(ItemComponent::Exp(11)),
            )
            .unwrap();
        let mut log = ActionLog::new();
        let summary = run(&db, &mut world, &mut log, CombatSetup::new("natasha", "heal", "seth"));
        assert_eq!(summary.phases, 1);
        assert_eq!(world.unit(&"seth".into()).unwrap().current_hp, 22);
        assert_eq!(world.messages, vec!["Natasha helped Seth".to_string()]);
        assert_eq!(summary.exp_awards[0].amount, 11);
    }

    #[test]
    fn test_fast_healer_heals_once() {
        let db = db();
        let mut world = World::new();
        world.add_unit(
            Unit::new("natasha", Team::Player).with_name("Natasha").with_stat("HP", 18).with_stat("SPD", 10).at(0, 0),
        );
        let mut hurt = Unit::new("seth", Team::Player).with_name("Seth").with_stat("HP", 30).with_stat("SPD", 0).at(1, 0);
        hurt.current_hp = 5;
        world.add_unit(hurt);
        let heal = Item::new("heal").with_uses(10).with_component(ItemComponent::Heal { amount: 10, formula: None });
        world.give_item(&"natasha".into(), heal).unwrap();
        let mut log = ActionLog::new();
        let summary = run(&db, &mut world, &mut log, CombatSetup::new("natasha", "heal", "seth"));
        assert_eq!(summary.phases, 1);
        assert_eq!(world.unit(&"seth".into()).unwrap().current_hp, 15);
        assert_eq!(world.item(&"heal".into()).unwrap().uses.map(|uses| uses.current), Some(9));
    }

    #[test]
    fn test_counter_kill_tallied_without_attackers_weapon() {
        let db = db();
        let mut world = world(0);
        world.unit_mut(&"eirika".into()).unwrap().current_hp = 5;
        let mut log = ActionLog::new();
        let mut rng = FixedRolls::always(0);
        let mut keeper = Recorder::default();
        let mut ctx = CombatContext::new(&db, &mut world, &mut log, &mut rng).with_record_keeper(&mut keeper);
        MapCombat::new(CombatSetup::new("eirika", "rapier", "bandit")).run_to_completion(&mut ctx).unwrap();
        drop(ctx);

        assert!(world.unit(&"eirika".into()).unwrap().is_dying);
        let (bandit, eirika) = (UnitId::from("bandit"), UnitId::from("eirika"));
        let tallies = &keeper.last_tallies;
        assert!(tallies.get(&bandit, &eirika, Some(&"rapier".into())).is_none());
        assert_eq!(tallies.get(&bandit, &eirika, None).map(|t| t.kills), Some(1));
        assert_eq!(tallies.get(&eirika, &bandit, None).map(|t| t.deaths), Some(1));
        assert_eq!(tallies.get(&bandit, &eirika, Some(&"iron_axe".into())).map(|t| t.hits), Some(1));
        assert_eq!(world.records.kills_by(&bandit), 1);
        assert_eq!(world.records.deaths_of(&eirika), 1);
    }
}
