//! # SRPG Core
//!
//! Deterministic combat resolver for a grid-based tactics game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO beyond loading content and replay files
//! - No system randomness (rolls come from an injected [`rng::CombatRng`])
//! - No floating-point math (multipliers use fixed-point)
//!
//! An encounter is resolved in three layers:
//! - [`calcs`] turns stats, equations, the weapon triangle and skill/item
//!   hooks into hit, crit, damage and speed numbers
//! - [`solver`] sequences strikes into phases and emits playback plus the
//!   actions that commit each phase
//! - [`combat`] drives the solver, gates phases on presentation and runs
//!   post-combat reconciliation
//!
//! Every state change goes through [`action::ActionLog`], so an encounter can
//! be rewound exactly.
//!
//! ## Crate Structure
//!
//! - [`components`] - Identifiers, teams, positions and combat roles
//! - [`data`] - Content database (constants, weapon ranks, weapon types)
//! - [`equations`] - Named stat formulas
//! - [`hooks`] - Capability traits for item and skill components
//! - [`playback`] - Semantic combat events
//! - [`replay`] - Recorded encounters

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod action;
pub mod calcs;
pub mod combat;
pub mod components;
pub mod data;
pub mod equations;
pub mod error;
pub mod hooks;
pub mod item;
pub mod math;
pub mod playback;
pub mod records;
pub mod replay;
pub mod rng;
pub mod skill;
pub mod solver;
pub mod triangle;
pub mod unit;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::action::{Action, ActionLog};
    pub use crate::calcs::CombatCalculator;
    pub use crate::combat::{
        AfterCombat, CombatContext, CombatStage, CombatSummary, MapCombat, PlaybackObserver, RecordKeeper,
    };
    pub use crate::components::*;
    pub use crate::data::{CombatConstants, Database, RngMode, WeaponRank, WeaponTypeData};
    pub use crate::equations::{EquationSystem, EquationTable, Formula};
    pub use crate::error::{CombatError, Result};
    pub use crate::item::{Item, ItemComponent};
    pub use crate::math::Fixed;
    pub use crate::playback::{CombatEvent, Playback};
    pub use crate::replay::EncounterReplay;
    pub use crate::rng::{CombatRng, FixedRolls, PcgRng};
    pub use crate::skill::{Skill, SkillComponent};
    pub use crate::solver::{CombatPhaseSolver, CombatSetup, PhaseResult};
    pub use crate::unit::Unit;
    pub use crate::world::World;
}
