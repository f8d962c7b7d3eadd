//! Error types for the combat core.

use thiserror::Error;

/// Result type alias using [`CombatError`].
pub type Result<T> = std::result::Result<T, CombatError>;

/// Top-level error type for content loading and encounter resolution.
#[derive(Debug, Error)]
pub enum CombatError {
    /// A named equation was requested but never registered.
    #[error("Unknown equation: {0}")]
    UnknownEquation(String),

    /// Equation references nest deeper than the evaluator allows.
    #[error("Equation recursion too deep while evaluating '{0}'")]
    EquationRecursion(String),

    /// A formula could not be evaluated (e.g. division by zero).
    #[error("Invalid formula: {0}")]
    InvalidFormula(String),

    /// Weapon type missing from the content database.
    #[error("Unknown weapon type: {0}")]
    UnknownWeaponType(String),

    /// Weapon rank missing from the content database.
    #[error("Unknown weapon rank: {0}")]
    UnknownWeaponRank(String),

    /// Unit identifier not present in the world.
    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    /// Item identifier not present in the world.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Skill identifier not present in the world.
    #[error("Skill not found: {0}")]
    SkillNotFound(String),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Content parsed but failed validation.
    #[error("Content validation failed: {}", .0.join("; "))]
    ContentValidation(Vec<String>),

    /// An encounter was set up with inconsistent participants.
    #[error("Invalid combat setup: {0}")]
    InvalidSetup(String),

    /// Invalid world or encounter state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}
