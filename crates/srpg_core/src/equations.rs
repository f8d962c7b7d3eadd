//! Named stat equations.
//!
//! Every base combat statistic is computed from a named equation such as
//! `HIT` or `DAMAGE`. Equations are content: they are loaded from RON as
//! [`Formula`] trees and evaluated against a [`StatSource`] view of a unit.
//! Asking for an equation that was never registered is an error, never a
//! silent zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CombatError, Result};
use crate::math::{from_percent, scale};

/// Equation used for accuracy when an item does not override it.
pub const HIT: &str = "HIT";
/// Equation used for avoid.
pub const AVOID: &str = "AVOID";
/// Equation used for crit accuracy.
pub const CRIT_HIT: &str = "CRIT_HIT";
/// Equation used for crit avoid.
pub const CRIT_AVOID: &str = "CRIT_AVOID";
/// Equation used for damage.
pub const DAMAGE: &str = "DAMAGE";
/// Equation used for defense.
pub const DEFENSE: &str = "DEFENSE";
/// Equation used for attack speed.
pub const ATTACK_SPEED: &str = "ATTACK_SPEED";
/// Equation used for defense speed.
pub const DEFENSE_SPEED: &str = "DEFENSE_SPEED";

/// Every equation the calculator may request without an item override.
pub const STANDARD_EQUATIONS: [&str; 8] = [
    HIT,
    AVOID,
    CRIT_HIT,
    CRIT_AVOID,
    DAMAGE,
    DEFENSE,
    ATTACK_SPEED,
    DEFENSE_SPEED,
];

/// Maximum nesting of equation references.
pub const MAX_EQUATION_DEPTH: usize = 16;

/// Read-only view of the numbers an equation may reference.
pub trait StatSource {
    /// Effective value of a named stat (base plus modifiers). Unknown stats are 0.
    fn stat(&self, name: &str) -> i32;

    /// Current level.
    fn level(&self) -> i32;
}

/// Evaluates named equations.
pub trait EquationSystem {
    /// Evaluate the equation registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::UnknownEquation`] if `name` is not registered.
    fn evaluate(&self, name: &str, stats: &dyn StatSource) -> Result<i32>;

    /// Whether an equation is registered under `name`.
    fn contains(&self, name: &str) -> bool;
}

/// Integer expression tree.
///
/// # Example RON
///
/// ```ron
/// Sum([Stat("SKL"), Stat("SKL"), Scaled(formula: Stat("LCK"), percent: 50)])
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Formula {
    /// A literal value.
    Constant(i32),
    /// A unit stat.
    Stat(String),
    /// The unit's level.
    Level,
    /// Another named equation.
    Equation(String),
    /// `formula * percent / 100`, truncated.
    Scaled {
        /// Inner formula.
        formula: Box<Formula>,
        /// Scale in percent.
        percent: i32,
    },
    /// Sum of all terms.
    Sum(Vec<Formula>),
    /// Product of all terms.
    Product(Vec<Formula>),
    /// Smallest term (0 when empty).
    Min(Vec<Formula>),
    /// Largest term (0 when empty).
    Max(Vec<Formula>),
    /// Integer division truncating toward zero.
    Div(Box<Formula>, Box<Formula>),
}

impl Formula {
    /// Evaluate against a stat view, resolving equation references through `equations`.
    ///
    /// # Errors
    ///
    /// Fails on unknown equation references or division by zero.
    pub fn evaluate(&self, stats: &dyn StatSource, equations: &dyn EquationSystem) -> Result<i32> {
        let value = match self {
            Self::Constant(value) => *value,
            Self::Stat(name) => stats.stat(name),
            Self::Level => stats.level(),
            Self::Equation(name) => equations.evaluate(name, stats)?,
            Self::Scaled { formula, percent } => {
                scale(formula.evaluate(stats, equations)?, from_percent(*percent))
            }
            Self::Sum(terms) => {
                let mut total = 0i32;
                for term in terms {
                    total = total.saturating_add(term.evaluate(stats, equations)?);
                }
                total
            }
            Self::Product(terms) => {
                let mut total = 1i32;
                for term in terms {
                    total = total.saturating_mul(term.evaluate(stats, equations)?);
                }
                total
            }
            Self::Min(terms) => Self::fold(terms, stats, equations, i32::min)?,
            Self::Max(terms) => Self::fold(terms, stats, equations, i32::max)?,
            Self::Div(numerator, denominator) => {
                let denominator = denominator.evaluate(stats, equations)?;
                if denominator == 0 {
                    return Err(CombatError::InvalidFormula("division by zero".into()));
                }
                numerator.evaluate(stats, equations)? / denominator
            }
        };
        Ok(value)
    }

    fn fold(
        terms: &[Formula],
        stats: &dyn StatSource,
        equations: &dyn EquationSystem,
        pick: fn(i32, i32) -> i32,
    ) -> Result<i32> {
        let mut result: Option<i32> = None;
        for term in terms {
            let value = term.evaluate(stats, equations)?;
            result = Some(result.map_or(value, |current| pick(current, value)));
        }
        Ok(result.unwrap_or(0))
    }

    /// Names of every equation this formula references, recursively.
    #[must_use]
    pub fn referenced_equations(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Self::Equation(name) => names.push(name),
            Self::Scaled { formula, .. } => formula.collect_references(names),
            Self::Sum(terms) | Self::Product(terms) | Self::Min(terms) | Self::Max(terms) => {
                for term in terms {
                    term.collect_references(names);
                }
            }
            Self::Div(numerator, denominator) => {
                numerator.collect_references(names);
                denominator.collect_references(names);
            }
            Self::Constant(_) | Self::Stat(_) | Self::Level => {}
        }
    }
}

/// Content-driven equation registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EquationTable {
    equations: BTreeMap<String, Formula>,
}

impl EquationTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an equation.
    pub fn insert(&mut self, name: impl Into<String>, formula: Formula) {
        self.equations.insert(name.into(), formula);
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, formula: Formula) -> Self {
        self.insert(name, formula);
        self
    }

    /// Look up a registered formula.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Formula> {
        self.equations.get(name)
    }

    /// Iterate registered equations in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Formula)> {
        self.equations.iter()
    }

    /// Names that are referenced by some equation but not registered.
    #[must_use]
    pub fn dangling_references(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .equations
            .values()
            .flat_map(Formula::referenced_equations)
            .filter(|name| !self.equations.contains_key(*name))
            .map(str::to_owned)
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    fn evaluate_at_depth(&self, name: &str, stats: &dyn StatSource, depth: usize) -> Result<i32> {
        if depth > MAX_EQUATION_DEPTH {
            return Err(CombatError::EquationRecursion(name.to_owned()));
        }
        let formula = self
            .equations
            .get(name)
            .ok_or_else(|| CombatError::UnknownEquation(name.to_owned()))?;
        let nested = Nested { table: self, depth: depth + 1 };
        formula.evaluate(stats, &nested)
    }
}

impl EquationSystem for EquationTable {
    fn evaluate(&self, name: &str, stats: &dyn StatSource) -> Result<i32> {
        self.evaluate_at_depth(name, stats, 0)
    }

    fn contains(&self, name: &str) -> bool {
        self.equations.contains_key(name)
    }
}

/// Depth-tracking view used while resolving equation references.
struct Nested<'a> {
    table: &'a EquationTable,
    depth: usize,
}

impl EquationSystem for Nested<'_> {
    fn evaluate(&self, name: &str, stats: &dyn StatSource) -> Result<i32> {
        self.table.evaluate_at_depth(name, stats, self.depth)
    }

    fn contains(&self, name: &str) -> bool {
        self.table.contains(name)
    }
}
