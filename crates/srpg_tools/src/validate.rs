//! Data validation utilities.

use std::path::{Path, PathBuf};

use srpg_core::data::Database;

use crate::scenario::{Scenario, ScenarioError};

/// File name of the content database inside a data directory.
pub const DATABASE_FILE: &str = "database.ron";

/// Subdirectory holding scenario files.
pub const SCENARIO_DIR: &str = "scenarios";

/// Validate all RON data files in a directory.
///
/// Loads `database.ron`, then checks every `scenarios/*.ron` against it.
/// Returns the number of scenarios checked.
///
/// # Errors
///
/// Returns an error if the database fails to load, or
/// [`ScenarioError::Invalid`] listing every problem found in the scenarios.
pub fn validate_data_directory(path: &Path) -> Result<usize, ScenarioError> {
    let db = Database::load(path.join(DATABASE_FILE))?;
    let scenarios = scenario_files(&path.join(SCENARIO_DIR))?;

    let mut errors = Vec::new();
    for file in &scenarios {
        let name = file.display();
        match Scenario::load(file) {
            Ok(scenario) => {
                let problems = scenario.validate(&db);
                tracing::debug!(file = %name, problems = problems.len(), "Checked scenario");
                errors.extend(problems.into_iter().map(|p| format!("{name}: {p}")));
            }
            Err(e) => errors.push(format!("{name}: {e}")),
        }
    }

    if errors.is_empty() {
        Ok(scenarios.len())
    } else {
        Err(ScenarioError::Invalid(errors))
    }
}

/// Sorted `.ron` files in `dir`. A missing directory has no scenarios.
fn scenario_files(dir: &Path) -> Result<Vec<PathBuf>, ScenarioError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "ron") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
