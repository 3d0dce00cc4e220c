//! Compilation database (`compile_commands.json`) loading.

use crate::model::BuildStep;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Error type for database loading failures.
#[derive(Debug)]
pub enum DbError {
    /// The database file could not be read.
    Io(io::Error),
    /// The file is not a valid compilation database.
    Json(serde_json::Error),
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::Io(e) => write!(f, "cannot read compilation database: {}", e),
            DbError::Json(e) => write!(f, "malformed compilation database: {}", e),
        }
    }
}

impl std::error::Error for DbError {}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        DbError::Io(e)
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Json(e)
    }
}

/// Loads all build steps from a compilation database.
///
/// Steps are returned in file order. Entries must carry the `command`,
/// `file` and `directory` keys; other keys are ignored.
pub fn load(path: &Path) -> Result<Vec<BuildStep>, DbError> {
    let file = File::open(path)?;
    let steps = serde_json::from_reader(BufReader::new(file))?;
    Ok(steps)
}
