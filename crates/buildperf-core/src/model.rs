//! Shared data model for build-step measurement.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// One entry of a compilation database (`compile_commands.json`).
///
/// Unknown keys (`output`, `arguments`, ...) are ignored on load; only the
/// fields needed to re-run the step are kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuildStep {
    /// Shell command that performs the step, run via `sh -c`.
    pub command: String,
    /// Primary input file the step processes.
    pub file: PathBuf,
    /// Working directory the command must run in.
    pub directory: PathBuf,
}

/// Kind of build step a measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Compile,
    Link,
}

impl Category {
    /// Tag written to the `type` column of shared logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Compile => "compile",
            Category::Link => "link",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of measuring one build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    /// Subject path, relativized against the invocation directory.
    pub file: String,
    /// Peak resident set size over the step's process tree, in bytes.
    pub max_rss: u64,
    /// Wall-clock duration from spawn to reap.
    pub time: Duration,
    pub category: Category,
}

impl Measurement {
    /// Duration in seconds, as written to the log.
    pub fn time_secs(&self) -> f64 {
        self.time.as_secs_f64()
    }
}

/// A finished sample: the measurement plus the wrapped command's exit status.
///
/// `status` is `None` only for dry runs, where nothing was spawned.
#[derive(Debug, Clone)]
pub struct Sampled {
    pub measurement: Measurement,
    pub status: Option<ExitStatus>,
}
