//! Runs one build step under memory observation.
//!
//! The step's command is spawned through `sh -c` in the step's directory with
//! its stdio discarded. While it runs, the whole process tree under the shell
//! is scanned at a fixed interval and the peak resident set size is tracked.

use crate::model::{BuildStep, Category, Measurement, Sampled};
use crate::procfs::ProcessTree;
use crate::util;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

/// Default pause between process-tree scans.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

/// Converts a configured seconds value into a sampling interval.
///
/// Rejects negative, non-finite and overflowing values.
pub fn interval_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

/// Knobs for a single sample run.
#[derive(Debug, Clone)]
pub struct SampleOptions {
    /// Pause between process-tree scans.
    pub interval: Duration,
    /// Delete the step's `-o` artifact once the step finishes.
    pub post_clean: bool,
    /// Skip execution entirely and report a zero measurement.
    pub dry_run: bool,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            post_clean: false,
            dry_run: false,
        }
    }
}

/// Error type for sampling failures.
#[derive(Debug)]
pub enum SampleError {
    /// The step's command could not be spawned.
    Spawn(io::Error),
    /// Waiting on the spawned child failed.
    Wait(io::Error),
    /// Post-clean found no `-o <output>` in the step's command.
    MissingOutputFlag { command: String },
    /// Post-clean could not delete the output artifact.
    Clean { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for SampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleError::Spawn(e) => write!(f, "failed to spawn command: {}", e),
            SampleError::Wait(e) => write!(f, "failed to wait for command: {}", e),
            SampleError::MissingOutputFlag { command } => {
                write!(f, "no '-o <output>' in command: {}", command)
            }
            SampleError::Clean { path, source } => {
                write!(f, "failed to delete output {:?}: {}", path, source)
            }
        }
    }
}

impl std::error::Error for SampleError {}

/// Measures one build step.
///
/// Returns the peak resident set size over the step's process tree and the
/// wall-clock duration from spawn to reap. When `progress` is given, a
/// carriage-return terminated status line is rewritten on every tick;
/// progress write failures are ignored and never affect the measurement.
pub fn sample(
    step: &BuildStep,
    category: Category,
    options: &SampleOptions,
    mut progress: Option<&mut dyn Write>,
) -> Result<Sampled, SampleError> {
    let subject = display_subject(step);

    if options.dry_run {
        return Ok(Sampled {
            measurement: Measurement {
                file: subject,
                max_rss: 0,
                time: Duration::ZERO,
                category,
            },
            status: None,
        });
    }

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(&step.command)
        .current_dir(&step.directory)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(SampleError::Spawn)?;

    let pid = child.id();
    let start = Instant::now();
    let tree = ProcessTree::host();
    let mut peak: u64 = 0;

    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {}
            Err(e) => return Err(SampleError::Wait(e)),
        }

        let rss = tree.tree_rss_bytes(pid);
        peak = peak.max(rss);

        if let Some(out) = progress.as_mut() {
            let _ = write!(
                out,
                "[{:8.2}M, max: {:8.2}M] [{:8.2}s] - {}\r",
                rss as f64 / 1e6,
                peak as f64 / 1e6,
                start.elapsed().as_secs_f64(),
                subject
            );
            let _ = out.flush();
        }

        thread::sleep(options.interval);
    }

    let status = child.wait().map_err(SampleError::Wait)?;
    let time = start.elapsed();

    if let Some(out) = progress.as_mut() {
        let _ = writeln!(out);
    }

    if !status.success() {
        warn!("step '{}' exited with {}", subject, status);
    }

    if options.post_clean {
        clean_output(step)?;
    }

    Ok(Sampled {
        measurement: Measurement {
            file: subject,
            max_rss: peak,
            time,
            category,
        },
        status: Some(status),
    })
}

/// Subject path as reported in measurements: relative to the invocation
/// directory when possible.
fn display_subject(step: &BuildStep) -> String {
    match env::current_dir() {
        Ok(cwd) => util::relative_to(&step.file, &cwd).display().to_string(),
        Err(_) => step.file.display().to_string(),
    }
}

/// Deletes the artifact named by `-o` in the step's command.
fn clean_output(step: &BuildStep) -> Result<(), SampleError> {
    let output = output_path(&step.command).ok_or_else(|| SampleError::MissingOutputFlag {
        command: step.command.clone(),
    })?;
    let path = step.directory.join(output);
    std::fs::remove_file(&path).map_err(|source| SampleError::Clean { path, source })
}

/// Finds the argument following `-o` in a whitespace-tokenized command.
fn output_path(command: &str) -> Option<&str> {
    let mut tokens = command.split_whitespace();
    while let Some(tok) = tokens.next() {
        if tok == "-o" {
            return tokens.next();
        }
    }
    None
}
