//! Batch collection over a compilation database.
//!
//! Steps that pass the include/exclude filters are fed to a bounded pool of
//! worker threads. Finished measurements stream back over a channel and are
//! appended to the sink in completion order, so the log is written
//! incrementally and survives interruption as a valid prefix.

use crate::model::{BuildStep, Category, Sampled};
use crate::sampler::{self, SampleError, SampleOptions};
use crate::sink::{ResultSink, SinkError};
use regex::Regex;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// How collection reports progress on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// No progress output.
    Silent,
    /// One summary line per completed step.
    Summary,
    /// Rewrite a live status line on every sample tick. Only effective with
    /// a single job; with more, workers would interleave and it degrades to
    /// `Summary`.
    Live,
}

/// Settings for one collection run.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// Steps whose file path matches are sampled.
    pub filter: Regex,
    /// Steps whose file path matches are skipped, even when `filter` matches.
    pub exclude: Option<Regex>,
    /// Pause between process-tree scans.
    pub interval: Duration,
    /// Upper bound on concurrently running steps.
    pub jobs: usize,
    /// Delete each step's `-o` artifact after measuring it.
    pub post_clean: bool,
    /// Skip execution and record zero measurements.
    pub dry_run: bool,
    pub progress: Progress,
}

/// Counters for a finished collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    /// Steps that passed the filters.
    pub total: usize,
    /// Steps measured and appended to the sink.
    pub completed: usize,
    /// Steps that could not be run (spawn failures).
    pub failed: usize,
}

/// Error type for fatal collection failures.
///
/// Per-step spawn failures are not fatal; they are counted in
/// `CollectStats::failed` and the run continues.
#[derive(Debug)]
pub enum CollectError {
    /// Appending to the sink failed; the log can no longer be trusted to
    /// grow, so the run stops.
    Sink(SinkError),
    /// A step violated a run precondition (post-clean contract).
    Step { file: String, source: SampleError },
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Sink(e) => write!(f, "{}", e),
            CollectError::Step { file, source } => write!(f, "{}: {}", file, source),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<SinkError> for CollectError {
    fn from(e: SinkError) -> Self {
        CollectError::Sink(e)
    }
}

/// Applies include/exclude filters to build steps. Exclusion wins.
pub fn filter_steps(
    steps: Vec<BuildStep>,
    filter: &Regex,
    exclude: Option<&Regex>,
) -> Vec<BuildStep> {
    steps
        .into_iter()
        .filter(|step| {
            let file = step.file.to_string_lossy();
            filter.is_match(&file) && !exclude.is_some_and(|e| e.is_match(&file))
        })
        .collect()
}

/// Runs every filtered step through the worker pool and appends each
/// measurement to `sink` as it completes.
///
/// `cancel` is checked between steps: once set, queued steps are abandoned,
/// running ones finish and are still recorded, and the function returns
/// normally with whatever was sampled.
pub fn run(
    steps: Vec<BuildStep>,
    config: &CollectConfig,
    sink: &mut dyn ResultSink,
    cancel: &AtomicBool,
) -> Result<CollectStats, CollectError> {
    let steps = filter_steps(steps, &config.filter, config.exclude.as_ref());
    let total = steps.len();
    if total == 0 {
        return Ok(CollectStats {
            total: 0,
            completed: 0,
            failed: 0,
        });
    }

    let workers = config.jobs.max(1).min(total);
    let live = config.progress == Progress::Live && workers == 1;
    let summary = config.progress != Progress::Silent && !live;
    let options = SampleOptions {
        interval: config.interval,
        post_clean: config.post_clean,
        dry_run: config.dry_run,
    };

    let queue = Mutex::new(VecDeque::from(steps));
    let (tx, rx) = mpsc::channel::<(String, Result<Sampled, SampleError>)>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            let options = &options;
            scope.spawn(move || {
                loop {
                    if cancel.load(Ordering::SeqCst) {
                        break;
                    }
                    let step = queue
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .pop_front();
                    let Some(step) = step else { break };

                    let file = step.file.display().to_string();
                    let mut err = io::stderr();
                    let progress: Option<&mut dyn Write> =
                        if live { Some(&mut err) } else { None };
                    let result = sampler::sample(&step, Category::Compile, options, progress);
                    if tx.send((file, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut fatal: Option<CollectError> = None;
        let width = total.to_string().len();

        // Drain the channel to completion even after a fatal error so that
        // in-flight workers are not left blocked on a vanished receiver.
        for (file, outcome) in rx {
            if fatal.is_some() {
                continue;
            }
            match outcome {
                Ok(sampled) => {
                    let m = &sampled.measurement;
                    if let Err(e) = sink.append(m) {
                        cancel.store(true, Ordering::SeqCst);
                        fatal = Some(e.into());
                        continue;
                    }
                    completed += 1;
                    if summary {
                        let done = completed + failed;
                        let percent = done as f64 / total as f64 * 100.0;
                        let _ = writeln!(
                            io::stderr(),
                            "[{:>width$}/{}, {:5.1}%] [{:8.2}M] [{:8.2}s] - {}",
                            done,
                            total,
                            percent,
                            m.max_rss as f64 / 1e6,
                            m.time_secs(),
                            m.file,
                            width = width
                        );
                    }
                }
                Err(e @ (SampleError::Spawn(_) | SampleError::Wait(_))) => {
                    failed += 1;
                    warn!("skipping '{}': {}", file, e);
                    let _ = writeln!(io::stderr(), "error: {}: {}", file, e);
                }
                Err(e) => {
                    cancel.store(true, Ordering::SeqCst);
                    fatal = Some(CollectError::Step { file, source: e });
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(CollectStats {
                total,
                completed,
                failed,
            }),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Measurement;
    use std::path::PathBuf;

    #[derive(Default)]
    struct VecSink {
        rows: Vec<Measurement>,
    }

    impl ResultSink for VecSink {
        fn append(&mut self, measurement: &Measurement) -> Result<(), SinkError> {
            self.rows.push(measurement.clone());
            Ok(())
        }
    }

    /// Sink that rejects every append.
    struct BrokenSink;

    impl ResultSink for BrokenSink {
        fn append(&mut self, _measurement: &Measurement) -> Result<(), SinkError> {
            Err(SinkError::Io(io::Error::other("disk full")))
        }
    }

    fn steps(files: &[&str]) -> Vec<BuildStep> {
        files
            .iter()
            .map(|f| BuildStep {
                command: "true".to_string(),
                file: PathBuf::from(f),
                directory: PathBuf::from("/tmp"),
            })
            .collect()
    }

    fn config(jobs: usize) -> CollectConfig {
        CollectConfig {
            filter: Regex::new(".*").unwrap(),
            exclude: None,
            interval: Duration::from_millis(10),
            jobs,
            post_clean: false,
            dry_run: true,
            progress: Progress::Silent,
        }
    }

    #[test]
    fn test_filter_steps_include() {
        let filtered = filter_steps(
            steps(&["src/a.cpp", "src/b.cpp", "vendor/c.cpp"]),
            &Regex::new("^src/").unwrap(),
            None,
        );
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_filter_steps_exclude_wins() {
        let filtered = filter_steps(
            steps(&["src/a.cpp", "src/gen_b.cpp"]),
            &Regex::new("src").unwrap(),
            Some(&Regex::new("gen_").unwrap()),
        );
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].file, PathBuf::from("src/a.cpp"));
    }

    #[test]
    fn test_run_all_steps_recorded() {
        let mut sink = VecSink::default();
        let cancel = AtomicBool::new(false);
        let stats = run(
            steps(&["a.cpp", "b.cpp", "c.cpp"]),
            &config(2),
            &mut sink,
            &cancel,
        )
        .unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 0);

        let mut files: Vec<String> = sink.rows.iter().map(|m| m.file.clone()).collect();
        files.sort();
        assert_eq!(files, ["a.cpp", "b.cpp", "c.cpp"]);
    }

    #[test]
    fn test_run_single_job_preserves_input_order() {
        let mut sink = VecSink::default();
        let cancel = AtomicBool::new(false);
        run(
            steps(&["z.cpp", "a.cpp", "m.cpp"]),
            &config(1),
            &mut sink,
            &cancel,
        )
        .unwrap();

        let files: Vec<&str> = sink.rows.iter().map(|m| m.file.as_str()).collect();
        assert_eq!(files, ["z.cpp", "a.cpp", "m.cpp"]);
    }

    #[test]
    fn test_run_single_job_writes_ordered_csv() {
        use crate::sink::DirectSink;

        let mut buf: Vec<u8> = Vec::new();
        {
            let mut sink = DirectSink::new(&mut buf).unwrap();
            let cancel = AtomicBool::new(false);
            run(
                steps(&["z.cpp", "a.cpp", "m.cpp"]),
                &config(1),
                &mut sink,
                &cancel,
            )
            .unwrap();
        }

        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "file,max_rss,time\nz.cpp,0,0\na.cpp,0,0\nm.cpp,0,0\n");
    }

    #[test]
    fn test_run_nothing_after_filter() {
        let mut sink = VecSink::default();
        let cancel = AtomicBool::new(false);
        let mut cfg = config(2);
        cfg.filter = Regex::new("nomatch").unwrap();

        let stats = run(steps(&["a.cpp"]), &cfg, &mut sink, &cancel).unwrap();
        assert_eq!(stats.total, 0);
        assert!(sink.rows.is_empty());
    }

    #[test]
    fn test_run_pre_cancelled_records_nothing() {
        let mut sink = VecSink::default();
        let cancel = AtomicBool::new(true);
        let stats = run(
            steps(&["a.cpp", "b.cpp", "c.cpp"]),
            &config(2),
            &mut sink,
            &cancel,
        )
        .unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 0);
        assert!(sink.rows.is_empty());
    }

    #[test]
    fn test_run_sink_failure_is_fatal() {
        let mut sink = BrokenSink;
        let cancel = AtomicBool::new(false);
        let result = run(steps(&["a.cpp", "b.cpp"]), &config(1), &mut sink, &cancel);
        assert!(matches!(result, Err(CollectError::Sink(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_run_real_commands() {
        let dir = tempfile::tempdir().unwrap();
        let real_steps: Vec<BuildStep> = ["a.cpp", "b.cpp"]
            .iter()
            .map(|f| BuildStep {
                command: "true".to_string(),
                file: PathBuf::from(f),
                directory: dir.path().to_path_buf(),
            })
            .collect();

        let mut sink = VecSink::default();
        let cancel = AtomicBool::new(false);
        let mut cfg = config(2);
        cfg.dry_run = false;

        let stats = run(real_steps, &cfg, &mut sink, &cancel).unwrap();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_run_spawn_failure_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let mixed = vec![
            BuildStep {
                command: "true".to_string(),
                file: PathBuf::from("good.cpp"),
                directory: dir.path().to_path_buf(),
            },
            BuildStep {
                command: "true".to_string(),
                file: PathBuf::from("bad.cpp"),
                directory: PathBuf::from("/nonexistent/dir/12345"),
            },
        ];

        let mut sink = VecSink::default();
        let cancel = AtomicBool::new(false);
        let mut cfg = config(1);
        cfg.dry_run = false;

        let stats = run(mixed, &cfg, &mut sink, &cancel).unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(sink.rows[0].file, "good.cpp");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_run_missing_output_flag_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let one = vec![BuildStep {
            command: "true".to_string(),
            file: PathBuf::from("a.cpp"),
            directory: dir.path().to_path_buf(),
        }];

        let mut sink = VecSink::default();
        let cancel = AtomicBool::new(false);
        let mut cfg = config(1);
        cfg.dry_run = false;
        cfg.post_clean = true;

        let result = run(one, &cfg, &mut sink, &cancel);
        assert!(matches!(result, Err(CollectError::Step { .. })));
        // The violation also halts the queue.
        assert!(cancel.load(Ordering::SeqCst));
    }
}
