//! Drop-in wrapper logic for compiler and linker interception.
//!
//! A wrapper binary substitutes for the real tool during a full build. It
//! receives the tool's original argument vector verbatim, re-executes it
//! under memory observation and appends one row to a shared log that all
//! concurrently running wrappers write through `SharedLogSink`.

use crate::model::{BuildStep, Category, Sampled};
use crate::sampler::{self, DEFAULT_INTERVAL, SampleError, SampleOptions, interval_from_secs};
use crate::sink::{ResultSink, SharedLogSink, SinkError};
use crate::util;
use std::env;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the shared log location.
pub const OUTPUT_ENV: &str = "BUILDPERF_OUTPUT";

/// Environment variable overriding the sample interval, in seconds.
pub const INTERVAL_ENV: &str = "BUILDPERF_INTERVAL";

/// Shared log written into the build's working directory by default.
pub const DEFAULT_LOG: &str = "buildperf.csv";

/// Error type for wrapper failures.
#[derive(Debug)]
pub enum InterceptError {
    /// The wrapped command line has no recognizable subject.
    MissingSubject { category: Category },
    /// The interval variable is not a valid number of seconds.
    BadInterval(String),
    /// The working directory is unavailable.
    CurrentDir(io::Error),
    Sample(SampleError),
    Sink(SinkError),
}

impl std::fmt::Display for InterceptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterceptError::MissingSubject {
                category: Category::Compile,
            } => write!(f, "no source file argument in wrapped command line"),
            InterceptError::MissingSubject {
                category: Category::Link,
            } => write!(f, "no '-o <output>' in wrapped command line"),
            InterceptError::BadInterval(raw) => {
                write!(f, "invalid {} value: '{}'", INTERVAL_ENV, raw)
            }
            InterceptError::CurrentDir(e) => {
                write!(f, "cannot determine working directory: {}", e)
            }
            InterceptError::Sample(e) => write!(f, "{}", e),
            InterceptError::Sink(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for InterceptError {}

impl From<SampleError> for InterceptError {
    fn from(e: SampleError) -> Self {
        InterceptError::Sample(e)
    }
}

impl From<SinkError> for InterceptError {
    fn from(e: SinkError) -> Self {
        InterceptError::Sink(e)
    }
}

/// Wrapper settings taken from the environment.
#[derive(Debug, Clone)]
pub struct InterceptConfig {
    /// Shared log path.
    pub output: PathBuf,
    /// Pause between process-tree scans.
    pub interval: Duration,
}

impl InterceptConfig {
    /// Reads `BUILDPERF_OUTPUT` and `BUILDPERF_INTERVAL`, falling back to
    /// `buildperf.csv` in the working directory and 0.5 seconds.
    pub fn from_env() -> Result<Self, InterceptError> {
        Self::from_lookup(|key| env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self, InterceptError> {
        let output = lookup(OUTPUT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG));

        let interval = match lookup(INTERVAL_ENV) {
            Some(raw) => {
                let raw = raw.to_string_lossy();
                raw.trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(interval_from_secs)
                    .ok_or_else(|| InterceptError::BadInterval(raw.into_owned()))?
            }
            None => DEFAULT_INTERVAL,
        };

        Ok(Self { output, interval })
    }
}

/// True when the wrapper was invoked with exactly `-h` or `--help` and
/// should print its own usage instead of delegating to the wrapped tool.
pub fn is_help(args: &[String]) -> bool {
    matches!(args, [only] if only == "-h" || only == "--help")
}

/// Picks the path a measurement is attributed to.
///
/// For links it is the argument after `-o`. For compiles it is the last
/// argument that is neither an option nor the value of `-o`; a flag that
/// takes a separate value argument can fool this, but the trailing source
/// convention holds for the compiler drivers this wraps.
pub fn derive_subject(category: Category, args: &[String]) -> Option<&str> {
    match category {
        Category::Compile => {
            let mut subject = None;
            let mut prev: Option<&str> = None;
            for arg in args {
                if !arg.starts_with('-') && prev != Some("-o") {
                    subject = Some(arg.as_str());
                }
                prev = Some(arg);
            }
            subject
        }
        Category::Link => {
            let mut iter = args.iter();
            while let Some(arg) = iter.next() {
                if arg == "-o" {
                    return iter.next().map(String::as_str);
                }
            }
            None
        }
    }
}

/// Re-executes the wrapped command under observation and appends the
/// measurement to the shared log.
///
/// The subject is derived before anything runs, so a command line the
/// wrapper cannot attribute fails fast without side effects.
pub fn run(
    category: Category,
    args: &[String],
    config: &InterceptConfig,
) -> Result<Sampled, InterceptError> {
    let subject =
        derive_subject(category, args).ok_or(InterceptError::MissingSubject { category })?;
    let directory = env::current_dir().map_err(InterceptError::CurrentDir)?;

    let step = BuildStep {
        command: util::shell_join(args),
        file: PathBuf::from(subject),
        directory,
    };
    let options = SampleOptions {
        interval: config.interval,
        ..SampleOptions::default()
    };

    let sampled = sampler::sample(&step, category, &options, None)?;

    let mut sink = SharedLogSink::new(config.output.clone());
    sink.append(&sampled.measurement)?;

    Ok(sampled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn lookup_from<'a>(map: &'a HashMap<&'a str, &'a str>) -> impl Fn(&str) -> Option<OsString> + 'a {
        move |key| map.get(key).map(OsString::from)
    }

    #[test]
    fn test_is_help() {
        assert!(is_help(&args(&["-h"])));
        assert!(is_help(&args(&["--help"])));
        assert!(!is_help(&args(&[])));
        assert!(!is_help(&args(&["-h", "x.cpp"])));
        assert!(!is_help(&args(&["--help=full"])));
        assert!(!is_help(&args(&["g++", "--help"])));
    }

    #[test]
    fn test_derive_subject_compile_trailing_source() {
        let argv = args(&["g++", "-c", "-O2", "-o", "a.o", "src/a.cpp"]);
        assert_eq!(derive_subject(Category::Compile, &argv), Some("src/a.cpp"));
    }

    #[test]
    fn test_derive_subject_compile_skips_output_value() {
        // `-o`'s value comes after the source and must not win.
        let argv = args(&["g++", "-c", "src/a.cpp", "-o", "a.o"]);
        assert_eq!(derive_subject(Category::Compile, &argv), Some("src/a.cpp"));
    }

    #[test]
    fn test_derive_subject_compile_no_positional() {
        let argv = args(&["-c", "-O2"]);
        assert_eq!(derive_subject(Category::Compile, &argv), None);
    }

    #[test]
    fn test_derive_subject_link() {
        let argv = args(&["g++", "a.o", "b.o", "-o", "app"]);
        assert_eq!(derive_subject(Category::Link, &argv), Some("app"));
    }

    #[test]
    fn test_derive_subject_link_missing_output() {
        assert_eq!(derive_subject(Category::Link, &args(&["g++", "a.o"])), None);
        assert_eq!(
            derive_subject(Category::Link, &args(&["g++", "a.o", "-o"])),
            None
        );
    }

    #[test]
    fn test_config_defaults() {
        let map = HashMap::new();
        let config = InterceptConfig::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(config.output, PathBuf::from("buildperf.csv"));
        assert_eq!(config.interval, DEFAULT_INTERVAL);
    }

    #[test]
    fn test_config_overrides() {
        let mut map = HashMap::new();
        map.insert(OUTPUT_ENV, "/tmp/build/log.csv");
        map.insert(INTERVAL_ENV, "0.05");
        let config = InterceptConfig::from_lookup(lookup_from(&map)).unwrap();
        assert_eq!(config.output, PathBuf::from("/tmp/build/log.csv"));
        assert_eq!(config.interval, Duration::from_millis(50));
    }

    #[test]
    fn test_config_rejects_bad_interval() {
        for bad in ["abc", "-1", "inf", ""] {
            let mut map = HashMap::new();
            map.insert(INTERVAL_ENV, bad);
            let result = InterceptConfig::from_lookup(lookup_from(&map));
            assert!(
                matches!(result, Err(InterceptError::BadInterval(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_run_missing_subject_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.csv");
        let config = InterceptConfig {
            output: log.clone(),
            interval: Duration::from_millis(10),
        };
        let result = run(Category::Link, &args(&["g++", "a.o"]), &config);
        assert!(matches!(
            result,
            Err(InterceptError::MissingSubject { .. })
        ));
        // Fails before anything runs or is appended.
        assert!(!log.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_run_compile_appends_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.csv");
        let config = InterceptConfig {
            output: log.clone(),
            interval: Duration::from_millis(10),
        };

        let sampled = run(Category::Compile, &args(&["true"]), &config).unwrap();
        assert!(sampled.status.unwrap().success());

        let text = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "file,max_rss,time,type");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("true,"));
        assert!(lines[1].ends_with(",compile"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_run_link_appends_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.csv");
        let config = InterceptConfig {
            output: log.clone(),
            interval: Duration::from_millis(10),
        };

        run(
            Category::Link,
            &args(&["true", "-o", "result.bin"]),
            &config,
        )
        .unwrap();

        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("result.bin,"));
        assert!(text.trim_end().ends_with(",link"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_run_failing_tool_still_logged() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.csv");
        let config = InterceptConfig {
            output: log.clone(),
            interval: Duration::from_millis(10),
        };

        let sampled = run(Category::Compile, &args(&["false"]), &config).unwrap();
        assert!(!sampled.status.unwrap().success());

        let text = std::fs::read_to_string(&log).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
