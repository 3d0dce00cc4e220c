//! buildperf - Build step resource measurement.
//!
//! Runs every step of a compilation database under a memory sampler and
//! streams one CSV row per step (`collect`), and prints ranking reports
//! over a previously collected log (`print`).

use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use regex::Regex;
use tracing::{Level, warn};
use tracing_subscriber::EnvFilter;

use buildperf_core::collect::{self, CollectConfig, Progress};
use buildperf_core::compiledb;
use buildperf_core::report;
use buildperf_core::sampler;
use buildperf_core::sink::DirectSink;

/// Build step resource measurement.
#[derive(Parser)]
#[command(name = "buildperf", about = "Build step resource measurement", version)]
struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode - only show errors, no progress.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure peak memory and wall time of every build step.
    Collect(CollectArgs),

    /// Print the most expensive entries of a collected log.
    Print(PrintArgs),
}

#[derive(clap::Args)]
struct CollectArgs {
    /// Path to compile_commands.json.
    compile_db: PathBuf,

    /// Output CSV to file, or stdout (use -).
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Filter input files by regex.
    #[arg(long, default_value = ".*")]
    filter: String,

    /// Drop input files matching regex, even when they pass --filter.
    #[arg(long)]
    exclude: Option<String>,

    /// Sample interval in seconds.
    #[arg(long, default_value_t = 0.5)]
    interval: f64,

    /// Number of build steps run in parallel.
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Delete each step's -o artifact after measuring it.
    #[arg(long)]
    post_clean: bool,

    /// Record the filtered steps with zero measurements, without running them.
    #[arg(long)]
    dry_run: bool,
}

#[derive(clap::Args)]
struct PrintArgs {
    /// Path to a log produced by collect or the intercept tools.
    data_file: PathBuf,

    /// Number of entries per table.
    #[arg(short, long, default_value_t = 10)]
    number: usize,

    /// Only report files matching regex.
    #[arg(long)]
    filter: Option<String>,

    /// Drop files matching regex.
    #[arg(long)]
    exclude: Option<String>,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("buildperf={}", level).parse().unwrap())
        .add_directive(format!("buildperf_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn compile_pattern(flag: &str, pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| {
        eprintln!("Error: bad {flag} pattern: {e}");
        exit(1);
    })
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Collect(args) => run_collect(args, cli.quiet),
        Command::Print(args) => run_print(args),
    }
}

fn run_collect(args: CollectArgs, quiet: bool) {
    let filter = compile_pattern("--filter", &args.filter);
    let exclude = args
        .exclude
        .as_deref()
        .map(|pattern| compile_pattern("--exclude", pattern));
    let interval = sampler::interval_from_secs(args.interval).unwrap_or_else(|| {
        eprintln!("Error: bad --interval value: {}", args.interval);
        exit(1);
    });

    let steps = compiledb::load(&args.compile_db).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        exit(1);
    });

    // Data rows go to stdout by default so diagnostics on stderr never mix
    // into the CSV stream.
    let writer: Box<dyn Write> = if args.output == "-" {
        Box::new(io::stdout())
    } else {
        eprintln!("I will write output to {}", args.output);
        let file = File::create(&args.output).unwrap_or_else(|e| {
            eprintln!("Error: cannot create {}: {e}", args.output);
            exit(1);
        });
        Box::new(file)
    };
    let mut sink = DirectSink::new(writer).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        exit(1);
    });

    let progress = if quiet {
        Progress::Silent
    } else if args.jobs <= 1 && io::stderr().is_terminal() {
        Progress::Live
    } else {
        Progress::Summary
    };

    let config = CollectConfig {
        filter,
        exclude,
        interval,
        jobs: args.jobs,
        post_clean: args.post_clean,
        dry_run: args.dry_run,
        progress,
    };

    // Graceful shutdown: finish in-flight steps, abandon queued ones.
    let cancel = Arc::new(AtomicBool::new(false));
    let c = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        c.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    match collect::run(steps, &config, &mut sink, &cancel) {
        Ok(stats) => {
            if cancel.load(Ordering::SeqCst) {
                eprintln!(
                    "Interrupted, measured {} of {} steps",
                    stats.completed, stats.total
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            exit(1);
        }
    }
}

fn run_print(args: PrintArgs) {
    let filter = args
        .filter
        .as_deref()
        .map(|pattern| compile_pattern("--filter", pattern));
    let exclude = args
        .exclude
        .as_deref()
        .map(|pattern| compile_pattern("--exclude", pattern));

    let rows = report::load(&args.data_file).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        exit(1);
    });
    let rows = report::filter_rows(rows, filter.as_ref(), exclude.as_ref());

    print!("{}", report::render_report(&rows, args.number));
}
