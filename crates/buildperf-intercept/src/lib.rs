//! Shared driver for the intercept wrapper binaries.
//!
//! Both wrappers stand in for a real compiler or linker inside a foreign
//! build, so they take the wrapped command line verbatim from argv, parse
//! no flags of their own beyond a bare `-h`/`--help`, and stay quiet on
//! the happy path. Configuration comes from the environment only.

use std::env;
use std::process::exit;

use buildperf_core::intercept::{self, DEFAULT_LOG, INTERVAL_ENV, InterceptConfig, OUTPUT_ENV};
use buildperf_core::model::Category;

/// Entry point shared by both wrapper binaries.
pub fn run_tool(category: Category, tool: &str) -> ! {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.is_empty() {
        print_usage(tool);
        exit(1);
    }
    if intercept::is_help(&args) {
        print_usage(tool);
        exit(0);
    }

    let config = InterceptConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        exit(1);
    });

    match intercept::run(category, &args, &config) {
        Ok(sampled) => match sampled.status {
            Some(status) => exit(status.code().unwrap_or(1)),
            None => exit(0),
        },
        Err(e) => {
            eprintln!("Error: {e}");
            exit(1);
        }
    }
}

fn print_usage(tool: &str) {
    println!("usage: {tool} <command line of the wrapped tool>");
    println!();
    println!("Runs the given command, samples the peak resident memory of its");
    println!("process tree, appends one row to a shared CSV log, and exits with");
    println!("the wrapped command's status.");
    println!();
    println!("Environment:");
    println!("  {OUTPUT_ENV}    log path (default: {DEFAULT_LOG})");
    println!("  {INTERVAL_ENV}  sample interval in seconds (default: 0.5)");
}
