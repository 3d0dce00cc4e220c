//! buildperf-core — shared library for the buildperf tools.
//!
//! Provides:
//! - `compiledb` — compilation database loading
//! - `collect` — batch measurement over a compilation database
//! - `intercept` — compiler/linker wrapper driver
//! - `model` — shared data models (steps, categories, measurements)
//! - `procfs` — process tree memory readings from /proc
//! - `report` — ranking reports over a measurement log
//! - `sampler` — single-step spawning and memory polling
//! - `sink` — measurement log writers (direct and lock-guarded shared)
//! - `util` — helper utilities (shell quoting, path display)

pub mod collect;
pub mod compiledb;
pub mod intercept;
pub mod model;
pub mod procfs;
pub mod report;
pub mod sampler;
pub mod sink;
pub mod util;
