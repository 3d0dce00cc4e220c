//! Process-tree memory accounting via the `/proc` filesystem.
//!
//! Split into:
//! - `traits` — filesystem abstraction (`FileSystem`, `RealFs`)
//! - `mock` — in-memory filesystem for tests
//! - `parser` — pure parsers for `/proc/[pid]/stat` and `/proc/[pid]/status`
//! - `tree` — `ProcessTree`, resident-memory summation over a process tree

pub mod mock;
pub mod parser;
pub mod traits;
pub mod tree;

pub use mock::MockFs;
pub use parser::{ParseError, StatLine, parse_stat, vm_rss_bytes};
pub use traits::{FileSystem, RealFs};
pub use tree::ProcessTree;
