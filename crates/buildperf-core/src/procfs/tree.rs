//! Resident-memory summation over a process and its descendants.

use crate::procfs::parser::{parse_stat, vm_rss_bytes};
use crate::procfs::traits::{FileSystem, RealFs};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Scans `/proc` and sums resident memory over a process tree.
///
/// Every scan is a fresh snapshot: the parent/child relation is rebuilt from
/// scratch so processes that fork or exit between ticks are picked up. A
/// process that vanishes mid-scan simply contributes zero; the measurement
/// loop tolerates transient underreads.
pub struct ProcessTree<F: FileSystem> {
    fs: F,
    proc_path: PathBuf,
}

impl ProcessTree<RealFs> {
    /// Scanner over the host `/proc`.
    pub fn host() -> Self {
        Self::new(RealFs::new(), "/proc")
    }
}

impl<F: FileSystem> ProcessTree<F> {
    /// Creates a scanner over the given filesystem and proc root.
    pub fn new(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    /// Resident set size of a single process in bytes, 0 if it is gone or
    /// unreadable.
    pub fn rss_bytes(&self, pid: u32) -> u64 {
        let path = self.proc_path.join(pid.to_string()).join("status");
        match self.fs.read_to_string(&path) {
            Ok(content) => vm_rss_bytes(&content),
            Err(_) => 0,
        }
    }

    /// Sums resident memory over `root` and every live descendant.
    ///
    /// Descendants are discovered by scanning all numeric `/proc` entries and
    /// following parent pids, so the set reflects whatever is alive at this
    /// instant. Unreadable or vanished entries contribute zero.
    pub fn tree_rss_bytes(&self, root: u32) -> u64 {
        let entries = match self.fs.read_dir(&self.proc_path) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for entry in entries {
            let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(pid) = name.parse::<u32>() else {
                continue;
            };
            let Ok(content) = self.fs.read_to_string(&entry.join("stat")) else {
                continue;
            };
            let Ok(stat) = parse_stat(&content) else {
                continue;
            };
            children.entry(stat.ppid).or_default().push(pid);
        }

        let mut total = 0u64;
        let mut seen = HashSet::new();
        let mut pending = vec![root];
        while let Some(pid) = pending.pop() {
            if !seen.insert(pid) {
                continue;
            }
            total += self.rss_bytes(pid);
            if let Some(kids) = children.get(&pid) {
                pending.extend_from_slice(kids);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procfs::mock::MockFs;

    #[test]
    fn test_tree_rss_single_process() {
        let mut fs = MockFs::new();
        fs.add_process(100, 1, "cc1plus", 2048);

        let tree = ProcessTree::new(fs, "/proc");
        assert_eq!(tree.tree_rss_bytes(100), 2048 * 1024);
    }

    #[test]
    fn test_tree_rss_sums_descendants() {
        let mut fs = MockFs::new();
        fs.add_process(100, 1, "sh", 1000);
        fs.add_process(101, 100, "make", 2000);
        fs.add_process(102, 101, "cc1plus", 4000);
        fs.add_process(103, 101, "as", 500);
        // Unrelated process must not be counted.
        fs.add_process(200, 1, "sshd", 9999);

        let tree = ProcessTree::new(fs, "/proc");
        assert_eq!(tree.tree_rss_bytes(100), (1000 + 2000 + 4000 + 500) * 1024);
    }

    #[test]
    fn test_tree_rss_root_missing() {
        let mut fs = MockFs::new();
        fs.add_process(200, 1, "sshd", 9999);

        let tree = ProcessTree::new(fs, "/proc");
        assert_eq!(tree.tree_rss_bytes(100), 0);
    }

    #[test]
    fn test_tree_rss_unreadable_status_counts_zero() {
        let mut fs = MockFs::new();
        fs.add_process(100, 1, "sh", 1000);
        // Child has a stat line but no readable status.
        fs.add_file("/proc/101/stat", "101 (cc1plus) R 100 101 101 0 -1 4194304 0 0");

        let tree = ProcessTree::new(fs, "/proc");
        assert_eq!(tree.tree_rss_bytes(100), 1000 * 1024);
    }

    #[test]
    fn test_tree_rss_zombie_counts_zero() {
        let mut fs = MockFs::new();
        fs.add_process(100, 1, "sh", 1000);
        fs.add_zombie(101, 100, "cc1plus");

        let tree = ProcessTree::new(fs, "/proc");
        assert_eq!(tree.tree_rss_bytes(100), 1000 * 1024);
    }

    #[test]
    fn test_tree_rss_ignores_non_numeric_entries() {
        let mut fs = MockFs::new();
        fs.add_process(100, 1, "sh", 1000);
        fs.add_file("/proc/meminfo", "MemTotal: 16384 kB\n");
        fs.add_dir("/proc/sys");

        let tree = ProcessTree::new(fs, "/proc");
        assert_eq!(tree.tree_rss_bytes(100), 1000 * 1024);
    }

    #[test]
    fn test_tree_rss_empty_proc() {
        let fs = MockFs::new();
        let tree = ProcessTree::new(fs, "/proc");
        assert_eq!(tree.tree_rss_bytes(1), 0);
    }
}
