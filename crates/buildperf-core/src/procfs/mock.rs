//! In-memory mock filesystem for testing without real `/proc`.
//!
//! `MockFs` simulates a `/proc` layout in memory, letting tests exercise the
//! tree scanner with arbitrary process hierarchies and broken files.

use crate::procfs::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();

        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }

        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.directories.insert(path.clone());

        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Adds a process with synthesized `/proc/[pid]/stat` and `status` files.
    ///
    /// # Arguments
    /// * `pid` - Process ID
    /// * `ppid` - Parent process ID
    /// * `comm` - Command name (may contain spaces or parentheses)
    /// * `rss_kb` - Resident set size reported in `VmRSS`, in kB
    pub fn add_process(&mut self, pid: u32, ppid: u32, comm: &str, rss_kb: u64) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(
            base.join("stat"),
            format!(
                "{} ({}) S {} {} {} 0 -1 4194304 100 0 0 0 10 5 0 0 20 0 1 0 12345 0 {}",
                pid,
                comm,
                ppid,
                pid,
                pid,
                rss_kb / 4
            ),
        );
        self.add_file(
            base.join("status"),
            format!(
                "Name:\t{}\nState:\tS (sleeping)\nPid:\t{}\nPPid:\t{}\nVmRSS:\t{} kB\n",
                comm, pid, ppid, rss_kb
            ),
        );
    }

    /// Adds a zombie process: present in `/proc`, but with no `VmRSS` line.
    pub fn add_zombie(&mut self, pid: u32, ppid: u32, comm: &str) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(
            base.join("stat"),
            format!(
                "{} ({}) Z {} {} {} 0 -1 4194308 0 0 0 0 0 0 0 0 20 0 1 0 12345 0 0",
                pid, comm, ppid, pid, pid
            ),
        );
        self.add_file(
            base.join("status"),
            format!("Name:\t{}\nState:\tZ (zombie)\nPid:\t{}\nPPid:\t{}\n", comm, pid, ppid),
        );
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        for file_path in self.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &self.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }
}
