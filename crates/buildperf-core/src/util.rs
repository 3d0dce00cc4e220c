//! Small path and shell-word helpers.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

/// Joins arguments into a single `sh -c` compatible command line.
///
/// Arguments that need protection are wrapped in single quotes, with embedded
/// single quotes rendered as `'\''`. The result re-executes with exactly the
/// original argument boundaries.
pub fn shell_join<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for arg in args {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&shell_quote(arg.as_ref()));
    }
    out
}

/// Quotes a single shell word if it contains anything the shell would
/// reinterpret.
fn shell_quote(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && arg.bytes().all(is_safe_byte) {
        return Cow::Borrowed(arg);
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    for ch in arg.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

fn is_safe_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(b, b'-' | b'_' | b'.' | b'/' | b'=' | b'+' | b':' | b',' | b'@' | b'%')
}

/// Computes `path` relative to `base` without touching the filesystem.
///
/// Walks up from `base` with `..` components where the two diverge. A path
/// that is already relative is returned unchanged; equal paths yield `.`.
/// Both paths are treated lexically, so `base` should be in canonical form
/// (e.g. the value of `std::env::current_dir()`).
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    if path.is_relative() {
        return path.to_path_buf();
    }

    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();

    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part.as_os_str());
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}
