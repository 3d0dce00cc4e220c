//! Parsers for `/proc` filesystem files.
//!
//! Pure functions over file contents, easily testable with string inputs.
//! Only the fields the tree scanner needs are parsed.

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Leading fields of `/proc/[pid]/stat`.
#[derive(Debug, Clone, Default)]
pub struct StatLine {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
}

/// Parses the prefix of `/proc/[pid]/stat`.
///
/// The format is tricky because the comm field can contain spaces and
/// parentheses. Format: pid (comm) state ppid ...
pub fn parse_stat(content: &str) -> Result<StatLine, ParseError> {
    let content = content.trim();

    // Find the comm field boundaries (enclosed in parentheses)
    let open_paren = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    if close_paren <= open_paren {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let pid: u32 = content[..open_paren]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let comm = content[open_paren + 1..close_paren].to_string();

    let mut fields = content[close_paren + 1..].split_whitespace();
    let state = fields
        .next()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| ParseError::new("missing state"))?;
    let ppid: u32 = fields
        .next()
        .ok_or_else(|| ParseError::new("missing ppid"))?
        .parse()
        .map_err(|_| ParseError::new("invalid ppid"))?;

    Ok(StatLine {
        pid,
        comm,
        state,
        ppid,
    })
}

/// Extracts resident set size in bytes from `/proc/[pid]/status` content.
///
/// The `VmRSS` line reports kB. Processes without the line (zombies, kernel
/// threads) report 0.
pub fn vm_rss_bytes(content: &str) -> u64 {
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            return kb * 1024;
        }
    }
    0
}
