//! Ranking reports over a collected measurement log.
//!
//! Reads both log shapes (three columns from a batch run, four from
//! intercept wrappers) and renders the most expensive entries by peak
//! memory and by duration as aligned text tables.

use regex::Regex;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};

/// One row of a measurement log.
#[derive(Debug, Clone, Deserialize)]
pub struct LogRow {
    pub file: String,
    /// Peak resident set size in bytes.
    pub max_rss: u64,
    /// Duration in seconds.
    pub time: f64,
    /// Step kind; present in shared logs only.
    #[serde(rename = "type", default)]
    pub category: Option<String>,
}

/// Error type for report loading failures.
#[derive(Debug)]
pub enum ReportError {
    /// The data file does not exist.
    NotFound(PathBuf),
    /// The data file could not be read or parsed.
    Csv(csv::Error),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::NotFound(path) => write!(f, "no such data file: {:?}", path),
            ReportError::Csv(e) => write!(f, "cannot read data file: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}

/// Loads every row of a measurement log.
pub fn load(path: &Path) -> Result<Vec<LogRow>, ReportError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        let not_found = matches!(
            e.kind(),
            csv::ErrorKind::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound
        );
        if not_found {
            ReportError::NotFound(path.to_path_buf())
        } else {
            ReportError::Csv(e)
        }
    })?;

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row.map_err(ReportError::Csv)?);
    }
    Ok(rows)
}

/// Applies include/exclude filters to log rows. Exclusion wins.
pub fn filter_rows(
    rows: Vec<LogRow>,
    filter: Option<&Regex>,
    exclude: Option<&Regex>,
) -> Vec<LogRow> {
    rows.into_iter()
        .filter(|row| {
            filter.is_none_or(|f| f.is_match(&row.file))
                && !exclude.is_some_and(|e| e.is_match(&row.file))
        })
        .collect()
}

/// Rows ranked by peak memory, descending, truncated to `n`.
///
/// The sort is stable, so ties keep their log order.
pub fn top_by_rss(rows: &[LogRow], n: usize) -> Vec<&LogRow> {
    let mut ranked: Vec<&LogRow> = rows.iter().collect();
    ranked.sort_by(|a, b| b.max_rss.cmp(&a.max_rss));
    ranked.truncate(n);
    ranked
}

/// Rows ranked by duration, descending, truncated to `n`.
pub fn top_by_time(rows: &[LogRow], n: usize) -> Vec<&LogRow> {
    let mut ranked: Vec<&LogRow> = rows.iter().collect();
    ranked.sort_by(|a, b| b.time.total_cmp(&a.time));
    ranked.truncate(n);
    ranked
}

/// Renders rows as an aligned table with memory rescaled to megabytes.
pub fn render_table(rows: &[&LogRow]) -> String {
    let headers = ["file", "max_rss [M]", "time [s]"];

    let mut cells: Vec<[String; 3]> = Vec::with_capacity(rows.len());
    for row in rows {
        cells.push([
            row.file.clone(),
            format!("{:.2}", row.max_rss as f64 / 1e6),
            format!("{:.2}", row.time),
        ]);
    }

    let mut widths = [headers[0].len(), headers[1].len(), headers[2].len()];
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<w0$}  {:>w1$}  {:>w2$}\n",
        headers[0],
        headers[1],
        headers[2],
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2]
    ));
    out.push_str(&format!(
        "{}  {}  {}\n",
        "-".repeat(widths[0]),
        "-".repeat(widths[1]),
        "-".repeat(widths[2])
    ));
    for row in &cells {
        out.push_str(&format!(
            "{:<w0$}  {:>w1$}  {:>w2$}\n",
            row[0],
            row[1],
            row[2],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2]
        ));
    }
    out
}

/// Full report: top entries by memory, a blank line, top entries by time.
pub fn render_report(rows: &[LogRow], n: usize) -> String {
    let mut out = String::new();
    out.push_str(&render_table(&top_by_rss(rows, n)));
    out.push('\n');
    out.push_str(&render_table(&top_by_time(rows, n)));
    out
}
