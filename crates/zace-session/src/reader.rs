//! Reads a session log back into its ordered [`SessionEntry`] sequence.

use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::entry::SessionEntry;

#[derive(Deserialize)]
struct JsonlLine {
    #[serde(flatten)]
    entry: SessionEntry,
    #[allow(dead_code)]
    #[serde(default)]
    seq: Option<u64>,
    #[allow(dead_code)]
    #[serde(default)]
    ts: Option<Value>,
}

/// Read every well-formed entry in `path`, in file order. A malformed
/// trailing line (e.g. a crash mid-write) is skipped with a warning rather
/// than failing the whole read — the log is append-only, not transactional.
pub fn read_entries(path: &Path) -> Result<Vec<SessionEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading line {i} of {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JsonlLine>(&line) {
            Ok(parsed) => entries.push(parsed.entry),
            Err(e) => {
                tracing::warn!(path = %path.display(), line = i, error = %e, "skipping malformed session log line");
            }
        }
    }
    Ok(entries)
}
