//! [`EventWriter`]: buffered, size/interval-flushed JSONL append, grounded
//! in the teacher's `csa-session::event_writer` (same flush thresholds,
//! same resumable-sequence-on-reopen behavior), narrowed to
//! [`crate::entry::SessionEntry`].

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;

use crate::entry::SessionEntry;
use crate::reader::read_entries;

const FLUSH_SIZE_BYTES: usize = 64 * 1024;
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Serialize)]
struct JsonlLine<'a> {
    seq: u64,
    ts: String,
    #[serde(flatten)]
    entry: &'a SessionEntry,
}

/// Append-only sink for a session's event stream (§4.9). Serialized per
/// run: the orchestrator is the sole writer for its run, so ordering is
/// preserved without locking (§5 "locking discipline").
pub struct EventWriter {
    path: PathBuf,
    writer: BufWriter<std::fs::File>,
    pending_bytes: usize,
    last_flush: Instant,
    seq: u64,
}

impl EventWriter {
    /// Open (creating if absent) and resume the sequence counter from the
    /// existing line count, so a reopened log keeps strictly increasing
    /// `seq` values rather than restarting at 0.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let existing_lines = if path.exists() {
            read_entries(path)?.len() as u64
        } else {
            0
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            pending_bytes: 0,
            last_flush: Instant::now(),
            seq: existing_lines,
        })
    }

    pub fn append(&mut self, entry: &SessionEntry) -> Result<()> {
        let line = JsonlLine {
            seq: self.seq,
            ts: chrono::Utc::now().to_rfc3339(),
            entry,
        };
        let mut bytes = serde_json::to_vec(&line).context("serializing session entry")?;
        bytes.push(b'\n');
        self.seq += 1;
        self.pending_bytes += bytes.len();
        self.writer.write_all(&bytes).context("writing session entry")?;

        if self.pending_bytes >= FLUSH_SIZE_BYTES || self.last_flush.elapsed() >= FLUSH_INTERVAL {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("flushing session log")?;
        self.pending_bytes = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush session log on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::SessionEntry;

    #[test]
    fn append_then_read_round_trips_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        {
            let mut writer = EventWriter::open(&path).unwrap();
            writer
                .append(&SessionEntry::Run {
                    run_id: "r1".into(),
                    task: "do it".into(),
                    max_steps: 10,
                })
                .unwrap();
            writer
                .append(&SessionEntry::final_state_set("r1", 1, "completed"))
                .unwrap();
            writer.flush().unwrap();
        }
        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], SessionEntry::Run { .. }));
        assert!(entries[1].is_final_state_set());
    }

    #[test]
    fn reopening_resumes_the_sequence_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        {
            let mut writer = EventWriter::open(&path).unwrap();
            writer
                .append(&SessionEntry::Run {
                    run_id: "r1".into(),
                    task: "t".into(),
                    max_steps: 1,
                })
                .unwrap();
        }
        {
            let mut writer = EventWriter::open(&path).unwrap();
            assert_eq!(writer.seq, 1);
            writer
                .append(&SessionEntry::final_state_set("r1", 1, "completed"))
                .unwrap();
        }
        assert_eq!(read_entries(&path).unwrap().len(), 2);
    }
}
