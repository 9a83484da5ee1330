//! Recovery of runs interrupted mid-flight (§4.9): "a run whose events
//! contain `run_started` but lack `final_state_set` has a synthetic
//! `run_interrupted_recovered` + `final_state_set{finalState=interrupted}`
//! appended."

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Result;
use serde_json::Map;

use crate::entry::{Phase, SessionEntry};
use crate::reader::read_entries;
use crate::writer::EventWriter;

/// Scan `path` for runs that started but never reached a terminal state,
/// append the synthetic recovery entries for each, and return their run
/// ids. Idempotent: a run already carrying `final_state_set` (including one
/// appended by a previous recovery pass) is left untouched.
pub fn recover_interrupted_runs(path: &Path) -> Result<Vec<String>> {
    let entries = read_entries(path)?;

    let mut started: HashSet<String> = HashSet::new();
    let mut finalized: HashSet<String> = HashSet::new();
    let mut last_step: HashMap<String, u32> = HashMap::new();
    let mut first_seen_order: Vec<String> = Vec::new();

    for entry in &entries {
        let run_id = entry.run_id().to_string();
        if !started.contains(&run_id) && !first_seen_order.contains(&run_id) {
            first_seen_order.push(run_id.clone());
        }
        if entry.is_run_started() {
            started.insert(run_id.clone());
        }
        if entry.is_final_state_set() {
            finalized.insert(run_id.clone());
        }
        if let SessionEntry::RunEvent { step, .. } = entry {
            last_step
                .entry(run_id)
                .and_modify(|s| *s = (*s).max(*step))
                .or_insert(*step);
        }
    }

    let mut recovered = Vec::new();
    for run_id in first_seen_order {
        if started.contains(&run_id) && !finalized.contains(&run_id) {
            recovered.push(run_id);
        }
    }

    if recovered.is_empty() {
        return Ok(recovered);
    }

    let mut writer = EventWriter::open(path)?;
    for run_id in &recovered {
        let step = last_step.get(run_id).copied().unwrap_or(0);
        writer.append(&SessionEntry::RunEvent {
            run_id: run_id.clone(),
            step,
            phase: Phase::Finalizing,
            event: "run_interrupted_recovered".to_string(),
            payload: Map::new(),
        })?;
        writer.append(&SessionEntry::final_state_set(run_id.clone(), step, "interrupted"))?;
    }
    writer.flush()?;

    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::SessionEntry;
    use serde_json::Map;

    fn started_event(run_id: &str, step: u32) -> SessionEntry {
        SessionEntry::RunEvent {
            run_id: run_id.to_string(),
            step,
            phase: Phase::Planning,
            event: "run_started".to_string(),
            payload: Map::new(),
        }
    }

    #[test]
    fn unfinalized_run_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        {
            let mut writer = EventWriter::open(&path).unwrap();
            writer.append(&started_event("r1", 1)).unwrap();
            writer.flush().unwrap();
        }

        let recovered = recover_interrupted_runs(&path).unwrap();
        assert_eq!(recovered, vec!["r1".to_string()]);

        let entries = read_entries(&path).unwrap();
        assert!(entries.iter().any(|e| e.is_final_state_set()));
        assert_eq!(entries.iter().filter(|e| e.is_final_state_set()).count(), 1);
    }

    #[test]
    fn finalized_run_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        {
            let mut writer = EventWriter::open(&path).unwrap();
            writer.append(&started_event("r1", 1)).unwrap();
            writer
                .append(&SessionEntry::final_state_set("r1", 2, "completed"))
                .unwrap();
            writer.flush().unwrap();
        }

        let recovered = recover_interrupted_runs(&path).unwrap();
        assert!(recovered.is_empty());
    }

    #[test]
    fn recovery_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        {
            let mut writer = EventWriter::open(&path).unwrap();
            writer.append(&started_event("r1", 1)).unwrap();
            writer.flush().unwrap();
        }
        let first = recover_interrupted_runs(&path).unwrap();
        let second = recover_interrupted_runs(&path).unwrap();
        assert_eq!(first, vec!["r1".to_string()]);
        assert!(second.is_empty());
    }
}
