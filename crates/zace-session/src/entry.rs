//! The four typed entry kinds an append-only session log carries (§4.9).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Phase a `run_event` was emitted from (§4.9, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Executing,
    Approval,
    Finalizing,
}

impl Phase {
    /// Index used for the `(step, phase-index)` ordering invariant (§4.9).
    pub fn index(self) -> u8 {
        match self {
            Phase::Planning => 0,
            Phase::Executing => 1,
            Phase::Approval => 2,
            Phase::Finalizing => 3,
        }
    }
}

/// One entry of the append-only session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEntry {
    /// A message appended to a run's message log (mirrors `zace_memory`'s
    /// role/content shape without depending on that crate — the sink is a
    /// serialization boundary, not a shared-type boundary).
    Message {
        run_id: String,
        role: String,
        content: String,
    },
    /// A compaction summary (§4.7).
    Summary { run_id: String, content: String },
    /// Marks the start of a run.
    Run {
        run_id: String,
        task: String,
        max_steps: u32,
    },
    /// One orchestrator-emitted telemetry event (§4.6, §4.9).
    RunEvent {
        run_id: String,
        step: u32,
        phase: Phase,
        event: String,
        #[serde(default)]
        payload: Map<String, Value>,
    },
}

impl SessionEntry {
    pub fn run_id(&self) -> &str {
        match self {
            SessionEntry::Message { run_id, .. }
            | SessionEntry::Summary { run_id, .. }
            | SessionEntry::Run { run_id, .. }
            | SessionEntry::RunEvent { run_id, .. } => run_id,
        }
    }

    /// Convenience constructor for `final_state_set`, the one event every
    /// run is guaranteed to emit as its terminal entry (§4.9, §7).
    pub fn final_state_set(run_id: impl Into<String>, step: u32, final_state: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("finalState".to_string(), Value::String(final_state.to_string()));
        SessionEntry::RunEvent {
            run_id: run_id.into(),
            step,
            phase: Phase::Finalizing,
            event: "final_state_set".to_string(),
            payload,
        }
    }

    pub fn is_final_state_set(&self) -> bool {
        matches!(self, SessionEntry::RunEvent { event, .. } if event == "final_state_set")
    }

    pub fn is_run_started(&self) -> bool {
        matches!(self, SessionEntry::RunEvent { event, .. } if event == "run_started")
    }
}
