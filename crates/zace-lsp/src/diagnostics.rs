//! Per-file diagnostics tracking with version counters, and the debounced
//! wait used by a probe to decide whether a command's writes produced fresh
//! diagnostics (§4.2).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

/// Latest diagnostics array plus a monotonic version counter for one file.
#[derive(Debug, Clone, Default)]
pub struct FileDiagnostics {
    pub diagnostics: Vec<Value>,
    pub version: u64,
    pub last_published_at: Option<Instant>,
}

/// Tracks diagnostics across all files a client has reported on.
#[derive(Debug, Default)]
pub struct DiagnosticsTracker {
    files: HashMap<String, FileDiagnostics>,
}

impl DiagnosticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `textDocument/publishDiagnostics` notification.
    pub fn publish(&mut self, uri: String, diagnostics: Vec<Value>) {
        let entry = self.files.entry(uri).or_default();
        entry.diagnostics = diagnostics;
        entry.version += 1;
        entry.last_published_at = Some(Instant::now());
    }

    pub fn version(&self, uri: &str) -> u64 {
        self.files.get(uri).map(|f| f.version).unwrap_or(0)
    }

    pub fn get(&self, uri: &str) -> Option<&[Value]> {
        self.files.get(uri).map(|f| f.diagnostics.as_slice())
    }

    /// Poll-friendly readiness check for `waitForDiagnostics`: true once the
    /// version exceeds `baseline` and at least `debounce` has elapsed since
    /// the most recent publish for that file (so a burst of publishes settles
    /// before the caller reads them).
    pub fn is_settled(&self, uri: &str, baseline: u64, debounce: Duration) -> bool {
        match self.files.get(uri) {
            Some(entry) => {
                entry.version > baseline
                    && entry
                        .last_published_at
                        .is_some_and(|t| t.elapsed() >= debounce)
            }
            None => false,
        }
    }
}
