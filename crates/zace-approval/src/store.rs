//! Persisted approval rules (§4.5 step 4, §6 "implementation choice"):
//! keyed by signature, TOML on disk — the concrete shape `spec.md` leaves
//! open, grounded in the teacher's flat rule-file persistence pattern
//! (`weave_lock.rs`'s keyed-record-list-in-TOML shape).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zace_core::types::ApprovalScope;
use zace_core::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDecision {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub signature: String,
    pub scope: ApprovalScope,
    pub decision: RuleDecision,
    pub created_at: String,
    /// Set only for `scope == Session`: the rule matches only within the
    /// session (process run) that created it. `Workspace`-scoped rules
    /// match regardless of session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RulesFile {
    #[serde(default, rename = "rule")]
    rules: Vec<ApprovalRule>,
}

#[derive(Debug, Default)]
pub struct ApprovalStore {
    rules: HashMap<String, ApprovalRule>,
}

impl ApprovalStore {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::ToolExecution(format!("reading {}: {e}", path.display())))?;
        let file: RulesFile = toml::from_str(&text)
            .map_err(|e| AppError::ToolExecution(format!("parsing {}: {e}", path.display())))?;
        let rules = file
            .rules
            .into_iter()
            .map(|r| (r.signature.clone(), r))
            .collect();
        Ok(Self { rules })
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::ToolExecution(format!("creating {}: {e}", parent.display())))?;
        }
        let mut rules: Vec<ApprovalRule> = self.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.signature.cmp(&b.signature));
        let file = RulesFile { rules };
        let text = toml::to_string_pretty(&file)
            .map_err(|e| AppError::ToolExecution(format!("serializing approvals: {e}")))?;
        std::fs::write(path, text)
            .map_err(|e| AppError::ToolExecution(format!("writing {}: {e}", path.display())))?;
        Ok(())
    }

    /// Look up a rule by signature, honoring `Session` scoping against
    /// `current_session_id`.
    pub fn lookup(&self, signature: &str, current_session_id: &str) -> Option<&ApprovalRule> {
        let rule = self.rules.get(signature)?;
        match rule.scope {
            ApprovalScope::Workspace => Some(rule),
            ApprovalScope::Session => {
                if rule.session_id.as_deref() == Some(current_session_id) {
                    Some(rule)
                } else {
                    None
                }
            }
            ApprovalScope::Once => None,
        }
    }

    pub fn upsert(&mut self, rule: ApprovalRule) {
        self.rules.insert(rule.signature.clone(), rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(signature: &str, scope: ApprovalScope, decision: RuleDecision, session_id: Option<&str>) -> ApprovalRule {
        ApprovalRule {
            signature: signature.to_string(),
            scope,
            decision,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            session_id: session_id.map(str::to_string),
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approvals.toml");
        let mut store = ApprovalStore::default();
        store.upsert(rule("sig-1", ApprovalScope::Workspace, RuleDecision::Allow, None));
        store.save(&path).unwrap();

        let reloaded = ApprovalStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.lookup("sig-1", "any-session").is_some());
    }

    #[test]
    fn session_scoped_rule_only_matches_its_session() {
        let mut store = ApprovalStore::default();
        store.upsert(rule("sig-2", ApprovalScope::Session, RuleDecision::Allow, Some("s1")));
        assert!(store.lookup("sig-2", "s1").is_some());
        assert!(store.lookup("sig-2", "s2").is_none());
    }

    #[test]
    fn once_scoped_rules_never_persist_lookup() {
        let mut store = ApprovalStore::default();
        store.upsert(rule("sig-3", ApprovalScope::Once, RuleDecision::Allow, None));
        assert!(store.lookup("sig-3", "s1").is_none());
    }

    #[test]
    fn missing_file_loads_empty() {
        let store = ApprovalStore::load(Path::new("/nonexistent/approvals.toml")).unwrap();
        assert!(store.is_empty());
    }
}
