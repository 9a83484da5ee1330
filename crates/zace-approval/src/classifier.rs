//! The destructive-command classifier (§4.5 step 1). Real classification
//! is LLM-assisted and lives outside the CORE; [`SafetyClassifier`] is the
//! narrow seam it's reached through.

use async_trait::async_trait;
use regex::Regex;
use zace_core::AppError;

/// Returns `Some(reason)` when a command is judged destructive enough to
/// require approval, `None` otherwise.
#[async_trait]
pub trait SafetyClassifier: Send + Sync {
    async fn classify(&self, command: &str) -> Result<Option<String>, AppError>;
}

/// Regex-pattern stand-in for the LLM classifier: flags a short list of
/// recognizably destructive shapes (recursive deletes, force-pushes,
/// disk-wiping redirections, privilege escalation). Good enough for
/// `doctor` dry-runs and tests; production classification is the LLM
/// collaborator this trait abstracts over.
pub struct HeuristicClassifier {
    patterns: Vec<(Regex, &'static str)>,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        let patterns = [
            (r"rm\s+-[a-zA-Z]*r[a-zA-Z]*f|rm\s+-[a-zA-Z]*f[a-zA-Z]*r", "recursive force delete"),
            (r"git\s+push\s+.*--force|git\s+push\s+.*-f\b", "force-push can overwrite remote history"),
            (r"git\s+reset\s+--hard", "hard reset discards uncommitted work"),
            (r">\s*/dev/sd[a-z]", "writes directly to a block device"),
            (r"\bdd\s+.*of=", "dd can overwrite arbitrary disk regions"),
            (r"\bsudo\b", "privilege escalation"),
            (r"\bmkfs\b", "formats a filesystem"),
            (r"chmod\s+-R\s+777", "world-writable recursive permission change"),
        ]
        .into_iter()
        .map(|(pattern, reason)| (Regex::new(pattern).expect("static pattern compiles"), reason))
        .collect();
        Self { patterns }
    }
}

#[async_trait]
impl SafetyClassifier for HeuristicClassifier {
    async fn classify(&self, command: &str) -> Result<Option<String>, AppError> {
        let lower = command.to_ascii_lowercase();
        for (pattern, reason) in &self.patterns {
            if pattern.is_match(&lower) {
                return Ok(Some(reason.to_string()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flags_recursive_force_delete() {
        let classifier = HeuristicClassifier::default();
        let reason = classifier.classify("rm -rf build/").await.unwrap();
        assert!(reason.is_some());
    }

    #[tokio::test]
    async fn flags_force_push() {
        let classifier = HeuristicClassifier::default();
        let reason = classifier.classify("git push origin main --force").await.unwrap();
        assert!(reason.is_some());
    }

    #[tokio::test]
    async fn benign_command_is_not_flagged() {
        let classifier = HeuristicClassifier::default();
        let reason = classifier.classify("ls -la").await.unwrap();
        assert!(reason.is_none());
    }
}
