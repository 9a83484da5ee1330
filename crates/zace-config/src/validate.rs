//! Configuration validation: range/enum/regex checks run before the run
//! loop starts, surfaced as a list rather than a single bail (§A.3/A.4 of
//! `SPEC_FULL.md`), grounded in the teacher's `validate.rs` per-section
//! check functions.

use regex::Regex;

use crate::config::RuntimeConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Start-up refuses to proceed.
    Error,
    /// Surfaced to the operator but does not block.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

/// Validate a loaded [`RuntimeConfig`]. Does not itself load the config —
/// callers run `RuntimeConfig::load` first, matching the teacher's
/// load-then-validate split (`validate_config` calls `ProjectConfig::load`).
pub fn validate(config: &RuntimeConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if config.max_steps == 0 {
        issues.push(ValidationIssue::error(
            "maxSteps",
            "must be greater than 0",
        ));
    }
    if config.max_steps > 500 {
        issues.push(ValidationIssue::warning(
            "maxSteps",
            format!("{} is unusually high; runs may be expensive", config.max_steps),
        ));
    }

    if config.doom_loop_threshold == 0 {
        issues.push(ValidationIssue::error(
            "doomLoopThreshold",
            "must be greater than 0",
        ));
    }
    if config.readonly_stagnation_window == 0 {
        issues.push(ValidationIssue::error(
            "readonlyStagnationWindow",
            "must be greater than 0",
        ));
    }
    if config.completion_block_repeat_limit == 0 {
        issues.push(ValidationIssue::error(
            "completionBlockRepeatLimit",
            "must be greater than 0",
        ));
    }

    if !(0.0..=1.0).contains(&config.compaction_trigger_ratio) {
        issues.push(ValidationIssue::error(
            "compactionTriggerRatio",
            format!(
                "{} is outside the valid [0.0, 1.0] range",
                config.compaction_trigger_ratio
            ),
        ));
    }

    if config.output_limit_chars == 0 {
        issues.push(ValidationIssue::error(
            "outputLimitChars",
            "must be greater than 0",
        ));
    }
    if config.shell_timeout_ms == 0 {
        issues.push(ValidationIssue::warning(
            "shellTimeoutMs",
            "0 disables the timeout entirely; commands can run unbounded",
        ));
    }

    for (field, patterns) in [
        ("commandAllowPatterns", &config.command_allow_patterns),
        ("commandDenyPatterns", &config.command_deny_patterns),
    ] {
        for pattern in patterns {
            if let Err(e) = Regex::new(pattern) {
                issues.push(ValidationIssue::error(
                    field,
                    format!("invalid regex '{pattern}': {e}"),
                ));
            }
        }
    }

    if config.lsp_enabled && config.lsp_server_config_path.trim().is_empty() {
        issues.push(ValidationIssue::error(
            "lspServerConfigPath",
            "must be set when lspEnabled is true",
        ));
    }

    if config.require_risky_confirmation && config.risky_confirmation_token.trim().is_empty() {
        issues.push(ValidationIssue::error(
            "riskyConfirmationToken",
            "must be non-empty when requireRiskyConfirmation is true",
        ));
    }

    issues
}

/// Whether `issues` contains anything that should stop start-up.
pub fn has_blocking_issues(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RuntimeConfig::default();
        let issues = validate(&config);
        assert!(!has_blocking_issues(&issues), "{issues:?}");
    }

    #[test]
    fn zero_max_steps_is_an_error() {
        let config = RuntimeConfig {
            max_steps: 0,
            ..RuntimeConfig::default()
        };
        let issues = validate(&config);
        assert!(has_blocking_issues(&issues));
    }

    #[test]
    fn invalid_deny_pattern_regex_is_an_error() {
        let config = RuntimeConfig {
            command_deny_patterns: vec!["(unclosed".to_string()],
            ..RuntimeConfig::default()
        };
        let issues = validate(&config);
        assert!(has_blocking_issues(&issues));
        assert!(issues.iter().any(|i| i.field == "commandDenyPatterns"));
    }

    #[test]
    fn out_of_range_compaction_ratio_is_an_error() {
        let config = RuntimeConfig {
            compaction_trigger_ratio: 1.5,
            ..RuntimeConfig::default()
        };
        let issues = validate(&config);
        assert!(has_blocking_issues(&issues));
    }

    #[test]
    fn high_max_steps_is_a_warning_not_an_error() {
        let config = RuntimeConfig {
            max_steps: 1000,
            ..RuntimeConfig::default()
        };
        let issues = validate(&config);
        assert!(!has_blocking_issues(&issues));
        assert!(issues.iter().any(|i| i.severity == Severity::Warning));
    }
}
