//! [`RuntimeConfig`]: the layered merge of built-in defaults, a project TOML
//! file, and environment variable overrides (§6).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use zace_core::types::PlannerOutputMode;

/// `executorAnalysis` (§6): when the executor-analysis LLM call opines on
/// shell-retry decisions (§4.6 step 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorAnalysisMode {
    Always,
    OnFailure,
    Never,
}

impl Default for ExecutorAnalysisMode {
    fn default() -> Self {
        Self::OnFailure
    }
}

/// `completionValidationMode` (§6): how strictly the completion-gate
/// pipeline (§4.4) demands discovered gates and rejects masked ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionValidationMode {
    Strict,
    Balanced,
    LlmOnly,
}

impl Default for CompletionValidationMode {
    fn default() -> Self {
        Self::Balanced
    }
}

impl CompletionValidationMode {
    pub fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// `docContextMode` (§6): out of CORE scope for retrieval itself (project-
/// documentation discovery is an external collaborator, §1) but the runtime
/// still carries the knob so a caller can wire one in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocContextMode {
    Off,
    Targeted,
    Full,
}

impl Default for DocContextMode {
    fn default() -> Self {
        Self::Off
    }
}

/// The layered runtime configuration: one field per `spec.md` §6 option,
/// each carrying the documented or an explicitly chosen default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub max_steps: u32,
    pub stream: bool,
    pub verbose: bool,
    pub executor_analysis: ExecutorAnalysisMode,
    pub doom_loop_threshold: u32,
    pub stagnation_window: u32,
    pub readonly_stagnation_window: u32,
    pub transient_retry_max_attempts: u32,
    pub transient_retry_max_delay_ms: u64,
    pub completion_validation_mode: CompletionValidationMode,
    pub completion_require_discovered_gates: bool,
    pub completion_require_lsp: bool,
    pub completion_block_repeat_limit: u32,
    pub gate_disallow_masking: bool,
    pub command_allow_patterns: Vec<String>,
    pub command_deny_patterns: Vec<String>,
    pub lsp_enabled: bool,
    pub lsp_auto_provision: bool,
    pub lsp_bootstrap_block_on_failed: bool,
    pub lsp_provision_max_attempts: u32,
    pub lsp_wait_for_diagnostics_ms: u64,
    pub lsp_server_config_path: String,
    pub lsp_max_diagnostics_per_file: usize,
    pub lsp_max_files_in_output: usize,
    pub write_regression_error_spike: u32,
    pub compaction_trigger_ratio: f64,
    pub compaction_preserve_recent_messages: u32,
    pub planner_output_mode: PlannerOutputMode,
    pub planner_schema_strict: bool,
    pub planner_parse_max_repairs: u32,
    pub planner_parse_retry_on_failure: bool,
    pub planner_max_invalid_artifact_chars: usize,
    pub require_risky_confirmation: bool,
    pub risky_confirmation_token: String,
    pub runtime_script_enforced: bool,
    pub doc_context_mode: DocContextMode,
    pub doc_context_max_chars: usize,
    pub doc_context_max_files: usize,
    /// Shell executor output cap, env-derived in the source (§4.1); kept
    /// here so it participates in the same layered merge as every other
    /// option rather than being read out-of-band.
    pub output_limit_chars: usize,
    pub shell_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            stream: false,
            verbose: false,
            executor_analysis: ExecutorAnalysisMode::default(),
            doom_loop_threshold: 3,
            stagnation_window: 3,
            readonly_stagnation_window: 4,
            transient_retry_max_attempts: 2,
            transient_retry_max_delay_ms: 5_000,
            completion_validation_mode: CompletionValidationMode::default(),
            completion_require_discovered_gates: false,
            completion_require_lsp: false,
            completion_block_repeat_limit: 2,
            gate_disallow_masking: true,
            command_allow_patterns: Vec::new(),
            command_deny_patterns: Vec::new(),
            lsp_enabled: true,
            lsp_auto_provision: true,
            lsp_bootstrap_block_on_failed: false,
            lsp_provision_max_attempts: 2,
            lsp_wait_for_diagnostics_ms: 2_000,
            lsp_server_config_path: ".zace/runtime/lsp/servers.json".to_string(),
            lsp_max_diagnostics_per_file: 20,
            lsp_max_files_in_output: 10,
            write_regression_error_spike: 3,
            compaction_trigger_ratio: 0.8,
            compaction_preserve_recent_messages: 20,
            planner_output_mode: PlannerOutputMode::Auto,
            planner_schema_strict: false,
            planner_parse_max_repairs: 2,
            planner_parse_retry_on_failure: true,
            planner_max_invalid_artifact_chars: 20_000,
            require_risky_confirmation: true,
            risky_confirmation_token: "CONFIRM".to_string(),
            runtime_script_enforced: false,
            doc_context_mode: DocContextMode::default(),
            doc_context_max_chars: 20_000,
            doc_context_max_files: 10,
            output_limit_chars: 120_000,
            shell_timeout_ms: 120_000,
        }
    }
}

impl RuntimeConfig {
    /// Load: built-in defaults, merged with `<project_root>/.zace/config.toml`
    /// if present, merged with `ZACE_*` environment overrides. Later sources
    /// win, matching the teacher's project-over-defaults, env-over-project
    /// precedence in `config_merge.rs`.
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut config = Self::default();

        let project_path = project_root.join(".zace").join("config.toml");
        if project_path.exists() {
            let text = std::fs::read_to_string(&project_path)
                .with_context(|| format!("reading {}", project_path.display()))?;
            let partial: PartialConfig = toml::from_str(&text)
                .with_context(|| format!("parsing {}", project_path.display()))?;
            partial.apply(&mut config);
        }

        apply_env_overrides(&mut config)?;
        Ok(config)
    }
}

/// A project file is allowed to specify any subset of options; unspecified
/// fields fall back to whatever `RuntimeConfig::default()` (or an earlier
/// layer) already holds. Mirrors the teacher's `Option<T>`-field merge
/// pattern in `config_merge.rs` rather than requiring a full document.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PartialConfig {
    max_steps: Option<u32>,
    stream: Option<bool>,
    verbose: Option<bool>,
    executor_analysis: Option<ExecutorAnalysisMode>,
    doom_loop_threshold: Option<u32>,
    stagnation_window: Option<u32>,
    readonly_stagnation_window: Option<u32>,
    transient_retry_max_attempts: Option<u32>,
    transient_retry_max_delay_ms: Option<u64>,
    completion_validation_mode: Option<CompletionValidationMode>,
    completion_require_discovered_gates: Option<bool>,
    completion_require_lsp: Option<bool>,
    completion_block_repeat_limit: Option<u32>,
    gate_disallow_masking: Option<bool>,
    command_allow_patterns: Option<Vec<String>>,
    command_deny_patterns: Option<Vec<String>>,
    lsp_enabled: Option<bool>,
    lsp_auto_provision: Option<bool>,
    lsp_bootstrap_block_on_failed: Option<bool>,
    lsp_provision_max_attempts: Option<u32>,
    lsp_wait_for_diagnostics_ms: Option<u64>,
    lsp_server_config_path: Option<String>,
    lsp_max_diagnostics_per_file: Option<usize>,
    lsp_max_files_in_output: Option<usize>,
    write_regression_error_spike: Option<u32>,
    compaction_trigger_ratio: Option<f64>,
    compaction_preserve_recent_messages: Option<u32>,
    planner_output_mode: Option<PlannerOutputMode>,
    planner_schema_strict: Option<bool>,
    planner_parse_max_repairs: Option<u32>,
    planner_parse_retry_on_failure: Option<bool>,
    planner_max_invalid_artifact_chars: Option<usize>,
    require_risky_confirmation: Option<bool>,
    risky_confirmation_token: Option<String>,
    runtime_script_enforced: Option<bool>,
    doc_context_mode: Option<DocContextMode>,
    doc_context_max_chars: Option<usize>,
    doc_context_max_files: Option<usize>,
    output_limit_chars: Option<usize>,
    shell_timeout_ms: Option<u64>,
}

macro_rules! apply_opt {
    ($self:ident, $target:ident, $($field:ident),+ $(,)?) => {
        $(if let Some(v) = $self.$field.clone() { $target.$field = v; })+
    };
}

impl PartialConfig {
    fn apply(self, target: &mut RuntimeConfig) {
        apply_opt!(
            self,
            target,
            max_steps,
            stream,
            verbose,
            executor_analysis,
            doom_loop_threshold,
            stagnation_window,
            readonly_stagnation_window,
            transient_retry_max_attempts,
            transient_retry_max_delay_ms,
            completion_validation_mode,
            completion_require_discovered_gates,
            completion_require_lsp,
            completion_block_repeat_limit,
            gate_disallow_masking,
            command_allow_patterns,
            command_deny_patterns,
            lsp_enabled,
            lsp_auto_provision,
            lsp_bootstrap_block_on_failed,
            lsp_provision_max_attempts,
            lsp_wait_for_diagnostics_ms,
            lsp_server_config_path,
            lsp_max_diagnostics_per_file,
            lsp_max_files_in_output,
            write_regression_error_spike,
            compaction_trigger_ratio,
            compaction_preserve_recent_messages,
            planner_output_mode,
            planner_schema_strict,
            planner_parse_max_repairs,
            planner_parse_retry_on_failure,
            planner_max_invalid_artifact_chars,
            require_risky_confirmation,
            risky_confirmation_token,
            runtime_script_enforced,
            doc_context_mode,
            doc_context_max_chars,
            doc_context_max_files,
            output_limit_chars,
            shell_timeout_ms,
        );
    }
}

/// `ZACE_<UPPER_SNAKE_FIELD>` environment overrides, highest precedence.
/// Only scalar/string fields are supported from the environment — list and
/// enum options are project-file-only, matching the teacher's convention
/// that env overrides are for quick scalar tweaks, not structural config.
fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<()> {
    let env: HashMap<String, String> = std::env::vars().collect();

    if let Some(v) = env.get("ZACE_MAX_STEPS") {
        config.max_steps = v.parse().context("ZACE_MAX_STEPS")?;
    }
    if let Some(v) = env.get("ZACE_STREAM") {
        config.stream = parse_bool(v)?;
    }
    if let Some(v) = env.get("ZACE_VERBOSE") {
        config.verbose = parse_bool(v)?;
    }
    if let Some(v) = env.get("ZACE_DOOM_LOOP_THRESHOLD") {
        config.doom_loop_threshold = v.parse().context("ZACE_DOOM_LOOP_THRESHOLD")?;
    }
    if let Some(v) = env.get("ZACE_TRANSIENT_RETRY_MAX_ATTEMPTS") {
        config.transient_retry_max_attempts =
            v.parse().context("ZACE_TRANSIENT_RETRY_MAX_ATTEMPTS")?;
    }
    if let Some(v) = env.get("ZACE_LSP_ENABLED") {
        config.lsp_enabled = parse_bool(v)?;
    }
    if let Some(v) = env.get("ZACE_OUTPUT_LIMIT_CHARS") {
        config.output_limit_chars = v.parse().context("ZACE_OUTPUT_LIMIT_CHARS")?;
    }
    if let Some(v) = env.get("ZACE_SHELL_TIMEOUT_MS") {
        config.shell_timeout_ms = v.parse().context("ZACE_SHELL_TIMEOUT_MS")?;
    }
    if let Some(v) = env.get("ZACE_COMPACTION_TRIGGER_RATIO") {
        config.compaction_trigger_ratio = v.parse().context("ZACE_COMPACTION_TRIGGER_RATIO")?;
    }

    Ok(())
}

fn parse_bool(v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("cannot parse '{other}' as a boolean"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_spec_documented_values() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.doom_loop_threshold, 3);
        assert!(config.gate_disallow_masking);
        assert_eq!(config.output_limit_chars, 120_000);
    }

    #[test]
    fn project_file_overrides_subset_of_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".zace")).unwrap();
        let mut file =
            std::fs::File::create(dir.path().join(".zace/config.toml")).unwrap();
        writeln!(file, "maxSteps = 12").unwrap();
        writeln!(file, "lspEnabled = false").unwrap();
        drop(file);

        let config = RuntimeConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_steps, 12);
        assert!(!config.lsp_enabled);
        // Untouched fields keep their default.
        assert_eq!(config.doom_loop_threshold, 3);
    }

    #[test]
    fn missing_project_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::load(dir.path()).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }
}
