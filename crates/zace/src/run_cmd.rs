//! The `run` subcommand: constructs every collaborator the run loop needs
//! and drives `orchestrator::run` to a terminal state, grounded in the
//! teacher's `run_cmd.rs` wiring shape and its `doctor.rs` sibling.

use std::collections::HashSet;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};
use ulid::Ulid;

use zace_approval::{ApprovalStore, HeuristicClassifier};
use zace_config::config::RuntimeConfig;
use zace_config::{paths, validate};
use zace_core::types::RunState;
use zace_memory::MessageLog;
use zace_planner::llm::PromptOnlyClient;
use zace_process::AbortSignal;
use zace_retry::NeverRetryAnalysis;
use zace_shell::ShellExecutor;
use zace_shell::policy::CommandPolicy;

use crate::orchestrator::{self, LoopState, RunCollaborators};

const SYSTEM_PROMPT: &str = "You are the planning half of a task-driven coding agent. \
Respond with a single tool call or a completion signal; never narrate.";

pub async fn handle_run(task: Option<String>, cd: Option<PathBuf>, max_steps: Option<u32>) -> Result<i32> {
    let task = match task {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading task from stdin")?;
            buf.trim().to_string()
        }
    };
    if task.is_empty() {
        anyhow::bail!("no task given: pass it as an argument or pipe it on stdin");
    }

    let project_root = cd.unwrap_or(std::env::current_dir()?);
    let mut config = RuntimeConfig::load(&project_root)?;
    if let Some(max_steps) = max_steps {
        config.max_steps = max_steps;
    }

    let issues = validate::validate(&config);
    for issue in &issues {
        match issue.severity {
            validate::Severity::Error => error!(field = %issue.field, "{}", issue.message),
            validate::Severity::Warning => tracing::warn!(field = %issue.field, "{}", issue.message),
        }
    }
    if validate::has_blocking_issues(&issues) {
        anyhow::bail!("configuration has blocking issues; run `zace doctor` for details");
    }

    let artifacts_dir = paths::artifacts_dir(&project_root);
    std::fs::create_dir_all(&artifacts_dir).context("creating artifacts directory")?;

    let policy = CommandPolicy::new(&config.command_allow_patterns, &config.command_deny_patterns)
        .context("compiling command allow/deny patterns")?;
    let executor = ShellExecutor::new(policy, artifacts_dir.clone());

    let lsp_config_path = project_root.join(&config.lsp_server_config_path);
    let mut lsp = zace_lsp::LspRegistry::new(lsp_config_path, config.lsp_enabled)
        .with_limits(config.lsp_max_diagnostics_per_file, config.lsp_max_files_in_output);

    let approvals_path = paths::approvals_path(&project_root);
    let approval_store = ApprovalStore::load(&approvals_path)
        .with_context(|| format!("loading approval rules from {}", approvals_path.display()))?;
    let safety_classifier = HeuristicClassifier::default();
    let mut one_shot_allowlist: HashSet<String> = HashSet::new();

    let planner_client = PromptOnlyClient;
    let summarizer = zace_memory::NoopSummarizer;
    let executor_analysis = NeverRetryAnalysis;

    let session_log_path = paths::session_log_path(&project_root);
    if session_log_path.exists() {
        match zace_session::recover_interrupted_runs(&session_log_path) {
            Ok(recovered) if !recovered.is_empty() => {
                info!(count = recovered.len(), "recovered interrupted runs from prior session log")
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to scan session log for interrupted runs"),
        }
    }
    let mut session = zace_session::EventWriter::open(&session_log_path)
        .with_context(|| format!("opening session log at {}", session_log_path.display()))?;

    let mut memory = MessageLog::new(SYSTEM_PROMPT);

    let abort = AbortSignal::new();
    let ctrl_c_abort = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_abort.fire();
        }
    });

    let run_id = Ulid::new().to_string();
    let session_id = Ulid::new().to_string();

    info!(run_id = %run_id, task = %task, project_root = %project_root.display(), "starting run");

    let mut collab = RunCollaborators {
        planner_client: &planner_client,
        summarizer: &summarizer,
        safety_classifier: &safety_classifier,
        executor_analysis: &executor_analysis,
        executor: &executor,
        lsp: &mut lsp,
        approval_store: &approval_store,
        one_shot_allowlist: &mut one_shot_allowlist,
        session: &mut session,
        memory: &mut memory,
        config: &config,
        project_root: &project_root,
        artifacts_dir,
        abort,
        run_id: run_id.clone(),
        session_id,
    };

    let ctx = zace_core::model::RunContext::new(task, config.max_steps);
    let mut state = LoopState::new();

    let outcome = orchestrator::run(ctx, &mut collab, &mut state).await;

    lsp.shutdown().await;

    print_outcome(&outcome.final_state, outcome.message.as_deref());

    let exit_code = match outcome.final_state {
        RunState::Completed => 0,
        RunState::WaitingForUser => 2,
        RunState::Interrupted => 130,
        RunState::Blocked | RunState::Error => 1,
        _ => 1,
    };
    Ok(exit_code)
}

fn print_outcome(final_state: &RunState, message: Option<&str>) {
    println!();
    println!("=== Run finished: {final_state:?} ===");
    if let Some(message) = message {
        println!("{message}");
    }
}
