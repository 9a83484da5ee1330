//! Read-only environment self-check, grounded in the teacher's `doctor.rs`:
//! platform info, config validity, LSP servers-config parse, artifacts
//! directory writability, and approval-rules file parse — reported as a
//! pass/fail list.

use std::path::PathBuf;

use anyhow::Result;

use zace_config::config::RuntimeConfig;
use zace_config::{paths, validate};

pub async fn run_doctor(cd: Option<PathBuf>) -> Result<()> {
    let project_root = cd.unwrap_or(std::env::current_dir()?);

    println!("=== zace environment check ===");
    println!("Platform:     {} {}", std::env::consts::OS, std::env::consts::ARCH);
    println!("zace version: {}", env!("CARGO_PKG_VERSION"));
    println!("Project root: {}", project_root.display());
    println!();

    println!("=== Configuration ===");
    let config = RuntimeConfig::load(&project_root)?;
    let issues = validate::validate(&config);
    if issues.is_empty() {
        println!("config:       ok");
    } else {
        for issue in &issues {
            println!("config:       [{:?}] {}: {}", issue.severity, issue.field, issue.message);
        }
    }
    let config_ok = !validate::has_blocking_issues(&issues);
    println!();

    println!("=== LSP servers config ===");
    let lsp_config_path = project_root.join(&config.lsp_server_config_path);
    let lsp_ok = if !config.lsp_enabled {
        println!("lsp:          disabled in config, skipping");
        true
    } else if !lsp_config_path.exists() {
        println!("lsp:          {} not found (bootstrap will run on demand)", lsp_config_path.display());
        true
    } else {
        match std::fs::read_to_string(&lsp_config_path) {
            Ok(text) => match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(_) => {
                    println!("lsp:          {} parses ok", lsp_config_path.display());
                    true
                }
                Err(e) => {
                    println!("lsp:          {} failed to parse: {e}", lsp_config_path.display());
                    false
                }
            },
            Err(e) => {
                println!("lsp:          failed to read {}: {e}", lsp_config_path.display());
                false
            }
        }
    };
    println!();

    println!("=== Artifacts directory ===");
    let artifacts_dir = paths::artifacts_dir(&project_root);
    let artifacts_ok = match std::fs::create_dir_all(&artifacts_dir) {
        Ok(()) => {
            println!("artifacts:    {} writable", artifacts_dir.display());
            true
        }
        Err(e) => {
            println!("artifacts:    {} not writable: {e}", artifacts_dir.display());
            false
        }
    };
    println!();

    println!("=== Approval rules ===");
    let approvals_path = paths::approvals_path(&project_root);
    let approvals_ok = match zace_approval::ApprovalStore::load(&approvals_path) {
        Ok(store) => {
            println!("approvals:    {} rule(s) at {}", store.len(), approvals_path.display());
            true
        }
        Err(e) => {
            println!("approvals:    failed to parse {}: {e}", approvals_path.display());
            false
        }
    };
    println!();

    let all_ok = config_ok && lsp_ok && artifacts_ok && approvals_ok;
    println!("=== Summary ===");
    println!("{}", if all_ok { "all checks passed" } else { "one or more checks failed" });
    if !all_ok {
        std::process::exit(1);
    }

    Ok(())
}
