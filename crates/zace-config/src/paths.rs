//! Runtime path resolution, grounded in the teacher's `paths.rs` but
//! narrowed: this runtime has no user-level XDG directories, only a
//! project-local `.zace/` root (the directory spec.md's external
//! interfaces default everything under, e.g. `.zace/runtime/lsp/servers.json`).

use std::path::{Path, PathBuf};

/// `<project_root>/.zace`.
pub fn runtime_root(project_root: &Path) -> PathBuf {
    project_root.join(".zace")
}

/// Where shell-executed command artifacts (stdout/stderr/combined) are
/// persisted (§4.1).
pub fn artifacts_dir(project_root: &Path) -> PathBuf {
    runtime_root(project_root).join("artifacts")
}

/// Where planner invalid-output artifacts are persisted on parse exhaustion
/// (§4.3 step 6).
pub fn planner_artifacts_dir(project_root: &Path) -> PathBuf {
    runtime_root(project_root).join("runtime").join("planner")
}

/// Default LSP servers-config path (§6), relative to `project_root`.
pub fn default_lsp_server_config_path(project_root: &Path) -> PathBuf {
    runtime_root(project_root)
        .join("runtime")
        .join("lsp")
        .join("servers.json")
}

/// Append-only session event log (§4.9).
pub fn session_log_path(project_root: &Path) -> PathBuf {
    runtime_root(project_root)
        .join("runtime")
        .join("session.jsonl")
}

/// Persisted approval rules (§4.5, §6 "implementation choice").
pub fn approvals_path(project_root: &Path) -> PathBuf {
    runtime_root(project_root)
        .join("runtime")
        .join("approvals.toml")
}

/// Scripts the runtime-script protocol (§4.6 step 6) confines mutating
/// commands to.
pub fn runtime_scripts_dir(project_root: &Path) -> PathBuf {
    runtime_root(project_root).join("runtime").join("scripts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_nest_under_the_runtime_root() {
        let root = Path::new("/repo");
        assert_eq!(artifacts_dir(root), Path::new("/repo/.zace/artifacts"));
        assert_eq!(
            default_lsp_server_config_path(root),
            Path::new("/repo/.zace/runtime/lsp/servers.json")
        );
        assert_eq!(
            session_log_path(root),
            Path::new("/repo/.zace/runtime/session.jsonl")
        );
        assert_eq!(
            approvals_path(root),
            Path::new("/repo/.zace/runtime/approvals.toml")
        );
    }
}
