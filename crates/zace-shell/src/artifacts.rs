//! Artifact persistence and output truncation (§4.1).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Default character cap on rendered stdout/stderr, overridable per call.
pub const DEFAULT_OUTPUT_LIMIT_CHARS: usize = 120_000;

/// Where a command's stdout/stderr/combined artifacts were written.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub combined_path: PathBuf,
}

/// Write stdout, stderr, and a combined file into `artifacts_dir`, filenames
/// keyed by `run_id`.
pub fn persist(
    artifacts_dir: &Path,
    run_id: &str,
    command: &str,
    stdout: &str,
    stderr: &str,
) -> Result<ArtifactPaths> {
    std::fs::create_dir_all(artifacts_dir)
        .with_context(|| format!("creating artifacts dir {}", artifacts_dir.display()))?;

    let stdout_path = artifacts_dir.join(format!("{run_id}.stdout.txt"));
    let stderr_path = artifacts_dir.join(format!("{run_id}.stderr.txt"));
    let combined_path = artifacts_dir.join(format!("{run_id}.combined.txt"));

    std::fs::write(&stdout_path, stdout).context("writing stdout artifact")?;
    std::fs::write(&stderr_path, stderr).context("writing stderr artifact")?;

    let combined = format!("COMMAND: {command}\n[STDOUT]\n{stdout}\n[STDERR]\n{stderr}\n");
    std::fs::write(&combined_path, combined).context("writing combined artifact")?;

    Ok(ArtifactPaths {
        stdout_path,
        stderr_path,
        combined_path,
    })
}

/// Truncation result for one stream.
pub struct Truncated {
    pub text: String,
    pub truncated: bool,
}

/// Truncate `text` to `limit` characters, preserving the head.
pub fn truncate(text: &str, limit: usize) -> Truncated {
    if text.chars().count() <= limit {
        return Truncated {
            text: text.to_string(),
            truncated: false,
        };
    }
    let truncated: String = text.chars().take(limit).collect();
    Truncated {
        text: truncated,
        truncated: true,
    }
}

/// Standard truncation-guidance block appended when a stream was cut.
pub fn truncation_guidance(combined_path: &Path) -> String {
    let p = combined_path.display();
    format!(
        "[truncation]\noutput was truncated; recover the full text with:\n  tail -n 200 {p}\n  sed -n '1,200p' {p}\n  rg <pattern> {p}\n"
    )
}
