//! Process lifecycle: spawning a command in its own process group, enforcing
//! a wall-clock timeout or an external abort signal, and tearing down the
//! whole process tree (SIGTERM, then SIGKILL after a grace period) when
//! either fires.
//!
//! Stdout and stderr are collected as independent byte streams — callers that
//! need a combined view concatenate them themselves; they are never
//! interleaved here.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tracing::warn;

use zace_core::types::LifecycleEvent;

/// Grace period between SIGTERM and SIGKILL when tearing down a process tree.
pub const KILL_GRACE: Duration = Duration::from_secs(1);

/// Default per-command wall-clock timeout, used when the caller passes `None`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A cooperative, idempotent abort signal shared between a run loop and the
/// command it is currently awaiting.
#[derive(Clone)]
pub struct AbortSignal {
    fired: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Idempotent — safe to call more than once.
    pub fn fire(&self) {
        self.fired.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Resolves once `fire()` has been called, or immediately if it already
    /// fired before this call.
    pub async fn wait(&self) {
        loop {
            if self.is_fired() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_fired() {
                return;
            }
            notified.await;
        }
    }
}

/// Result of running a command to completion (or to forced termination).
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Captured stdout.
    pub output: String,
    /// Captured stderr.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr_output: String,
    /// Last non-empty line of stdout or stderr, or an exit-code fallback.
    pub summary: String,
    /// Exit code (1 if signal-killed without a reported code).
    pub exit_code: i32,
    /// Why (and whether) the process was torn down before a natural exit.
    pub lifecycle_event: LifecycleEvent,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

/// Spawn `cmd` detached into its own session/process group, stdio fully
/// piped, so the whole tree can later be torn down as a unit.
///
/// SAFETY: `setsid()` is async-signal-safe and runs before `exec`, as
/// required by `Command::pre_exec`.
fn spawn_detached(mut cmd: Command) -> Result<Child> {
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    cmd.spawn().context("failed to spawn command")
}

/// Run a detached child to completion, enforcing `timeout` (if any) and
/// racing against `abort` (if any). Either trigger terminates the process
/// tree with SIGTERM, followed by SIGKILL after [`KILL_GRACE`] if it hasn't
/// exited by then.
pub async fn run_with_lifecycle(
    cmd: Command,
    timeout: Option<Duration>,
    abort: Option<AbortSignal>,
) -> Result<ExecutionResult> {
    let start = Instant::now();
    let mut child = spawn_detached(cmd)?;
    let pid = child.id();

    let mut stdout = child.stdout.take().context("missing stdout pipe")?;
    let mut stderr = child.stderr.take().context("missing stderr pipe")?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    });

    let timeout_fut = async {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    let abort_fut = async {
        match &abort {
            Some(signal) => signal.wait().await,
            None => std::future::pending::<()>().await,
        }
    };

    let mut lifecycle_event = LifecycleEvent::None;

    let status = tokio::select! {
        status = child.wait() => status.context("failed to wait for child")?,
        _ = timeout_fut => {
            lifecycle_event = LifecycleEvent::Timeout;
            warn!(?pid, timeout_ms = ?timeout.map(|d| d.as_millis()), "killing child: timeout");
            terminate_tree(pid, &mut child).await;
            child.wait().await.context("failed to wait for child after timeout")?
        }
        _ = abort_fut => {
            lifecycle_event = LifecycleEvent::Abort;
            warn!(?pid, "killing child: aborted");
            terminate_tree(pid, &mut child).await;
            child.wait().await.context("failed to wait for child after abort")?
        }
    };

    let output = stdout_task.await.unwrap_or_default();
    let stderr_output = stderr_task.await.unwrap_or_default();

    let mut exit_code = status.code().unwrap_or_else(|| {
        warn!("process terminated by signal, using exit code 1");
        1
    });
    if lifecycle_event != LifecycleEvent::None {
        exit_code = 137;
    }

    let summary = match lifecycle_event {
        LifecycleEvent::Timeout => "timed out; process killed".to_string(),
        LifecycleEvent::Abort => "aborted; process killed".to_string(),
        LifecycleEvent::None if exit_code == 0 => extract_summary(&output),
        LifecycleEvent::None => failure_summary(&output, &stderr_output, exit_code),
    };

    Ok(ExecutionResult {
        output,
        stderr_output,
        summary,
        exit_code,
        lifecycle_event,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Send SIGTERM to the process group, wait [`KILL_GRACE`], then SIGKILL if
/// the child is still alive.
async fn terminate_tree(pid: Option<u32>, child: &mut Child) {
    let Some(pid) = pid else {
        let _ = child.start_kill();
        return;
    };

    #[cfg(unix)]
    {
        // SAFETY: kill() is async-signal-safe; a negative pid targets the group.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGTERM);
        }
        tokio::select! {
            _ = child.wait() => return,
            _ = tokio::time::sleep(KILL_GRACE) => {}
        }
        if child.try_wait().ok().flatten().is_none() {
            unsafe {
                libc::kill(-(pid as i32), libc::SIGKILL);
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }
}

/// Check if a tool is installed by attempting to locate it via `which`.
pub async fn check_tool_installed(executable: &str) -> Result<()> {
    let output = Command::new("which")
        .arg(executable)
        .output()
        .await
        .context("failed to execute 'which' command")?;

    if !output.status.success() {
        anyhow::bail!("tool '{executable}' is not installed or not in PATH");
    }

    Ok(())
}

/// Extract summary from output: last non-empty line, truncated to 200 chars.
fn extract_summary(output: &str) -> String {
    truncate_line(last_non_empty_line(output), 200)
}

/// Build summary for failed executions (exit_code != 0).
///
/// Priority chain:
/// 1. stdout last non-empty line (some tools write errors to stdout)
/// 2. stderr last non-empty line
/// 3. `"exit code {N}"` fallback
fn failure_summary(stdout: &str, stderr: &str, exit_code: i32) -> String {
    let stdout_line = last_non_empty_line(stdout);
    if !stdout_line.is_empty() {
        return truncate_line(stdout_line, 200);
    }

    let stderr_line = last_non_empty_line(stderr);
    if !stderr_line.is_empty() {
        return truncate_line(stderr_line, 200);
    }

    format!("exit code {exit_code}")
}

fn last_non_empty_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
}

fn truncate_line(line: &str, max_chars: usize) -> String {
    if line.chars().nth(max_chars).is_none() {
        line.to_string()
    } else {
        let truncated: String = line.chars().take(max_chars - 3).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
