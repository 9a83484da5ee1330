//! LSP client and bootstrap state machine: spawns configured language
//! servers, probes file writes for diagnostics, and tracks whether the run
//! has at least one server actively producing feedback.

pub mod bootstrap;
pub mod config;
pub mod diagnostics;
pub mod provision;
pub mod roots;
mod rpc;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::warn;
use zace_core::types::LspStatus;

use config::ServerRecord;
use diagnostics::DiagnosticsTracker;
use rpc::RpcClient;

const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(15);

/// Extensions that never warrant diagnostics (images, docs, lockfiles, etc.).
const NON_DIAGNOSTIC_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".md", ".txt", ".lock", ".json.lock",
];

/// A live connection to one (rootPath, serverId) pair.
struct ClientEntry {
    client: RpcClient,
    server: ServerRecord,
    diagnostics: DiagnosticsTracker,
    open_files: HashSet<String>,
}

/// Result of probing a set of changed files for LSP feedback.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: LspStatus,
    pub diagnostics_files: Vec<String>,
    pub reason: Option<String>,
    pub error_count: u32,
}

/// Process-scoped registry of connected clients and known-broken keys.
///
/// The spec's design notes call for the LSP client registry to be a
/// process-scoped singleton; here it is an ordinary struct the orchestrator
/// constructs once at startup and threads through — equivalent lifetime,
/// without reaching for global mutable state.
pub struct LspRegistry {
    servers_config_path: PathBuf,
    loader: config::ServersConfigLoader,
    clients: HashMap<(PathBuf, String), ClientEntry>,
    broken: HashMap<(PathBuf, String), String>,
    enabled: bool,
    max_diagnostics_per_file: usize,
    max_files_in_output: usize,
    wait_for_diagnostics: Duration,
}

impl LspRegistry {
    pub fn new(servers_config_path: PathBuf, enabled: bool) -> Self {
        Self {
            servers_config_path,
            loader: config::ServersConfigLoader::new(),
            clients: HashMap::new(),
            broken: HashMap::new(),
            enabled,
            max_diagnostics_per_file: 20,
            max_files_in_output: 10,
            wait_for_diagnostics: Duration::from_millis(2000),
        }
    }

    pub fn with_limits(mut self, max_diagnostics_per_file: usize, max_files_in_output: usize) -> Self {
        self.max_diagnostics_per_file = max_diagnostics_per_file;
        self.max_files_in_output = max_files_in_output;
        self
    }

    /// Probe the applicable subset of `changed_files`: files whose extension
    /// is recognized and covered by some configured server.
    pub async fn probe_files(&mut self, changed_files: &[String], cwd: &Path) -> Result<ProbeOutcome> {
        if !self.enabled {
            return Ok(ProbeOutcome {
                status: LspStatus::Disabled,
                diagnostics_files: Vec::new(),
                reason: None,
                error_count: 0,
            });
        }

        let servers_config_path = self.servers_config_path.clone();
        let servers = match self.loader.load(&servers_config_path) {
            Ok(cfg) => cfg.servers.clone(),
            Err(e) => {
                return Ok(ProbeOutcome {
                    status: LspStatus::Failed,
                    diagnostics_files: Vec::new(),
                    reason: Some(format!("servers config invalid: {e:#}")),
                    error_count: 0,
                });
            }
        };

        let applicable: Vec<&String> = changed_files
            .iter()
            .filter(|f| is_diagnostic_candidate(f))
            .collect();
        if applicable.is_empty() {
            return Ok(ProbeOutcome {
                status: LspStatus::NoApplicableFiles,
                diagnostics_files: Vec::new(),
                reason: None,
                error_count: 0,
            });
        }

        let mut by_server: HashMap<String, Vec<&String>> = HashMap::new();
        for file in &applicable {
            if let Some(server) = servers.iter().find(|s| extension_matches(s, file)) {
                by_server.entry(server.id.clone()).or_default().push(file);
            }
        }
        if by_server.is_empty() {
            return Ok(ProbeOutcome {
                status: LspStatus::NoActiveServer,
                diagnostics_files: Vec::new(),
                reason: Some("no configured server covers the changed files".into()),
                error_count: 0,
            });
        }

        let mut total_error_count = 0u32;
        let mut diagnostics_files = Vec::new();
        let mut any_connected = false;
        let mut failure_reason = None;

        for (server_id, files) in by_server {
            let server = servers.iter().find(|s| s.id == server_id).unwrap().clone();
            let root = roots::resolve_root(Path::new(files[0]), &server.root_markers, cwd);
            let key = (root.clone(), server_id.clone());

            if let Some(reason) = self.broken.get(&key) {
                failure_reason.get_or_insert_with(|| reason.clone());
                continue;
            }

            if !self.clients.contains_key(&key) {
                match self.connect(&server, &root).await {
                    Ok(entry) => {
                        self.clients.insert(key.clone(), entry);
                    }
                    Err(e) => {
                        let reason = format!("{e:#}");
                        self.broken.insert(key.clone(), reason.clone());
                        failure_reason = Some(reason);
                        continue;
                    }
                }
            }

            any_connected = true;
            let entry = self.clients.get_mut(&key).unwrap();
            let (files_diag, errors) =
                probe_with_client(entry, &files, self.wait_for_diagnostics, self.max_diagnostics_per_file)
                    .await
                    .unwrap_or_default();
            total_error_count += errors;
            diagnostics_files.extend(files_diag);
        }

        diagnostics_files.truncate(self.max_files_in_output);

        let status = if !any_connected {
            LspStatus::Failed
        } else if total_error_count > 0 {
            LspStatus::Diagnostics
        } else {
            LspStatus::NoErrors
        };

        Ok(ProbeOutcome {
            status,
            diagnostics_files,
            reason: failure_reason,
            error_count: total_error_count,
        })
    }

    async fn connect(&self, server: &ServerRecord, root: &Path) -> Result<ClientEntry> {
        let client = RpcClient::spawn(&server.command, root, &server.env).await?;
        let init_params = json!({
            "processId": std::process::id(),
            "rootUri": format!("file://{}", root.display()),
            "capabilities": {
                "textDocument": {
                    "synchronization": { "didSave": true },
                    "publishDiagnostics": { "relatedInformation": true },
                },
            },
            "initializationOptions": server.initialization,
        });
        client
            .request("initialize", init_params, INITIALIZE_TIMEOUT)
            .await
            .context("LSP initialize failed")?;
        client.notify("initialized", json!({})).await?;
        if !server.initialization.is_empty() {
            let _ = client
                .notify(
                    "workspace/didChangeConfiguration",
                    json!({ "settings": server.initialization }),
                )
                .await;
        }

        Ok(ClientEntry {
            client,
            server: server.clone(),
            diagnostics: DiagnosticsTracker::new(),
            open_files: HashSet::new(),
        })
    }

    /// Gracefully shut down every connected client.
    pub async fn shutdown(&mut self) {
        for ((_, id), entry) in self.clients.drain() {
            if let Err(e) = entry.client.request("shutdown", Value::Null, Duration::from_secs(5)).await {
                warn!(server = %id, error = %format!("{e:#}"), "LSP shutdown request failed");
            }
            let _ = entry.client.notify("exit", Value::Null).await;
        }
    }

    /// Status of every connected/broken client, for diagnostics/telemetry.
    pub fn status(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .clients
            .keys()
            .map(|(root, id)| (format!("{id}@{}", root.display()), "connected".to_string()))
            .collect();
        out.extend(
            self.broken
                .iter()
                .map(|((root, id), reason)| (format!("{id}@{}", root.display()), format!("broken: {reason}"))),
        );
        out
    }
}

async fn probe_with_client(
    entry: &mut ClientEntry,
    files: &[&String],
    wait_for: Duration,
    max_diagnostics_per_file: usize,
) -> Result<(Vec<String>, u32)> {
    let mut baselines = Vec::new();
    for file in files {
        let uri = format!("file://{file}");
        if entry.open_files.insert(uri.clone()) {
            let text = std::fs::read_to_string(file).unwrap_or_default();
            let language_id = language_id_for(file);
            entry
                .client
                .notify(
                    "textDocument/didOpen",
                    json!({
                        "textDocument": {
                            "uri": uri,
                            "languageId": language_id,
                            "version": 1,
                            "text": text,
                        }
                    }),
                )
                .await?;
        }
        let baseline = entry.diagnostics.version(&uri);
        baselines.push((uri, baseline));
    }

    let deadline = tokio::time::Instant::now() + wait_for;
    loop {
        if baselines
            .iter()
            .all(|(uri, baseline)| entry.diagnostics.is_settled(uri, *baseline, Duration::from_millis(150)))
        {
            break;
        }
        tokio::select! {
            biased;
            msg = entry.client.notifications.recv() => {
                match msg {
                    Some((method, params)) if method == "textDocument/publishDiagnostics" => {
                        if let (Some(uri), Some(diags)) = (
                            params.get("uri").and_then(Value::as_str),
                            params.get("diagnostics").and_then(Value::as_array),
                        ) {
                            entry.diagnostics.publish(uri.to_string(), diags.clone());
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
    }

    let mut diagnostics_files = Vec::new();
    let mut error_count = 0u32;
    for (uri, _) in &baselines {
        if let Some(diags) = entry.diagnostics.get(uri) {
            if !diags.is_empty() {
                diagnostics_files.push(uri.trim_start_matches("file://").to_string());
                let capped = diags.iter().take(max_diagnostics_per_file);
                error_count += capped
                    .filter(|d| d.get("severity").and_then(Value::as_u64) == Some(1))
                    .count() as u32;
            }
        }
    }

    Ok((diagnostics_files, error_count))
}

fn extension_matches(server: &ServerRecord, path: &str) -> bool {
    server.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
}

fn is_diagnostic_candidate(path: &str) -> bool {
    !NON_DIAGNOSTIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn language_id_for(path: &str) -> &'static str {
    if path.ends_with(".tsx") {
        "typescriptreact"
    } else if path.ends_with(".ts") {
        "typescript"
    } else if path.ends_with(".jsx") {
        "javascriptreact"
    } else if path.ends_with(".js") || path.ends_with(".mjs") || path.ends_with(".cjs") {
        "javascript"
    } else if path.ends_with(".py") {
        "python"
    } else {
        "plaintext"
    }
}
