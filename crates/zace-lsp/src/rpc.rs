//! Minimal JSON-RPC 2.0 client over a child process's stdio, framed per the
//! LSP wire format (`Content-Length` header, blank line, UTF-8 body).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::warn;

/// A connected JSON-RPC client talking to one spawned LSP server process.
pub struct RpcClient {
    stdin: Arc<Mutex<ChildStdin>>,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>,
    pub notifications: mpsc::UnboundedReceiver<(String, Value)>,
    _child: Child,
}

impl RpcClient {
    /// Spawn `command` with `cwd`/`env`, and start the background reader
    /// task that demultiplexes responses (by id) from notifications.
    pub async fn spawn(command: &[String], cwd: &std::path::Path, env: &HashMap<String, String>) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("server command must have at least one element"))?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().context("failed to spawn LSP server")?;
        let stdin = child.stdin.take().context("missing stdin pipe")?;
        let stdout = child.stdout.take().context("missing stdout pipe")?;
        let stderr = child.stderr.take().context("missing stderr pipe")?;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (notif_tx, notif_rx) = mpsc::unbounded_channel();

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            loop {
                match read_message(&mut reader).await {
                    Ok(Some(msg)) => {
                        if let Some(id) = msg.get("id").and_then(Value::as_u64) {
                            if msg.get("method").is_none() {
                                if let Some(tx) = reader_pending.lock().await.remove(&id) {
                                    let _ = tx.send(msg);
                                }
                                continue;
                            }
                        }
                        if let Some(method) = msg.get("method").and_then(Value::as_str) {
                            let params = msg.get("params").cloned().unwrap_or(Value::Null);
                            let _ = notif_tx.send((method.to_string(), params));
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("LSP rpc read error: {e:#}");
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut stderr = stderr;
            let _ = stderr.read_to_end(&mut buf).await;
        });

        Ok(Self {
            stdin: Arc::new(Mutex::new(stdin)),
            next_id: AtomicU64::new(1),
            pending,
            notifications: notif_rx,
            _child: child,
        })
    }

    /// Send a request and await its response, bounded by `timeout`.
    pub async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.write_message(&payload).await?;

        let response = tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| anyhow!("LSP request '{method}' timed out"))?
            .context("LSP response channel closed")?;

        if let Some(error) = response.get("error") {
            anyhow::bail!("LSP request '{method}' failed: {error}");
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.write_message(&payload).await
    }

    async fn write_message(&self, payload: &Value) -> Result<()> {
        let body = serde_json::to_vec(payload)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(header.as_bytes()).await?;
        stdin.write_all(&body).await?;
        stdin.flush().await?;
        Ok(())
    }
}

async fn read_message<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<Option<Value>> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed.strip_prefix("Content-Length:") {
            content_length = Some(value.trim().parse().context("invalid Content-Length")?);
        }
    }

    let len = content_length.ok_or_else(|| anyhow!("missing Content-Length header"))?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}
