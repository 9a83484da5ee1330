//! Servers-config loader: a JSON file describing which LSP servers to spawn
//! for which file extensions (§4.2, §6).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One configured LSP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: String,
    pub command: Vec<String>,
    pub extensions: Vec<String>,
    #[serde(default)]
    pub root_markers: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub initialization: serde_json::Map<String, serde_json::Value>,
}

/// Either bare-array or `{ "servers": [...] }` shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServersConfigFile {
    Array(Vec<ServerRecord>),
    Wrapped { servers: Vec<ServerRecord> },
}

/// Parsed servers config plus the mtime it was loaded at, for cache
/// invalidation.
#[derive(Debug, Clone)]
pub struct ServersConfig {
    pub servers: Vec<ServerRecord>,
    path: PathBuf,
    mtime: SystemTime,
}

impl ServersConfig {
    pub fn server_ids(&self) -> std::collections::HashSet<&str> {
        self.servers.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Caches a loaded config by (path, mtime). Returns the cached value
/// unchanged when the file's mtime hasn't moved, and an up-to-date
/// `ServersConfig` otherwise — callers use this to shut down clients for
/// server IDs that disappeared.
#[derive(Default)]
pub struct ServersConfigLoader {
    cached: Option<ServersConfig>,
}

impl ServersConfigLoader {
    pub fn new() -> Self {
        Self { cached: None }
    }

    /// Load (or return the cached) config for `path`. Missing file is not
    /// an error — it's treated as an empty config (no servers).
    pub fn load(&mut self, path: &Path) -> Result<&ServersConfig> {
        let metadata = std::fs::metadata(path);
        let mtime = match &metadata {
            Ok(m) => m.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            Err(_) => SystemTime::UNIX_EPOCH,
        };

        let needs_reload = match &self.cached {
            Some(c) => c.path != path || c.mtime != mtime,
            None => true,
        };

        if needs_reload {
            let servers = if metadata.is_ok() {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading LSP servers config {}", path.display()))?;
                let parsed: ServersConfigFile = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing LSP servers config {}", path.display()))?;
                match parsed {
                    ServersConfigFile::Array(s) => s,
                    ServersConfigFile::Wrapped { servers } => servers,
                }
            } else {
                Vec::new()
            };
            self.cached = Some(ServersConfig {
                servers,
                path: path.to_path_buf(),
                mtime,
            });
        }

        Ok(self.cached.as_ref().expect("just populated"))
    }

    /// Server IDs present in the previous load but absent from `current` —
    /// callers shut down clients for these.
    pub fn stale_server_ids(previous: &ServersConfig, current: &ServersConfig) -> Vec<String> {
        let current_ids = current.server_ids();
        previous
            .server_ids()
            .into_iter()
            .filter(|id| !current_ids.contains(*id))
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_bare_array_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(
            &path,
            r#"[{"id":"ts","command":["typescript-language-server","--stdio"],"extensions":[".ts"],"rootMarkers":["package.json"]}]"#,
        )
        .unwrap();

        let mut loader = ServersConfigLoader::new();
        let cfg = loader.load(&path).unwrap();
        assert_eq!(cfg.servers.len(), 1);
        assert_eq!(cfg.servers[0].id, "ts");
    }

    #[test]
    fn loads_wrapped_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(
            &path,
            r#"{"servers":[{"id":"py","command":["pylsp"],"extensions":[".py"]}]}"#,
        )
        .unwrap();

        let mut loader = ServersConfigLoader::new();
        let cfg = loader.load(&path).unwrap();
        assert_eq!(cfg.servers[0].id, "py");
    }

    #[test]
    fn rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(
            &path,
            r#"[{"id":"ts","command":["x"],"extensions":[".ts"],"bogus":true}]"#,
        )
        .unwrap();

        let mut loader = ServersConfigLoader::new();
        assert!(loader.load(&path).is_err());
    }

    #[test]
    fn missing_file_yields_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let mut loader = ServersConfigLoader::new();
        let cfg = loader.load(&path).unwrap();
        assert!(cfg.servers.is_empty());
    }

    #[test]
    fn stale_server_ids_detects_removed_servers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(
            &path,
            r#"[{"id":"ts","command":["x"],"extensions":[".ts"]},{"id":"py","command":["y"],"extensions":[".py"]}]"#,
        )
        .unwrap();
        let mut loader = ServersConfigLoader::new();
        let previous = loader.load(&path).unwrap().clone();

        std::fs::write(&path, r#"[{"id":"ts","command":["x"],"extensions":[".ts"]}]"#).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        filetime_touch(&path);
        let mut loader2 = ServersConfigLoader::new();
        let current = loader2.load(&path).unwrap().clone();

        let stale = ServersConfigLoader::stale_server_ids(&previous, &current);
        assert_eq!(stale, vec!["py".to_string()]);
    }

    fn filetime_touch(path: &Path) {
        let now = std::time::SystemTime::now();
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        let _ = file.set_modified(now);
    }
}
