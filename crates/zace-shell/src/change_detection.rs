//! Change detection from three independent sources (§4.1): marker lines,
//! git snapshot delta, and redirect-target inference. The union is
//! deduplicated and resolved to absolute paths.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use zace_core::types::ChangeSource;

static MARKER_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
static REDIRECT_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();

fn marker_re() -> &'static Regex {
    MARKER_RE.get_or_init(|| Regex::new(r"(?m)^ZACE_FILE_CHANGED\|(.+)$").unwrap())
}

fn redirect_re() -> &'static Regex {
    // A single `>` (not `>>`) followed by a target, stopping at whitespace,
    // `&`, or a shell-metacharacter boundary.
    REDIRECT_RE.get_or_init(|| Regex::new(r"(?:^|[^>])>(?!>)\s*([^\s&|;]+)").unwrap())
}

/// Paths reported via `ZACE_FILE_CHANGED|<path>` lines in stdout or stderr.
pub fn from_markers(stdout: &str, stderr: &str, cwd: &Path) -> BTreeSet<PathBuf> {
    let mut paths = BTreeSet::new();
    for text in [stdout, stderr] {
        for cap in marker_re().captures_iter(text) {
            let raw = cap[1].trim();
            if !raw.is_empty() {
                paths.insert(resolve(raw, cwd));
            }
        }
    }
    paths
}

/// Parse the command text for `>` overwrite targets, skipping `>>`, `&`,
/// `/dev/null`, `NUL`, `-`, tilde-paths, and targets containing shell
/// metacharacters.
pub fn from_redirects(command: &str, cwd: &Path) -> BTreeSet<PathBuf> {
    let mut paths = BTreeSet::new();
    for cap in redirect_re().captures_iter(command) {
        let target = cap[1].trim();
        if is_skippable_redirect_target(target) {
            continue;
        }
        paths.insert(resolve(target, cwd));
    }
    paths
}

fn is_skippable_redirect_target(target: &str) -> bool {
    if target.is_empty() || target == "-" {
        return true;
    }
    let lowered = target.to_ascii_lowercase();
    if lowered == "/dev/null" || lowered == "nul" {
        return true;
    }
    if target.starts_with('~') {
        return true;
    }
    target.contains(['`', '$', '*', '?', '{', '}', '(', ')'])
}

fn resolve(path: &str, cwd: &Path) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        cwd.join(p)
    }
}

/// Fingerprint of a tracked file: mtime (ms) and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    mtime_ms: u128,
    size: u64,
}

/// A point-in-time snapshot of the repo's working-tree + index + untracked
/// file state, built from `git diff --name-only`, `git diff --name-only
/// --cached`, and `git ls-files --others --exclude-standard`.
#[derive(Debug, Clone, Default)]
pub struct GitSnapshot {
    fingerprints: BTreeMap<PathBuf, Fingerprint>,
}

impl GitSnapshot {
    /// Take a snapshot of `repo_root`. A failure (not a repo) yields an
    /// empty snapshot silently.
    pub fn take(repo_root: &Path) -> Self {
        let mut paths = BTreeSet::new();
        for args in [
            &["diff", "--name-only"][..],
            &["diff", "--name-only", "--cached"][..],
            &["ls-files", "--others", "--exclude-standard"][..],
        ] {
            if let Ok(output) = Command::new("git").args(args).current_dir(repo_root).output() {
                if output.status.success() {
                    for line in String::from_utf8_lossy(&output.stdout).lines() {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            paths.insert(repo_root.join(trimmed));
                        }
                    }
                }
            }
        }

        let mut fingerprints = BTreeMap::new();
        for path in paths {
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mtime_ms = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_millis())
                    .unwrap_or(0);
                fingerprints.insert(path, Fingerprint { mtime_ms, size: metadata.len() });
            } else {
                fingerprints.insert(path, Fingerprint { mtime_ms: 0, size: 0 });
            }
        }

        Self { fingerprints }
    }

    /// Paths new in `after`, or whose fingerprint differs from `self`.
    pub fn diff(&self, after: &GitSnapshot) -> BTreeSet<PathBuf> {
        after
            .fingerprints
            .iter()
            .filter(|(path, fp)| self.fingerprints.get(*path) != Some(*fp))
            .map(|(path, _)| path.clone())
            .collect()
    }
}

/// Union and dedupe the three sources into the final `(changedFiles,
/// changedFilesSource)` pair.
pub fn union_sources(
    markers: BTreeSet<PathBuf>,
    git_delta: BTreeSet<PathBuf>,
    redirects: BTreeSet<PathBuf>,
) -> (Vec<String>, Vec<ChangeSource>) {
    let mut all: BTreeMap<PathBuf, BTreeSet<ChangeSource>> = BTreeMap::new();
    for path in markers {
        all.entry(path).or_default().insert(ChangeSource::Marker);
    }
    for path in git_delta {
        all.entry(path).or_default().insert(ChangeSource::GitDelta);
    }
    for path in redirects {
        all.entry(path).or_default().insert(ChangeSource::InferredRedirect);
    }

    let mut sources = BTreeSet::new();
    let mut files = Vec::new();
    for (path, srcs) in all {
        files.push(path.display().to_string());
        sources.extend(srcs);
    }
    (files, sources.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_parsing_resolves_relative_paths_against_cwd() {
        let cwd = Path::new("/repo");
        let found = from_markers("ZACE_FILE_CHANGED|src/lib.rs\nother line\n", "", cwd);
        assert!(found.contains(&PathBuf::from("/repo/src/lib.rs")));
    }

    #[test]
    fn marker_parsing_preserves_absolute_paths() {
        let cwd = Path::new("/repo");
        let found = from_markers("ZACE_FILE_CHANGED|/tmp/out.txt\n", "", cwd);
        assert!(found.contains(&PathBuf::from("/tmp/out.txt")));
    }

    #[test]
    fn redirect_inference_skips_append_and_devnull() {
        let cwd = Path::new("/repo");
        let found = from_redirects("echo hi >> log.txt; echo x > /dev/null", cwd);
        assert!(found.is_empty());
    }

    #[test]
    fn redirect_inference_finds_overwrite_target() {
        let cwd = Path::new("/repo");
        let found = from_redirects("cat > redirected.txt <<'EOF'\nhello\nEOF", cwd);
        assert!(found.contains(&PathBuf::from("/repo/redirected.txt")));
    }

    #[test]
    fn redirect_inference_skips_metacharacter_targets() {
        let cwd = Path::new("/repo");
        let found = from_redirects("echo hi > $OUT", cwd);
        assert!(found.is_empty());
    }

    #[test]
    fn union_sources_dedupes_and_merges_source_lists() {
        let mut markers = BTreeSet::new();
        markers.insert(PathBuf::from("/repo/a.rs"));
        let mut git = BTreeSet::new();
        git.insert(PathBuf::from("/repo/a.rs"));
        git.insert(PathBuf::from("/repo/b.rs"));

        let (files, sources) = union_sources(markers, git, BTreeSet::new());
        assert_eq!(files.len(), 2);
        assert!(sources.contains(&ChangeSource::Marker));
        assert!(sources.contains(&ChangeSource::GitDelta));
    }

    #[test]
    fn git_snapshot_diff_detects_new_and_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one").unwrap();
        let before = GitSnapshot {
            fingerprints: {
                let mut m = BTreeMap::new();
                m.insert(dir.path().join("a.txt"), Fingerprint { mtime_ms: 0, size: 3 });
                m
            },
        };
        let after = GitSnapshot {
            fingerprints: {
                let mut m = BTreeMap::new();
                m.insert(dir.path().join("a.txt"), Fingerprint { mtime_ms: 1, size: 3 });
                m.insert(dir.path().join("b.txt"), Fingerprint { mtime_ms: 1, size: 1 });
                m
            },
        };
        let diff = before.diff(&after);
        assert_eq!(diff.len(), 2);
    }
}
