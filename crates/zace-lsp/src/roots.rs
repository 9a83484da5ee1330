//! Root resolution: find the nearest ancestor directory that looks like a
//! project root for a given server's `rootMarkers` (§4.2).

use std::path::{Path, PathBuf};

/// Starting from `dirname(file)`, walk upward; the first ancestor
/// containing any `root_markers` entry wins. If none is found but the
/// search path is inside `cwd`, return `cwd`; otherwise return the
/// starting directory.
pub fn resolve_root(file: &Path, root_markers: &[String], cwd: &Path) -> PathBuf {
    let start = file.parent().unwrap_or(file).to_path_buf();

    let mut dir = start.as_path();
    loop {
        if root_markers.iter().any(|marker| dir.join(marker).exists()) {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }

    if start.starts_with(cwd) {
        cwd.to_path_buf()
    } else {
        start
    }
}
