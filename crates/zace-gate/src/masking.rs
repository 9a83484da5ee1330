//! Masking check (§4.4 step 5): a gate command that swallows its own
//! failure defeats the point of gating. Rejected via a small fixed set of
//! regexes, same static-`OnceLock` style as `zace_retry::signature`.

use regex::Regex;
use std::sync::OnceLock;

fn masking_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\|\|\s*true\b",
            r"\|\|\s*echo\b",
            r";\s*true\s*$",
            r"&&\s*true\b",
            r"\bexit\s+0\b",
        ]
        .into_iter()
        .map(|pattern| Regex::new(pattern).expect("static pattern compiles"))
        .collect()
    })
}

/// Returns the first matching pattern's description, if `command` masks
/// its own failure.
pub fn detect_masking(command: &str) -> Option<&'static str> {
    for pattern in masking_patterns() {
        if pattern.is_match(command) {
            return Some("command masks failure with a fallback that always succeeds");
        }
    }
    None
}
