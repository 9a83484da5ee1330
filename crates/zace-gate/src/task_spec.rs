//! Completion-gate declarations embedded in the task text itself (§6):
//! `COMPLETION_GATES:` or `DONE_CRITERIA:` followed by a list delimited by
//! `;;` (preferred) or `,`. Tokens may be prefixed `cmd:`; `none` is
//! ignored; duplicates are discarded; the last header occurrence wins.

use std::sync::OnceLock;

use regex::Regex;

fn header_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*(?:COMPLETION_GATES|DONE_CRITERIA):\s*(.*)$")
            .expect("static pattern compiles")
    })
}

/// Extract the task-declared gate commands, if any. Returns an empty vec
/// when neither header is present or the declared list is empty/`none`.
pub fn parse_task_gates(task: &str) -> Vec<String> {
    let Some(raw) = header_pattern()
        .captures_iter(task)
        .last()
        .map(|cap| cap[1].to_string())
    else {
        return Vec::new();
    };

    let delimiter = if raw.contains(";;") { ";;" } else { "," };
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for token in raw.split(delimiter) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let token = token.strip_prefix("cmd:").unwrap_or(token).trim();
        if token.is_empty() || token.eq_ignore_ascii_case("none") {
            continue;
        }
        if seen.insert(token.to_string()) {
            out.push(token.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_header_yields_empty() {
        assert!(parse_task_gates("just do the thing").is_empty());
    }

    #[test]
    fn double_semicolon_delimited_list() {
        let task = "Fix the bug.\nCOMPLETION_GATES: cargo test ;; cargo clippy";
        assert_eq!(
            parse_task_gates(task),
            vec!["cargo test".to_string(), "cargo clippy".to_string()]
        );
    }

    #[test]
    fn comma_delimited_fallback_and_cmd_prefix() {
        let task = "DONE_CRITERIA: cmd:npm test, cmd:npm run lint";
        assert_eq!(
            parse_task_gates(task),
            vec!["npm test".to_string(), "npm run lint".to_string()]
        );
    }

    #[test]
    fn none_is_ignored() {
        assert_eq!(parse_task_gates("COMPLETION_GATES: none").len(), 0);
    }

    #[test]
    fn duplicates_are_discarded() {
        let task = "COMPLETION_GATES: cargo test ;; cargo test";
        assert_eq!(parse_task_gates(task), vec!["cargo test".to_string()]);
    }

    #[test]
    fn last_header_occurrence_wins() {
        let task = "COMPLETION_GATES: cargo test\n\nDONE_CRITERIA: cargo check";
        assert_eq!(parse_task_gates(task), vec!["cargo check".to_string()]);
    }
}
