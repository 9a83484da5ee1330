//! Auto-discovery of lint/test gates (§4.4 step 3), probing in order:
//! `package.json` scripts, a Makefile target, a Justfile target.
//!
//! Project-marker detection style is grounded on the teacher's
//! `csa-config::project_profile::has_non_symlink_file`.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn lint_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|:)lint(?:$|:)").expect("static pattern compiles"))
}

fn test_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|:)test(?:$|:)").expect("static pattern compiles"))
}

fn has_non_symlink_file(project_root: &Path, file_name: &str) -> bool {
    let path = project_root.join(file_name);
    match std::fs::symlink_metadata(path) {
        Ok(metadata) => !metadata.file_type().is_symlink() && metadata.is_file(),
        Err(_) => false,
    }
}

fn package_manager_runner(project_root: &Path, declared: Option<&str>) -> &'static str {
    if let Some(declared) = declared {
        let name = declared.split('@').next().unwrap_or(declared);
        return match name {
            "yarn" => "yarn",
            "pnpm" => "pnpm",
            "bun" => "bun",
            _ => "npm",
        };
    }
    if has_non_symlink_file(project_root, "bun.lockb") || has_non_symlink_file(project_root, "bun.lock") {
        "bun"
    } else if has_non_symlink_file(project_root, "pnpm-lock.yaml") {
        "pnpm"
    } else if has_non_symlink_file(project_root, "yarn.lock") {
        "yarn"
    } else {
        "npm"
    }
}

fn pick_script<'a>(scripts: &'a serde_json::Map<String, Value>, pattern: &Regex, exact: &str) -> Option<&'a str> {
    if scripts.contains_key(exact) {
        return Some(exact);
    }
    scripts
        .keys()
        .find(|name| {
            pattern.is_match(name) && !name.ends_with("fix") && !name.ends_with("format") && !name.ends_with("watch")
        })
        .map(String::as_str)
}

/// Probes `package.json` for a lint and a test script, returning runnable
/// commands (e.g. `npm run lint`) for whichever are found.
fn discover_package_json_gates(project_root: &Path) -> Vec<String> {
    let path = project_root.join("package.json");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    let Ok(value) = serde_json::from_str::<Value>(&text) else {
        return Vec::new();
    };
    let Some(scripts) = value.get("scripts").and_then(Value::as_object) else {
        return Vec::new();
    };
    let declared_pm = value.get("packageManager").and_then(Value::as_str);
    let runner = package_manager_runner(project_root, declared_pm);

    let mut gates = Vec::new();
    if let Some(lint) = pick_script(scripts, lint_name_pattern(), "lint") {
        gates.push(format!("{runner} run {lint}"));
    }
    if let Some(test) = pick_script(scripts, test_name_pattern(), "test") {
        if !test.ends_with("watch") {
            gates.push(format!("{runner} run {test}"));
        }
    }
    gates
}

fn discover_make_targets(project_root: &Path, file_name: &str, runner_prefix: &str) -> Vec<String> {
    let path = project_root.join(file_name);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    let target_pattern = Regex::new(r"^([A-Za-z0-9_-]+)\s*:").expect("static pattern compiles");
    let mut targets = Vec::new();
    for line in text.lines() {
        if line.starts_with('\t') || line.starts_with(' ') || line.starts_with('#') {
            continue;
        }
        if let Some(captures) = target_pattern.captures(line) {
            let name = &captures[1];
            if name == "lint" || name == "test" {
                targets.push(format!("{runner_prefix} {name}"));
            }
        }
    }
    targets
}

/// Probes Makefile and Justfile targets named exactly `lint`/`test`.
fn discover_makefile_gates(project_root: &Path) -> Vec<String> {
    discover_make_targets(project_root, "Makefile", "make")
}

fn discover_justfile_gates(project_root: &Path) -> Vec<String> {
    discover_make_targets(project_root, "Justfile", "just")
}

/// Runs all three probes in spec order, returning the first non-empty
/// result — `package.json` takes precedence over Makefile/Justfile.
pub fn discover_gates(project_root: &Path) -> Vec<String> {
    let package_gates = discover_package_json_gates(project_root);
    if !package_gates.is_empty() {
        return package_gates;
    }
    let make_gates = discover_makefile_gates(project_root);
    if !make_gates.is_empty() {
        return make_gates;
    }
    discover_justfile_gates(project_root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_npm_lint_and_test_scripts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"demo","scripts":{"lint":"eslint .","test":"vitest run","lint:fix":"eslint . --fix"}}"#,
        )
        .unwrap();
        let gates = discover_gates(dir.path());
        assert_eq!(gates, vec!["npm run lint".to_string(), "npm run test".to_string()]);
    }

    #[test]
    fn uses_declared_package_manager() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"demo","packageManager":"pnpm@9.0.0","scripts":{"test":"vitest run"}}"#,
        )
        .unwrap();
        let gates = discover_gates(dir.path());
        assert_eq!(gates, vec!["pnpm run test".to_string()]);
    }

    #[test]
    fn falls_back_to_makefile_targets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Makefile"), "lint:\n\tgolangci-lint run\ntest:\n\tgo test ./...\n").unwrap();
        let gates = discover_gates(dir.path());
        assert_eq!(gates, vec!["make lint".to_string(), "make test".to_string()]);
    }

    #[test]
    fn no_markers_discovers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_gates(dir.path()).is_empty());
    }
}
