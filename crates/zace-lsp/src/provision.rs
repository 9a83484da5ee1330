//! Runtime auto-provisioning: generate a servers-config template for common
//! ecosystems when none is configured yet (§4.2).

use serde_json::json;

/// Supported auto-provision targets, keyed by extension.
pub fn template_for_extension(extension: &str) -> Option<serde_json::Value> {
    match extension {
        ".ts" | ".tsx" | ".js" | ".jsx" | ".mjs" | ".cjs" => Some(json!({
            "id": "typescript",
            "command": ["typescript-language-server", "--stdio"],
            "extensions": [".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"],
            "rootMarkers": ["package.json", "tsconfig.json"],
        })),
        ".py" => Some(json!({
            "id": "python",
            "command": ["pylsp"],
            "extensions": [".py"],
            "rootMarkers": ["pyproject.toml", "setup.py", "requirements.txt"],
        })),
        _ => None,
    }
}

/// Build a full servers-config document for the given set of extensions,
/// deduplicating servers that cover more than one extension.
///
/// Returns `None` if none of the extensions are supported — the caller
/// should emit a skip marker rather than write an empty file.
pub fn build_template(extensions: &std::collections::BTreeSet<String>) -> Option<serde_json::Value> {
    let mut servers = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();
    for ext in extensions {
        if let Some(server) = template_for_extension(ext) {
            let id = server["id"].as_str().unwrap().to_string();
            if seen_ids.insert(id) {
                servers.push(server);
            }
        }
    }
    if servers.is_empty() {
        None
    } else {
        Some(json!({ "servers": servers }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_typescript_and_python_servers() {
        let mut exts = std::collections::BTreeSet::new();
        exts.insert(".ts".to_string());
        exts.insert(".py".to_string());
        let doc = build_template(&exts).unwrap();
        let servers = doc["servers"].as_array().unwrap();
        assert_eq!(servers.len(), 2);
    }

    #[test]
    fn dedupes_js_family_to_one_typescript_server() {
        let mut exts = std::collections::BTreeSet::new();
        exts.insert(".ts".to_string());
        exts.insert(".tsx".to_string());
        exts.insert(".js".to_string());
        let doc = build_template(&exts).unwrap();
        assert_eq!(doc["servers"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn unsupported_extensions_yield_none() {
        let mut exts = std::collections::BTreeSet::new();
        exts.insert(".rs".to_string());
        assert!(build_template(&exts).is_none());
    }
}
