//! Legacy best-effort JSON extraction, tolerant of markdown fences and
//! leading/trailing prose (§4.3 step 5).

use regex::Regex;
use std::sync::OnceLock;

static FENCE_RE: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    FENCE_RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap())
}

/// Extract the first JSON object from `text`: prefer a fenced ```json block,
/// else the first balanced `{...}` span.
pub fn extract_first_json_object(text: &str) -> Option<serde_json::Value> {
    if let Some(cap) = fence_re().captures(text) {
        if let Ok(value) = serde_json::from_str(&cap[1]) {
            return Some(value);
        }
    }

    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..=i];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_fenced_block() {
        let text = "here is the plan:\n```json\n{\"action\": \"complete\", \"reasoning\": \"done\"}\n```\nthanks";
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["action"], "complete");
    }

    #[test]
    fn extracts_bare_object_with_surrounding_prose() {
        let text = "Sure! {\"action\": \"ask_user\", \"reasoning\": \"need input\"} let me know.";
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["action"], "ask_user");
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let text = r#"{"action": "complete", "reasoning": "uses a { brace } inside a string"}"#;
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["reasoning"], "uses a { brace } inside a string");
    }

    #[test]
    fn no_json_object_yields_none() {
        assert!(extract_first_json_object("no json here").is_none());
    }
}
