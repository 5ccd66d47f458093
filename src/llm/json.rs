//! Pulling a structured object out of free-form model output.

use serde::de::DeserializeOwned;

/// Narrow model output down to the JSON object it carries.
///
/// Output that already opens with `{` is taken as-is. Otherwise the first
/// fenced block wins, and the outermost braces are cut from whatever is left.
pub fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed;
    }
    let body = fenced_block(trimmed).map(str::trim).unwrap_or(trimmed);
    match (body.find('{'), body.rfind('}')) {
        (Some(open), Some(close)) if close > open => &body[open..=close],
        _ => body,
    }
}

/// Contents of the first ```` ``` ```` fence, minus an optional `json` tag.
fn fenced_block(text: &str) -> Option<&str> {
    let (_, rest) = text.split_once("```")?;
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.split_once("```").map(|(inner, _)| inner)
}

/// Extract and deserialize a JSON object, reporting a readable reason on failure.
pub fn parse_json_object<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_str(extract_json_object(raw)).map_err(|e| format!("JSON parse error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_direct_object() {
        let input = r#"{"class": "INTERESTED"}"#;
        assert_eq!(extract_json_object(input), input);
    }

    #[test]
    fn extract_json_from_markdown_block() {
        let input = "```json\n{\"priority_score\": 80}\n```";
        let result = extract_json_object(input);
        assert_eq!(result, "{\"priority_score\": 80}");
    }

    #[test]
    fn extract_json_from_bare_fence() {
        let input = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(input), "{\"a\": 1}");
    }

    #[test]
    fn extract_json_embedded_in_text() {
        let input = "Here you go: {\"subject\": \"Hi\"} hope it helps.";
        assert_eq!(extract_json_object(input), "{\"subject\": \"Hi\"}");
    }

    #[test]
    fn fence_after_prose_is_unwrapped() {
        let input = "Sure, here is the draft:\n```json\n{\"subject\": \"Hi\", \"body\": \"Dear Ada\"}\n```\nLet me know.";
        assert_eq!(
            extract_json_object(input),
            "{\"subject\": \"Hi\", \"body\": \"Dear Ada\"}"
        );
    }

    #[test]
    fn parse_reports_reason_for_prose() {
        let err = parse_json_object::<serde_json::Value>("no json here").unwrap_err();
        assert!(err.starts_with("JSON parse error"));
    }
}
