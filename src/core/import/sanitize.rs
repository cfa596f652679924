//! Redaction of row snapshots stored alongside row errors

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::types::RawRow;

static SENSITIVE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|passwd|token|secret|key)").expect("Invalid sensitive field regex")
});

pub const REDACTED: &str = "[REDACTED]";

pub fn is_sensitive_field(name: &str) -> bool {
    SENSITIVE_FIELD.is_match(name)
}

/// Copy of `row` with sensitive fields redacted and strings truncated to
/// `preview_length` characters
pub fn sanitize_row(row: &RawRow, preview_length: usize) -> Value {
    Value::Object(sanitize_map(row, preview_length))
}

fn sanitize_map(
    map: &serde_json::Map<String, Value>,
    preview_length: usize,
) -> serde_json::Map<String, Value> {
    map.iter()
        .map(|(name, value)| {
            let value = if is_sensitive_field(name) {
                Value::String(REDACTED.to_string())
            } else {
                sanitize_value(value, preview_length)
            };
            (name.clone(), value)
        })
        .collect()
}

fn sanitize_value(value: &Value, preview_length: usize) -> Value {
    match value {
        Value::String(text) => Value::String(truncate(text, preview_length)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value(item, preview_length))
                .collect(),
        ),
        Value::Object(map) => Value::Object(sanitize_map(map, preview_length)),
        other => other.clone(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RawRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_sensitive_fields_redacted() {
        let sanitized = sanitize_row(
            &row(json!({
                "name": "Burger",
                "Password": "hunter2",
                "api_key": "abc",
                "auth_token": 42,
            })),
            100,
        );

        assert_eq!(sanitized["name"], "Burger");
        assert_eq!(sanitized["Password"], REDACTED);
        assert_eq!(sanitized["api_key"], REDACTED);
        assert_eq!(sanitized["auth_token"], REDACTED);
    }

    #[test]
    fn test_long_strings_truncated_on_char_boundary() {
        let sanitized = sanitize_row(&row(json!({"description": "ééééé"})), 3);
        assert_eq!(sanitized["description"], "ééé...");

        let untouched = sanitize_row(&row(json!({"description": "abc"})), 3);
        assert_eq!(untouched["description"], "abc");
    }

    #[test]
    fn test_nested_values_sanitized() {
        let sanitized = sanitize_row(
            &row(json!({"meta": {"secret": "x", "note": "abcdef"}, "tags": ["abcdef"]})),
            2,
        );
        assert_eq!(sanitized["meta"]["secret"], REDACTED);
        assert_eq!(sanitized["meta"]["note"], "ab...");
        assert_eq!(sanitized["tags"][0], "ab...");
    }
}
