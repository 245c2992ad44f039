use serde_json::Value;

const MAX_ERROR_CHARS: usize = 2000;

/// Render an arbitrary error value from the agent runtime as a single line
/// suitable for `errorMessage` and log fields.
pub fn format_error_for_log(error: &Value) -> String {
    let raw = match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) => match map.get("name").and_then(Value::as_str) {
                Some(name) if !name.is_empty() => format!("{name}: {message}"),
                _ => message.to_owned(),
            },
            None => error.to_string(),
        },
        other => other.to_string(),
    };
    truncate_chars(&collapse_whitespace(&raw), MAX_ERROR_CHARS)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_errors_pass_through() {
        assert_eq!(format_error_for_log(&json!("rate limited")), "rate limited");
    }

    #[test]
    fn object_errors_use_name_and_message() {
        let err = json!({ "name": "TimeoutError", "message": "took too long", "stack": "..." });
        assert_eq!(format_error_for_log(&err), "TimeoutError: took too long");
        assert_eq!(format_error_for_log(&json!({ "message": "bad" })), "bad");
    }

    #[test]
    fn other_values_are_serialized() {
        assert_eq!(format_error_for_log(&json!({ "code": 5 })), r#"{"code":5}"#);
        assert_eq!(format_error_for_log(&json!(404)), "404");
    }

    #[test]
    fn multiline_errors_are_collapsed_and_truncated() {
        assert_eq!(format_error_for_log(&json!("a\n  b\tc")), "a b c");
        let long = "x".repeat(MAX_ERROR_CHARS + 10);
        let out = format_error_for_log(&json!(long));
        assert_eq!(out.chars().count(), MAX_ERROR_CHARS + 1);
        assert!(out.ends_with('…'));
    }
}
