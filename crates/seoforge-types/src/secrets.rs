//! Credential masking and body truncation for log emission.
//!
//! Every integration logs request/response material; API keys are replaced
//! with `****` and bodies cut to a fixed prefix before anything reaches the
//! log stream.

use serde_json::Value;

/// Replacement for any masked credential.
pub const MASKED: &str = "****";

/// Maximum number of bytes of a request/response body that may be logged.
pub const MAX_LOGGED_BODY_BYTES: usize = 2048;

/// Return a copy of `body` with any top-level `apiKey` field masked.
///
/// The optimization provider carries its credential in the request body
/// rather than a header, so bodies must be sanitized before logging.
pub fn mask_api_key_field(body: &Value) -> Value {
    match body {
        Value::Object(map) if map.contains_key("apiKey") => {
            let mut masked = map.clone();
            masked.insert("apiKey".to_string(), Value::String(MASKED.to_string()));
            Value::Object(masked)
        }
        other => other.clone(),
    }
}

/// Truncate `text` to [`MAX_LOGGED_BODY_BYTES`] on a char boundary, appending
/// an ellipsis marker when cut.
pub fn truncate_for_log(text: &str) -> String {
    if text.len() <= MAX_LOGGED_BODY_BYTES {
        return text.to_string();
    }
    let mut end = MAX_LOGGED_BODY_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… [truncated {} bytes]", &text[..end], text.len() - end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_api_key_only() {
        let body = json!({"apiKey": "sk-live-secret", "keyword": "coffee"});
        let masked = mask_api_key_field(&body);
        assert_eq!(masked["apiKey"], MASKED);
        assert_eq!(masked["keyword"], "coffee");
        // original untouched
        assert_eq!(body["apiKey"], "sk-live-secret");
    }

    #[test]
    fn passes_through_bodies_without_key() {
        let body = json!({"keyword": "coffee"});
        assert_eq!(mask_api_key_field(&body), body);
    }

    #[test]
    fn truncates_long_bodies() {
        let long = "x".repeat(MAX_LOGGED_BODY_BYTES + 100);
        let cut = truncate_for_log(&long);
        assert!(cut.contains("[truncated 100 bytes]"));
        let short = "short body";
        assert_eq!(truncate_for_log(short), short);
    }
}
