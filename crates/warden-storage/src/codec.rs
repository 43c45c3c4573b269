//! Value encoding for string-only backends (cookies, web storage).
//!
//! Strings are stored verbatim; everything else as JSON. Decoding tries JSON
//! first and falls back to the raw string, so `"Bearer abc"` and `{"id":1}`
//! both survive a round trip.

use serde_json::Value;

/// Encode a value for a string-only backend.
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Decode a stored string.
pub fn decode_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_verbatim() {
        assert_eq!(encode_value(&json!("Bearer abc")), "Bearer abc");
        assert_eq!(decode_value("Bearer abc"), json!("Bearer abc"));
    }

    #[test]
    fn objects_are_json() {
        let user = json!({"id": 1, "name": "ada"});
        let encoded = encode_value(&user);
        assert_eq!(decode_value(&encoded), user);
    }

    #[test]
    fn booleans_and_numbers() {
        assert_eq!(encode_value(&json!(true)), "true");
        assert_eq!(decode_value("true"), json!(true));
        assert_eq!(decode_value("1700000000000"), json!(1_700_000_000_000_i64));
    }
}
