//! Deserializers for config fields that accept `false` as "disabled".
//!
//! Auth configs written for the browser use `false` freely: `maxAge: false`,
//! `property: false`, `endpoints: { csrf: false }`. These helpers turn `false`
//! and `null` into `None` and leave everything else to the target type.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `false`/`null` → `None`, otherwise `Some(T)`.
pub fn option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(false) => Ok(None),
        other => serde_json::from_value(other).map(Some).map_err(D::Error::custom),
    }
}

/// Scope lists: a single space-separated string, an array, or `false`.
pub fn scope<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(false) => Ok(Vec::new()),
        Value::String(s) => Ok(s.split_whitespace().map(str::to_string).collect()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(D::Error::custom(format!("scope entries must be strings, got {other}"))),
            })
            .collect(),
        other => Err(D::Error::custom(format!("invalid scope: {other}"))),
    }
}

/// Validation intervals: `true` means one second, a number is milliseconds.
pub fn interval<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Bool(true) => Ok(Some(1000)),
        Value::Number(n) => n
            .as_u64()
            .filter(|ms| *ms > 0)
            .map(Some)
            .ok_or_else(|| D::Error::custom("interval must be a positive integer")),
        other => Err(D::Error::custom(format!("invalid interval: {other}"))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
