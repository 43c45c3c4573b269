//! Reading [`AuthOptions`] from disk and the environment.
//!
//! Layers, lowest first: compiled defaults, the JSON config file, then
//! `WARDEN_*` variables. File values are merged with [`deep_merge`], so a
//! file only needs the keys it changes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{AuthOptions, RedirectStrategy};

const CONFIG_ENV: &str = "WARDEN_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "warden.json";

/// Bounds for `WARDEN_TOKEN_VALIDATION_INTERVAL_MS`: 100ms to one day.
const VALIDATION_INTERVAL_BOUNDS: (u64, u64) = (100, 86_400_000);

/// `$WARDEN_CONFIG` when set and non-empty, else `./warden.json`.
pub fn config_path() -> PathBuf {
    env_value(CONFIG_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}

/// [`load_options_from_path`] on [`config_path`].
pub fn load_options() -> Result<AuthOptions> {
    load_options_from_path(&config_path())
}

/// Defaults, overlaid with `path` when it exists, overlaid with env vars.
///
/// A missing file is not an error. Unreadable files and malformed JSON are.
pub fn load_options_from_path(path: &Path) -> Result<AuthOptions> {
    let mut merged = serde_json::to_value(AuthOptions::default())?;
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            debug!(path = %path.display(), "auth config file found");
            let file: Value = serde_json::from_str(&raw)?;
            merge_into(&mut merged, file);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no auth config file, using defaults");
        }
        Err(e) => return Err(e.into()),
    }

    let mut options: AuthOptions = serde_json::from_value(merged)?;
    apply_env_overrides(&mut options, env_value);
    Ok(options)
}

/// Overlay `source` onto `target`.
///
/// Objects merge key by key and keep `target`'s key order. Any other
/// `source` value (arrays and `false` included) replaces what it lands on.
/// `null` in `source` leaves `target` alone.
pub fn deep_merge(mut target: Value, source: Value) -> Value {
    merge_into(&mut target, source);
    target
}

fn merge_into(target: &mut Value, source: Value) {
    match (target, source) {
        (_, Value::Null) => {}
        (Value::Object(into), Value::Object(from)) => {
            for (key, value) in from {
                match into.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = into.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `WARDEN_*` overrides read through `lookup`.
///
/// Values that do not parse are logged and skipped, leaving the file or
/// default value in place.
fn apply_env_overrides(options: &mut AuthOptions, lookup: impl Fn(&str) -> Option<String>) {
    let parsed = |name: &str, parse: &dyn Fn(&str) -> Option<Value>| -> Option<Value> {
        let raw = lookup(name)?;
        let value = parse(&raw);
        if value.is_none() {
            warn!(var = name, value = %raw, "ignoring unparseable env override");
        }
        value
    };
    let text = |s: &str| Some(Value::String(s.to_string()));
    let flag = |s: &str| flag_value(s).map(Value::Bool);
    let interval = |s: &str| {
        let (min, max) = VALIDATION_INTERVAL_BOUNDS;
        s.parse::<u64>().ok().filter(|n| (min..=max).contains(n)).map(Value::from)
    };
    let redirect = |s: &str| redirect_strategy(s).map(|_| Value::String(s.to_ascii_lowercase()));

    if let Some(Value::String(v)) = parsed("WARDEN_BASE_URL", &text) {
        options.base_url = Some(v);
    }
    if let Some(Value::String(v)) = parsed("WARDEN_DEFAULT_STRATEGY", &text) {
        options.default_strategy = Some(v);
    }
    if let Some(Value::String(v)) = parsed("WARDEN_REDIRECT_STRATEGY", &redirect) {
        if let Some(strategy) = redirect_strategy(&v) {
            options.redirect_strategy = strategy;
        }
    }
    if let Some(Value::Bool(v)) = parsed("WARDEN_WATCH_LOGGED_IN", &flag) {
        options.watch_logged_in = v;
    }
    if let Some(Value::Bool(v)) = parsed("WARDEN_RESET_ON_ERROR", &flag) {
        options.reset_on_error = v;
    }
    if let Some(v) = parsed("WARDEN_TOKEN_VALIDATION_INTERVAL_MS", &interval).and_then(|v| v.as_u64()) {
        options.token_validation_interval = Some(v);
    }
    if let Some(Value::String(v)) = parsed("WARDEN_COOKIE_PREFIX", &text) {
        options.stores.cookie.prefix = v;
    }
    if let Some(Value::Bool(v)) = parsed("WARDEN_STRICT_EXCEPTIONS", &flag) {
        options.stores.strict_exceptions = v;
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn flag_value(raw: &str) -> Option<bool> {
    if ["true", "1", "yes", "on"].iter().any(|t| raw.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if ["false", "0", "no", "off"].iter().any(|f| raw.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

fn redirect_strategy(raw: &str) -> Option<RedirectStrategy> {
    if raw.eq_ignore_ascii_case("query") {
        Some(RedirectStrategy::Query)
    } else if raw.eq_ignore_ascii_case("storage") {
        Some(RedirectStrategy::Storage)
    } else {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
