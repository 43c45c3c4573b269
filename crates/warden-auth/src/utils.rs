//! Path, query and property helpers shared by the façade and schemes.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use url::form_urlencoded;

static RELATIVE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/([a-zA-Z0-9@\-%_~.:][/a-zA-Z0-9@\-%_~.:]*)?([?][^#]*)?(#[^#]*)?$")
        .unwrap_or_else(|_| unreachable!("static pattern"))
});

static REPEATED_SLASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("/+").unwrap_or_else(|_| unreachable!("static pattern")));

/// In-app path (starts with a single `/`, no scheme or host).
pub fn is_relative_url(url: &str) -> bool {
    RELATIVE_URL.is_match(url)
}

/// Drop the query, one trailing slash, and repeated slashes.
pub fn normalize_path(path: &str) -> String {
    let mut result = path.split('?').next().unwrap_or_default().to_string();
    if result.ends_with('/') {
        let _ = result.pop();
    }
    REPEATED_SLASHES.replace_all(&result, "/").into_owned()
}

/// Same page, ignoring query and trailing slash.
pub fn is_same_path(a: &str, b: &str) -> bool {
    normalize_path(a) == normalize_path(b)
}

/// Decode `a=1&b=2` (a leading `?` or `#` is ignored). Later keys win.
pub fn parse_query(input: &str) -> BTreeMap<String, String> {
    let input = input.trim_start_matches(['?', '#']);
    form_urlencoded::parse(input.as_bytes()).into_owned().collect()
}

/// Encode pairs as a query string without the leading `?`.
pub fn encode_query<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        let _ = serializer.append_pair(k.as_ref(), v.as_ref());
    }
    serializer.finish()
}

/// Merge `params` into the query of `input`, overriding existing keys and
/// keeping any fragment.
pub fn with_query<K, V>(input: &str, params: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let (without_hash, hash) = match input.split_once('#') {
        Some((rest, hash)) => (rest, Some(hash)),
        None => (input, None),
    };
    let (base, query) = without_hash.split_once('?').unwrap_or((without_hash, ""));

    let mut merged: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    for (k, v) in params {
        let (k, v) = (k.as_ref(), v.as_ref());
        match merged.iter_mut().find(|(existing, _)| existing == k) {
            Some(slot) => v.clone_into(&mut slot.1),
            None => merged.push((k.to_string(), v.to_string())),
        }
    }

    let mut out = base.to_string();
    if !merged.is_empty() {
        out.push('?');
        out.push_str(&encode_query(merged));
    }
    if let Some(hash) = hash {
        out.push('#');
        out.push_str(hash);
    }
    out
}

/// Read `prop` from `holder`.
///
/// A string holder is parsed as JSON first. No prop, or a holder that is not
/// an object, returns the holder itself. A key containing dots is tried
/// verbatim before walking it as a path.
pub fn get_prop(holder: &Value, prop: Option<&str>) -> Option<Value> {
    let parsed;
    let holder = match holder {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => {
                parsed = v;
                &parsed
            }
            Err(_) => holder,
        },
        other => other,
    };

    let Some(prop) = prop.filter(|p| !p.is_empty()) else {
        return Some(holder.clone()).filter(|v| !v.is_null());
    };
    let Value::Object(map) = holder else {
        return Some(holder.clone()).filter(|v| !v.is_null());
    };
    if let Some(direct) = map.get(prop) {
        return Some(direct.clone());
    }

    let mut current = holder;
    for part in prop.split('.') {
        current = current.get(part)?;
    }
    Some(current.clone())
}

/// JavaScript truthiness of a JSON value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `"{kind} {token}"` unless `token` already starts with `kind`.
pub fn add_token_prefix(token: &str, kind: Option<&str>) -> String {
    match kind {
        Some(kind) if !kind.is_empty() && !token.is_empty() && !token.starts_with(kind) => {
            format!("{kind} {token}")
        }
        _ => token.to_string(),
    }
}

/// Strip a leading `"{kind} "`.
pub fn remove_token_prefix(token: &str, kind: Option<&str>) -> String {
    match kind {
        Some(kind) if !kind.is_empty() => token.replacen(&format!("{kind} "), "", 1),
        _ => token.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn relative_urls() {
        assert!(is_relative_url("/"));
        assert!(is_relative_url("/dashboard?tab=1#top"));
        assert!(!is_relative_url("https://example.com/x"));
        assert!(!is_relative_url("//evil.com"));
        assert!(!is_relative_url("dashboard"));
    }

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize_path("/login/?x=1"), "/login");
        assert_eq!(normalize_path("//a///b"), "/a/b");
        assert!(is_same_path("/login/", "/login?to=/x"));
        assert!(!is_same_path("/login", "/logout"));
    }

    #[test]
    fn query_round() {
        let q = parse_query("#access_token=abc&state=x%20y");
        assert_eq!(q["access_token"], "abc");
        assert_eq!(q["state"], "x y");
    }

    #[test]
    fn with_query_merges_and_keeps_hash() {
        assert_eq!(with_query("/a?x=1#h", [("y", "2"), ("x", "3")]), "/a?x=3&y=2#h");
        assert_eq!(with_query("/a", Vec::<(&str, &str)>::new()), "/a");
        assert_eq!(with_query("/a", [("to", "/b c")]), "/a?to=%2Fb+c");
    }

    #[test]
    fn get_prop_paths() {
        let data = json!({"user": {"profile": {"id": 7}}, "a.b": 1});
        assert_eq!(get_prop(&data, Some("user.profile.id")), Some(json!(7)));
        assert_eq!(get_prop(&data, Some("a.b")), Some(json!(1)));
        assert_eq!(get_prop(&data, Some("user.missing")), None);
        assert_eq!(get_prop(&data, None), Some(data.clone()));
    }

    #[test]
    fn get_prop_parses_json_strings() {
        let raw = Value::String(r#"{"token":"t"}"#.to_string());
        assert_eq!(get_prop(&raw, Some("token")), Some(json!("t")));
        let opaque = Value::String("plain".to_string());
        assert_eq!(get_prop(&opaque, Some("token")), Some(opaque.clone()));
    }

    #[test]
    fn truthiness() {
        assert!(is_truthy(&json!({})));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn token_prefixes() {
        assert_eq!(add_token_prefix("abc", Some("Bearer")), "Bearer abc");
        assert_eq!(add_token_prefix("Bearer abc", Some("Bearer")), "Bearer abc");
        assert_eq!(add_token_prefix("abc", None), "abc");
        assert_eq!(remove_token_prefix("Bearer abc", Some("Bearer")), "abc");
        assert_eq!(remove_token_prefix("abc", Some("Bearer")), "abc");
    }
}
