//! Unverified JWT claim extraction.
//!
//! Claims are only read to learn the expiry and identity of tokens the
//! provider already handed us; signatures are not checked here.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::errors::Result;

fn unverified() -> Validation {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Decode the claims of `token`.
///
/// A value that is not a JWT at all yields `Ok(None)`. Any other decode
/// failure is an error.
pub fn decode_claims(token: &str) -> Result<Option<Map<String, Value>>> {
    match jsonwebtoken::decode::<Map<String, Value>>(token, &DecodingKey::from_secret(&[]), &unverified()) {
        Ok(data) => Ok(Some(data.claims)),
        Err(e) => match e.kind() {
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => Ok(None),
            _ => Err(e.into()),
        },
    }
}

/// `exp` claim of `token` in epoch millis, if it is a JWT carrying one.
/// Out-of-range values saturate.
pub fn expiration_millis(token: &str) -> Result<Option<i64>> {
    let Some(claims) = decode_claims(token)? else {
        return Ok(None);
    };
    #[allow(clippy::cast_possible_truncation)]
    let exp = claims
        .get("exp")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .filter(|exp| *exp != 0);
    Ok(exp.map(|secs| secs.saturating_mul(1000)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
