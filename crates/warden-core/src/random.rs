//! Random strings for OAuth `state`, `nonce` and PKCE code verifiers.

use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of generated `state` and `nonce` values.
pub const STATE_LENGTH: usize = 10;

/// Length of generated PKCE code verifiers (RFC 7636 allows 43..=128).
pub const VERIFIER_LENGTH: usize = 56;

/// An alphanumeric random string of `len` characters.
pub fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
