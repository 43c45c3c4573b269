//! PKCE (RFC 7636) code challenges.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use warden_core::random::{VERIFIER_LENGTH, random_string};
use warden_settings::CodeChallengeMethod;

/// A fresh code verifier.
pub fn code_verifier() -> String {
    random_string(VERIFIER_LENGTH)
}

/// Challenge for `verifier`. `None` for the implicit method (no PKCE).
pub fn code_challenge(verifier: &str, method: CodeChallengeMethod) -> Option<String> {
    match method {
        CodeChallengeMethod::S256 => Some(URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))),
        CodeChallengeMethod::Plain => Some(verifier.to_string()),
        CodeChallengeMethod::Implicit => None,
    }
}

/// Wire name of `method`.
pub fn method_name(method: CodeChallengeMethod) -> &'static str {
    match method {
        CodeChallengeMethod::S256 => "S256",
        CodeChallengeMethod::Plain => "plain",
        CodeChallengeMethod::Implicit => "implicit",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
