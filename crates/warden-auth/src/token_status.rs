//! Credential status classification.

/// Slack subtracted from the expiry so a token does not expire between
/// validation and use.
pub const SLACK_MILLIS: i64 = 500;

/// Derived state of a stored credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
    /// No value, or no expiry tracked.
    Unknown,
    /// Usable.
    Valid,
    /// Past its expiry (minus slack).
    Expired,
}

impl TokenStatus {
    /// Classify a credential from presence and expiry at `now` (epoch millis).
    /// An expiry of `0` counts as untracked.
    pub fn calculate(present: bool, expires_at: Option<i64>, now: i64) -> Self {
        if !present {
            return Self::Unknown;
        }
        match expires_at {
            None | Some(0) => Self::Unknown,
            Some(at) if now < at.saturating_sub(SLACK_MILLIS) => Self::Valid,
            Some(_) => Self::Expired,
        }
    }

    /// No value or no tracked expiry.
    pub fn unknown(self) -> bool {
        self == Self::Unknown
    }

    /// Usable now.
    pub fn valid(self) -> bool {
        self == Self::Valid
    }

    /// Past expiry.
    pub fn expired(self) -> bool {
        self == Self::Expired
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
