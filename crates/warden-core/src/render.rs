use serde::{Deserialize, Serialize};

/// Where an auth instance is running.
///
/// Storage read precedence and a few scheme steps (OAuth callback handling,
/// browser storage availability) depend on this.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderContext {
    /// Rendering a request on the server. One auth instance per request.
    Server,
    /// Running in the browser. One auth instance per app.
    #[default]
    Client,
}

impl RenderContext {
    /// Whether this is the server side.
    pub fn is_server(self) -> bool {
        matches!(self, Self::Server)
    }

    /// Whether this is the client side.
    pub fn is_client(self) -> bool {
        matches!(self, Self::Client)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_client() {
        assert!(RenderContext::default().is_client());
        assert!(!RenderContext::default().is_server());
    }

    #[test]
    fn server_is_not_client() {
        assert!(RenderContext::Server.is_server());
        assert!(!RenderContext::Server.is_client());
    }
}
