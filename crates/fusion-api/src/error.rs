use thiserror::Error;

/// Top-level error type for the `fusion-api` crate.
///
/// Covers session, transport, portal and payload failures. `fusion-core`
/// maps these into its own cycle-level taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Session ─────────────────────────────────────────────────────
    /// No `Roarand` token has been captured yet.
    #[error("No session token available")]
    NoToken,

    /// The portal rejected the token, or answered with its login page.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    /// The login collaborator could not establish a session.
    #[error("Login failed: {message}")]
    Login { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A request or a wait exceeded its deadline.
    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Portal ──────────────────────────────────────────────────────
    /// Non-success HTTP status from a portal endpoint.
    #[error("Portal error (HTTP {status}): {message}")]
    Portal { status: u16, message: String },

    /// The portal answered with `success: false` in its JSON envelope.
    #[error("Portal rejected request: {message}")]
    Rejected { message: String },

    /// An optional endpoint was used without being configured.
    #[error("Endpoint '{name}' is not configured")]
    EndpointNotConfigured { name: &'static str },

    // ── Batch ───────────────────────────────────────────────────────
    /// A whole chunk produced no outcome before its deadline.
    #[error("Batch chunk {chunk} timed out with no results ({devices} devices)")]
    BatchTimeout { chunk: usize, devices: usize },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error means the session token is gone or stale.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::NoToken | Self::SessionExpired)
            || matches!(self, Self::Portal { status: 401 | 403, .. })
    }

    /// Returns `true` if retrying on the next cycle is likely to help.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::BatchTimeout { .. } => true,
            Self::Portal { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// First `max` characters of a body, safe on multi-byte boundaries.
pub(crate) fn preview(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_count_as_expired() {
        assert!(Error::SessionExpired.is_session_expired());
        assert!(Error::NoToken.is_session_expired());
        assert!(
            Error::Portal {
                status: 403,
                message: String::new()
            }
            .is_session_expired()
        );
        assert!(
            !Error::Portal {
                status: 500,
                message: String::new()
            }
            .is_session_expired()
        );
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(
            Error::Portal {
                status: 502,
                message: String::new()
            }
            .is_transient()
        );
        assert!(Error::BatchTimeout { chunk: 1, devices: 2 }.is_transient());
        assert!(!Error::SessionExpired.is_transient());
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("abc", 10), "abc");
    }
}
