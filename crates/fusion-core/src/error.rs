// ── Core error types ──
//
// Errors surfaced by the harvest pipeline. Transport detail stays inside
// `Api`; the `From<fusion_api::Error>` impl lifts session and batch
// failures into their own variants so the cycle can react to them.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session ──────────────────────────────────────────────────────
    #[error("Session is not valid -- re-login required")]
    SessionInvalid,

    #[error("Login failed: {message}")]
    LoginFailed { message: String },

    // ── Discovery / fetch ────────────────────────────────────────────
    #[error("Discovery failed for site {site}: {reason}")]
    DiscoveryFailed { site: String, reason: String },

    #[error("Batch chunk {chunk} timed out with no responses ({devices} devices skipped)")]
    BatchTimeout { chunk: usize, devices: usize },

    #[error("Fetch failed for device {dn}: {reason}")]
    DeviceFetchFailed { dn: String, reason: String },

    // ── Output ───────────────────────────────────────────────────────
    #[error("Sink {sink} rejected records: {message}")]
    Sink { sink: String, message: String },

    // ── API errors (wrapped) ─────────────────────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },
}

impl CoreError {
    /// Attribute a failure to a site, keeping session loss distinguishable.
    pub fn discovery(site: &str, err: &fusion_api::Error) -> Self {
        if err.is_session_expired() {
            Self::SessionInvalid
        } else {
            Self::DiscoveryFailed {
                site: site.to_owned(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether the next step should be a fresh login.
    pub fn needs_login(&self) -> bool {
        matches!(self, Self::SessionInvalid | Self::LoginFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<fusion_api::Error> for CoreError {
    fn from(err: fusion_api::Error) -> Self {
        if err.is_session_expired() {
            return Self::SessionInvalid;
        }
        match err {
            fusion_api::Error::Login { message } => Self::LoginFailed { message },
            fusion_api::Error::BatchTimeout { chunk, devices } => {
                Self::BatchTimeout { chunk, devices }
            }
            fusion_api::Error::Portal { status, message } => Self::Api {
                message,
                status: Some(status),
            },
            fusion_api::Error::Transport(ref e) => Self::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            other => Self::Api {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_loss_maps_to_session_invalid() {
        let err: CoreError = fusion_api::Error::SessionExpired.into();
        assert!(matches!(err, CoreError::SessionInvalid));

        let err: CoreError = fusion_api::Error::Portal {
            status: 401,
            message: "denied".into(),
        }
        .into();
        assert!(err.needs_login());
    }

    #[test]
    fn discovery_keeps_site_context() {
        let err = CoreError::discovery(
            "NE=1",
            &fusion_api::Error::Portal {
                status: 500,
                message: "boom".into(),
            },
        );
        match err {
            CoreError::DiscoveryFailed { site, reason } => {
                assert_eq!(site, "NE=1");
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn batch_timeout_passes_through() {
        let err: CoreError = fusion_api::Error::BatchTimeout {
            chunk: 1,
            devices: 2,
        }
        .into();
        assert!(matches!(err, CoreError::BatchTimeout { chunk: 1, devices: 2 }));
    }
}
