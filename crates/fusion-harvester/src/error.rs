//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and distinct exit codes.

use miette::Diagnostic;
use thiserror::Error;

use fusion_config::ConfigError;
use fusion_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONFIG: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Portal login failed: {message}")]
    #[diagnostic(
        code(fusion::auth_failed),
        help(
            "Verify the portal username and password.\n\
             Run: fusion-harvester config set-password"
        )
    )]
    AuthFailed { message: String },

    #[error("Portal session was lost")]
    #[diagnostic(
        code(fusion::session_lost),
        help("The portal rejected the session mid-cycle. Run the command again.")
    )]
    SessionLost,

    #[error("No portal credentials configured")]
    #[diagnostic(
        code(fusion::no_credentials),
        help(
            "Set credentials.username in the config file, then either\n\
             run: fusion-harvester config set-password\n\
             or set the FUSION_PASSWORD environment variable."
        )
    )]
    NoCredentials,

    // ── Configuration ────────────────────────────────────────────────
    #[error("No sites configured")]
    #[diagnostic(
        code(fusion::no_sites),
        help("Add at least one [[sites]] entry (id and name) to {path}")
    )]
    NoSites { path: String },

    #[error(transparent)]
    #[diagnostic(code(fusion::config))]
    Config(#[from] ConfigError),

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fusion::validation))]
    Validation { field: String, reason: String },

    // ── Portal ───────────────────────────────────────────────────────
    #[error("Portal request failed: {message}")]
    #[diagnostic(
        code(fusion::portal),
        help("Check portal.url and network access. Use -vv for request logs.")
    )]
    Portal {
        message: String,
        status: Option<u16>,
    },

    #[error("Could not write records: {message}")]
    #[diagnostic(code(fusion::sink))]
    Sink { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(fusion::json), help("Check the JSON file contents and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } | Self::SessionLost | Self::NoCredentials => exit_code::AUTH,
            Self::NoSites { .. } | Self::Config(_) => exit_code::CONFIG,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Portal { .. } => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::SessionInvalid => Self::SessionLost,
            CoreError::LoginFailed { message } => Self::AuthFailed { message },
            CoreError::Api { message, status } => Self::Portal { message, status },
            CoreError::Sink { sink, message } => Self::Sink {
                message: format!("{sink}: {message}"),
            },
            other @ (CoreError::DiscoveryFailed { .. }
            | CoreError::BatchTimeout { .. }
            | CoreError::DeviceFetchFailed { .. }) => Self::Portal {
                message: other.to_string(),
                status: None,
            },
        }
    }
}
