// ── Core error types ──
//
// Consumer-facing errors from helki-core. Raw transport failures never
// reach consumers directly; the `From<helki_api::Error>` impl translates
// them into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The device directory returned zero devices; nothing can be served.
    #[error("No devices available from the directory")]
    NoData,

    /// The listener is not running (or never started).
    #[error("Listener is not running")]
    Disconnected,

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cannot reach the vendor cloud: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<helki_api::Error> for CoreError {
    fn from(err: helki_api::Error) -> Self {
        match err {
            helki_api::Error::Auth { message } => CoreError::AuthenticationFailed { message },
            helki_api::Error::Protocol(message) => CoreError::Protocol { message },
            helki_api::Error::PollTimeout { .. } => CoreError::Timeout,
            helki_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            helki_api::Error::HttpStatus { status, endpoint } => CoreError::Api {
                message: format!("HTTP {status} from {endpoint}"),
                status: Some(status),
            },
            helki_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
        }
    }
}
