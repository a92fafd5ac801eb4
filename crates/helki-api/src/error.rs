use thiserror::Error;

/// Top-level error type for the `helki-api` crate.
///
/// Covers every failure mode across the push session and the REST surface.
/// `helki-core` maps these into consumer-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Protocol ────────────────────────────────────────────────────
    /// Malformed handshake or an unexpected frame from the push endpoint.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, TLS, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the vendor cloud.
    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { status: u16, endpoint: String },

    /// A bounded long poll elapsed without a response. Routine.
    #[error("Poll timed out after {timeout_secs}s")]
    PollTimeout { timeout_secs: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Authentication ──────────────────────────────────────────────
    /// The token collaborator could not produce a usable access token.
    #[error("Authentication failed: {message}")]
    Auth { message: String },
}

impl Error {
    /// Returns `true` for the routine poll-timeout case, which callers
    /// retry without disturbing reconnect/backoff state.
    pub fn is_poll_timeout(&self) -> bool {
        matches!(self, Self::PollTimeout { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::PollTimeout { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
