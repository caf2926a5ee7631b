use thiserror::Error;

/// Top-level error type for the `fritzlink-aha` crate.
///
/// Covers every failure mode across the AHA HTTP surfaces: session
/// handshake, command dispatch, device list decoding, and the digest
/// interceptor. `fritzlink-core` maps these into cycle outcomes.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login was answered with the all-zero session token.
    ///
    /// The gateway enforces a growing back-off between failed attempts;
    /// `block_time_secs` is how long it will refuse further logins.
    #[error("Authentication rejected by gateway (blocked for {block_time_secs}s)")]
    AuthRejected { block_time_secs: u64 },

    /// The session token was rejected mid-flight (HTTP 403 or a login
    /// page served in place of the expected payload).
    #[error("Session invalid -- re-authentication required")]
    SessionInvalid,

    /// A digest-protected endpoint challenged the retried request again.
    #[error("Digest authentication failed: {message}")]
    DigestRejected { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Failed to connect to the gateway (connection refused, DNS
    /// failure, timeout, broken body stream).
    #[error("Failed to connect to gateway: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Gateway API ─────────────────────────────────────────────────
    /// The gateway answered a command with a non-success status or the
    /// literal `inval` body it uses for unknown actors and parameters.
    #[error("Gateway rejected {command}: {message}")]
    Api { command: String, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// Response body could not be decoded into the expected shape.
    ///
    /// Carries a truncated body preview for diagnostics.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String, body: String },
}

impl Error {
    /// True if this error means the held session is no longer usable.
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, Error::SessionInvalid)
    }

    /// True if the gateway rejected the credentials themselves.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Error::AuthRejected { .. })
    }

    /// True if this is a transient transport failure worth retrying on
    /// the next polling cycle (timeouts, connection resets).
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}
