// ── Core error types ──
//
// User-facing errors from fritzlink-core. Wire-level failures pass
// through as `Gateway` so callers can keep classifying them with the
// fritzlink-aha predicates; everything else is domain-level.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Anything the gateway client reported: transport, auth, decoding.
    #[error(transparent)]
    Gateway(#[from] fritzlink_aha::Error),

    /// Rejected configuration (bad URL scheme, zero interval, ...).
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A reconciliation diff violated its own guarantees.
    #[error("Reconciliation produced an inconsistent diff: {message}")]
    ReconciliationInconsistency { message: String },
}

impl CoreError {
    /// True if the gateway rejected the credentials themselves.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, CoreError::Gateway(e) if e.is_auth_rejected())
    }

    /// True for transient transport failures worth retrying next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Gateway(e) if e.is_transient())
    }
}
