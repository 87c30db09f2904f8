// error.rs — Mediation error types.

use thiserror::Error;

use warden_auth::AuthError;

/// Errors surfaced by the dispatcher. Policy denials and missing scopes are
/// NOT errors — they come back as `InvokeOutcome` variants; these are the
/// paths where the operation could not run at all.
#[derive(Debug, Error)]
pub enum MediationError {
    /// The request's parameters do not match the operation's schema.
    #[error("invalid parameters for {operation}: {detail}")]
    InvalidParameters { operation: String, detail: String },

    /// No adapter is registered for the operation's service.
    #[error("no adapter registered for service {service}")]
    AdapterMissing { service: &'static str },

    /// Token acquisition failed (consent denied, timed out, refresh dead).
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The downstream API kept failing transiently after retries.
    #[error("downstream failure for {operation} after retries: {detail}")]
    DownstreamTransient { operation: String, detail: String },

    /// The downstream API rejected the access token. The cached credential
    /// has been invalidated; the next call re-authorizes.
    #[error("downstream rejected credentials for {operation}: {detail}")]
    DownstreamRejected { operation: String, detail: String },

    /// The downstream API failed in a non-retryable way.
    #[error("downstream call failed for {operation}: {detail}")]
    DownstreamFailed { operation: String, detail: String },
}
