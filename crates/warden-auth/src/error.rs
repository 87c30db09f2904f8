// error.rs — Error types for the auth subsystem.

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the OAuth protocol client and the session manager.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The external consent flow did not complete within the configured
    /// window. The account is back in the unauthenticated state.
    #[error("authorization flow timed out; re-authentication required")]
    AuthorizationTimeout,

    /// The external consent flow completed unsuccessfully (user declined,
    /// or the code exchange was rejected).
    #[error("authorization denied: {detail}")]
    AuthorizationDenied { detail: String },

    /// Refresh failed terminally; the credential has been discarded and the
    /// account is back in the unauthenticated state.
    #[error("token expired and could not be refreshed: {detail}")]
    TokenExpired { detail: String },

    /// The `state` parameter on authorization completion did not match the
    /// pending flow (possible CSRF, or a stale callback).
    #[error("authorization state mismatch for account '{account_id}'")]
    StateMismatch { account_id: String },

    /// Authorization completion arrived with no flow in progress.
    #[error("no pending authorization for account '{account_id}'")]
    NoPendingAuthorization { account_id: String },

    /// The authorization server rejected the refresh token (revoked or
    /// invalid). Never retried.
    #[error("refresh token rejected: {detail}")]
    RefreshRejected { detail: String },

    /// A network-level failure talking to the authorization server.
    /// Retried with bounded backoff during refresh.
    #[error("authorization server unreachable: {detail}")]
    Network { detail: String },

    /// The authorization server answered, but not with a usable token
    /// response.
    #[error("authorization server protocol error: {detail}")]
    Protocol { detail: String },

    /// The credential store failed.
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    /// A required configuration variable is missing.
    #[error("missing configuration: {variable}")]
    MissingConfig { variable: String },
}
