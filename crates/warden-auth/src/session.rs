// session.rs — Per-account OAuth session state machine.
//
// States per account:
//
//   Unauthenticated → Authorizing → Active → (refresh → Active | Expired)
//                                            → Unauthenticated
//
// Each account has a slot guarded by its own tokio Mutex, so accounts never
// block each other. All transitions happen while holding the slot lock:
//
//   - Refresh runs under the lock, which is what enforces "at most one
//     refresh in flight per account": concurrent callers queue on the lock
//     and then observe the refreshed credential (or the propagated failure)
//     instead of issuing duplicate refresh requests.
//   - Authorization waits (a human in a browser) do NOT hold the lock —
//     waiters register on the slot's Notify and suspend with a bounded
//     timeout, so completion callbacks can take the lock to store the
//     credential.
//
// Lock release on every exit path, including caller cancellation, falls
// out of RAII: dropping the future drops the MutexGuard.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::credential::Credential;
use crate::error::AuthError;
use crate::oauth::{self, AuthorizationServer, HttpAuthorizationServer, TokenGrant};
use crate::store::{open_store, CredentialStore};

/// A point-in-time view of an account's access token, valid for the
/// duration of one downstream call. Callers never hold the Credential.
#[derive(Clone)]
pub struct TokenSnapshot {
    pub access_token: String,
    pub scopes: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSnapshot {
    fn of(credential: &Credential) -> Self {
        Self {
            access_token: credential.access_token.clone(),
            scopes: credential.scopes.clone(),
            expires_at: credential.expires_at,
        }
    }
}

impl fmt::Debug for TokenSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSnapshot")
            .field("access_token", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A consent flow waiting on the user, as exposed to the embedding
/// application (which surfaces the URL and routes the callback back in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub scopes: BTreeSet<String>,
}

#[derive(Clone)]
struct PendingAuthorization {
    state: String,
    verifier: String,
    url: String,
    scopes: BTreeSet<String>,
}

enum SessionState {
    /// No credential. `denial` records why the last flow failed, so waiters
    /// woken by a failed completion can report it.
    Unauthenticated { denial: Option<String> },
    /// A consent flow is in progress; callers suspend on the slot's Notify.
    Authorizing(PendingAuthorization),
    /// A live credential exists (it may still need a refresh on next use).
    Active(Credential),
}

struct AccountSlot {
    state: Mutex<SessionState>,
    notify: Notify,
}

impl AccountSlot {
    fn new(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
            notify: Notify::new(),
        }
    }
}

/// Owns every credential and all session state transitions.
pub struct SessionManager {
    slots: StdMutex<HashMap<String, Arc<AccountSlot>>>,
    server: Arc<dyn AuthorizationServer>,
    store: Box<dyn CredentialStore>,
    config: AuthConfig,
    /// Scope union requested up front at consent time (computed from the
    /// catalog and active profile by the embedder), so one prompt covers
    /// every reachable operation.
    consent_scopes: BTreeSet<String>,
}

impl SessionManager {
    /// Build a manager over an explicit authorization server and store.
    /// Persisted credentials (if the store has any) are restored as Active.
    pub fn new(
        config: AuthConfig,
        server: Arc<dyn AuthorizationServer>,
        store: Box<dyn CredentialStore>,
        consent_scopes: BTreeSet<String>,
    ) -> Result<Self, AuthError> {
        let mut slots = HashMap::new();
        for account_id in store.list_accounts()? {
            if let Some(credential) = store.get(&account_id)? {
                info!(account_id = %account_id, "restored persisted credential");
                slots.insert(
                    account_id,
                    Arc::new(AccountSlot::new(SessionState::Active(credential))),
                );
            }
        }
        Ok(Self {
            slots: StdMutex::new(slots),
            server,
            store,
            config,
            consent_scopes,
        })
    }

    /// Build a manager for production use: HTTP authorization server and
    /// the store matching the configured storage mode.
    pub fn from_config(
        config: AuthConfig,
        consent_scopes: BTreeSet<String>,
    ) -> Result<Self, AuthError> {
        let server = Arc::new(HttpAuthorizationServer::new(&config));
        let store = open_store(config.storage_mode, config.credentials_dir.as_deref())?;
        Self::new(config, server, store, consent_scopes)
    }

    fn slot(&self, account_id: &str) -> Arc<AccountSlot> {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots
            .entry(account_id.to_string())
            .or_insert_with(|| {
                Arc::new(AccountSlot::new(SessionState::Unauthenticated {
                    denial: None,
                }))
            })
            .clone()
    }

    /// Obtain a valid access token for an account.
    ///
    /// May refresh a near-expiry token, or start a consent flow and suspend
    /// until it completes — bounded by `authorization_timeout`. The returned
    /// snapshot is valid for one downstream call.
    pub async fn access_token(&self, account_id: &str) -> Result<TokenSnapshot, AuthError> {
        let slot = self.slot(account_id);
        let deadline = Instant::now() + self.config.authorization_timeout;
        let mut waited = false;

        loop {
            let mut guard = slot.state.lock().await;
            match &mut *guard {
                SessionState::Active(credential) => {
                    if !credential.expires_within(self.config.refresh_margin) {
                        return Ok(TokenSnapshot::of(credential));
                    }

                    let Some(refresh_token) = credential.refresh_token.clone() else {
                        warn!(account_id, "access token expired with no refresh token");
                        self.store.delete(account_id)?;
                        *guard = SessionState::Unauthenticated { denial: None };
                        return Err(AuthError::TokenExpired {
                            detail: "access token expired and no refresh token was issued"
                                .to_string(),
                        });
                    };

                    // Refresh under the slot lock: any concurrent caller
                    // queues here and reads the outcome.
                    debug!(account_id, "access token near expiry, refreshing");
                    match self.refresh_with_backoff(&refresh_token).await {
                        Ok(grant) => {
                            apply_grant(credential, grant);
                            self.store.put(credential)?;
                            info!(account_id, "access token refreshed");
                            return Ok(TokenSnapshot::of(credential));
                        }
                        Err(e) => {
                            warn!(account_id, error = %e, "refresh failed, discarding credential");
                            self.store.delete(account_id)?;
                            *guard = SessionState::Unauthenticated { denial: None };
                            return Err(AuthError::TokenExpired {
                                detail: e.to_string(),
                            });
                        }
                    }
                }
                SessionState::Unauthenticated { denial } => {
                    if waited {
                        // We suspended on a consent flow that ended without
                        // producing a credential.
                        let detail = denial
                            .clone()
                            .unwrap_or_else(|| "authorization flow did not complete".to_string());
                        return Err(AuthError::AuthorizationDenied { detail });
                    }

                    let (state, verifier, url) =
                        oauth::new_authorization(&self.config, &self.consent_scopes);
                    info!(account_id, url = %url, "authorization required; waiting for consent");
                    *guard = SessionState::Authorizing(PendingAuthorization {
                        state,
                        verifier,
                        url,
                        scopes: self.consent_scopes.clone(),
                    });
                }
                // Another caller already started the flow; join its wait.
                SessionState::Authorizing(_) => {}
            }

            // Register interest before releasing the lock so a completion
            // between unlock and await cannot be missed.
            let notified = slot.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(guard);

            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, notified).await.is_err() {
                let mut guard = slot.state.lock().await;
                if matches!(*guard, SessionState::Authorizing(_)) {
                    *guard = SessionState::Unauthenticated { denial: None };
                }
                warn!(account_id, "authorization flow timed out");
                return Err(AuthError::AuthorizationTimeout);
            }
            waited = true;
        }
    }

    /// The consent flow currently awaiting the user for an account, if any.
    pub async fn pending_authorization(&self, account_id: &str) -> Option<AuthorizationRequest> {
        let slot = self.slot(account_id);
        let guard = slot.state.lock().await;
        match &*guard {
            SessionState::Authorizing(pending) => Some(AuthorizationRequest {
                url: pending.url.clone(),
                state: pending.state.clone(),
                scopes: pending.scopes.clone(),
            }),
            _ => None,
        }
    }

    /// Complete a pending consent flow with the authorization-code callback.
    ///
    /// Verifies the `state` token, exchanges the code, stores the credential,
    /// and wakes every suspended caller.
    pub async fn complete_authorization(
        &self,
        account_id: &str,
        state: &str,
        code: &str,
    ) -> Result<(), AuthError> {
        let slot = self.slot(account_id);
        let mut guard = slot.state.lock().await;

        let pending = match &*guard {
            SessionState::Authorizing(pending) => pending.clone(),
            _ => {
                return Err(AuthError::NoPendingAuthorization {
                    account_id: account_id.to_string(),
                })
            }
        };
        if pending.state != state {
            warn!(account_id, "authorization callback state mismatch");
            return Err(AuthError::StateMismatch {
                account_id: account_id.to_string(),
            });
        }

        match self
            .server
            .exchange_code(code, &pending.verifier, &self.config.redirect_uri)
            .await
        {
            Ok(grant) => {
                let scopes = grant.granted_scopes(&pending.scopes);
                let credential = Credential {
                    account_id: account_id.to_string(),
                    scopes,
                    access_token: grant.access_token.clone(),
                    expires_at: expiry_from_delta(grant.expires_in),
                    refresh_token: grant.refresh_token.clone(),
                };
                self.store.put(&credential)?;
                info!(account_id, "authorization complete");
                *guard = SessionState::Active(credential);
                slot.notify.notify_waiters();
                Ok(())
            }
            Err(e) => {
                *guard = SessionState::Unauthenticated {
                    denial: Some(e.to_string()),
                };
                slot.notify.notify_waiters();
                Err(e)
            }
        }
    }

    /// Report that the user declined (or the flow failed externally).
    /// Suspended callers fail with `AuthorizationDenied`.
    pub async fn deny_authorization(
        &self,
        account_id: &str,
        detail: impl Into<String>,
    ) -> Result<(), AuthError> {
        let slot = self.slot(account_id);
        let mut guard = slot.state.lock().await;
        if !matches!(*guard, SessionState::Authorizing(_)) {
            return Err(AuthError::NoPendingAuthorization {
                account_id: account_id.to_string(),
            });
        }
        *guard = SessionState::Unauthenticated {
            denial: Some(detail.into()),
        };
        slot.notify.notify_waiters();
        Ok(())
    }

    /// Destroy an account's credential immediately. Used for downstream
    /// token rejection (the cached token is known bad) and for explicit
    /// logout/revocation. The next call re-triggers authorization.
    pub async fn invalidate(&self, account_id: &str) -> Result<(), AuthError> {
        let slot = self.slot(account_id);
        let mut guard = slot.state.lock().await;
        if matches!(*guard, SessionState::Active(_)) {
            info!(account_id, "credential invalidated");
        }
        self.store.delete(account_id)?;
        *guard = SessionState::Unauthenticated { denial: None };
        Ok(())
    }

    /// Explicit user/admin revocation. Alias for [`Self::invalidate`] with
    /// intent in the name.
    pub async fn revoke(&self, account_id: &str) -> Result<(), AuthError> {
        self.invalidate(account_id).await
    }

    /// Accounts with a live credential.
    pub async fn active_accounts(&self) -> Vec<String> {
        let slots: Vec<(String, Arc<AccountSlot>)> = {
            let map = match self.slots.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let mut active = Vec::new();
        for (account_id, slot) in slots {
            if matches!(*slot.state.lock().await, SessionState::Active(_)) {
                active.push(account_id);
            }
        }
        active.sort();
        active
    }

    /// Refresh with bounded exponential backoff. Rejection (revoked token)
    /// is terminal; network errors retry up to `refresh_attempts`.
    async fn refresh_with_backoff(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.server.refresh(refresh_token).await {
                Ok(grant) => return Ok(grant),
                Err(e @ AuthError::RefreshRejected { .. }) => return Err(e),
                Err(e) if attempt < self.config.refresh_attempts => {
                    let delay = self.config.refresh_backoff * 2u32.saturating_pow(attempt - 1);
                    warn!(attempt, error = %e, "token refresh attempt failed, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Apply a refresh grant to an existing credential in place. The refresh
/// token is kept when the server does not rotate it.
fn apply_grant(credential: &mut Credential, grant: TokenGrant) {
    credential.scopes = grant.granted_scopes(&credential.scopes);
    credential.expires_at = expiry_from_delta(grant.expires_in);
    credential.refresh_token = grant
        .refresh_token
        .clone()
        .or_else(|| credential.refresh_token.take());
    credential.access_token = grant.access_token;
}

/// Absolute expiry from a token-endpoint `expires_in` delta. The value is
/// untrusted network input; out-of-range deltas saturate instead of
/// panicking.
fn expiry_from_delta(expires_in: u64) -> DateTime<Utc> {
    let seconds = i64::try_from(expires_in).unwrap_or(i64::MAX);
    let delta = chrono::Duration::try_seconds(seconds).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
