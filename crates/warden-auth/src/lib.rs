//! # warden-auth
//!
//! Credential storage and OAuth session lifecycle for Warden.
//!
//! The [`SessionManager`] owns one state machine per account
//! (`Unauthenticated → Authorizing → Active → Refreshing → ...`) and is the
//! only component that holds live credentials. Callers ask it for a
//! [`TokenSnapshot`]; what happens underneath (silent refresh, suspension
//! on a pending consent flow, discard on revocation) is its business.
//!
//! ## Key invariants
//!
//! - **Memory-only by default**: with [`StorageMode::MemoryOnly`] tokens
//!   live only in process memory. `Credential`'s `Debug` impl redacts
//!   token material, so crash or log paths cannot leak it either.
//! - **One refresh in flight per account**: refresh happens while holding
//!   the account's slot lock, so concurrent callers wait for the result
//!   instead of issuing duplicate refresh requests.
//! - **Per-account isolation**: a consent flow or refresh for one account
//!   never blocks operations on another.

pub mod config;
pub mod credential;
pub mod error;
pub mod oauth;
pub mod pkce;
pub mod session;
pub mod store;

pub use config::AuthConfig;
pub use credential::Credential;
pub use error::AuthError;
pub use oauth::{AuthorizationServer, HttpAuthorizationServer, TokenGrant};
pub use session::{AuthorizationRequest, SessionManager, TokenSnapshot};
pub use store::{CredentialStore, DirectoryStore, MemoryStore, StorageMode, StoreError};
