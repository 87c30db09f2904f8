//! # warden-policy
//!
//! Policy profiles and the pure decision engine for Warden.
//!
//! The [`PolicyEngine`] is the single chokepoint every operation request
//! passes through. Evaluation is a pure function of the request, the active
//! [`PolicyProfile`], and the credential's granted scopes: identical inputs
//! always yield the identical [`Decision`], with no hidden state, clock
//! reads, or network calls. That determinism is what makes the decision
//! logic exhaustively testable offline.
//!
//! ## Key invariants
//!
//! - **Blocked is unconditional**: a catalog-level `Blocked` classification
//!   denies before the profile is even consulted. No profile, scope set, or
//!   parameter shape can flip it.
//! - **Deny is scope-independent**: every deny reason depends only on the
//!   catalog, profile, and request — never on the credential. Callers may
//!   safely pre-screen with an empty scope set.
//! - **Expected outcomes are values**: deny and elevation are ordinary
//!   return values, not errors. Only malformed profiles fail, at load time.

pub mod engine;
pub mod profile;
pub mod request;

pub use engine::{Decision, DenyReason, PolicyEngine};
pub use profile::{PolicyProfile, ProfileError};
pub use request::OperationRequest;
