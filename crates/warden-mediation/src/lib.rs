//! # warden-mediation
//!
//! The dispatcher that mediates every agent operation request: catalog
//! lookup, parameter validation, policy evaluation, token acquisition, and
//! the downstream call itself, in that order. No code path reaches a
//! workspace API without passing the [`PolicyEngine`](warden_policy::PolicyEngine)
//! twice — once scope-free before credentials are touched, once against the
//! credential actually obtained.
//!
//! Downstream services plug in behind the [`ServiceAdapter`] trait; an
//! optional append-only JSONL [`DecisionLog`] records every outcome.

pub mod adapter;
pub mod audit;
pub mod dispatcher;
pub mod error;

pub use adapter::{AdapterError, AdapterRegistry, ServiceAdapter};
pub use audit::{AuditError, DecisionLog, DecisionRecord};
pub use dispatcher::{InvokeOutcome, MediationConfig, Mediator};
pub use error::MediationError;
