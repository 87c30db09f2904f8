//! # warden-catalog
//!
//! Static operation catalog for the Warden mediation layer.
//!
//! Every operation an agent can request against a workspace account is
//! described by an [`OperationDescriptor`]: which service it targets, which
//! OAuth scopes it needs, how it is classified (allowed / blocked /
//! restricted variant), and what kind of side effect it has. The catalog is
//! compiled once at process start from a fixed table and validated by
//! [`OperationCatalog::builtin`]; it is never mutated at runtime.
//!
//! ## Key invariants
//!
//! - **Blocked means blocked**: operations whose side effect is external
//!   communication (send mail, share a file) are classified `Blocked` in
//!   the table itself. Construction fails if any external-communication
//!   descriptor is not blocked.
//! - **Closed catalog**: restricted variants carry a declarative
//!   [`VariantConstraint`] on the descriptor, not ad hoc checks scattered
//!   through call sites.
//! - **Minimal consent**: [`OperationCatalog::consent_scopes`] unions the
//!   scopes of allowed and enabled-variant operations only — the scopes of
//!   blocked operations are never requested from the authorization server.

pub mod catalog;
pub mod descriptor;
pub mod error;

pub use catalog::OperationCatalog;
pub use descriptor::{
    Classification, OperationDescriptor, ParameterSpec, Service, SideEffect, VariantConstraint,
};
pub use error::CatalogError;
