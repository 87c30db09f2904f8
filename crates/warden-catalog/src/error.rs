// error.rs — Error types for catalog construction.
//
// Every variant here is a programmer/configuration error: the catalog table
// shipped in the binary is wrong. These are fatal at startup by design —
// a process with an invalid capability table must not serve requests.

use thiserror::Error;

/// Errors raised by the catalog's startup self-checks.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Two descriptors share the same operation name.
    #[error("duplicate operation name '{name}' in catalog table")]
    DuplicateOperation { name: String },

    /// An external-communication operation is not classified Blocked.
    #[error("operation '{name}' has external-communication side effect but is not blocked")]
    UnblockedExternalCommunication { name: String },

    /// A non-read-only, non-blocked operation declares no required scopes.
    #[error("operation '{name}' touches user data but declares no required scopes")]
    MissingScopes { name: String },

    /// A restricted-variant operation has no declarative constraint.
    #[error("restricted-variant operation '{name}' declares no constraint")]
    MissingConstraint { name: String },

    /// A constraint is attached to an operation that is not a restricted variant.
    #[error("operation '{name}' carries a constraint but is not a restricted variant")]
    UnexpectedConstraint { name: String },
}
