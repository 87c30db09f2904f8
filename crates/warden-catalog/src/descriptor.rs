// descriptor.rs — Operation descriptor data model.
//
// An OperationDescriptor is the unit of the capability table: one invocable
// operation, its target service, the OAuth scopes it requires, its risk
// classification, and its side-effect class. Descriptors are `'static` data
// compiled into the binary — changing what an agent can do requires a code
// change and a redeploy, which is the point.

use serde::{Deserialize, Serialize};

/// The downstream workspace service an operation targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Mail,
    Storage,
    Document,
    Spreadsheet,
    Calendar,
    Form,
    Presentation,
}

impl Service {
    /// Stable lowercase name, used in log fields and adapter registry keys.
    pub fn name(&self) -> &'static str {
        match self {
            Service::Mail => "mail",
            Service::Storage => "storage",
            Service::Document => "document",
            Service::Spreadsheet => "spreadsheet",
            Service::Calendar => "calendar",
            Service::Form => "form",
            Service::Presentation => "presentation",
        }
    }
}

/// Risk classification of an operation.
///
/// This is decided in the catalog table, once, at build time. `Blocked` can
/// never be lifted by a policy profile — only by editing the table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Invocable whenever the credential carries the required scopes.
    Allowed,
    /// Never invocable, regardless of profile or scopes.
    Blocked,
    /// Invocable only when the active profile enables it, and only in the
    /// constrained form described by the descriptor's [`VariantConstraint`].
    RestrictedVariant,
}

/// What an operation does to the account it runs against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Reads data, changes nothing. The only class eligible for retry.
    ReadOnly,
    /// Creates new data inside the account boundary (draft, file, event).
    CreatesData,
    /// Mutates existing data inside the account boundary.
    MutatesData,
    /// Deletes data inside the account boundary.
    DeletesData,
    /// Causes data to leave the account boundary (send, share, forward).
    /// Descriptors with this side effect must be `Blocked`.
    ExternalCommunication,
}

/// One parameter an operation accepts.
///
/// The dispatcher validates every request against this schema before any
/// other processing: unknown parameters and missing required parameters are
/// rejected outright, never silently dropped or coerced.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub required: bool,
}

impl ParameterSpec {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
        }
    }
}

/// Declarative structural constraint for a restricted-variant operation.
///
/// Lists the parameter names that must not appear in a request. Keeping the
/// constraint on the descriptor (rather than as code in the engine) keeps
/// the catalog closed and auditable: the full reachable surface is readable
/// from the table alone.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct VariantConstraint {
    pub forbidden_parameters: &'static [&'static str],
}

/// A single entry in the operation catalog.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Unique operation name (e.g., "calendar.create_event").
    pub name: &'static str,
    /// The downstream service this operation targets.
    pub service: Service,
    /// OAuth scopes a credential must carry to invoke this operation.
    pub required_scopes: &'static [&'static str],
    /// Allowed, Blocked, or RestrictedVariant.
    pub classification: Classification,
    /// What the operation does to the account.
    pub side_effect: SideEffect,
    /// Parameter schema, enforced by the dispatcher.
    pub parameters: &'static [ParameterSpec],
    /// Structural constraint — present iff classification is RestrictedVariant.
    pub constraint: Option<VariantConstraint>,
}

impl OperationDescriptor {
    /// Whether this operation may be retried after a transient downstream
    /// failure. Only reads are safe to retry — retrying a create or delete
    /// risks duplicating the side effect.
    pub fn retryable(&self) -> bool {
        self.side_effect == SideEffect::ReadOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names_are_stable() {
        assert_eq!(Service::Mail.name(), "mail");
        assert_eq!(Service::Presentation.name(), "presentation");
    }

    #[test]
    fn only_read_only_is_retryable() {
        let mut descriptor = OperationDescriptor {
            name: "test.op",
            service: Service::Storage,
            required_scopes: &["drive.readonly"],
            classification: Classification::Allowed,
            side_effect: SideEffect::ReadOnly,
            parameters: &[],
            constraint: None,
        };
        assert!(descriptor.retryable());

        descriptor.side_effect = SideEffect::CreatesData;
        assert!(!descriptor.retryable());
        descriptor.side_effect = SideEffect::DeletesData;
        assert!(!descriptor.retryable());
    }

    #[test]
    fn classification_serializes_snake_case() {
        let json = serde_json::to_string(&Classification::RestrictedVariant).unwrap();
        assert_eq!(json, "\"restricted_variant\"");
        let json = serde_json::to_string(&SideEffect::ExternalCommunication).unwrap();
        assert_eq!(json, "\"external_communication\"");
    }
}
