// engine.rs — The pure decision engine.
//
// Every operation request flows through `evaluate()`, which checks in order:
//
// 1. Is the operation in the catalog? → No → Deny(UnknownOperation)
// 2. Is it classified Blocked? → Yes → Deny(BlockedByPolicy), unconditionally
// 3. Restricted variant: does the profile enable it, and does the request
//    avoid every forbidden parameter? → No → Deny(ConstraintViolation)
// 4. Does the credential cover the required scopes? → No → RequireElevation
// 5. Otherwise → Permit
//
// Evaluation is deterministic: no clock, no I/O, no interior state. Token
// expiry is deliberately not checked here — that is the session manager's
// concern, with its own time source.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_catalog::{Classification, OperationCatalog, OperationDescriptor};

use crate::profile::PolicyProfile;
use crate::request::OperationRequest;

/// Why a request was denied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    /// The operation is not in the catalog.
    UnknownOperation { operation: String },
    /// The operation is blocked at the catalog level. Not configurable.
    BlockedByPolicy { operation: String },
    /// A restricted variant was requested outside its permitted form.
    ConstraintViolation { operation: String, detail: String },
}

/// The outcome of a policy evaluation.
///
/// Deny and elevation are expected outcomes, returned as values — the
/// engine has no error path at all.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// The operation may proceed.
    Permit { operation: String },
    /// The operation must not proceed.
    Deny { reason: DenyReason },
    /// The credential lacks scopes; re-authorization with exactly these
    /// missing scopes would make the request permissible.
    RequireElevation { missing_scopes: BTreeSet<String> },
}

/// The policy engine: catalog reference plus the one active profile.
/// Immutable after construction.
pub struct PolicyEngine {
    catalog: Arc<OperationCatalog>,
    profile: PolicyProfile,
}

impl PolicyEngine {
    pub fn new(catalog: Arc<OperationCatalog>, profile: PolicyProfile) -> Self {
        Self { catalog, profile }
    }

    /// The active profile.
    pub fn profile(&self) -> &PolicyProfile {
        &self.profile
    }

    /// The catalog this engine evaluates against.
    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    /// Evaluate a request against the active profile and a credential's
    /// granted scopes.
    ///
    /// Pure: identical inputs yield identical decisions. Deny reasons never
    /// depend on `granted_scopes`, so callers may pre-screen with an empty
    /// set before acquiring a credential at all.
    pub fn evaluate(
        &self,
        request: &OperationRequest,
        granted_scopes: &BTreeSet<String>,
    ) -> Decision {
        let descriptor = match self.catalog.lookup(&request.operation) {
            Some(d) => d,
            None => {
                return Decision::Deny {
                    reason: DenyReason::UnknownOperation {
                        operation: request.operation.clone(),
                    },
                }
            }
        };

        // Catalog-level block. Checked before the profile so no profile
        // configuration can reach past it.
        if descriptor.classification == Classification::Blocked {
            debug!(operation = %request.operation, "denied: blocked at catalog level");
            return Decision::Deny {
                reason: DenyReason::BlockedByPolicy {
                    operation: request.operation.clone(),
                },
            };
        }

        if descriptor.classification == Classification::RestrictedVariant {
            if let Some(violation) = self.check_variant(descriptor, request) {
                debug!(operation = %request.operation, detail = %violation,
                    "denied: variant constraint");
                return Decision::Deny {
                    reason: DenyReason::ConstraintViolation {
                        operation: request.operation.clone(),
                        detail: violation,
                    },
                };
            }
        }

        let missing: BTreeSet<String> = descriptor
            .required_scopes
            .iter()
            .filter(|scope| !granted_scopes.contains(**scope))
            .map(|scope| scope.to_string())
            .collect();
        if !missing.is_empty() {
            return Decision::RequireElevation {
                missing_scopes: missing,
            };
        }

        Decision::Permit {
            operation: request.operation.clone(),
        }
    }

    /// Restricted-variant check: enabled by the profile, and no forbidden
    /// parameter present. Forbidden set = catalog constraint ∪ profile
    /// extras — the profile can only narrow.
    fn check_variant(
        &self,
        descriptor: &OperationDescriptor,
        request: &OperationRequest,
    ) -> Option<String> {
        if !self.profile.enables(descriptor.name) {
            return Some(format!(
                "operation not enabled by profile '{}'",
                self.profile.name
            ));
        }

        if let Some(constraint) = &descriptor.constraint {
            for parameter in constraint.forbidden_parameters {
                if request.parameters.contains_key(*parameter) {
                    return Some(format!("parameter '{}' is not permitted", parameter));
                }
            }
        }
        if let Some(extra) = self.profile.extra_forbidden(descriptor.name) {
            for parameter in extra {
                if request.parameters.contains_key(parameter) {
                    return Some(format!(
                        "parameter '{}' is not permitted by profile '{}'",
                        parameter, self.profile.name
                    ));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn engine(profile: PolicyProfile) -> PolicyEngine {
        PolicyEngine::new(Arc::new(OperationCatalog::builtin().unwrap()), profile)
    }

    fn scopes(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn permit_with_sufficient_scopes() {
        let engine = engine(PolicyProfile::standard());
        let request = OperationRequest::new("mail.list_messages", "alice");
        let decision = engine.evaluate(&request, &scopes(&["mail.readonly"]));
        assert_eq!(
            decision,
            Decision::Permit {
                operation: "mail.list_messages".to_string()
            }
        );
    }

    #[test]
    fn unknown_operation_denied() {
        let engine = engine(PolicyProfile::standard());
        let request = OperationRequest::new("mail.read_minds", "alice");
        match engine.evaluate(&request, &scopes(&["mail.readonly"])) {
            Decision::Deny {
                reason: DenyReason::UnknownOperation { operation },
            } => assert_eq!(operation, "mail.read_minds"),
            other => panic!("expected UnknownOperation deny, got {:?}", other),
        }
    }

    #[test]
    fn blocked_is_denied_for_every_profile_and_scope_set() {
        // No profile or scope combination can flip a catalog-level block.
        // Includes a deliberately hostile, unvalidated profile that "enables"
        // the blocked operation and a credential holding the send scope.
        let mut hostile = PolicyProfile {
            name: "hostile".to_string(),
            enabled_variants: ["mail.send_message".to_string()].into(),
            forbidden_parameters: BTreeMap::new(),
        };
        hostile.enabled_variants.insert("drive.share_file".to_string());

        let profiles = [
            PolicyProfile::standard(),
            PolicyProfile::locked_down(),
            hostile,
        ];
        let scope_sets = [
            scopes(&[]),
            scopes(&["mail.send"]),
            scopes(&["mail.send", "mail.readonly", "drive"]),
        ];

        for profile in profiles {
            let engine = engine(profile);
            for granted in &scope_sets {
                for operation in ["mail.send_message", "mail.forward_message", "drive.share_file"] {
                    let request = OperationRequest::new(operation, "alice");
                    match engine.evaluate(&request, granted) {
                        Decision::Deny {
                            reason: DenyReason::BlockedByPolicy { .. },
                        } => {}
                        other => panic!("{} must be blocked, got {:?}", operation, other),
                    }
                }
            }
        }
    }

    #[test]
    fn restricted_variant_with_forbidden_parameter_denied() {
        // Spec scenario B: create_calendar_event with attendees under a
        // profile that disallows attendees.
        let engine = engine(PolicyProfile::standard());
        let request = OperationRequest::new("calendar.create_event", "alice")
            .with_parameter("summary", json!("standup"))
            .with_parameter("start", json!("2026-09-01T09:00:00Z"))
            .with_parameter("end", json!("2026-09-01T09:15:00Z"))
            .with_parameter("attendees", json!(["bob@example.com"]));

        match engine.evaluate(&request, &scopes(&["calendar.events"])) {
            Decision::Deny {
                reason: DenyReason::ConstraintViolation { detail, .. },
            } => assert!(detail.contains("attendees")),
            other => panic!("expected ConstraintViolation, got {:?}", other),
        }
    }

    #[test]
    fn restricted_variant_without_forbidden_parameters_permitted() {
        let engine = engine(PolicyProfile::standard());
        let request = OperationRequest::new("calendar.create_event", "alice")
            .with_parameter("summary", json!("focus block"))
            .with_parameter("start", json!("2026-09-01T09:00:00Z"))
            .with_parameter("end", json!("2026-09-01T11:00:00Z"));

        match engine.evaluate(&request, &scopes(&["calendar.events"])) {
            Decision::Permit { .. } => {}
            other => panic!("expected Permit, got {:?}", other),
        }
    }

    #[test]
    fn disabled_variant_denied_even_without_forbidden_parameters() {
        let engine = engine(PolicyProfile::locked_down());
        let request = OperationRequest::new("calendar.create_event", "alice")
            .with_parameter("summary", json!("focus block"))
            .with_parameter("start", json!("2026-09-01T09:00:00Z"))
            .with_parameter("end", json!("2026-09-01T11:00:00Z"));

        match engine.evaluate(&request, &scopes(&["calendar.events"])) {
            Decision::Deny {
                reason: DenyReason::ConstraintViolation { detail, .. },
            } => assert!(detail.contains("locked_down")),
            other => panic!("expected ConstraintViolation, got {:?}", other),
        }
    }

    #[test]
    fn profile_extra_forbidden_parameters_are_enforced() {
        let mut profile = PolicyProfile::standard();
        profile.forbidden_parameters.insert(
            "calendar.create_event".to_string(),
            ["location".to_string()].into(),
        );
        let engine = engine(profile);

        let request = OperationRequest::new("calendar.create_event", "alice")
            .with_parameter("summary", json!("offsite"))
            .with_parameter("start", json!("2026-09-02T09:00:00Z"))
            .with_parameter("end", json!("2026-09-02T17:00:00Z"))
            .with_parameter("location", json!("HQ"));

        match engine.evaluate(&request, &scopes(&["calendar.events"])) {
            Decision::Deny {
                reason: DenyReason::ConstraintViolation { detail, .. },
            } => assert!(detail.contains("location")),
            other => panic!("expected ConstraintViolation, got {:?}", other),
        }
    }

    #[test]
    fn missing_scopes_require_elevation() {
        // Spec scenario C: credential has drive.readonly, operation needs
        // drive — elevation names exactly the missing scope.
        let engine = engine(PolicyProfile::standard());
        let request = OperationRequest::new("drive.upload_file", "alice")
            .with_parameter("name", json!("notes.txt"))
            .with_parameter("content", json!("hello"));

        match engine.evaluate(&request, &scopes(&["drive.readonly"])) {
            Decision::RequireElevation { missing_scopes } => {
                assert_eq!(missing_scopes, scopes(&["drive"]));
            }
            other => panic!("expected RequireElevation, got {:?}", other),
        }
    }

    #[test]
    fn evaluation_is_idempotent() {
        let engine = engine(PolicyProfile::standard());
        let request = OperationRequest::new("sheets.get_values", "alice")
            .with_parameter("spreadsheet_id", json!("s-1"))
            .with_parameter("range", json!("A1:B2"));
        let granted = scopes(&["sheets.readonly"]);

        let first = engine.evaluate(&request, &granted);
        let second = engine.evaluate(&request, &granted);
        assert_eq!(first, second);
    }

    #[test]
    fn decision_serialization() {
        // Decisions serialize with a tag, for the decision log.
        let permit = Decision::Permit {
            operation: "mail.get_message".to_string(),
        };
        let json = serde_json::to_string(&permit).unwrap();
        assert!(json.contains("\"decision\":\"permit\""));

        let deny = Decision::Deny {
            reason: DenyReason::BlockedByPolicy {
                operation: "mail.send_message".to_string(),
            },
        };
        let json = serde_json::to_string(&deny).unwrap();
        assert!(json.contains("\"blocked_by_policy\""));
    }
}
