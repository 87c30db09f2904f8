// catalog.rs — The operation catalog: builtin table + startup self-checks.
//
// The table below is the single authoritative statement of what an agent
// can reach through Warden. Exfiltration-shaped operations (send mail,
// forward mail, share a file) are present in the table and Blocked — they
// exist so that a request for them produces an explicit BlockedByPolicy
// denial rather than an UnknownOperation, and so the self-checks can prove
// that every external-communication operation is blocked.
//
// Scope names are the short forms recognized by the authorization server
// (e.g., "mail.readonly", "drive", "calendar.events").

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::descriptor::{
    Classification, OperationDescriptor, ParameterSpec, Service, SideEffect, VariantConstraint,
};
use crate::error::CatalogError;

use Classification::{Allowed, Blocked, RestrictedVariant};
use ParameterSpec as P;
use SideEffect::{CreatesData, DeletesData, ExternalCommunication, MutatesData, ReadOnly};

/// The builtin operation table. Compiled into the binary; changing an
/// agent's reachable surface requires editing this table and redeploying.
pub const BUILTIN_OPERATIONS: &[OperationDescriptor] = &[
    // ── Mail ────────────────────────────────────────────────────────
    OperationDescriptor {
        name: "mail.list_messages",
        service: Service::Mail,
        required_scopes: &["mail.readonly"],
        classification: Allowed,
        side_effect: ReadOnly,
        parameters: &[P::optional("query"), P::optional("max_results")],
        constraint: None,
    },
    OperationDescriptor {
        name: "mail.get_message",
        service: Service::Mail,
        required_scopes: &["mail.readonly"],
        classification: Allowed,
        side_effect: ReadOnly,
        parameters: &[P::required("message_id")],
        constraint: None,
    },
    OperationDescriptor {
        // Drafts never leave the account until a human sends them.
        name: "mail.create_draft",
        service: Service::Mail,
        required_scopes: &["mail.compose"],
        classification: Allowed,
        side_effect: CreatesData,
        parameters: &[
            P::required("subject"),
            P::required("body"),
            P::optional("to"),
        ],
        constraint: None,
    },
    OperationDescriptor {
        name: "mail.send_message",
        service: Service::Mail,
        required_scopes: &["mail.send"],
        classification: Blocked,
        side_effect: ExternalCommunication,
        parameters: &[P::required("to"), P::required("subject"), P::required("body")],
        constraint: None,
    },
    OperationDescriptor {
        name: "mail.forward_message",
        service: Service::Mail,
        required_scopes: &["mail.send"],
        classification: Blocked,
        side_effect: ExternalCommunication,
        parameters: &[P::required("message_id"), P::required("to")],
        constraint: None,
    },
    // ── Storage (drive) ─────────────────────────────────────────────
    OperationDescriptor {
        name: "drive.list_files",
        service: Service::Storage,
        required_scopes: &["drive.readonly"],
        classification: Allowed,
        side_effect: ReadOnly,
        parameters: &[P::optional("query"), P::optional("folder_id")],
        constraint: None,
    },
    OperationDescriptor {
        name: "drive.get_file",
        service: Service::Storage,
        required_scopes: &["drive.readonly"],
        classification: Allowed,
        side_effect: ReadOnly,
        parameters: &[P::required("file_id")],
        constraint: None,
    },
    OperationDescriptor {
        name: "drive.upload_file",
        service: Service::Storage,
        required_scopes: &["drive"],
        classification: Allowed,
        side_effect: CreatesData,
        parameters: &[
            P::required("name"),
            P::required("content"),
            P::optional("folder_id"),
        ],
        constraint: None,
    },
    OperationDescriptor {
        name: "drive.move_file",
        service: Service::Storage,
        required_scopes: &["drive"],
        classification: Allowed,
        side_effect: MutatesData,
        parameters: &[P::required("file_id"), P::required("folder_id")],
        constraint: None,
    },
    OperationDescriptor {
        // Trash, not permanent delete — recoverable from the account UI.
        name: "drive.trash_file",
        service: Service::Storage,
        required_scopes: &["drive"],
        classification: Allowed,
        side_effect: DeletesData,
        parameters: &[P::required("file_id")],
        constraint: None,
    },
    OperationDescriptor {
        name: "drive.share_file",
        service: Service::Storage,
        required_scopes: &["drive"],
        classification: Blocked,
        side_effect: ExternalCommunication,
        parameters: &[P::required("file_id"), P::required("email")],
        constraint: None,
    },
    // ── Documents ───────────────────────────────────────────────────
    OperationDescriptor {
        name: "docs.get_document",
        service: Service::Document,
        required_scopes: &["docs.readonly"],
        classification: Allowed,
        side_effect: ReadOnly,
        parameters: &[P::required("document_id")],
        constraint: None,
    },
    OperationDescriptor {
        name: "docs.create_document",
        service: Service::Document,
        required_scopes: &["docs"],
        classification: Allowed,
        side_effect: CreatesData,
        parameters: &[P::required("title"), P::optional("body")],
        constraint: None,
    },
    OperationDescriptor {
        name: "docs.append_text",
        service: Service::Document,
        required_scopes: &["docs"],
        classification: Allowed,
        side_effect: MutatesData,
        parameters: &[P::required("document_id"), P::required("text")],
        constraint: None,
    },
    // ── Spreadsheets ────────────────────────────────────────────────
    OperationDescriptor {
        name: "sheets.get_values",
        service: Service::Spreadsheet,
        required_scopes: &["sheets.readonly"],
        classification: Allowed,
        side_effect: ReadOnly,
        parameters: &[P::required("spreadsheet_id"), P::required("range")],
        constraint: None,
    },
    OperationDescriptor {
        name: "sheets.update_values",
        service: Service::Spreadsheet,
        required_scopes: &["sheets"],
        classification: Allowed,
        side_effect: MutatesData,
        parameters: &[
            P::required("spreadsheet_id"),
            P::required("range"),
            P::required("values"),
        ],
        constraint: None,
    },
    OperationDescriptor {
        name: "sheets.create_spreadsheet",
        service: Service::Spreadsheet,
        required_scopes: &["sheets"],
        classification: Allowed,
        side_effect: CreatesData,
        parameters: &[P::required("title")],
        constraint: None,
    },
    // ── Calendar ────────────────────────────────────────────────────
    OperationDescriptor {
        name: "calendar.list_events",
        service: Service::Calendar,
        required_scopes: &["calendar.readonly"],
        classification: Allowed,
        side_effect: ReadOnly,
        parameters: &[P::optional("time_min"), P::optional("time_max")],
        constraint: None,
    },
    OperationDescriptor {
        // Restricted variant: creating an event is fine, but attendees and
        // "send updates" turn event creation into outbound email.
        name: "calendar.create_event",
        service: Service::Calendar,
        required_scopes: &["calendar.events"],
        classification: RestrictedVariant,
        side_effect: CreatesData,
        parameters: &[
            P::required("summary"),
            P::required("start"),
            P::required("end"),
            P::optional("description"),
            P::optional("location"),
            P::optional("attendees"),
            P::optional("send_updates"),
        ],
        constraint: Some(VariantConstraint {
            forbidden_parameters: &["attendees", "send_updates"],
        }),
    },
    OperationDescriptor {
        name: "calendar.delete_event",
        service: Service::Calendar,
        required_scopes: &["calendar.events"],
        classification: Allowed,
        side_effect: DeletesData,
        parameters: &[P::required("event_id")],
        constraint: None,
    },
    // ── Forms ───────────────────────────────────────────────────────
    OperationDescriptor {
        name: "forms.get_form",
        service: Service::Form,
        required_scopes: &["forms.readonly"],
        classification: Allowed,
        side_effect: ReadOnly,
        parameters: &[P::required("form_id")],
        constraint: None,
    },
    OperationDescriptor {
        name: "forms.create_form",
        service: Service::Form,
        required_scopes: &["forms"],
        classification: Allowed,
        side_effect: CreatesData,
        parameters: &[P::required("title")],
        constraint: None,
    },
    OperationDescriptor {
        name: "forms.list_responses",
        service: Service::Form,
        required_scopes: &["forms.responses.readonly"],
        classification: Allowed,
        side_effect: ReadOnly,
        parameters: &[P::required("form_id")],
        constraint: None,
    },
    // ── Presentations ───────────────────────────────────────────────
    OperationDescriptor {
        name: "slides.get_presentation",
        service: Service::Presentation,
        required_scopes: &["slides.readonly"],
        classification: Allowed,
        side_effect: ReadOnly,
        parameters: &[P::required("presentation_id")],
        constraint: None,
    },
    OperationDescriptor {
        name: "slides.create_presentation",
        service: Service::Presentation,
        required_scopes: &["slides"],
        classification: Allowed,
        side_effect: CreatesData,
        parameters: &[P::required("title")],
        constraint: None,
    },
    OperationDescriptor {
        name: "slides.add_slide",
        service: Service::Presentation,
        required_scopes: &["slides"],
        classification: Allowed,
        side_effect: MutatesData,
        parameters: &[P::required("presentation_id"), P::optional("layout")],
        constraint: None,
    },
];

/// The validated operation catalog.
///
/// Built exactly once at process start. Lookup is by operation name; the
/// returned descriptors are `'static` and shared by reference everywhere.
pub struct OperationCatalog {
    by_name: HashMap<&'static str, &'static OperationDescriptor>,
}

impl OperationCatalog {
    /// Build the catalog from the builtin table, running all self-checks.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_table(BUILTIN_OPERATIONS)
    }

    /// Build a catalog from an arbitrary `'static` table (tests use this to
    /// exercise the self-checks with deliberately broken tables).
    pub fn from_table(table: &'static [OperationDescriptor]) -> Result<Self, CatalogError> {
        let mut by_name: HashMap<&'static str, &'static OperationDescriptor> =
            HashMap::with_capacity(table.len());

        for descriptor in table {
            if by_name.insert(descriptor.name, descriptor).is_some() {
                return Err(CatalogError::DuplicateOperation {
                    name: descriptor.name.to_string(),
                });
            }
            Self::check_descriptor(descriptor)?;
        }

        debug!(operations = by_name.len(), "operation catalog validated");
        Ok(Self { by_name })
    }

    /// Per-descriptor self-checks. These run at startup, never per call.
    fn check_descriptor(descriptor: &OperationDescriptor) -> Result<(), CatalogError> {
        // Any operation that moves data out of the account must be blocked.
        // There is deliberately no whitelist mechanism for this.
        if descriptor.side_effect == SideEffect::ExternalCommunication
            && descriptor.classification != Classification::Blocked
        {
            return Err(CatalogError::UnblockedExternalCommunication {
                name: descriptor.name.to_string(),
            });
        }

        // Every non-read-only reachable operation needs at least one scope.
        // (Blocked operations are exempt — they are never invoked.)
        if descriptor.side_effect != SideEffect::ReadOnly
            && descriptor.classification != Classification::Blocked
            && descriptor.required_scopes.is_empty()
        {
            return Err(CatalogError::MissingScopes {
                name: descriptor.name.to_string(),
            });
        }

        match (descriptor.classification, descriptor.constraint) {
            (Classification::RestrictedVariant, None) => Err(CatalogError::MissingConstraint {
                name: descriptor.name.to_string(),
            }),
            (Classification::Allowed | Classification::Blocked, Some(_)) => {
                Err(CatalogError::UnexpectedConstraint {
                    name: descriptor.name.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Look up a descriptor by operation name.
    pub fn lookup(&self, operation: &str) -> Option<&'static OperationDescriptor> {
        self.by_name.get(operation).copied()
    }

    /// Iterate over every descriptor in the catalog.
    pub fn descriptors(&self) -> impl Iterator<Item = &'static OperationDescriptor> + '_ {
        self.by_name.values().copied()
    }

    /// Number of operations in the catalog.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Union of scopes required by Allowed operations plus the restricted
    /// variants named in `enabled_variants`.
    ///
    /// This is the scope set requested up front at authorization time, so
    /// one consent prompt covers every reachable operation. Blocked
    /// operations never contribute: the issued token cannot carry, say, the
    /// mail-send scope even if the host is compromised.
    pub fn consent_scopes(&self, enabled_variants: &BTreeSet<String>) -> BTreeSet<String> {
        let mut scopes = BTreeSet::new();
        for descriptor in self.by_name.values() {
            let reachable = match descriptor.classification {
                Classification::Allowed => true,
                Classification::Blocked => false,
                Classification::RestrictedVariant => enabled_variants.contains(descriptor.name),
            };
            if reachable {
                scopes.extend(descriptor.required_scopes.iter().map(|s| s.to_string()));
            }
        }
        scopes
    }
}
