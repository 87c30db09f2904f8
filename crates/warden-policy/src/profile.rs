// profile.rs — Policy profile: which restricted variants are enabled, and
// any extra structural constraints the deployment layers on top.
//
// Exactly one profile is active per running process, chosen at startup and
// immutable afterwards. Profiles can only narrow what the catalog permits:
// they enable restricted variants and add forbidden parameters; they can
// never lift a catalog-level block or remove a catalog-level constraint.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use warden_catalog::{Classification, OperationCatalog};

/// Errors raised while loading or validating a profile. All fatal at
/// startup — a process with a malformed profile must not serve requests.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile file '{path}': {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse profile: {0}")]
    ParseFailed(#[from] serde_yaml::Error),

    /// `enabled_variants` names an operation absent from the catalog.
    #[error("profile '{profile}' enables unknown operation '{operation}'")]
    UnknownVariant { profile: String, operation: String },

    /// `enabled_variants` names an operation that is not a restricted variant.
    #[error("profile '{profile}' enables '{operation}', which is not a restricted variant")]
    NotAVariant { profile: String, operation: String },

    /// `forbidden_parameters` keys an operation absent from the catalog.
    #[error("profile '{profile}' constrains unknown operation '{operation}'")]
    UnknownConstraintTarget { profile: String, operation: String },
}

/// A named policy profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyProfile {
    /// Profile name, used in logs and deny details.
    pub name: String,

    /// Restricted-variant operations this profile enables.
    #[serde(default)]
    pub enabled_variants: BTreeSet<String>,

    /// Extra forbidden parameters per operation, unioned with (never
    /// replacing) the catalog-level constraint.
    #[serde(default)]
    pub forbidden_parameters: BTreeMap<String, BTreeSet<String>>,
}

impl PolicyProfile {
    /// The standard profile: calendar event creation enabled in its
    /// constrained (no-attendee) form, nothing else.
    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            enabled_variants: ["calendar.create_event".to_string()].into(),
            forbidden_parameters: BTreeMap::new(),
        }
    }

    /// The most restrictive profile: no restricted variants at all.
    pub fn locked_down() -> Self {
        Self {
            name: "locked_down".to_string(),
            enabled_variants: BTreeSet::new(),
            forbidden_parameters: BTreeMap::new(),
        }
    }

    /// Parse a profile from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, ProfileError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a profile from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ProfileError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let profile = Self::from_yaml(&text)?;
        info!(profile = %profile.name, path = %path.display(), "loaded policy profile");
        Ok(profile)
    }

    /// Validate this profile against the catalog. Run once at startup.
    ///
    /// Note this is a configuration sanity check, not the enforcement
    /// mechanism: the engine denies blocked operations before consulting
    /// the profile, so even an unvalidated profile cannot widen access.
    pub fn validate(&self, catalog: &OperationCatalog) -> Result<(), ProfileError> {
        for operation in &self.enabled_variants {
            match catalog.lookup(operation) {
                None => {
                    return Err(ProfileError::UnknownVariant {
                        profile: self.name.clone(),
                        operation: operation.clone(),
                    })
                }
                Some(descriptor) if descriptor.classification != Classification::RestrictedVariant => {
                    return Err(ProfileError::NotAVariant {
                        profile: self.name.clone(),
                        operation: operation.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        for operation in self.forbidden_parameters.keys() {
            if catalog.lookup(operation).is_none() {
                return Err(ProfileError::UnknownConstraintTarget {
                    profile: self.name.clone(),
                    operation: operation.clone(),
                });
            }
        }
        Ok(())
    }

    /// Whether this profile enables the named restricted variant.
    pub fn enables(&self, operation: &str) -> bool {
        self.enabled_variants.contains(operation)
    }

    /// Profile-level forbidden parameters for an operation, if any.
    pub fn extra_forbidden(&self, operation: &str) -> Option<&BTreeSet<String>> {
        self.forbidden_parameters.get(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_profile_validates_against_builtin_catalog() {
        let catalog = OperationCatalog::builtin().unwrap();
        PolicyProfile::standard().validate(&catalog).unwrap();
        PolicyProfile::locked_down().validate(&catalog).unwrap();
    }

    #[test]
    fn yaml_round_trip() {
        let yaml = "
name: pilot
enabled_variants:
  - calendar.create_event
forbidden_parameters:
  calendar.create_event:
    - location
";
        let profile = PolicyProfile::from_yaml(yaml).unwrap();
        assert_eq!(profile.name, "pilot");
        assert!(profile.enables("calendar.create_event"));
        assert!(profile
            .extra_forbidden("calendar.create_event")
            .unwrap()
            .contains("location"));
    }

    #[test]
    fn yaml_file_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.yaml");
        std::fs::write(&path, "name: from-file\n").unwrap();

        let profile = PolicyProfile::from_yaml_file(&path).unwrap();
        assert_eq!(profile.name, "from-file");
        assert!(profile.enabled_variants.is_empty());
    }

    #[test]
    fn unknown_variant_rejected() {
        let catalog = OperationCatalog::builtin().unwrap();
        let mut profile = PolicyProfile::locked_down();
        profile
            .enabled_variants
            .insert("calendar.no_such_op".to_string());

        match profile.validate(&catalog) {
            Err(ProfileError::UnknownVariant { operation, .. }) => {
                assert_eq!(operation, "calendar.no_such_op")
            }
            other => panic!("expected UnknownVariant, got {:?}", other.err()),
        }
    }

    #[test]
    fn enabling_non_variant_rejected() {
        let catalog = OperationCatalog::builtin().unwrap();
        let mut profile = PolicyProfile::locked_down();
        // mail.send_message exists but is Blocked, not a restricted variant.
        profile
            .enabled_variants
            .insert("mail.send_message".to_string());

        match profile.validate(&catalog) {
            Err(ProfileError::NotAVariant { operation, .. }) => {
                assert_eq!(operation, "mail.send_message")
            }
            other => panic!("expected NotAVariant, got {:?}", other.err()),
        }
    }

    #[test]
    fn unknown_constraint_target_rejected() {
        let catalog = OperationCatalog::builtin().unwrap();
        let mut profile = PolicyProfile::standard();
        profile
            .forbidden_parameters
            .insert("ghost.op".to_string(), BTreeSet::new());

        match profile.validate(&catalog) {
            Err(ProfileError::UnknownConstraintTarget { operation, .. }) => {
                assert_eq!(operation, "ghost.op")
            }
            other => panic!("expected UnknownConstraintTarget, got {:?}", other.err()),
        }
    }
}
