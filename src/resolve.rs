//! Cross-reference extracted signing settings with the local profile index.
//!
//! Matching is exact: a wrong profile exported silently is worse than one
//! reported missing. Unmatched references are part of the result, never an
//! error; whether they block anything is the caller's decision.

use codesign_settings::{SigningSettings, TargetProfileRef};
use serde::{Deserialize, Serialize};

use crate::identity::LocalIdentity;
use crate::profiles::ProvisioningProfileDescriptor;

/// Minimum length for an identifier to be treated as a uuid
const MIN_UUID_LEN: usize = 8;

/// Whether an identifier looks like a profile uuid rather than a name.
///
/// Hex digits and dashes only, at least eight characters, so short names
/// such as `Dev` or `ABC` stay names.
pub fn is_uuid_shaped(identifier: &str) -> bool {
    identifier.len() >= MIN_UUID_LEN
        && identifier.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
        && identifier.chars().any(|c| c.is_ascii_hexdigit())
}

/// Whether `reference` names `descriptor`.
pub fn matches(reference: &TargetProfileRef, descriptor: &ProvisioningProfileDescriptor) -> bool {
    let id = reference.profile_identifier.as_str();
    if id == descriptor.uuid {
        return true;
    }
    !is_uuid_shaped(id) && id == descriptor.name
}

/// How one reference was satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefMatch {
    pub target_name: String,
    pub profile_identifier: String,
    /// Uuids of every descriptor the reference matched
    pub uuids: Vec<String>,
}

impl RefMatch {
    /// A name that matched more than one installed profile
    pub fn is_ambiguous(&self) -> bool {
        self.uuids.len() > 1
    }
}

/// Profiles to export plus the references nothing satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedExportSet {
    /// Matched descriptors, unique by uuid, in first-match order
    pub profiles: Vec<ProvisioningProfileDescriptor>,
    /// References with no matching descriptor, in settings order
    pub unmatched_refs: Vec<TargetProfileRef>,
    /// Per-reference match detail, in settings order
    pub matches: Vec<RefMatch>,
}

impl ResolvedExportSet {
    pub fn has_unmatched(&self) -> bool {
        !self.unmatched_refs.is_empty()
    }
}

/// Resolve every profile reference in `settings` against `descriptors`.
pub fn resolve(
    settings: &SigningSettings,
    descriptors: &[ProvisioningProfileDescriptor],
) -> ResolvedExportSet {
    let mut set = ResolvedExportSet::default();

    for reference in &settings.per_target_profiles {
        let matched: Vec<&ProvisioningProfileDescriptor> = descriptors
            .iter()
            .filter(|d| matches(reference, d))
            .collect();

        if matched.is_empty() {
            tracing::warn!(
                target_name = %reference.target_name,
                profile = %reference.profile_identifier,
                "no installed provisioning profile matches"
            );
            set.unmatched_refs.push(reference.clone());
            continue;
        }

        let mut uuids: Vec<String> = Vec::with_capacity(matched.len());
        for descriptor in matched {
            if !uuids.contains(&descriptor.uuid) {
                uuids.push(descriptor.uuid.clone());
            }
            if !set.profiles.iter().any(|p| p.uuid == descriptor.uuid) {
                set.profiles.push(descriptor.clone());
            }
        }

        let entry = RefMatch {
            target_name: reference.target_name.clone(),
            profile_identifier: reference.profile_identifier.clone(),
            uuids,
        };
        if entry.is_ambiguous() {
            tracing::warn!(
                target_name = %entry.target_name,
                profile = %entry.profile_identifier,
                uuids = %entry.uuids.join(", "),
                "profile name matches several installed profiles, exporting all of them"
            );
        }
        set.matches.push(entry);
    }

    set
}

/// Whether the archive's signing identity is installed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityStatus {
    /// The build did not report an identity
    NotReported,
    /// Installed, exact name match
    Installed { identity: LocalIdentity },
    /// Reported by the build but not installed
    Missing { name: String },
    /// Local identities could not be listed
    Unknown { name: String, reason: String },
}

/// Look up the reported identity among `installed`.
pub fn resolve_identity(
    settings: &SigningSettings,
    installed: Result<&[LocalIdentity], String>,
) -> IdentityStatus {
    let Some(name) = settings.signing_identity_name.as_deref() else {
        return IdentityStatus::NotReported;
    };
    match installed {
        Err(reason) => IdentityStatus::Unknown {
            name: name.to_string(),
            reason,
        },
        Ok(identities) => match identities.iter().find(|i| i.name == name) {
            Some(identity) => IdentityStatus::Installed {
                identity: identity.clone(),
            },
            None => {
                tracing::warn!(identity = %name, "signing identity is not installed");
                IdentityStatus::Missing {
                    name: name.to_string(),
                }
            }
        },
    }
}
