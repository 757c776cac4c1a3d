//! Extraction result types.

use serde::{Deserialize, Serialize};

/// Signing facts reported by one archive build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningSettings {
    /// Development team identifier, if the build reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_identifier: Option<String>,

    /// Name of the identity the build signed with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_identity_name: Option<String>,

    /// Profiles per target, in the order the build reported them.
    pub per_target_profiles: Vec<TargetProfileRef>,
}

/// A provisioning profile a target was signed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProfileRef {
    /// Target the profile was embedded into.
    pub target_name: String,

    /// Profile uuid when the build printed one, otherwise the profile name.
    pub profile_identifier: String,

    /// Profile display name as printed by the build.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
}

impl TargetProfileRef {
    pub fn new(target_name: impl Into<String>, profile_identifier: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            profile_identifier: profile_identifier.into(),
            profile_name: None,
        }
    }
}

/// Why a transcript produced no settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// The build itself failed; its output is not trusted for signing facts.
    #[error("build did not succeed, no code signing settings extracted")]
    BuildFailed,

    /// The build succeeded but printed nothing signing related.
    #[error("no code signing settings found in build output")]
    NoSigningSettingsFound,
}
