//! Local provisioning profile index.
//!
//! Decodes every candidate file a [`ProfileSource`] yields. Unreadable or
//! undecodable files, unusable uuids and duplicate uuids are skipped with a
//! recorded warning; the scan itself only fails when the source directory
//! cannot be enumerated. Source files are only ever read.

mod decode;
mod source;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use decode::{
    decode_profile, decode_profile_bytes, DecodeError, ProfileFormat,
    ProvisioningProfileDescriptor,
};
pub use source::{
    default_profiles_dir, Candidates, DirectoryProfileSource, ProfileSource, ProfileSourceError,
    PROFILES_SUBDIR,
};

/// A profile file that was left out of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDecodeWarning {
    pub path: PathBuf,
    #[serde(flatten)]
    pub kind: ProfileWarningKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileWarningKind {
    /// The directory entry could not be read.
    Unreadable { message: String },
    /// The file could not be decoded.
    Decode { message: String },
    /// The uuid cannot be used in an export file name.
    InvalidUuid { uuid: String },
    /// An earlier file already claimed this uuid.
    DuplicateUuid { uuid: String, first_path: PathBuf },
}

impl std::fmt::Display for ProfileDecodeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ProfileWarningKind::Unreadable { message } | ProfileWarningKind::Decode { message } => {
                write!(f, "{}: {}", self.path.display(), message)
            }
            ProfileWarningKind::InvalidUuid { uuid } => {
                write!(f, "{}: unusable uuid {:?}", self.path.display(), uuid)
            }
            ProfileWarningKind::DuplicateUuid { uuid, first_path } => write!(
                f,
                "{}: uuid {} already provided by {}",
                self.path.display(),
                uuid,
                first_path.display()
            ),
        }
    }
}

/// Profile uuids become part of export file names: `[A-Za-z0-9-]+` only.
fn is_valid_uuid(uuid: &str) -> bool {
    !uuid.is_empty() && uuid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Descriptors in first-discovered order, unique by uuid.
#[derive(Debug, Clone, Default)]
pub struct ProfileIndex {
    descriptors: Vec<ProvisioningProfileDescriptor>,
    warnings: Vec<ProfileDecodeWarning>,
}

impl ProfileIndex {
    /// Enumerate and decode every profile `source` provides.
    pub fn scan(source: &dyn ProfileSource) -> Result<Self, ProfileSourceError> {
        let candidates = source.candidates()?;
        let mut index = Self::from_paths(candidates.paths);
        let mut warnings = candidates.skipped;
        warnings.append(&mut index.warnings);
        index.warnings = warnings;
        Ok(index)
    }

    /// Decode the given paths in order.
    pub fn from_paths<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut index = Self::default();
        for path in paths {
            match decode_profile(&path) {
                Ok(descriptor) => index.insert(descriptor),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping undecodable profile");
                    index.warnings.push(ProfileDecodeWarning {
                        path,
                        kind: ProfileWarningKind::Decode {
                            message: e.to_string(),
                        },
                    });
                }
            }
        }
        tracing::debug!(
            profiles = index.descriptors.len(),
            warnings = index.warnings.len(),
            "profile index built"
        );
        index
    }

    /// Add a descriptor unless its uuid is unusable or already indexed
    /// (first wins).
    pub fn insert(&mut self, descriptor: ProvisioningProfileDescriptor) {
        if !is_valid_uuid(&descriptor.uuid) {
            tracing::warn!(
                uuid = %descriptor.uuid,
                path = %descriptor.file_path.display(),
                "skipping profile with unusable uuid"
            );
            self.warnings.push(ProfileDecodeWarning {
                path: descriptor.file_path,
                kind: ProfileWarningKind::InvalidUuid {
                    uuid: descriptor.uuid,
                },
            });
            return;
        }
        if let Some(first) = self.get(&descriptor.uuid) {
            tracing::warn!(
                uuid = %descriptor.uuid,
                path = %descriptor.file_path.display(),
                first = %first.file_path.display(),
                "skipping profile with duplicate uuid"
            );
            let warning = ProfileDecodeWarning {
                path: descriptor.file_path,
                kind: ProfileWarningKind::DuplicateUuid {
                    uuid: descriptor.uuid,
                    first_path: first.file_path.clone(),
                },
            };
            self.warnings.push(warning);
            return;
        }
        self.descriptors.push(descriptor);
    }

    pub fn get(&self, uuid: &str) -> Option<&ProvisioningProfileDescriptor> {
        self.descriptors.iter().find(|d| d.uuid == uuid)
    }

    pub fn descriptors(&self) -> &[ProvisioningProfileDescriptor] {
        &self.descriptors
    }

    pub fn warnings(&self) -> &[ProfileDecodeWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn into_parts(self) -> (Vec<ProvisioningProfileDescriptor>, Vec<ProfileDecodeWarning>) {
        (self.descriptors, self.warnings)
    }
}
