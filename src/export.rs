//! Export of resolved profiles and the build transcript.
//!
//! Destination names are `<uuid>.<sanitized name><extension>`. Since the
//! export set is unique by uuid, names never collide within one run; a
//! collision is still refused rather than overwriting.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::profiles::{ProfileFormat, ProvisioningProfileDescriptor};
use crate::resolve::ResolvedExportSet;

/// Fixed transcript file name; downstream tooling looks for it.
pub const TRANSCRIPT_FILE_NAME: &str = "xcodebuild-output.log";

/// Keep only `[A-Za-z0-9_.-]`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect()
}

/// Destination file name for a descriptor.
///
/// The extension follows the source file's own suffix.
pub fn export_file_name(descriptor: &ProvisioningProfileDescriptor) -> String {
    let extension = ProfileFormat::from_path(&descriptor.file_path).extension();
    format!(
        "{}.{}{}",
        descriptor.uuid,
        sanitize_name(&descriptor.name),
        extension
    )
}

/// A file that was exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedFile {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    /// Human name of what was exported (the profile display name)
    pub logical_name: String,
    /// SHA-256 of the exported bytes
    pub sha256: String,
}

/// One export that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("failed to export {logical_name} ({source_path} -> {destination_path}): {message}")]
pub struct ExportCopyError {
    pub logical_name: String,
    pub source_path: String,
    pub destination_path: String,
    pub message: String,
}

/// Outcome of exporting an entire set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    pub exported: Vec<ExportedFile>,
    pub errors: Vec<ExportCopyError>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Writes export artifacts into one destination directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    destination: PathBuf,
}

impl Exporter {
    /// The directory must already exist.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Persist the raw build transcript as `xcodebuild-output.log`.
    pub fn write_transcript(&self, text: &str) -> io::Result<PathBuf> {
        let path = self.destination.join(TRANSCRIPT_FILE_NAME);
        fs::write(&path, text)?;
        tracing::info!(path = %path.display(), "saved xcodebuild output");
        Ok(path)
    }

    /// Copy every profile in `set`; failures are collected per file and
    /// do not stop the remaining copies.
    pub fn export_profiles(&self, set: &ResolvedExportSet) -> ExportReport {
        let mut report = ExportReport::default();
        let mut used_names: HashSet<String> = HashSet::new();

        for descriptor in &set.profiles {
            let file_name = export_file_name(descriptor);
            let destination = self.destination.join(&file_name);

            if !used_names.insert(file_name) {
                report.errors.push(copy_error(
                    descriptor,
                    &destination,
                    "destination name already used in this export".to_string(),
                ));
                continue;
            }

            tracing::info!(
                name = %descriptor.name,
                uuid = %descriptor.uuid,
                "exporting provisioning profile"
            );
            match copy_profile(&descriptor.file_path, &destination) {
                Ok(sha256) => report.exported.push(ExportedFile {
                    source_path: descriptor.file_path.clone(),
                    destination_path: destination,
                    logical_name: descriptor.name.clone(),
                    sha256,
                }),
                Err(e) => {
                    let error = copy_error(descriptor, &destination, e.to_string());
                    tracing::warn!("{}", error);
                    report.errors.push(error);
                }
            }
        }

        report
    }
}

fn copy_error(
    descriptor: &ProvisioningProfileDescriptor,
    destination: &Path,
    message: String,
) -> ExportCopyError {
    ExportCopyError {
        logical_name: descriptor.name.clone(),
        source_path: descriptor.file_path.display().to_string(),
        destination_path: destination.display().to_string(),
        message,
    }
}

/// Byte-for-byte copy; returns the SHA-256 of the copied content.
fn copy_profile(source: &Path, destination: &Path) -> io::Result<String> {
    let bytes = fs::read(source)?;
    fs::write(destination, &bytes)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
