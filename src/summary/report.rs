//! Scan report (codesign-scan-report.json)

use chrono::{DateTime, Utc};
use codesign_settings::{SigningSettings, TargetProfileRef};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::failure::{ExitCode, FailureKind, Status};
use crate::export::{ExportCopyError, ExportReport, ExportedFile};
use crate::profiles::{ProfileDecodeWarning, ProvisioningProfileDescriptor};
use crate::resolve::{IdentityStatus, RefMatch, ResolvedExportSet};

/// Schema version for codesign-scan-report.json
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for codesign-scan-report.json
pub const REPORT_SCHEMA_ID: &str = "codesign-scan/report@1";

/// File name of the report inside the output directory
pub const REPORT_FILE_NAME: &str = "codesign-scan-report.json";

/// Generate a new scan identifier
pub fn generate_scan_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// Everything one scan found and did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Scan identifier
    pub scan_id: String,

    /// When the report was created
    pub created_at: DateTime<Utc>,

    pub project_path: PathBuf,
    pub scheme: String,

    pub status: Status,

    /// Failure kind (when status is not success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,

    /// Stable exit code
    pub exit_code: i32,

    /// Human-readable summary
    pub human_summary: String,

    /// Error message for scans that stopped early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Where the build transcript was written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<SigningSettings>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityStatus>,

    #[serde(default)]
    pub ref_matches: Vec<RefMatch>,

    #[serde(default)]
    pub unmatched_refs: Vec<TargetProfileRef>,

    #[serde(default)]
    pub matched_profiles: Vec<ProvisioningProfileDescriptor>,

    /// Uuids of matched profiles past their expiration date
    #[serde(default)]
    pub expired_profiles: Vec<String>,

    #[serde(default)]
    pub exported: Vec<ExportedFile>,

    #[serde(default)]
    pub copy_errors: Vec<ExportCopyError>,

    /// Local profile files that were skipped while indexing
    #[serde(default)]
    pub profile_warnings: Vec<ProfileDecodeWarning>,
}

impl ScanReport {
    fn base(project_path: &Path, scheme: &str) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            schema_id: REPORT_SCHEMA_ID.to_string(),
            scan_id: generate_scan_id(),
            created_at: Utc::now(),
            project_path: project_path.to_path_buf(),
            scheme: scheme.to_string(),
            status: Status::Success,
            failure_kind: None,
            exit_code: ExitCode::Success.as_i32(),
            human_summary: String::new(),
            error: None,
            transcript_path: None,
            settings: None,
            identity: None,
            ref_matches: Vec::new(),
            unmatched_refs: Vec::new(),
            matched_profiles: Vec::new(),
            expired_profiles: Vec::new(),
            exported: Vec::new(),
            copy_errors: Vec::new(),
            profile_warnings: Vec::new(),
        }
    }

    /// Report for a scan that stopped before export.
    pub fn failure(
        project_path: &Path,
        scheme: &str,
        kind: FailureKind,
        error: String,
        transcript_path: Option<PathBuf>,
    ) -> Self {
        let mut report = Self::base(project_path, scheme);
        report.status = kind.status();
        report.failure_kind = Some(kind);
        report.exit_code = kind.exit_code().as_i32();
        report.human_summary = format!("{}: {}", kind.description(), error);
        report.error = Some(error);
        report.transcript_path = transcript_path;
        report
    }

    /// Report for a scan that reached the export stage.
    #[allow(clippy::too_many_arguments)]
    pub fn completed(
        project_path: &Path,
        scheme: &str,
        transcript_path: PathBuf,
        settings: SigningSettings,
        identity: IdentityStatus,
        resolved: ResolvedExportSet,
        expired_profiles: Vec<String>,
        export: ExportReport,
        profile_warnings: Vec<ProfileDecodeWarning>,
        fail_on_unmatched: bool,
    ) -> Self {
        let (status, failure_kind, exit_code) = super::failure::completed_outcome(
            resolved.has_unmatched(),
            !export.is_complete(),
            fail_on_unmatched,
        );

        let human_summary = match failure_kind {
            None => format!("Exported {} provisioning profile(s)", export.exported.len()),
            Some(FailureKind::ExportCopy) => format!(
                "Exported {} provisioning profile(s), {} failed to copy",
                export.exported.len(),
                export.errors.len()
            ),
            Some(_) => format!(
                "Exported {} provisioning profile(s), {} reference(s) not found locally",
                export.exported.len(),
                resolved.unmatched_refs.len()
            ),
        };

        let mut report = Self::base(project_path, scheme);
        report.status = status;
        report.failure_kind = failure_kind;
        report.exit_code = exit_code.as_i32();
        report.human_summary = human_summary;
        report.transcript_path = Some(transcript_path);
        report.settings = Some(settings);
        report.identity = Some(identity);
        report.ref_matches = resolved.matches;
        report.unmatched_refs = resolved.unmatched_refs;
        report.matched_profiles = resolved.profiles;
        report.expired_profiles = expired_profiles;
        report.exported = export.exported;
        report.copy_errors = export.errors;
        report.profile_warnings = profile_warnings;
        report
    }

    /// Attach indexing warnings gathered before the scan stopped.
    pub fn with_profile_warnings(mut self, warnings: Vec<ProfileDecodeWarning>) -> Self {
        self.profile_warnings = warnings;
        self
    }

    pub fn exit_code_enum(&self) -> Option<ExitCode> {
        ExitCode::from_i32(self.exit_code)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write `codesign-scan-report.json` into `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(REPORT_FILE_NAME);
        self.write_to_file(&path)?;
        Ok(path)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let json = self.to_json().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })?;
        fs::write(path, json)
    }

    /// Load from file
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("JSON error: {}", e))
        })
    }
}
