//! Scan pipeline
//!
//! Runs one archive build and carries its output through every stage:
//! - Capture the build transcript and save it to the output directory
//! - Extract signing settings from the transcript
//! - Index the local provisioning profiles
//! - Match the referenced profiles and copy them out
//! - Write `codesign-scan-report.json`
//!
//! A build that cannot be launched leaves the output directory untouched.
//! Every later failure still leaves the transcript and a failure report.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use codesign_settings::{extract, BuildTranscript};

use crate::build::{ArchiveRunner, BuildRequest, CaptureError};
use crate::cancel::{CancelReason, CancelToken};
use crate::error::ScanError;
use crate::export::{Exporter, TRANSCRIPT_FILE_NAME};
use crate::identity::IdentitySource;
use crate::profiles::{ProfileDecodeWarning, ProfileIndex, ProfileSource};
use crate::resolve::{resolve, resolve_identity};
use crate::summary::{ScanReport, REPORT_FILE_NAME};

/// Result of a scan that reached the export stage.
#[derive(Debug)]
pub struct ScanOutcome {
    pub report: ScanReport,
    pub report_path: PathBuf,
}

/// Create the output directory if needed and return its absolute path.
pub fn prepare_output_dir(path: &Path) -> Result<PathBuf, ScanError> {
    let export_dir = |source| ScanError::ExportDir {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(path).map_err(export_dir)?;
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_err(export_dir)?.join(path)
    };
    Ok(absolute)
}

pub struct ScanPipeline<'a> {
    runner: &'a dyn ArchiveRunner,
    profiles: &'a dyn ProfileSource,
    identities: Option<&'a dyn IdentitySource>,
    fail_on_unmatched: bool,
}

impl<'a> ScanPipeline<'a> {
    pub fn new(runner: &'a dyn ArchiveRunner, profiles: &'a dyn ProfileSource) -> Self {
        Self {
            runner,
            profiles,
            identities: None,
            fail_on_unmatched: false,
        }
    }

    /// Check the reported identity against the local keychain.
    pub fn with_identities(mut self, identities: &'a dyn IdentitySource) -> Self {
        self.identities = Some(identities);
        self
    }

    pub fn fail_on_unmatched(mut self, fail: bool) -> Self {
        self.fail_on_unmatched = fail;
        self
    }

    /// Run one scan into `output_dir`, which must already exist.
    ///
    /// When the scan stops after the transcript was saved, a failure report
    /// is written next to it before the error is returned.
    pub fn run(
        &self,
        request: &BuildRequest,
        output_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<ScanOutcome, ScanError> {
        tracing::info!(
            project = %request.project_path().display(),
            scheme = %request.scheme(),
            output_dir = %output_dir.display(),
            "starting signing scan"
        );

        let mut warnings = Vec::new();
        match self.scan(request, output_dir, cancel, &mut warnings) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if should_report_failure(&err) {
                    let report = ScanReport::failure(
                        request.project_path(),
                        request.scheme(),
                        err.failure_kind(),
                        err.to_string(),
                        err.transcript_path().cloned(),
                    )
                    .with_profile_warnings(warnings);
                    if let Err(e) = report.write_to_dir(output_dir) {
                        tracing::warn!(
                            path = %output_dir.join(REPORT_FILE_NAME).display(),
                            error = %e,
                            "failed to write failure report"
                        );
                    }
                }
                Err(err)
            }
        }
    }

    fn scan(
        &self,
        request: &BuildRequest,
        output_dir: &Path,
        cancel: &CancelToken,
        warnings: &mut Vec<ProfileDecodeWarning>,
    ) -> Result<ScanOutcome, ScanError> {
        let exporter = Exporter::new(output_dir);

        let (transcript, cancelled) = self.capture(request, cancel)?;
        let transcript_path = exporter
            .write_transcript(transcript.raw_text())
            .map_err(|source| ScanError::TranscriptWrite {
                path: output_dir.join(TRANSCRIPT_FILE_NAME),
                source,
            })?;

        if let Some(reason) = cancelled {
            tracing::warn!(%reason, "build stopped before completion");
            return Err(ScanError::BuildCancelled {
                reason,
                transcript_path,
            });
        }
        if !transcript.succeeded() {
            tracing::error!(
                transcript = %transcript_path.display(),
                "xcodebuild archive failed"
            );
        }

        let settings = extract(&transcript)
            .map_err(|e| ScanError::from_extract(e, transcript_path.clone()))?;
        tracing::info!(
            team = settings.team_identifier.as_deref().unwrap_or("-"),
            identity = settings.signing_identity_name.as_deref().unwrap_or("-"),
            profiles = settings.per_target_profiles.len(),
            "extracted signing settings"
        );

        let index = ProfileIndex::scan(self.profiles)?;
        let (descriptors, index_warnings) = index.into_parts();
        *warnings = index_warnings;
        tracing::info!(count = descriptors.len(), "indexed local provisioning profiles");

        let resolved = resolve(&settings, &descriptors);

        let identity = match self.identities {
            Some(source) => match source.identities() {
                Ok(installed) => resolve_identity(&settings, Ok(installed.as_slice())),
                Err(e) => {
                    tracing::warn!(error = %e, "could not list local signing identities");
                    resolve_identity(&settings, Err(e.to_string()))
                }
            },
            None => resolve_identity(&settings, Err("identity lookup disabled".to_string())),
        };

        let now = Utc::now();
        let mut expired_profiles = Vec::new();
        for profile in resolved.profiles.iter().filter(|p| p.is_expired(now)) {
            tracing::warn!(uuid = %profile.uuid, name = %profile.name, "exporting an expired profile");
            expired_profiles.push(profile.uuid.clone());
        }

        let export = exporter.export_profiles(&resolved);

        let report = ScanReport::completed(
            request.project_path(),
            request.scheme(),
            transcript_path,
            settings,
            identity,
            resolved,
            expired_profiles,
            export,
            std::mem::take(warnings),
            self.fail_on_unmatched,
        );
        let report_path = report
            .write_to_dir(output_dir)
            .map_err(|source| ScanError::ExportDir {
                path: output_dir.join(REPORT_FILE_NAME),
                source,
            })?;

        tracing::info!(
            status = ?report.status,
            exported = report.exported.len(),
            report = %report_path.display(),
            "{}",
            report.human_summary
        );
        Ok(ScanOutcome {
            report,
            report_path,
        })
    }

    /// Run the build; a cancelled build still yields its partial transcript.
    fn capture(
        &self,
        request: &BuildRequest,
        cancel: &CancelToken,
    ) -> Result<(BuildTranscript, Option<CancelReason>), ScanError> {
        match self.runner.run_archive(request, cancel) {
            Ok(transcript) => Ok((transcript, None)),
            Err(CaptureError::Cancelled { reason, transcript }) => Ok((transcript, Some(reason))),
            Err(CaptureError::Launch { program, source }) => {
                tracing::error!(%program, error = %source, "could not launch xcodebuild");
                Err(ScanError::ProcessLaunch { program, source })
            }
            Err(CaptureError::Io(e)) => Err(ScanError::BuildIo(e)),
        }
    }
}

/// Launch failures write nothing; output-directory failures cannot.
fn should_report_failure(err: &ScanError) -> bool {
    !matches!(
        err,
        ScanError::ProcessLaunch { .. }
            | ScanError::BuildIo(_)
            | ScanError::ExportDir { .. }
            | ScanError::TranscriptWrite { .. }
            | ScanError::Config(_)
    )
}
