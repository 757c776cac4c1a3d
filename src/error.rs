//! Errors that end a scan early

use std::io;
use std::path::PathBuf;

use codesign_settings::ExtractError;

use crate::cancel::CancelReason;
use crate::config::ConfigError;
use crate::profiles::ProfileSourceError;
use crate::summary::{ExitCode, FailureKind};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// xcodebuild never started. Nothing is written for this case.
    #[error("failed to launch {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("xcodebuild archive failed (transcript at {})", .transcript_path.display())]
    BuildFailed { transcript_path: PathBuf },

    #[error("build {reason}")]
    BuildCancelled {
        reason: CancelReason,
        transcript_path: PathBuf,
    },

    #[error("failed waiting for xcodebuild: {0}")]
    BuildIo(#[source] io::Error),

    /// The build succeeded but its output named no signing settings.
    #[error("no signing settings found in build output (transcript at {})", .transcript_path.display())]
    NoSigningSettingsFound { transcript_path: PathBuf },

    #[error(transparent)]
    ProfileSource(#[from] ProfileSourceError),

    #[error("cannot use output directory {}: {source}", .path.display())]
    ExportDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write transcript to {}: {source}", .path.display())]
    TranscriptWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ScanError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ScanError::ProcessLaunch { .. } => FailureKind::ProcessLaunch,
            ScanError::BuildFailed { .. } | ScanError::BuildIo(_) => FailureKind::BuildFailed,
            ScanError::BuildCancelled { .. } => FailureKind::Cancelled,
            ScanError::NoSigningSettingsFound { .. } => FailureKind::Extraction,
            ScanError::ProfileSource(_) => FailureKind::ProfileSource,
            ScanError::ExportDir { .. } | ScanError::TranscriptWrite { .. } => {
                FailureKind::ExportDir
            }
            ScanError::Config(_) => FailureKind::Config,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        self.failure_kind().exit_code()
    }

    /// The transcript written before the scan stopped, if any.
    pub fn transcript_path(&self) -> Option<&PathBuf> {
        match self {
            ScanError::BuildFailed { transcript_path }
            | ScanError::BuildCancelled {
                transcript_path, ..
            }
            | ScanError::NoSigningSettingsFound { transcript_path } => Some(transcript_path),
            _ => None,
        }
    }

    /// Build a scan error from an extraction failure on a written transcript.
    pub fn from_extract(source: ExtractError, transcript_path: PathBuf) -> Self {
        match source {
            ExtractError::NoSigningSettingsFound => {
                ScanError::NoSigningSettingsFound { transcript_path }
            }
            ExtractError::BuildFailed => ScanError::BuildFailed { transcript_path },
        }
    }
}
