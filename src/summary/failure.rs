//! Failure taxonomy and stable exit codes

use serde::{Deserialize, Serialize};

/// Overall scan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Every referenced profile was found and exported
    Success,
    /// Finished, but some references were unmatched or some copies failed
    Incomplete,
    /// Stopped before export
    Failed,
    /// Stopped by the user, a signal or the timeout
    Cancelled,
}

impl Status {
    /// Check if this is a terminal failure state
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Failed | Status::Cancelled)
    }
}

/// Failure kind - categorizes the cause of a non-success outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Some references matched no local profile
    Unmatched,
    /// One or more profile copies failed
    ExportCopy,
    /// xcodebuild could not be started
    ProcessLaunch,
    /// xcodebuild exited unsuccessfully
    BuildFailed,
    /// The build was interrupted
    Cancelled,
    /// Output carried no usable signing settings
    Extraction,
    /// Profile directory could not be read
    ProfileSource,
    /// Output directory or transcript could not be written
    ExportDir,
    /// Invalid configuration
    Config,
}

impl FailureKind {
    /// Map failure kind to exit code
    pub fn exit_code(&self) -> ExitCode {
        match self {
            FailureKind::Unmatched => ExitCode::Unmatched,
            FailureKind::ExportCopy => ExitCode::ExportCopy,
            FailureKind::ProcessLaunch => ExitCode::ProcessLaunch,
            FailureKind::BuildFailed => ExitCode::BuildFailed,
            FailureKind::Cancelled => ExitCode::Cancelled,
            FailureKind::Extraction => ExitCode::Extraction,
            FailureKind::ProfileSource => ExitCode::ProfileSource,
            FailureKind::ExportDir => ExitCode::ExportDir,
            FailureKind::Config => ExitCode::Config,
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            FailureKind::Unmatched => "Referenced profiles missing locally",
            FailureKind::ExportCopy => "Profile export failed",
            FailureKind::ProcessLaunch => "xcodebuild could not be launched",
            FailureKind::BuildFailed => "xcodebuild failed",
            FailureKind::Cancelled => "Scan cancelled",
            FailureKind::Extraction => "No signing settings in build output",
            FailureKind::ProfileSource => "Provisioning profiles unreadable",
            FailureKind::ExportDir => "Output directory not writable",
            FailureKind::Config => "Invalid configuration",
        }
    }

    /// Status a scan ends in when it stops for this reason
    pub fn status(&self) -> Status {
        match self {
            FailureKind::Unmatched | FailureKind::ExportCopy => Status::Incomplete,
            FailureKind::Cancelled => Status::Cancelled,
            _ => Status::Failed,
        }
    }
}

/// Stable process exit codes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    #[default]
    Success = 0,
    /// Unmatched references with `fail_on_unmatched`
    Unmatched = 2,
    ExportCopy = 3,
    ProcessLaunch = 10,
    BuildFailed = 11,
    Extraction = 12,
    ProfileSource = 13,
    ExportDir = 14,
    Config = 15,
    Cancelled = 80,
}

impl ExitCode {
    /// Get the integer value of the exit code
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Create from integer value
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitCode::Success),
            2 => Some(ExitCode::Unmatched),
            3 => Some(ExitCode::ExportCopy),
            10 => Some(ExitCode::ProcessLaunch),
            11 => Some(ExitCode::BuildFailed),
            12 => Some(ExitCode::Extraction),
            13 => Some(ExitCode::ProfileSource),
            14 => Some(ExitCode::ExportDir),
            15 => Some(ExitCode::Config),
            80 => Some(ExitCode::Cancelled),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

/// Outcome of a scan that reached the export stage.
///
/// Copy failures outrank unmatched references. Unmatched references only
/// count against the exit code when `fail_on_unmatched` is set.
pub fn completed_outcome(
    has_unmatched: bool,
    has_copy_errors: bool,
    fail_on_unmatched: bool,
) -> (Status, Option<FailureKind>, ExitCode) {
    if has_copy_errors {
        return (
            Status::Incomplete,
            Some(FailureKind::ExportCopy),
            ExitCode::ExportCopy,
        );
    }
    if has_unmatched {
        let code = if fail_on_unmatched {
            ExitCode::Unmatched
        } else {
            ExitCode::Success
        };
        return (Status::Incomplete, Some(FailureKind::Unmatched), code);
    }
    (Status::Success, None, ExitCode::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&Status::Success).unwrap(), r#""success""#);
        assert_eq!(serde_json::to_string(&Status::Incomplete).unwrap(), r#""incomplete""#);
        assert_eq!(serde_json::to_string(&Status::Cancelled).unwrap(), r#""cancelled""#);
    }

    #[test]
    fn test_failure_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&FailureKind::ProcessLaunch).unwrap(),
            r#""PROCESS_LAUNCH""#
        );
        assert_eq!(
            serde_json::to_string(&FailureKind::ExportDir).unwrap(),
            r#""EXPORT_DIR""#
        );
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::Unmatched.as_i32(), 2);
        assert_eq!(ExitCode::ExportCopy.as_i32(), 3);
        assert_eq!(ExitCode::ProcessLaunch.as_i32(), 10);
        assert_eq!(ExitCode::BuildFailed.as_i32(), 11);
        assert_eq!(ExitCode::Extraction.as_i32(), 12);
        assert_eq!(ExitCode::ProfileSource.as_i32(), 13);
        assert_eq!(ExitCode::ExportDir.as_i32(), 14);
        assert_eq!(ExitCode::Config.as_i32(), 15);
        assert_eq!(ExitCode::Cancelled.as_i32(), crate::cancel::EXIT_CODE_CANCELLED);
    }

    #[test]
    fn test_exit_code_roundtrip() {
        for code in [0, 2, 3, 10, 11, 12, 13, 14, 15, 80] {
            assert_eq!(ExitCode::from_i32(code).unwrap().as_i32(), code);
        }
        assert_eq!(ExitCode::from_i32(1), None);
    }

    #[test]
    fn test_failure_kind_status() {
        assert_eq!(FailureKind::Unmatched.status(), Status::Incomplete);
        assert_eq!(FailureKind::Cancelled.status(), Status::Cancelled);
        assert_eq!(FailureKind::BuildFailed.status(), Status::Failed);
        assert!(FailureKind::Config.status().is_failure());
    }

    #[test]
    fn test_completed_outcome() {
        assert_eq!(
            completed_outcome(false, false, true),
            (Status::Success, None, ExitCode::Success)
        );
        assert_eq!(
            completed_outcome(true, false, false),
            (Status::Incomplete, Some(FailureKind::Unmatched), ExitCode::Success)
        );
        assert_eq!(
            completed_outcome(true, false, true).2,
            ExitCode::Unmatched
        );
        assert_eq!(
            completed_outcome(true, true, true).2,
            ExitCode::ExportCopy
        );
    }
}
