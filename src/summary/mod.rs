//! Scan report and failure taxonomy
//!
//! Every scan that gets far enough to own an output directory leaves a
//! `codesign-scan-report.json` next to the exported profiles.

mod failure;
mod report;

pub use failure::{completed_outcome, ExitCode, FailureKind, Status};
pub use report::{
    generate_scan_id, ScanReport, REPORT_FILE_NAME, REPORT_SCHEMA_ID, REPORT_SCHEMA_VERSION,
};
