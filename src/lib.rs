//! Code signing settings scanner for Xcode projects
//!
//! Archives a project or workspace with `xcodebuild`, reads the signing
//! identity and provisioning profiles the build settled on, and copies
//! the matching local profiles into an export directory together with
//! the raw build output.

pub mod build;
pub mod cancel;
pub mod config;
pub mod error;
pub mod export;
pub mod identity;
pub mod pipeline;
pub mod profiles;
pub mod resolve;
pub mod summary;
pub mod timeout;

pub use build::{ArchiveRunner, BuildRequest, CaptureError, XcodebuildRunner};
pub use cancel::{CancelReason, CancelToken};
pub use config::{ConfigLayer, ScanConfig};
pub use error::ScanError;
pub use export::{ExportReport, Exporter};
pub use pipeline::{prepare_output_dir, ScanOutcome, ScanPipeline};
pub use profiles::{DirectoryProfileSource, ProfileIndex, ProvisioningProfileDescriptor};
pub use resolve::{resolve, ResolvedExportSet};
pub use summary::{ExitCode, FailureKind, ScanReport, Status};
