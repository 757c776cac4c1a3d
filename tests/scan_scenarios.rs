//! Scan Scenario Tests
//!
//! End-to-end scans driven by canned build transcripts and synthetic
//! provisioning profiles in temporary directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use codesign_scan::build::{ArchiveRunner, BuildRequest, CaptureError};
use codesign_scan::cancel::CancelToken;
use codesign_scan::export::TRANSCRIPT_FILE_NAME;
use codesign_scan::identity::{IdentityError, IdentitySource, LocalIdentity};
use codesign_scan::pipeline::ScanPipeline;
use codesign_scan::profiles::{decode_profile, DirectoryProfileSource};
use codesign_scan::resolve::IdentityStatus;
use codesign_scan::summary::{FailureKind, ScanReport, Status, REPORT_FILE_NAME};
use codesign_scan::ScanError;
use codesign_settings::BuildTranscript;
use cryptographic_message_syntax::SignedDataBuilder;
use plist::{Dictionary, Value};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

/// Runner that replays a fixed transcript
struct CannedRunner {
    text: String,
    succeeded: bool,
}

impl CannedRunner {
    fn succeeded(text: &str) -> Self {
        Self {
            text: text.to_string(),
            succeeded: true,
        }
    }

    fn failed(text: &str) -> Self {
        Self {
            text: text.to_string(),
            succeeded: false,
        }
    }
}

impl ArchiveRunner for CannedRunner {
    fn run_archive(
        &self,
        _request: &BuildRequest,
        _cancel: &CancelToken,
    ) -> Result<BuildTranscript, CaptureError> {
        Ok(BuildTranscript::new(self.text.clone(), self.succeeded))
    }
}

struct NoLaunch;

impl ArchiveRunner for NoLaunch {
    fn run_archive(
        &self,
        _request: &BuildRequest,
        _cancel: &CancelToken,
    ) -> Result<BuildTranscript, CaptureError> {
        Err(CaptureError::Launch {
            program: "/nonexistent/xcodebuild".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        })
    }
}

struct FixedIdentities(Vec<LocalIdentity>);

impl IdentitySource for FixedIdentities {
    fn identities(&self) -> Result<Vec<LocalIdentity>, IdentityError> {
        Ok(self.0.clone())
    }
}

/// Write a profile: an XML plist inside an unsigned CMS signed-data envelope
fn write_profile(dir: &Path, file_name: &str, uuid: &str, name: &str, expires_in_secs: i64) -> PathBuf {
    let mut dict = Dictionary::new();
    dict.insert("UUID".to_string(), Value::String(uuid.to_string()));
    dict.insert("Name".to_string(), Value::String(name.to_string()));
    dict.insert(
        "TeamIdentifier".to_string(),
        Value::Array(vec![Value::String("ABCDE12345".to_string())]),
    );
    let expiration = if expires_in_secs >= 0 {
        SystemTime::now() + Duration::from_secs(expires_in_secs as u64)
    } else {
        SystemTime::now() - Duration::from_secs(expires_in_secs.unsigned_abs())
    };
    dict.insert(
        "ExpirationDate".to_string(),
        Value::Date(plist::Date::from(expiration)),
    );

    let mut xml = Vec::new();
    Value::Dictionary(dict).to_writer_xml(&mut xml).unwrap();
    let bytes = SignedDataBuilder::default()
        .content_inline(xml)
        .build_der()
        .unwrap();

    let path = dir.join(file_name);
    fs::write(&path, bytes).unwrap();
    path
}

fn sha256_file(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fs::read(path).unwrap());
    hex::encode(hasher.finalize())
}

fn request() -> BuildRequest {
    BuildRequest::new("App.xcworkspace", "App").unwrap()
}

const TWO_TARGETS_ONE_PROFILE: &str = r#"
=== BUILD TARGET Ext OF PROJECT App WITH CONFIGURATION Release ===
CodeSign /tmp/Build/App.app/PlugIns/Ext.appex (in target 'Ext' from project 'App')
    cd /Users/dev/App
    export DEVELOPMENT_TEAM\=ABCDE12345

Signing Identity:     "Apple Distribution: Acme Inc (ABCDE12345)"
Provisioning Profile: "Wildcard Profile"
                      (1111-AAAA)

    /usr/bin/codesign --force --sign 0123ABCD /tmp/Build/App.app/PlugIns/Ext.appex

CodeSign /tmp/Build/App.app (in target 'App' from project 'App')
    cd /Users/dev/App

Signing Identity:     "Apple Distribution: Acme Inc (ABCDE12345)"
Provisioning Profile: "Wildcard Profile"
                      (1111-AAAA)

    /usr/bin/codesign --force --sign 0123ABCD /tmp/Build/App.app

** ARCHIVE SUCCEEDED **
"#;

const AD_HOC_BY_NAME: &str = r#"
CodeSign /tmp/Build/App.app (in target 'App' from project 'App')
    cd /Users/dev/App

Signing Identity:     "iPhone Distribution: Acme Inc (ABCDE12345)"
Provisioning Profile: "Ad Hoc Dist"

    /usr/bin/codesign --force --sign 0123ABCD /tmp/Build/App.app

** ARCHIVE SUCCEEDED **
"#;

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_shared_profile_exported_once() {
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let source_path = write_profile(
        profiles.path(),
        "1111-AAAA.mobileprovision",
        "1111-AAAA",
        "Wildcard Profile",
        86_400 * 30,
    );

    let runner = CannedRunner::succeeded(TWO_TARGETS_ONE_PROFILE);
    let source = DirectoryProfileSource::new(profiles.path());
    let outcome = ScanPipeline::new(&runner, &source)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap();
    let report = outcome.report;

    assert_eq!(report.status, Status::Success);
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.matched_profiles.len(), 1);
    assert!(report.unmatched_refs.is_empty());
    assert_eq!(report.ref_matches.len(), 2);

    let exported = out.path().join("1111-AAAA.WildcardProfile.mobileprovision");
    assert!(exported.is_file());
    assert_eq!(report.exported.len(), 1);
    assert_eq!(report.exported[0].destination_path, exported);
    assert_eq!(report.exported[0].sha256, sha256_file(&source_path));

    // Exported file decodes to the same profile
    let decoded = decode_profile(&exported).unwrap();
    assert_eq!(decoded.uuid, "1111-AAAA");
    assert_eq!(decoded.name, "Wildcard Profile");

    let transcript = fs::read_to_string(out.path().join(TRANSCRIPT_FILE_NAME)).unwrap();
    assert!(transcript.contains("** ARCHIVE SUCCEEDED **"));
    assert!(out.path().join(REPORT_FILE_NAME).is_file());
}

#[test]
fn test_unmatched_name_reference_reported() {
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_profile(
        profiles.path(),
        "other.mobileprovision",
        "2222-BBBB",
        "Development",
        86_400,
    );

    let runner = CannedRunner::succeeded(AD_HOC_BY_NAME);
    let source = DirectoryProfileSource::new(profiles.path());
    let outcome = ScanPipeline::new(&runner, &source)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap();
    let report = outcome.report;

    assert_eq!(report.status, Status::Incomplete);
    assert_eq!(report.failure_kind, Some(FailureKind::Unmatched));
    assert_eq!(report.exit_code, 0);
    assert!(report.exported.is_empty());
    assert_eq!(report.unmatched_refs.len(), 1);
    assert_eq!(report.unmatched_refs[0].target_name, "App");
    assert_eq!(report.unmatched_refs[0].profile_identifier, "Ad Hoc Dist");

    // Only the transcript and the report were written
    let mut names: Vec<String> = fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec![REPORT_FILE_NAME.to_string(), TRANSCRIPT_FILE_NAME.to_string()]);
}

#[test]
fn test_unmatched_with_fail_on_unmatched() {
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let runner = CannedRunner::succeeded(AD_HOC_BY_NAME);
    let source = DirectoryProfileSource::new(profiles.path());
    let outcome = ScanPipeline::new(&runner, &source)
        .fail_on_unmatched(true)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap();
    assert_eq!(outcome.report.exit_code, 2);
}

#[test]
fn test_duplicate_uuid_first_file_wins() {
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let first = write_profile(
        profiles.path(),
        "a.mobileprovision",
        "1111-AAAA",
        "Wildcard Profile",
        86_400,
    );
    let second = write_profile(
        profiles.path(),
        "b.mobileprovision",
        "1111-AAAA",
        "Wildcard Copy",
        86_400,
    );

    let runner = CannedRunner::succeeded(TWO_TARGETS_ONE_PROFILE);
    let source = DirectoryProfileSource::new(profiles.path());
    let report = ScanPipeline::new(&runner, &source)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap()
        .report;

    assert_eq!(report.matched_profiles.len(), 1);
    assert_eq!(report.matched_profiles[0].file_path, first);
    assert_eq!(report.profile_warnings.len(), 1);
    assert_eq!(report.profile_warnings[0].path, second);
    assert!(out
        .path()
        .join("1111-AAAA.WildcardProfile.mobileprovision")
        .is_file());
}

#[test]
fn test_launch_failure_leaves_output_untouched() {
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_profile(
        profiles.path(),
        "a.mobileprovision",
        "1111-AAAA",
        "Wildcard Profile",
        86_400,
    );

    let source = DirectoryProfileSource::new(profiles.path());
    let err = ScanPipeline::new(&NoLaunch, &source)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, ScanError::ProcessLaunch { .. }));
    assert_eq!(err.exit_code().as_i32(), 10);
    assert!(!out.path().join(TRANSCRIPT_FILE_NAME).exists());
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

// =============================================================================
// Failure Paths
// =============================================================================

#[test]
fn test_failed_build_keeps_transcript_and_exports_nothing() {
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_profile(
        profiles.path(),
        "a.mobileprovision",
        "1111-AAAA",
        "Wildcard Profile",
        86_400,
    );

    let log = format!("{}\nerror: Signing requires a development team.\n** ARCHIVE FAILED **\n", TWO_TARGETS_ONE_PROFILE);
    let runner = CannedRunner::failed(&log);
    let source = DirectoryProfileSource::new(profiles.path());
    let err = ScanPipeline::new(&runner, &source)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, ScanError::BuildFailed { .. }));
    assert_eq!(err.exit_code().as_i32(), 11);

    let transcript = fs::read_to_string(out.path().join(TRANSCRIPT_FILE_NAME)).unwrap();
    assert!(transcript.contains("** ARCHIVE FAILED **"));
    assert!(!out
        .path()
        .join("1111-AAAA.WildcardProfile.mobileprovision")
        .exists());

    let report = ScanReport::from_file(&out.path().join(REPORT_FILE_NAME)).unwrap();
    assert_eq!(report.status, Status::Failed);
    assert_eq!(report.failure_kind, Some(FailureKind::BuildFailed));
    assert!(report.settings.is_none());
}

#[test]
fn test_build_without_signing_lines() {
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let runner = CannedRunner::succeeded("note: Using new build system\n** ARCHIVE SUCCEEDED **\n");
    let source = DirectoryProfileSource::new(profiles.path());
    let err = ScanPipeline::new(&runner, &source)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, ScanError::NoSigningSettingsFound { .. }));
    assert_eq!(err.exit_code().as_i32(), 12);
    assert!(out.path().join(TRANSCRIPT_FILE_NAME).is_file());
}

#[test]
fn test_missing_profiles_dir_means_everything_unmatched() {
    let out = TempDir::new().unwrap();
    let runner = CannedRunner::succeeded(TWO_TARGETS_ONE_PROFILE);
    let source = DirectoryProfileSource::new(out.path().join("does-not-exist"));
    let report = ScanPipeline::new(&runner, &source)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap()
        .report;

    assert_eq!(report.unmatched_refs.len(), 2);
    assert!(report.exported.is_empty());
}

// =============================================================================
// Report Details
// =============================================================================

#[test]
fn test_expired_profile_still_exported() {
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_profile(
        profiles.path(),
        "old.mobileprovision",
        "1111-AAAA",
        "Wildcard Profile",
        -86_400,
    );

    let runner = CannedRunner::succeeded(TWO_TARGETS_ONE_PROFILE);
    let source = DirectoryProfileSource::new(profiles.path());
    let report = ScanPipeline::new(&runner, &source)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap()
        .report;

    assert_eq!(report.expired_profiles, vec!["1111-AAAA".to_string()]);
    assert_eq!(report.exported.len(), 1);
}

#[test]
fn test_identity_status_recorded() {
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let runner = CannedRunner::succeeded(TWO_TARGETS_ONE_PROFILE);
    let source = DirectoryProfileSource::new(profiles.path());
    let identities = FixedIdentities(vec![LocalIdentity {
        sha1: "0123456789ABCDEF0123456789ABCDEF01234567".to_string(),
        name: "Apple Distribution: Acme Inc (ABCDE12345)".to_string(),
    }]);
    let report = ScanPipeline::new(&runner, &source)
        .with_identities(&identities)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap()
        .report;

    assert!(matches!(report.identity, Some(IdentityStatus::Installed { .. })));
    let settings = report.settings.unwrap();
    assert_eq!(settings.team_identifier.as_deref(), Some("ABCDE12345"));
}

#[test]
fn test_report_written_matches_returned() {
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let runner = CannedRunner::succeeded(AD_HOC_BY_NAME);
    let source = DirectoryProfileSource::new(profiles.path());
    let outcome = ScanPipeline::new(&runner, &source)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap();

    let loaded = ScanReport::from_file(&outcome.report_path).unwrap();
    assert_eq!(loaded.scan_id, outcome.report.scan_id);
    assert_eq!(loaded.unmatched_refs, outcome.report.unmatched_refs);
    assert_eq!(loaded.scheme, "App");
}

// =============================================================================
// Real Process
// =============================================================================

#[cfg(unix)]
#[test]
fn test_stub_xcodebuild_end_to_end() {
    use codesign_scan::build::XcodebuildRunner;
    use std::os::unix::fs::PermissionsExt;

    let bin = TempDir::new().unwrap();
    let profiles = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_profile(
        profiles.path(),
        "1111-AAAA.mobileprovision",
        "1111-AAAA",
        "Wildcard Profile",
        86_400,
    );

    let log_path = bin.path().join("archive.log");
    fs::write(&log_path, TWO_TARGETS_ONE_PROFILE).unwrap();
    let script = bin.path().join("xcodebuild");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"args: $*\" >&2\ncat '{}'\n",
            log_path.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let runner = XcodebuildRunner::new(&script).with_configuration(Some("Release".to_string()));
    let source = DirectoryProfileSource::new(profiles.path());
    let report = ScanPipeline::new(&runner, &source)
        .run(&request(), out.path(), &CancelToken::new())
        .unwrap()
        .report;

    assert_eq!(report.exported.len(), 1);
    let transcript = fs::read_to_string(out.path().join(TRANSCRIPT_FILE_NAME)).unwrap();
    assert!(transcript.contains(
        "args: -workspace App.xcworkspace -scheme App -configuration Release clean archive"
    ));
}
