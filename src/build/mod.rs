//! Build output capture.
//!
//! Runs an archive build of one scheme and hands back the complete
//! transcript. Failing builds are not errors here; only a build tool that
//! cannot be started, or a build that was cancelled, is.

mod capture;

use std::path::{Path, PathBuf};
use std::process::Command;

use codesign_settings::BuildTranscript;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::timeout::TimeoutConfig;

pub use capture::{capture_command, CaptureError};

/// What to archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    project_path: PathBuf,
    scheme: String,
}

/// Invalid build request
#[derive(Debug, thiserror::Error)]
pub enum BuildRequestError {
    #[error("project path must not be empty")]
    EmptyProjectPath,

    #[error("scheme must not be empty")]
    EmptyScheme,
}

impl BuildRequest {
    pub fn new(
        project_path: impl Into<PathBuf>,
        scheme: impl Into<String>,
    ) -> Result<Self, BuildRequestError> {
        let project_path = project_path.into();
        let scheme = scheme.into();
        if project_path.as_os_str().is_empty() {
            return Err(BuildRequestError::EmptyProjectPath);
        }
        if scheme.trim().is_empty() {
            return Err(BuildRequestError::EmptyScheme);
        }
        Ok(Self {
            project_path,
            scheme,
        })
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn is_workspace(&self) -> bool {
        is_workspace_path(&self.project_path)
    }
}

fn is_workspace_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("xcworkspace")
}

/// `-workspace <path>` or `-project <path>`
fn container_args(project_path: &Path) -> [String; 2] {
    let flag = if is_workspace_path(project_path) {
        "-workspace"
    } else {
        "-project"
    };
    [flag.to_string(), project_path.display().to_string()]
}

/// Something that can produce an archive build transcript.
pub trait ArchiveRunner {
    fn run_archive(
        &self,
        request: &BuildRequest,
        cancel: &CancelToken,
    ) -> Result<BuildTranscript, CaptureError>;
}

/// Runs the real `xcodebuild`.
#[derive(Debug, Clone)]
pub struct XcodebuildRunner {
    program: PathBuf,
    configuration: Option<String>,
    extra_args: Vec<String>,
    timeout: TimeoutConfig,
}

impl Default for XcodebuildRunner {
    fn default() -> Self {
        Self::new("xcodebuild")
    }
}

impl XcodebuildRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            configuration: None,
            extra_args: Vec::new(),
            timeout: TimeoutConfig::none(),
        }
    }

    pub fn with_configuration(mut self, configuration: Option<String>) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments for `xcodebuild ... clean archive`
    pub fn archive_args(&self, request: &BuildRequest) -> Vec<String> {
        let mut args: Vec<String> = container_args(request.project_path()).into();
        args.push("-scheme".to_string());
        args.push(request.scheme().to_string());
        if let Some(ref configuration) = self.configuration {
            args.push("-configuration".to_string());
            args.push(configuration.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push("clean".to_string());
        args.push("archive".to_string());
        args
    }

    /// List the schemes of a project or workspace via `xcodebuild -list -json`.
    pub fn list_schemes(
        &self,
        project_path: &Path,
        cancel: &CancelToken,
    ) -> Result<Vec<String>, SchemeListError> {
        let mut command = Command::new(&self.program);
        command.args(container_args(project_path)).args(["-list", "-json"]);

        let transcript = capture_command(command, cancel, self.timeout)?;
        if !transcript.succeeded() {
            return Err(SchemeListError::Failed(transcript.into_text()));
        }
        parse_scheme_list(transcript.raw_text())
    }
}

impl ArchiveRunner for XcodebuildRunner {
    fn run_archive(
        &self,
        request: &BuildRequest,
        cancel: &CancelToken,
    ) -> Result<BuildTranscript, CaptureError> {
        let args = self.archive_args(request);
        tracing::info!(
            program = %self.program.display(),
            args = %args.join(" "),
            "running archive build"
        );

        let mut command = Command::new(&self.program);
        command.args(&args);
        capture_command(command, cancel, self.timeout)
    }
}

/// Errors from scheme listing
#[derive(Debug, thiserror::Error)]
pub enum SchemeListError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("xcodebuild -list failed:\n{0}")]
    Failed(String),

    #[error("unexpected xcodebuild -list output: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct ListOutput {
    project: Option<ListContainer>,
    workspace: Option<ListContainer>,
}

#[derive(Debug, Deserialize)]
struct ListContainer {
    #[serde(default)]
    schemes: Vec<String>,
}

/// Parse `xcodebuild -list -json` output.
///
/// xcodebuild may print warnings before the JSON document, so parsing
/// starts at the first `{`.
pub fn parse_scheme_list(output: &str) -> Result<Vec<String>, SchemeListError> {
    let start = output
        .find('{')
        .ok_or_else(|| SchemeListError::Parse("no JSON object in output".to_string()))?;
    let end = output
        .rfind('}')
        .ok_or_else(|| SchemeListError::Parse("unterminated JSON object".to_string()))?;
    let parsed: ListOutput = serde_json::from_str(&output[start..=end])
        .map_err(|e| SchemeListError::Parse(e.to_string()))?;

    let container = parsed
        .workspace
        .or(parsed.project)
        .ok_or_else(|| SchemeListError::Parse("neither project nor workspace listed".to_string()))?;
    Ok(container.schemes)
}
