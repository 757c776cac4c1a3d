//! Scan configuration
//!
//! Three layers, later wins:
//! 1. Built-in defaults
//! 2. Config file (`--config`, or `.codesign-scan.toml` when present)
//! 3. CLI flags

mod defaults;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::timeout::{TimeoutConfig, TimeoutValidationError};

pub use defaults::{BuiltinDefaults, DEFAULT_CONFIG_FILE, DEFAULT_OUTPUT_DIR, DEFAULT_XCODEBUILD};

/// Error types for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Timeout(#[from] TimeoutValidationError),
}

/// Optional settings, as read from a config file or CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    /// xcodebuild executable
    pub xcodebuild: Option<PathBuf>,

    /// Directory holding installed provisioning profiles
    pub profiles_dir: Option<PathBuf>,

    /// Export destination directory
    pub output_dir: Option<PathBuf>,

    /// Overall archive build timeout
    pub timeout_seconds: Option<u64>,

    /// Build configuration passed as `-configuration`
    pub configuration: Option<String>,

    /// Extra xcodebuild arguments, appended before the actions
    pub extra_args: Option<Vec<String>>,

    /// Exit non-zero when a profile reference has no local match
    pub fail_on_unmatched: Option<bool>,
}

impl ConfigLayer {
    /// Load a layer from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse a layer from a TOML string
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Overlay `other` on top of `self`; set values in `other` win.
    pub fn merge(self, other: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            xcodebuild: other.xcodebuild.or(self.xcodebuild),
            profiles_dir: other.profiles_dir.or(self.profiles_dir),
            output_dir: other.output_dir.or(self.output_dir),
            timeout_seconds: other.timeout_seconds.or(self.timeout_seconds),
            configuration: other.configuration.or(self.configuration),
            extra_args: other.extra_args.or(self.extra_args),
            fail_on_unmatched: other.fail_on_unmatched.or(self.fail_on_unmatched),
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanConfig {
    pub xcodebuild: PathBuf,
    pub profiles_dir: PathBuf,
    pub output_dir: PathBuf,
    pub timeout_seconds: Option<u64>,
    pub configuration: Option<String>,
    pub extra_args: Vec<String>,
    pub fail_on_unmatched: bool,
}

impl ScanConfig {
    /// Resolve defaults, an optional config file and CLI flags.
    ///
    /// Without an explicit `config_path`, `.codesign-scan.toml` in the
    /// working directory is used when it exists.
    pub fn load(config_path: Option<&Path>, cli: ConfigLayer) -> Result<Self, ConfigError> {
        let file_layer = match config_path {
            Some(path) => ConfigLayer::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    ConfigLayer::from_file(path)?
                } else {
                    ConfigLayer::default()
                }
            }
        };
        Self::resolve(BuiltinDefaults::default(), file_layer.merge(cli))
    }

    /// Apply a merged layer over the built-in defaults and validate.
    pub fn resolve(defaults: BuiltinDefaults, layer: ConfigLayer) -> Result<Self, ConfigError> {
        let profiles_dir = layer
            .profiles_dir
            .or(defaults.profiles_dir)
            .ok_or_else(|| {
                ConfigError::ValidationError(
                    "profiles_dir is not set and $HOME is unavailable".to_string(),
                )
            })?;

        let config = Self {
            xcodebuild: layer.xcodebuild.unwrap_or(defaults.xcodebuild),
            profiles_dir,
            output_dir: layer.output_dir.unwrap_or(defaults.output_dir),
            timeout_seconds: layer.timeout_seconds,
            configuration: layer.configuration,
            extra_args: layer.extra_args.unwrap_or_default(),
            fail_on_unmatched: layer.fail_on_unmatched.unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.xcodebuild.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "xcodebuild must not be empty".to_string(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "output_dir must not be empty".to_string(),
            ));
        }
        if matches!(self.configuration.as_deref(), Some(c) if c.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "configuration must not be empty when set".to_string(),
            ));
        }
        // Actions are appended by the scanner itself
        if let Some(action) = self
            .extra_args
            .iter()
            .find(|a| matches!(a.as_str(), "archive" | "build" | "clean" | "test"))
        {
            return Err(ConfigError::ValidationError(format!(
                "extra_args must not contain the action '{}'",
                action
            )));
        }
        self.timeout().validate()?;
        Ok(())
    }

    pub fn timeout(&self) -> TimeoutConfig {
        TimeoutConfig {
            overall_seconds: self.timeout_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> BuiltinDefaults {
        BuiltinDefaults {
            xcodebuild: PathBuf::from("xcodebuild"),
            profiles_dir: Some(PathBuf::from("/home/u/Library/MobileDevice/Provisioning Profiles")),
            output_dir: PathBuf::from("codesigndoc_exports"),
        }
    }

    #[test]
    fn test_defaults_only() {
        let config = ScanConfig::resolve(defaults(), ConfigLayer::default()).unwrap();
        assert_eq!(config.xcodebuild, PathBuf::from("xcodebuild"));
        assert_eq!(config.timeout_seconds, None);
        assert!(config.extra_args.is_empty());
        assert!(!config.fail_on_unmatched);
    }

    #[test]
    fn test_parse_file_layer() {
        let layer = ConfigLayer::from_toml(
            r#"
xcodebuild = "/Applications/Xcode.app/Contents/Developer/usr/bin/xcodebuild"
timeout_seconds = 3600
configuration = "Release"
extra_args = ["-allowProvisioningUpdates"]
fail_on_unmatched = true
"#,
        )
        .unwrap();
        let config = ScanConfig::resolve(defaults(), layer).unwrap();
        assert_eq!(config.timeout_seconds, Some(3600));
        assert_eq!(config.configuration.as_deref(), Some("Release"));
        assert_eq!(config.extra_args, vec!["-allowProvisioningUpdates"]);
        assert!(config.fail_on_unmatched);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            ConfigLayer::from_toml("scheme = \"App\""),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = ConfigLayer {
            output_dir: Some(PathBuf::from("from-file")),
            timeout_seconds: Some(100),
            ..Default::default()
        };
        let cli = ConfigLayer {
            output_dir: Some(PathBuf::from("from-cli")),
            ..Default::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.output_dir, Some(PathBuf::from("from-cli")));
        assert_eq!(merged.timeout_seconds, Some(100));
    }

    #[test]
    fn test_timeout_bounds() {
        let layer = ConfigLayer {
            timeout_seconds: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            ScanConfig::resolve(defaults(), layer),
            Err(ConfigError::Timeout(_))
        ));
    }

    #[test]
    fn test_extra_args_cannot_add_actions() {
        let layer = ConfigLayer {
            extra_args: Some(vec!["build".to_string()]),
            ..Default::default()
        };
        assert!(matches!(
            ScanConfig::resolve(defaults(), layer),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_profiles_dir() {
        let mut d = defaults();
        d.profiles_dir = None;
        assert!(matches!(
            ScanConfig::resolve(d, ConfigLayer::default()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLayer::from_file(Path::new("/nonexistent/.codesign-scan.toml"));
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}
