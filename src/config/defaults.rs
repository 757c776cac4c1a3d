//! Built-in defaults (layer 1)

use std::path::PathBuf;

use crate::profiles::default_profiles_dir;

/// Default xcodebuild executable, resolved through `PATH`
pub const DEFAULT_XCODEBUILD: &str = "xcodebuild";

/// Default export directory, relative to the working directory
pub const DEFAULT_OUTPUT_DIR: &str = "codesigndoc_exports";

/// Config file picked up from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = ".codesign-scan.toml";

/// Built-in default configuration values
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    pub xcodebuild: PathBuf,
    pub profiles_dir: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            xcodebuild: PathBuf::from(DEFAULT_XCODEBUILD),
            profiles_dir: default_profiles_dir(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}
