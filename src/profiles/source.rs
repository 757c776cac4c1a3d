//! Discovery of candidate profile files.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::decode::ProfileFormat;
use super::{ProfileDecodeWarning, ProfileWarningKind};

/// Location of installed profiles relative to `$HOME`
pub const PROFILES_SUBDIR: &str = "Library/MobileDevice/Provisioning Profiles";

/// The directory Xcode installs profiles into, when `$HOME` is known.
pub fn default_profiles_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(PROFILES_SUBDIR))
}

/// Failure enumerating a profile source
#[derive(Debug, thiserror::Error)]
pub enum ProfileSourceError {
    #[error("failed to list profiles in {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Candidate files in discovery order, plus entries that could not be read.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub paths: Vec<PathBuf>,
    pub skipped: Vec<ProfileDecodeWarning>,
}

/// Produces the candidate profile files to index.
pub trait ProfileSource {
    fn candidates(&self) -> Result<Candidates, ProfileSourceError>;
}

/// Every profile file directly inside a directory, sorted by file name.
#[derive(Debug, Clone)]
pub struct DirectoryProfileSource {
    root: PathBuf,
}

impl DirectoryProfileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ProfileSource for DirectoryProfileSource {
    /// Only a failure to read the directory itself is an error; a bad
    /// entry is skipped with a warning.
    fn candidates(&self) -> Result<Candidates, ProfileSourceError> {
        let mut candidates = Candidates::default();
        if !self.root.exists() {
            tracing::warn!(dir = %self.root.display(), "profile directory does not exist");
            return Ok(candidates);
        }

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) if source.depth() == 0 => {
                    return Err(ProfileSourceError::Walk {
                        path: self.root.clone(),
                        source,
                    });
                }
                Err(e) => {
                    let path = e.path().map_or_else(|| self.root.clone(), Path::to_path_buf);
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable profile entry");
                    candidates.skipped.push(ProfileDecodeWarning {
                        path,
                        kind: ProfileWarningKind::Unreadable {
                            message: e.to_string(),
                        },
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if ProfileFormat::is_profile_path(entry.path()) {
                candidates.paths.push(entry.into_path());
            } else {
                tracing::debug!(path = %entry.path().display(), "skipping non-profile file");
            }
        }
        Ok(candidates)
    }
}

/// A fixed list of paths.
impl ProfileSource for Vec<PathBuf> {
    fn candidates(&self) -> Result<Candidates, ProfileSourceError> {
        Ok(Candidates {
            paths: self.clone(),
            skipped: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_lists_profiles_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.mobileprovision"), b"b").unwrap();
        fs::write(dir.path().join("a.provisionprofile"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.mobileprovision"), b"c").unwrap();

        let candidates = DirectoryProfileSource::new(dir.path()).candidates().unwrap();
        let names: Vec<_> = candidates
            .paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.provisionprofile", "b.mobileprovision"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryProfileSource::new(dir.path().join("missing"));
        let candidates = source.candidates().unwrap();
        assert!(candidates.paths.is_empty());
        assert!(candidates.skipped.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_entry_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.mobileprovision"), b"a").unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("gone"),
            dir.path().join("b.mobileprovision"),
        )
        .unwrap();
        fs::write(dir.path().join("c.mobileprovision"), b"c").unwrap();

        let candidates = DirectoryProfileSource::new(dir.path()).candidates().unwrap();
        assert_eq!(
            candidates.paths,
            vec![
                dir.path().join("a.mobileprovision"),
                dir.path().join("c.mobileprovision"),
            ]
        );
        assert_eq!(candidates.skipped.len(), 1);
        assert_eq!(
            candidates.skipped[0].path,
            dir.path().join("b.mobileprovision")
        );
        assert!(matches!(
            candidates.skipped[0].kind,
            ProfileWarningKind::Unreadable { .. }
        ));
    }

    #[test]
    fn test_default_profiles_dir_suffix() {
        if let Some(dir) = default_profiles_dir() {
            assert!(dir.ends_with(PROFILES_SUBDIR));
        }
    }
}
