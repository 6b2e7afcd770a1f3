//! Picking up the newest report a previous run left behind.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::config::ReportConfig;

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("failed to copy report: {0}")]
    Copy(#[source] io::Error),
}

impl SelectError {
    /// Returns just the name of the error, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            SelectError::Copy(_) => "Copy",
        }
    }
}

/// A report file found in the source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub modified: SystemTime,
}

impl Artifact {
    pub fn modified_millis(&self) -> u128 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_millis())
            .unwrap_or(0)
    }

    /// `<mtimeMillis>_<originalFilename>`
    pub fn staged_name(&self) -> String {
        format!("{}_{}", self.modified_millis(), self.file_name)
    }
}

/// Finds report files matching a [`ReportConfig`].
#[derive(Debug, Clone)]
pub struct ArtifactSelector {
    source_directory: PathBuf,
    suffix: String,
}

impl ArtifactSelector {
    pub fn new(config: &ReportConfig) -> ArtifactSelector {
        ArtifactSelector {
            source_directory: config.source_directory.clone(),
            suffix: format!(".{}", config.file_extension),
        }
    }

    /// Every regular file in the source directory whose name ends with the configured
    /// extension, newest first.
    ///
    /// Files with the same modification time are ordered by name. Subdirectories are not
    /// searched.
    pub fn candidates(&self) -> io::Result<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        for entry in fs::read_dir(&self.source_directory)? {
            let Ok(entry) = entry else {
                continue;
            };
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if !file_name.ends_with(&self.suffix) {
                continue;
            }
            let path = entry.path();
            let metadata = match fs::metadata(&path) {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let Ok(modified) = metadata.modified() else {
                trace!("no modification time for {}", path.display());
                continue;
            };
            artifacts.push(Artifact {
                path,
                file_name,
                modified,
            });
        }
        artifacts.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(artifacts)
    }

    /// The newest candidate, or `None` if there is none or the source directory can't be
    /// listed.
    pub fn select(&self) -> Option<Artifact> {
        match self.candidates() {
            Ok(candidates) => candidates.into_iter().next(),
            Err(e) => {
                debug!(
                    "couldn't list report directory {}: {e}",
                    self.source_directory.display()
                );
                None
            }
        }
    }

    /// Copy the newest candidate into `destination`, returning the new path.
    pub fn stage(&self, destination: &Path) -> Result<Option<PathBuf>, SelectError> {
        let Some(artifact) = self.select() else {
            return Ok(None);
        };
        let staged = destination.join(artifact.staged_name());

        let mut source = File::open(&artifact.path).map_err(SelectError::Copy)?;
        let mut temp = NamedTempFile::new_in(destination).map_err(SelectError::Copy)?;
        io::copy(&mut source, &mut temp).map_err(SelectError::Copy)?;
        temp.persist(&staged)
            .map_err(|e| SelectError::Copy(e.error))?;
        debug!(
            "staged {} as {}",
            artifact.path.display(),
            staged.display()
        );
        Ok(Some(staged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, millis: u64) {
        let file = File::create(dir.join(name)).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_millis(millis))
            .unwrap();
    }

    fn selector(dir: &Path, extension: &str) -> ArtifactSelector {
        ArtifactSelector::new(&ReportConfig {
            source_directory: dir.to_owned(),
            file_extension: extension.to_owned(),
        })
    }

    #[test]
    fn test_newest_wins() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "old.json", 1_000);
        touch(dir.path(), "new.json", 3_000);
        touch(dir.path(), "newer.txt", 5_000);
        fs::create_dir(dir.path().join("newest.json")).unwrap();

        let artifact = selector(dir.path(), "json").select().unwrap();
        assert_eq!(artifact.file_name, "new.json");
        assert_eq!(artifact.staged_name(), "3000_new.json");
    }

    #[test]
    fn test_ties_break_by_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.log", 1_000);
        touch(dir.path(), "a.log", 1_000);
        let names: Vec<_> = selector(dir.path(), "log")
            .candidates()
            .unwrap()
            .into_iter()
            .map(|a| a.file_name)
            .collect();
        assert_eq!(names, vec!["a.log", "b.log"]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let selector = selector(&dir.path().join("nope"), "json");
        assert!(selector.candidates().is_err());
        assert!(selector.select().is_none());
        assert_eq!(selector.stage(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_stage() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        fs::write(source.path().join("crash.dmp"), b"MDMP").unwrap();
        File::options()
            .write(true)
            .open(source.path().join("crash.dmp"))
            .unwrap()
            .set_modified(UNIX_EPOCH + Duration::from_millis(1_234))
            .unwrap();

        let staged = selector(source.path(), "dmp")
            .stage(destination.path())
            .unwrap()
            .unwrap();
        assert_eq!(staged, destination.path().join("1234_crash.dmp"));
        assert_eq!(fs::read(&staged).unwrap(), b"MDMP");
        assert_eq!(fs::read_dir(destination.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_stage_leaves_nothing_behind() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        touch(source.path(), "crash.dmp", 1_234);
        // the staged name is already taken by a directory
        fs::create_dir(destination.path().join("1234_crash.dmp")).unwrap();

        let err = selector(source.path(), "dmp")
            .stage(destination.path())
            .unwrap_err();
        assert_eq!(err.name(), "Copy");
        let names: Vec<_> = fs::read_dir(destination.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["1234_crash.dmp"]);
    }
}
