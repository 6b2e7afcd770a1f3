//! Staging report artifacts on disk.
//!
//! Each report is written to its own file named `<millis>_<label>_<uuid>.cap`, where
//! `<millis>` is the report time and `<label>` is one of `crash`, `native_crash` or `anr`.
//! Files are written under a temporary name and renamed into place so an uploader scanning
//! the directory never sees a partial artifact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use tempfile::NamedTempFile;
use tracing::{debug, trace};
use uuid::Uuid;

use fatal_issue_common::format::REPORT_FILE_EXTENSION;

use crate::report::Report;
use crate::ProcessError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Couldn't create report directory {0}: {1}")]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("Couldn't write report {0}: {1}")]
    Write(PathBuf, #[source] io::Error),
    #[error("Couldn't read report {0}: {1}")]
    Read(PathBuf, #[source] io::Error),
    #[error("Report {0} is invalid: {1}")]
    Invalid(PathBuf, #[source] ProcessError),
}

impl StorageError {
    /// Returns just the name of the error, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            StorageError::CreateDir(..) => "CreateDir",
            StorageError::Write(..) => "Write",
            StorageError::Read(..) => "Read",
            StorageError::Invalid(..) => "Invalid",
        }
    }
}

/// The file name a report is staged under.
pub fn report_file_name(report: &Report) -> String {
    let millis = report
        .time
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis();
    format!(
        "{millis}_{}_{}.{REPORT_FILE_EXTENSION}",
        report.issue_type.file_label(),
        Uuid::new_v4()
    )
}

/// Writes reports into a staging directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> ReportWriter {
        ReportWriter { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encode `report` into a new file in the staging directory, creating the directory if
    /// needed. Returns the path of the new file.
    pub fn write(&self, report: &Report) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.dir).map_err(|e| StorageError::CreateDir(self.dir.clone(), e))?;

        let path = self.dir.join(report_file_name(report));
        let bytes = report.encode_to_vec();
        trace!("encoded {} report into {} bytes", report.issue_type, bytes.len());

        // the temp file is removed again if anything below fails
        let mut temp =
            NamedTempFile::new_in(&self.dir).map_err(|e| StorageError::Write(path.clone(), e))?;
        temp.write_all(&bytes)
            .map_err(|e| StorageError::Write(temp.path().to_owned(), e))?;
        temp.persist_noclobber(&path)
            .map_err(|e| StorageError::Write(path.clone(), e.error))?;
        debug!("staged {} report at {}", report.issue_type, path.display());
        Ok(path)
    }
}

/// Read back a staged report.
pub fn read_report(path: &Path) -> Result<Report, StorageError> {
    let bytes = fs::read(path).map_err(|e| StorageError::Read(path.to_owned(), e))?;
    Report::decode(&bytes).map_err(|e| StorageError::Invalid(path.to_owned(), e))
}

/// Every staged report in `dir`, oldest first by file name.
pub fn staged_reports(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let entries = fs::read_dir(dir).map_err(|e| StorageError::Read(dir.to_owned(), e))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|extension| extension == REPORT_FILE_EXTENSION)
        })
        .collect();
    paths.sort();
    Ok(paths)
}
