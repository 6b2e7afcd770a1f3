//! The report config directive.
//!
//! An integration that writes its own crash reports tells the reporter where to find them with
//! a one-line file at `<sdk_root>/reports/config`:
//!
//! ```text
//! {cache_dir}/the-files/{bundle_id}/reports,json
//! ```
//!
//! Everything before the first comma is the directory holding the reports, everything after
//! it is their file extension. Both are trimmed. The directory may use these placeholders:
//!
//! * `{cache_dir}`
//! * `{files_dir}`
//! * `{data_dir}`, also spelled `{support_dir}`
//! * `{bundle_id}`
//! * `{bundle_name}`
//!
//! Unknown placeholders are left in place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No report config at {0}")]
    Missing(PathBuf),
    #[error("Couldn't read report config {0}: {1}")]
    Unreadable(PathBuf, #[source] io::Error),
    #[error("Report config {0} is not valid UTF-8")]
    NotUtf8(PathBuf),
    #[error("Report config is malformed: {0}")]
    Malformed(&'static str),
}

impl ConfigError {
    /// Returns just the name of the error, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigError::Missing(_) => "Missing",
            ConfigError::Unreadable(..) => "Unreadable",
            ConfigError::NotUtf8(_) => "NotUtf8",
            ConfigError::Malformed(_) => "Malformed",
        }
    }
}

/// The directories and identifiers of the host app that placeholders resolve to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostDirectories {
    pub cache_dir: PathBuf,
    pub files_dir: PathBuf,
    /// Application support directory on Apple platforms.
    pub data_dir: PathBuf,
    pub bundle_id: String,
    pub bundle_name: String,
}

impl HostDirectories {
    /// The current user's platform directories.
    ///
    /// Directories the platform doesn't have fall back to the system temp directory.
    pub fn detect(bundle_id: impl Into<String>, bundle_name: impl Into<String>) -> HostDirectories {
        let cache_dir = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        let data_dir = dirs::data_dir().unwrap_or_else(|| cache_dir.clone());
        let files_dir = dirs::data_local_dir().unwrap_or_else(|| data_dir.clone());
        HostDirectories {
            cache_dir,
            files_dir,
            data_dir,
            bundle_id: bundle_id.into(),
            bundle_name: bundle_name.into(),
        }
    }

    fn resolve(&self, placeholder: &str) -> Option<String> {
        let dir = |path: &Path| path.to_string_lossy().into_owned();
        match placeholder {
            "cache_dir" => Some(dir(&self.cache_dir)),
            "files_dir" => Some(dir(&self.files_dir)),
            "data_dir" | "support_dir" => Some(dir(&self.data_dir)),
            "bundle_id" => Some(self.bundle_id.clone()),
            "bundle_name" => Some(self.bundle_name.clone()),
            _ => None,
        }
    }

    /// Replace every placeholder in `template`.
    pub fn expand(&self, template: &str) -> String {
        let mut expanded = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            expanded.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find(['{', '}']).filter(|&i| after.as_bytes()[i] == b'}') else {
                // not a placeholder, keep the brace and look again after it
                expanded.push('{');
                rest = after;
                continue;
            };
            let name = &after[..close];
            match self.resolve(name) {
                Some(value) => expanded.push_str(&value),
                None => {
                    warn!("unresolved placeholder {{{name}}} in report config");
                    expanded.push('{');
                    expanded.push_str(name);
                    expanded.push('}');
                }
            }
            rest = &after[close + 1..];
        }
        expanded.push_str(rest);
        expanded
    }
}

/// Where a previous run's crash reports live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub source_directory: PathBuf,
    /// Without the leading dot.
    pub file_extension: String,
}

impl ReportConfig {
    /// Parse the directive in `text`.
    ///
    /// Only the first non-blank line is considered. A relative directory is taken relative to
    /// the cache directory.
    pub fn parse(text: &str, directories: &HostDirectories) -> Result<ReportConfig, ConfigError> {
        let line = text
            .lines()
            .find(|line| !line.trim().is_empty())
            .ok_or(ConfigError::Malformed("empty directive"))?;
        let (path, extension) = line
            .split_once(',')
            .ok_or(ConfigError::Malformed("expected `<directory>,<extension>`"))?;

        let path = path.trim();
        let extension = extension.trim();
        if path.is_empty() {
            return Err(ConfigError::Malformed("empty directory"));
        }
        if extension.is_empty() {
            return Err(ConfigError::Malformed("empty extension"));
        }

        let source_directory = PathBuf::from(directories.expand(path));
        let source_directory = if source_directory.is_relative() {
            directories.cache_dir.join(source_directory)
        } else {
            source_directory
        };

        Ok(ReportConfig {
            source_directory,
            file_extension: extension.to_owned(),
        })
    }

    /// Read and parse the directive file at `path`.
    pub fn read(path: &Path, directories: &HostDirectories) -> Result<ReportConfig, ConfigError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            // also covers a path running through something that isn't a directory
            Err(e) if e.kind() == io::ErrorKind::NotFound || !path.exists() => {
                return Err(ConfigError::Missing(path.to_owned()))
            }
            Err(e) => return Err(ConfigError::Unreadable(path.to_owned(), e)),
        };
        let text = String::from_utf8(bytes).map_err(|_| ConfigError::NotUtf8(path.to_owned()))?;
        ReportConfig::parse(&text, directories)
    }
}
