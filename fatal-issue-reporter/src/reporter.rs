use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, warn};

use fatal_issue_processor::diagnostic::RawDiagnostic;
use fatal_issue_processor::enhance::CrashRecord;
use fatal_issue_processor::metrickit::{DiagnosticEventReporter, DiagnosticPayload};
use fatal_issue_processor::storage::{ReportWriter, StorageError};
use fatal_issue_processor::{process_diagnostic, ProcessError, ProcessorOptions, ReportMetadata};

use crate::config::{ConfigError, HostDirectories, ReportConfig};
use crate::selector::ArtifactSelector;
use crate::state::{ReporterStatus, Resolution, StatusHolder};

/// The config directive, relative to the SDK root.
pub const CONFIG_PATH: &str = "reports/config";
/// The staging directory, relative to the SDK root.
pub const STAGING_PATH: &str = "reports/new";

const WORKER_THREAD_NAME: &str = "fatal-issue-reporter";

/// An error staging a live diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StageError {
    /// Returns just the name of the error, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            StageError::Process(e) => e.name(),
            StageError::Storage(e) => e.name(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReporterOptions {
    /// The directory holding `reports/config` and `reports/new`.
    pub sdk_root: PathBuf,
    pub directories: HostDirectories,
    /// Attached to reports built by [`FatalIssueReporter::stage_diagnostic`].
    pub metadata: ReportMetadata,
    pub processor: ProcessorOptions,
}

impl ReporterOptions {
    pub fn new(sdk_root: impl Into<PathBuf>, directories: HostDirectories) -> ReporterOptions {
        ReporterOptions {
            sdk_root: sdk_root.into(),
            directories,
            metadata: ReportMetadata::default(),
            processor: ProcessorOptions::default(),
        }
    }
}

impl From<ConfigError> for Resolution {
    fn from(err: ConfigError) -> Resolution {
        match err {
            ConfigError::Missing(_) => Resolution::MissingConfigFile,
            ConfigError::NotUtf8(_) | ConfigError::Malformed(_) => Resolution::MalformedConfigFile,
            ConfigError::Unreadable(..) => Resolution::ProcessingFailure(err.to_string()),
        }
    }
}

/// Stages the fatal issue reports of previous runs for upload.
///
/// Each process runs the prior-run pass once, with [`process_prior_reports`] or
/// [`spawn`]. Nothing it does fails: every problem ends up in the [`Resolution`] reported
/// through [`status`] and [`log_fields`].
///
/// Clones share the same status.
///
/// [`process_prior_reports`]: FatalIssueReporter::process_prior_reports
/// [`spawn`]: FatalIssueReporter::spawn
/// [`status`]: FatalIssueReporter::status
/// [`log_fields`]: FatalIssueReporter::log_fields
#[derive(Debug, Clone)]
pub struct FatalIssueReporter {
    options: Arc<ReporterOptions>,
    status: Arc<StatusHolder>,
}

impl FatalIssueReporter {
    pub fn new(options: ReporterOptions) -> FatalIssueReporter {
        FatalIssueReporter::with_status(options, Arc::new(StatusHolder::new()))
    }

    /// A reporter recording its progress in `status`.
    pub fn with_status(options: ReporterOptions, status: Arc<StatusHolder>) -> FatalIssueReporter {
        FatalIssueReporter {
            options: Arc::new(options),
            status,
        }
    }

    pub fn options(&self) -> &ReporterOptions {
        &self.options
    }

    pub fn config_path(&self) -> PathBuf {
        self.options.sdk_root.join(CONFIG_PATH)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.options.sdk_root.join(STAGING_PATH)
    }

    /// Run the prior-run pass on the current thread.
    ///
    /// Only the first call does anything, later calls just return the current status.
    pub fn process_prior_reports(&self) -> ReporterStatus {
        let caller = thread_name(&thread::current());
        self.process_as(&caller)
    }

    /// Run the prior-run pass on a new worker thread.
    ///
    /// The calling thread is the one recorded as having initialized the reporter.
    pub fn spawn(&self) -> io::Result<JoinHandle<ReporterStatus>> {
        let caller = thread_name(&thread::current());
        let reporter = self.clone();
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || reporter.process_as(&caller))
    }

    fn process_as(&self, caller: &str) -> ReporterStatus {
        if !self.status.begin(caller) {
            warn!("fatal issue reporting is already initialized");
            return self.status.snapshot();
        }

        let start = Instant::now();
        let resolution = self.resolve();
        let duration = start.elapsed();
        match &resolution {
            Resolution::ProcessingFailure(message) => error!("{message}"),
            resolution => debug!("prior-run pass finished in {duration:?}: {resolution}"),
        }
        self.status.finish(resolution, duration);
        self.status.snapshot()
    }

    fn resolve(&self) -> Resolution {
        let config = match ReportConfig::read(&self.config_path(), &self.options.directories) {
            Ok(config) => config,
            Err(e) => {
                debug!("{} - {}", e.name(), e);
                return e.into();
            }
        };
        debug!(
            "looking for .{} reports in {}",
            config.file_extension,
            config.source_directory.display()
        );

        let staging_dir = self.staging_dir();
        if let Err(e) = fs::create_dir_all(&staging_dir) {
            return Resolution::ProcessingFailure(format!(
                "failed to create upload directory: {e}"
            ));
        }

        match ArtifactSelector::new(&config).stage(&staging_dir) {
            Ok(Some(_)) => Resolution::Sent,
            Ok(None) => Resolution::WithoutPriorCrash,
            Err(e) => Resolution::ProcessingFailure(e.to_string()),
        }
    }

    pub fn status(&self) -> ReporterStatus {
        self.status.snapshot()
    }

    /// The startup telemetry fields for the current status.
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        self.status.snapshot().fields()
    }

    /// Build a report for a diagnostic delivered while the app is running and stage it.
    ///
    /// Returns `None` if the diagnostic doesn't warrant a report.
    pub fn stage_diagnostic(&self, diagnostic: &RawDiagnostic) -> Result<Option<PathBuf>, StageError> {
        let Some(report) =
            process_diagnostic(diagnostic, &self.options.metadata, &self.options.processor)?
        else {
            return Ok(None);
        };
        let path = ReportWriter::new(self.staging_dir()).write(&report)?;
        Ok(Some(path))
    }

    /// Stage a report for every accepted diagnostic in a MetricKit payload.
    pub fn stage_metrickit_payload(
        &self,
        payload: &DiagnosticPayload,
        crash_record: Option<CrashRecord>,
    ) -> Vec<PathBuf> {
        let mut reporter = DiagnosticEventReporter::new(
            self.staging_dir(),
            self.options.metadata.clone(),
            self.options.processor.clone(),
        );
        if let Some(record) = crash_record {
            reporter.set_crash_record(record);
        }
        reporter.did_receive(std::slice::from_ref(payload))
    }
}

fn thread_name(thread: &thread::Thread) -> String {
    match thread.name() {
        Some(name) => name.to_owned(),
        None => format!("{:?}", thread.id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ReporterState;
    use std::path::Path;
    use fatal_issue_processor::jvm::{JvmCrash, StackTraceElement, Throwable};
    use std::time::SystemTime;

    fn reporter(sdk_root: &Path) -> FatalIssueReporter {
        let directories = HostDirectories {
            cache_dir: sdk_root.join("cache"),
            ..HostDirectories::default()
        };
        FatalIssueReporter::new(ReporterOptions::new(sdk_root, directories))
    }

    #[test]
    fn test_runs_once() {
        let root = tempfile::tempdir().unwrap();
        let reporter = reporter(root.path());
        let first = reporter.process_prior_reports();
        assert_eq!(
            first.state,
            ReporterState::Initialized(Resolution::MissingConfigFile)
        );
        // nothing is created without a config
        assert!(!reporter.staging_dir().exists());

        fs::create_dir_all(reporter.staging_dir()).unwrap();
        fs::write(reporter.config_path(), "{cache_dir},json").unwrap();
        let second = reporter.clone().process_prior_reports();
        assert_eq!(second, first);
    }

    #[test]
    fn test_spawn_records_caller() {
        let root = tempfile::tempdir().unwrap();
        let reporter = reporter(root.path());
        let caller = thread_name(&thread::current());
        let status = reporter.spawn().unwrap().join().unwrap();
        assert_eq!(status.init_thread.as_deref(), Some(caller.as_str()));
        assert_eq!(reporter.status(), status);
    }

    #[test]
    fn test_unreadable_config_is_a_failure() {
        let resolution = Resolution::from(ConfigError::Unreadable(
            PathBuf::from("config"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        ));
        assert!(matches!(resolution, Resolution::ProcessingFailure(_)));
    }

    #[test]
    fn test_stage_diagnostic() {
        let root = tempfile::tempdir().unwrap();
        let reporter = reporter(root.path());
        let crash = RawDiagnostic::JvmCrash(JvmCrash {
            time: SystemTime::UNIX_EPOCH,
            throwable: Throwable {
                class_name: "java.lang.IllegalStateException".to_owned(),
                message: Some("boom".to_owned()),
                stack_trace: vec![StackTraceElement {
                    class_name: "io.example.Main".to_owned(),
                    method_name: "run".to_owned(),
                    file_name: Some("Main.kt".to_owned()),
                    line_number: 3,
                }],
                cause: None,
            },
            crashing_thread: 1,
            threads: Vec::new(),
        });
        let path = reporter.stage_diagnostic(&crash).unwrap().unwrap();
        assert!(path.starts_with(reporter.staging_dir()));
        assert_eq!(path.extension().unwrap(), "cap");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("0_crash_"), "{name}");
    }
}
