//! Stages the fatal issue reports left behind by previous runs of an app.
//!
//! On startup a [`FatalIssueReporter`] reads the report config directive under the SDK
//! directory (see [`config`]), copies the newest matching report into the staging directory
//! for upload, and records how that went as a [`Resolution`] for startup telemetry.
//!
//! Diagnostics delivered while the app runs are turned into reports by
//! `fatal-issue-processor` and staged next to them, see
//! [`FatalIssueReporter::stage_diagnostic`].
//!
//! ```no_run
//! use fatal_issue_reporter::{FatalIssueReporter, HostDirectories, ReporterOptions};
//!
//! let directories = HostDirectories::detect("io.example.app", "Example");
//! let reporter = FatalIssueReporter::new(ReporterOptions::new("/data/sdk", directories));
//! let worker = reporter.spawn().unwrap();
//! // ... start the app ...
//! worker.join().unwrap();
//! for (key, value) in reporter.log_fields() {
//!     println!("{key}: {value}");
//! }
//! ```

pub mod config;
mod reporter;
pub mod selector;
mod state;

pub use config::{ConfigError, HostDirectories, ReportConfig};
pub use reporter::*;
pub use state::*;
