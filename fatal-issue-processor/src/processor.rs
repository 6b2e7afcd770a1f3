use std::time::Duration;

use bitflags::bitflags;
use tracing::debug;

use crate::app_exit::app_exit_report;
use crate::diagnostic::RawDiagnostic;
use crate::jvm::jvm_crash_report;
use crate::metrickit::{crash_report, hang_report};
use crate::report::{FatalIssueType, Report, ReportMetadata};

bitflags! {
    /// Which kinds of fatal issue are turned into reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventTypes: u8 {
        /// JVM crashes and every Apple crash diagnostic, watchdog terminations included.
        const CRASH = 1 << 0;
        /// Apple hangs and Android ANRs.
        const HANG = 1 << 1;
    }
}

impl EventTypes {
    /// The category that enables reports for `diagnostic`.
    ///
    /// Apple crash diagnostics are crashes even when they turn out to be watchdog
    /// terminations.
    pub fn for_diagnostic(diagnostic: &RawDiagnostic) -> EventTypes {
        match diagnostic {
            RawDiagnostic::AppleCrash(_) | RawDiagnostic::JvmCrash(_) => EventTypes::CRASH,
            RawDiagnostic::AppleHang(_) => EventTypes::HANG,
            RawDiagnostic::AppExit(info) => match info.issue_type() {
                Some(FatalIssueType::Anr) => EventTypes::HANG,
                _ => EventTypes::CRASH,
            },
        }
    }
}

impl Default for EventTypes {
    fn default() -> EventTypes {
        EventTypes::all()
    }
}

/// The hang duration below which hang diagnostics are discarded unless configured otherwise.
pub const DEFAULT_MINIMUM_HANG_DURATION: Duration = Duration::from_millis(2500);

/// Configuration for [`process_diagnostic`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorOptions {
    pub event_types: EventTypes,
    /// Hangs shorter than this are not reported.
    pub minimum_hang_duration: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> ProcessorOptions {
        ProcessorOptions {
            event_types: EventTypes::default(),
            minimum_hang_duration: DEFAULT_MINIMUM_HANG_DURATION,
        }
    }
}

/// An error encountered while turning a diagnostic into a report.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Diagnostic payload could not be parsed: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("Tombstone could not be decoded: {0}")]
    InvalidTombstone(#[source] prost::DecodeError),
    #[error("Report artifact could not be decoded: {0}")]
    InvalidReport(#[from] prost::DecodeError),
    #[error("Report artifact has unknown report type {0}")]
    UnknownReportType(i32),
}

impl ProcessError {
    /// Returns just the name of the error, as a more human-friendly version of
    /// an error-code for error logging.
    pub fn name(&self) -> &'static str {
        match self {
            ProcessError::InvalidPayload(_) => "InvalidPayload",
            ProcessError::InvalidTombstone(_) => "InvalidTombstone",
            ProcessError::InvalidReport(_) => "InvalidReport",
            ProcessError::UnknownReportType(_) => "UnknownReportType",
        }
    }
}

/// Turn a raw diagnostic into a report.
///
/// Returns `Ok(None)` when the diagnostic doesn't warrant a report: its kind is disabled in
/// `options`, it is a hang shorter than the configured minimum, or it is an app exit for a
/// reason that isn't reported.
pub fn process_diagnostic(
    diagnostic: &RawDiagnostic,
    metadata: &ReportMetadata,
    options: &ProcessorOptions,
) -> Result<Option<Report>, ProcessError> {
    let required = EventTypes::for_diagnostic(diagnostic);
    if !options.event_types.contains(required) {
        debug!("{} reporting is disabled", diagnostic.kind());
        return Ok(None);
    }

    Ok(match diagnostic {
        RawDiagnostic::AppleCrash(crash) => Some(crash_report(crash, metadata)),
        RawDiagnostic::AppleHang(hang) => hang_report(hang, metadata, options.minimum_hang_duration),
        RawDiagnostic::JvmCrash(crash) => Some(jvm_crash_report(crash, metadata)),
        RawDiagnostic::AppExit(info) => app_exit_report(info, metadata)?,
    })
}
