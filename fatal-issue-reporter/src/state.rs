use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;

/// Telemetry field carrying the [`ReporterState`].
pub const STATE_FIELD: &str = "_fatal_issue_reporting_state";
/// Telemetry field carrying how long the prior-run pass took, in milliseconds.
pub const DURATION_FIELD: &str = "_fatal_issue_reporting_duration_ms";
/// Telemetry field carrying the name of the thread that started the pass.
pub const INIT_THREAD_FIELD: &str = "_fatal_reporter_init_thread";

/// How the prior-run pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Sent,
    WithoutPriorCrash,
    MissingConfigFile,
    MalformedConfigFile,
    ProcessingFailure(String),
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Sent => f.write_str("CRASH_REPORT_SENT"),
            Resolution::WithoutPriorCrash => f.write_str("NO_PRIOR_CRASHES"),
            Resolution::MissingConfigFile => f.write_str("MISSING_CRASH_CONFIG_FILE"),
            Resolution::MalformedConfigFile => f.write_str("MALFORMED_CRASH_CONFIG_FILE"),
            Resolution::ProcessingFailure(message) => {
                write!(f, "CRASH_PROCESSING_FAILURE: {message}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReporterState {
    #[default]
    NotInitialized,
    Initializing,
    Initialized(Resolution),
}

impl fmt::Display for ReporterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReporterState::NotInitialized => f.write_str("NOT_INITIALIZED"),
            ReporterState::Initializing => f.write_str("INITIALIZING"),
            ReporterState::Initialized(resolution) => fmt::Display::fmt(resolution, f),
        }
    }
}

/// A snapshot of the reporter's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReporterStatus {
    pub state: ReporterState,
    /// Only set once the pass has finished.
    pub duration: Option<Duration>,
    pub init_thread: Option<String>,
}

impl ReporterStatus {
    /// Fractional milliseconds, or `n/a` before the pass has finished.
    pub fn duration_field(&self) -> String {
        match self.duration {
            Some(duration) => format!("{:?}", duration.as_nanos() as f64 / 1_000_000.0),
            None => "n/a".to_owned(),
        }
    }

    /// The startup telemetry fields.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let init_thread = match &self.init_thread {
            Some(thread) => thread.clone(),
            None => ReporterState::NotInitialized.to_string(),
        };
        vec![
            (STATE_FIELD, self.state.to_string()),
            (DURATION_FIELD, self.duration_field()),
            (INIT_THREAD_FIELD, init_thread),
        ]
    }
}

/// Holds a reporter's status so it can be read from any thread.
///
/// The state moves forward exactly once: `NotInitialized` to `Initializing` to
/// `Initialized`.
#[derive(Debug, Default)]
pub struct StatusHolder {
    status: Mutex<ReporterStatus>,
}

impl StatusHolder {
    pub fn new() -> StatusHolder {
        StatusHolder::default()
    }

    pub fn snapshot(&self) -> ReporterStatus {
        self.status.lock().clone()
    }

    /// Claim the pass for `thread`. Returns `false` if it was already claimed.
    pub fn begin(&self, thread: &str) -> bool {
        let mut status = self.status.lock();
        if status.state != ReporterState::NotInitialized {
            return false;
        }
        status.state = ReporterState::Initializing;
        status.init_thread = Some(thread.to_owned());
        true
    }

    pub fn finish(&self, resolution: Resolution, duration: Duration) {
        let mut status = self.status.lock();
        status.state = ReporterState::Initialized(resolution);
        status.duration = Some(duration);
    }
}
