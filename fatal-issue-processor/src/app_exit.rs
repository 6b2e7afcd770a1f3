//! Android `ApplicationExitInfo` records.
//!
//! On launch, Android reports why previous processes of the app died. Two reasons are turned
//! into reports: ANRs, whose trace is the text dump `debuggerd` writes for the process, and
//! native crashes, whose trace is a protobuf tombstone (see [`crate::tombstone`]).

use std::sync::OnceLock;
use std::time::SystemTime;

use regex::Regex;
use tracing::debug;

use crate::report::{Error, ErrorRelation, FatalIssueType, Frame, Report, ReportMetadata};
use crate::tombstone::{decode_tombstone, tombstone_report};
use crate::ProcessError;

/// `ApplicationExitInfo.REASON_CRASH_NATIVE`
pub const REASON_CRASH_NATIVE: i32 = 5;
/// `ApplicationExitInfo.REASON_ANR`
pub const REASON_ANR: i32 = 6;

/// One `ApplicationExitInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppExitInfo {
    pub reason: i32,
    pub description: Option<String>,
    pub time: SystemTime,
    /// The contents of `getTraceInputStream()`, empty if there was none.
    pub trace: Vec<u8>,
}

impl AppExitInfo {
    /// The kind of issue this exit is reported as, if any.
    pub fn issue_type(&self) -> Option<FatalIssueType> {
        match self.reason {
            REASON_ANR => Some(FatalIssueType::Anr),
            REASON_CRASH_NATIVE => Some(FatalIssueType::NativeCrash),
            _ => None,
        }
    }
}

/// The category an ANR falls in, derived from the exit description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnrReason {
    /// Every flavor of "Input dispatching timed out".
    UserPerceived,
    BroadcastReceiver,
    ExecutingService,
    StartForegroundNotCalled,
    ContentProvider,
    AppRegistered,
    ShortFgsTimeout,
    JobService,
    AppStart,
    ServiceStart,
    Generic,
}

impl AnrReason {
    pub fn from_description(description: Option<&str>) -> AnrReason {
        const PATTERNS: &[(&str, AnrReason)] = &[
            ("input dispatching timed out", AnrReason::UserPerceived),
            ("broadcast of intent", AnrReason::BroadcastReceiver),
            ("executing service", AnrReason::ExecutingService),
            ("service.startforeground() not called", AnrReason::StartForegroundNotCalled),
            ("content provider timeout", AnrReason::ContentProvider),
            ("app registered timeout", AnrReason::AppRegistered),
            ("short fgs timeout", AnrReason::ShortFgsTimeout),
            ("job service timeout", AnrReason::JobService),
            ("app start timeout", AnrReason::AppStart),
            ("service start timeout", AnrReason::ServiceStart),
        ];

        let Some(description) = description else {
            return AnrReason::Generic;
        };
        let description = description.to_lowercase();
        PATTERNS
            .iter()
            .find(|(pattern, _)| description.contains(pattern))
            .map(|&(_, reason)| reason)
            .unwrap_or(AnrReason::Generic)
    }

    pub fn message(self) -> &'static str {
        match self {
            AnrReason::UserPerceived => "User Perceived ANR",
            AnrReason::BroadcastReceiver => "Broadcast Receiver ANR",
            AnrReason::ExecutingService => "Executing Service ANR",
            AnrReason::StartForegroundNotCalled => "Service.startForeground() Not Called ANR",
            AnrReason::ContentProvider => "Content Provider ANR",
            AnrReason::AppRegistered => "App Registered ANR",
            AnrReason::ShortFgsTimeout => "Short Foreground Service Timeout ANR",
            AnrReason::JobService => "Job Service ANR",
            AnrReason::AppStart => "App Start ANR",
            AnrReason::ServiceStart => "Service Start ANR",
            AnrReason::Generic => "Generic ANR",
        }
    }
}

fn stack_frame_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^\s+at\s+(.*)\.(.*)\((.*):(\d+)\)$").expect("stack frame regex is valid")
    })
}

/// The frames of the `"main"` thread in an ANR trace dump.
///
/// The main thread's block starts at the line beginning with `"main"` and ends at the next
/// empty line. Frames without a file and line (native methods, for instance) are skipped.
pub fn main_thread_frames(trace: &str) -> Vec<Frame> {
    let mut in_main = false;
    let mut frames = Vec::new();
    for line in trace.lines() {
        if line.starts_with("\"main\"") {
            in_main = true;
        } else if in_main && line.is_empty() {
            in_main = false;
        }
        if !in_main || !line.trim().starts_with("at ") {
            continue;
        }
        let Some(captures) = stack_frame_regex().captures(line) else {
            continue;
        };
        frames.push(Frame::jvm(
            &captures[1],
            &captures[2],
            Some(&captures[3]),
            captures[4].parse().unwrap_or(0),
        ));
    }
    frames
}

pub fn anr_report(info: &AppExitInfo, metadata: &ReportMetadata) -> Report {
    let trace = String::from_utf8_lossy(&info.trace);
    let frames = main_thread_frames(&trace);
    debug!("found {} main thread frames in ANR trace", frames.len());

    Report {
        issue_type: FatalIssueType::Anr,
        time: info.time,
        errors: vec![Error {
            name: info.description.clone().unwrap_or_default(),
            reason: AnrReason::from_description(info.description.as_deref())
                .message()
                .to_owned(),
            stack_trace: frames,
            relation: ErrorRelation::CausedBy,
        }],
        thread_details: None,
        binary_images: Vec::new(),
        metadata: metadata.clone(),
    }
}

/// Build a report for an exit record, or `None` if its reason isn't reported.
pub fn app_exit_report(
    info: &AppExitInfo,
    metadata: &ReportMetadata,
) -> Result<Option<Report>, ProcessError> {
    match info.issue_type() {
        Some(FatalIssueType::Anr) => Ok(Some(anr_report(info, metadata))),
        Some(_) => {
            let tombstone = decode_tombstone(&info.trace)?;
            Ok(Some(tombstone_report(
                &tombstone,
                info.description.as_deref(),
                info.time,
                metadata,
            )))
        }
        None => {
            debug!("ignoring app exit with reason {}", info.reason);
            Ok(None)
        }
    }
}
