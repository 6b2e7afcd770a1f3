//! MetricKit diagnostic payloads.
//!
//! Apple delivers crash and hang diagnostics for previous runs of the app as
//! `MXDiagnosticPayload`s. This module reads their JSON representation, decides what kind of
//! fatal issue each diagnostic describes and stages one report per accepted diagnostic.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use num_traits::FromPrimitive;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::macros::format_description;
use time::PrimitiveDateTime;
use tracing::{debug, error, warn};

use fatal_issue_common::{ExceptionCodeMac, SignalMac};

use crate::correlator::{correlate, FrameOrder};
use crate::diagnostic::{CallStackTree, RawDiagnostic};
use crate::enhance::{merge_thread_names, CrashRecord};
use crate::processor::{process_diagnostic, EventTypes, ProcessorOptions};
use crate::report::{Error, ErrorRelation, FatalIssueType, Report, ReportMetadata};
use crate::storage::ReportWriter;
use crate::ProcessError;

/// The SDK id reports built from MetricKit payloads carry by default.
pub const APPLE_SDK_ID: &str = "io.bitdrift.capture-apple";

/// Watchdog terminations carry this code in their termination reason ("ate bad food").
const WATCHDOG_CODE: &str = "0x8badf00d";

/// Parse JSON without serde_json's nesting limit, call-stack trees routinely exceed it.
///
/// Deeply nested input grows the stack on the heap instead of overflowing it.
fn from_json<'de, R, T>(
    mut deserializer: serde_json::Deserializer<R>,
) -> Result<T, serde_json::Error>
where
    R: serde_json::de::Read<'de>,
    T: DeserializeOwned,
{
    deserializer.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

pub(crate) fn from_json_str<T: DeserializeOwned>(json: &str) -> Result<T, serde_json::Error> {
    from_json(serde_json::Deserializer::from_str(json))
}

pub(crate) fn from_json_slice<T: DeserializeOwned>(json: &[u8]) -> Result<T, serde_json::Error> {
    from_json(serde_json::Deserializer::from_slice(json))
}

/// Parse a MetricKit timestamp such as `2022-04-07 23:59:00`, interpreted as UTC.
pub fn parse_timestamp(text: &str) -> Option<SystemTime> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(text.trim(), format)
        .map(|time| time.assume_utc().into())
        .map_err(|e| {
            warn!("unparseable MetricKit timestamp {text:?}: {e}");
            e
        })
        .ok()
}

/// `MXCrashDiagnosticObjectiveCExceptionReason`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveCExceptionReason {
    pub exception_name: Option<String>,
    pub composed_message: Option<String>,
    pub exception_type: Option<String>,
    pub class_name: Option<String>,
}

impl ObjectiveCExceptionReason {
    /// `"<ExceptionName>: <message>"`, or whichever half is present.
    pub fn describe(&self) -> Option<String> {
        match (self.exception_name.as_deref(), self.composed_message.as_deref()) {
            (Some(name), Some(message)) => Some(format!("{name}: {message}")),
            (Some(name), None) => Some(name.to_owned()),
            (None, Some(message)) => Some(message.to_owned()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashMetaData {
    pub exception_type: Option<u32>,
    pub exception_code: Option<i64>,
    pub signal: Option<u32>,
    pub termination_reason: Option<String>,
    #[serde(rename = "objectiveCexceptionReason")]
    pub objective_c_exception_reason: Option<ObjectiveCExceptionReason>,
    pub pid: Option<i64>,
    pub app_version: Option<String>,
    pub os_version: Option<String>,
}

/// `MXCrashDiagnostic`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashDiagnostic {
    #[serde(default)]
    pub call_stack_tree: CallStackTree,
    #[serde(default, rename = "diagnosticMetaData")]
    pub meta: CrashMetaData,
    /// End of the payload's reporting window, copied over when a payload is delivered.
    #[serde(skip)]
    pub time: Option<SystemTime>,
}

/// How long a hang lasted. MetricKit writes this either as a number of seconds or as a
/// measurement string like `"1.7 sec"` or `"1700 ms"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HangDuration {
    Seconds(f64),
    Text(String),
}

impl HangDuration {
    pub fn as_duration(&self) -> Option<Duration> {
        let seconds = match self {
            HangDuration::Seconds(seconds) => *seconds,
            HangDuration::Text(text) => {
                let text = text.trim();
                let (value, unit) = text
                    .split_once(char::is_whitespace)
                    .map(|(value, unit)| (value, unit.trim()))
                    .unwrap_or((text, "sec"));
                match unit.to_ascii_lowercase().as_str() {
                    "ms" | "msec" | "milliseconds" => value.replace(',', "").parse::<f64>().ok()? / 1000.0,
                    "s" | "sec" | "secs" | "seconds" => value.replace(',', ".").parse().ok()?,
                    "min" | "minutes" => value.replace(',', ".").parse::<f64>().ok()? * 60.0,
                    _ => {
                        warn!("unknown hang duration unit in {text:?}");
                        return None;
                    }
                }
            }
        };
        Duration::try_from_secs_f64(seconds).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HangMetaData {
    pub hang_duration: Option<HangDuration>,
    pub hang_type: Option<String>,
}

/// `MXHangDiagnostic`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HangDiagnostic {
    #[serde(default)]
    pub call_stack_tree: CallStackTree,
    #[serde(default, rename = "diagnosticMetaData")]
    pub meta: HangMetaData,
    pub hang_type: Option<String>,
    #[serde(skip)]
    pub time: Option<SystemTime>,
}

impl HangDiagnostic {
    pub fn duration(&self) -> Option<Duration> {
        self.meta.hang_duration.as_ref()?.as_duration()
    }

    pub fn hang_type(&self) -> Option<&str> {
        let non_empty = |hang_type: &&str| !hang_type.is_empty();
        self.hang_type
            .as_deref()
            .filter(non_empty)
            .or_else(|| self.meta.hang_type.as_deref().filter(non_empty))
    }
}

/// `MXDiagnosticPayload`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticPayload {
    pub time_stamp_begin: Option<String>,
    pub time_stamp_end: Option<String>,
    #[serde(default)]
    pub crash_diagnostics: Vec<CrashDiagnostic>,
    #[serde(default)]
    pub hang_diagnostics: Vec<HangDiagnostic>,
}

impl DiagnosticPayload {
    pub fn from_slice(json: &[u8]) -> Result<DiagnosticPayload, ProcessError> {
        Ok(from_json_slice(json)?)
    }

    pub fn time(&self) -> Option<SystemTime> {
        self.time_stamp_end.as_deref().and_then(parse_timestamp)
    }

    /// Every diagnostic in this payload, crashes first, stamped with the payload's end time.
    pub fn diagnostics(&self) -> Vec<RawDiagnostic> {
        let time = self.time();
        let crashes = self.crash_diagnostics.iter().map(|crash| {
            RawDiagnostic::AppleCrash(CrashDiagnostic {
                time: crash.time.or(time),
                ..crash.clone()
            })
        });
        let hangs = self.hang_diagnostics.iter().map(|hang| {
            RawDiagnostic::AppleHang(HangDiagnostic {
                time: hang.time.or(time),
                ..hang.clone()
            })
        });
        crashes.chain(hangs).collect()
    }
}

fn signal_name(signal: u32) -> String {
    SignalMac::from_u32(signal)
        .map(|signal| signal.name().to_owned())
        .unwrap_or_else(|| format!("signal {signal}"))
}

/// What a crash diagnostic turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub issue_type: FatalIssueType,
    pub name: String,
    pub reason: String,
}

impl CrashDiagnostic {
    pub fn classify(&self) -> Classification {
        let meta = &self.meta;

        if let Some(ref termination) = meta.termination_reason {
            if termination.to_ascii_lowercase().contains(WATCHDOG_CODE) {
                return Classification {
                    issue_type: FatalIssueType::Anr,
                    name: "App Hang".to_owned(),
                    reason: termination.clone(),
                };
            }
        }

        let objc_reason = meta
            .objective_c_exception_reason
            .as_ref()
            .and_then(ObjectiveCExceptionReason::describe);

        let (name, reason) = match meta.exception_type {
            Some(exception_type) => {
                let name = ExceptionCodeMac::from_u32(exception_type)
                    .map(|exc| exc.name().to_owned())
                    .unwrap_or_else(|| format!("exception type {exception_type}"));
                let reason = objc_reason
                    .or_else(|| meta.signal.map(signal_name))
                    .or_else(|| meta.exception_code.map(|code| format!("exception code {code:#x}")))
                    .unwrap_or_default();
                (name, reason)
            }
            None => match meta.signal {
                Some(signal) => {
                    let reason = objc_reason
                        .or_else(|| {
                            SignalMac::from_u32(signal).map(|s| s.description().to_owned())
                        })
                        .unwrap_or_default();
                    (signal_name(signal), reason)
                }
                None => ("Unknown".to_owned(), objc_reason.unwrap_or_default()),
            },
        };

        Classification {
            issue_type: FatalIssueType::NativeCrash,
            name,
            reason,
        }
    }
}

/// Build a report for a crash diagnostic.
pub fn crash_report(crash: &CrashDiagnostic, metadata: &ReportMetadata) -> Report {
    let classification = crash.classify();
    debug!(
        "classified crash as {} ({})",
        classification.issue_type, classification.name
    );
    let correlation = correlate(&crash.call_stack_tree, FrameOrder::Traversal);
    Report {
        issue_type: classification.issue_type,
        time: crash.time.unwrap_or_else(SystemTime::now),
        errors: vec![Error {
            name: classification.name,
            reason: classification.reason,
            stack_trace: correlation.error_stack,
            relation: ErrorRelation::CausedBy,
        }],
        thread_details: correlation.thread_details,
        binary_images: correlation.binary_images,
        metadata: metadata.clone(),
    }
}

/// Build a report for a hang diagnostic, or `None` if it was shorter than `minimum`.
pub fn hang_report(
    hang: &HangDiagnostic,
    metadata: &ReportMetadata,
    minimum: Duration,
) -> Option<Report> {
    let Some(duration) = hang.duration() else {
        warn!("discarding hang diagnostic without a duration");
        return None;
    };
    if duration < minimum {
        debug!(
            "discarding {:.1}s hang, minimum is {:.1}s",
            duration.as_secs_f64(),
            minimum.as_secs_f64()
        );
        return None;
    }

    let correlation = correlate(&hang.call_stack_tree, FrameOrder::Reversed);
    Some(Report {
        issue_type: FatalIssueType::Hang,
        time: hang.time.unwrap_or_else(SystemTime::now),
        errors: vec![Error {
            name: hang.hang_type().unwrap_or("App Hang").to_owned(),
            reason: format!(
                "app was unresponsive for {:.1} sec",
                duration.as_secs_f64()
            ),
            stack_trace: correlation.error_stack,
            relation: ErrorRelation::CausedBy,
        }],
        thread_details: correlation.thread_details,
        binary_images: correlation.binary_images,
        metadata: metadata.clone(),
    })
}

/// Receives MetricKit payloads and stages a report for each accepted diagnostic.
pub struct DiagnosticEventReporter {
    writer: ReportWriter,
    metadata: ReportMetadata,
    options: ProcessorOptions,
    crash_record: Option<CrashRecord>,
}

impl DiagnosticEventReporter {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        metadata: ReportMetadata,
        options: ProcessorOptions,
    ) -> DiagnosticEventReporter {
        DiagnosticEventReporter {
            writer: ReportWriter::new(output_dir),
            metadata,
            options,
            crash_record: None,
        }
    }

    /// A reporter for `sdk_version` of the Apple SDK, accepting `event_types`.
    pub fn with_sdk_version(
        output_dir: impl Into<PathBuf>,
        sdk_version: &str,
        event_types: EventTypes,
        minimum_hang_duration: Duration,
    ) -> DiagnosticEventReporter {
        let mut metadata = ReportMetadata::default();
        metadata.sdk.id = APPLE_SDK_ID.to_owned();
        metadata.sdk.version = sdk_version.to_owned();
        metadata.device.platform = crate::report::Platform::Ios;
        DiagnosticEventReporter::new(
            output_dir,
            metadata,
            ProcessorOptions {
                event_types,
                minimum_hang_duration,
            },
        )
    }

    /// Use thread names from an in-process crash record for matching crash diagnostics.
    pub fn set_crash_record(&mut self, record: CrashRecord) {
        self.crash_record = Some(record);
    }

    /// Process every diagnostic in `payloads`, returning the paths of the staged reports.
    ///
    /// Failures are logged and skipped, a bad diagnostic never prevents the others from
    /// being staged.
    pub fn did_receive(&self, payloads: &[DiagnosticPayload]) -> Vec<PathBuf> {
        let mut staged = Vec::new();
        for payload in payloads {
            for mut diagnostic in payload.diagnostics() {
                if let (RawDiagnostic::AppleCrash(crash), Some(record)) =
                    (&mut diagnostic, &self.crash_record)
                {
                    if record.matches(&crash.meta) {
                        let named = merge_thread_names(&mut crash.call_stack_tree, record);
                        debug!("named {named} threads from the crash record");
                    }
                }

                let report = match process_diagnostic(&diagnostic, &self.metadata, &self.options) {
                    Ok(Some(report)) => report,
                    Ok(None) => continue,
                    Err(e) => {
                        error!("failed to process {} diagnostic: {e}", diagnostic.kind());
                        continue;
                    }
                };
                match self.writer.write(&report) {
                    Ok(path) => staged.push(path),
                    Err(e) => error!("failed to stage report: {e}"),
                }
            }
        }
        staged
    }
}
