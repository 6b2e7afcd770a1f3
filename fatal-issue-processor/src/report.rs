//! The canonical fatal issue report.
//!
//! Every diagnostic source (MetricKit payloads, JVM uncaught exceptions, Android exit info)
//! is normalized into a [`Report`]. A report is built once per detected event and is not
//! modified afterwards; it is either printed or encoded into the protobuf artifact defined in
//! [`fatal_issue_common::format`].

use std::io;
use std::io::prelude::*;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fatal_issue_common::format as wire;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::ProcessError;

pub use fatal_issue_common::format::{Architecture, ErrorRelation, FrameType, Platform};

/// The kind of event a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatalIssueType {
    JvmCrash,
    NativeCrash,
    /// An Android ANR or an Apple watchdog termination.
    Anr,
    /// An Apple hang diagnostic.
    Hang,
}

impl FatalIssueType {
    pub fn report_type(self) -> wire::ReportType {
        match self {
            FatalIssueType::JvmCrash => wire::ReportType::JvmCrash,
            FatalIssueType::NativeCrash => wire::ReportType::NativeCrash,
            FatalIssueType::Anr | FatalIssueType::Hang => wire::ReportType::AppNotResponding,
        }
    }

    /// The label staged report files are named with.
    pub fn file_label(self) -> &'static str {
        match self {
            FatalIssueType::JvmCrash => "crash",
            FatalIssueType::NativeCrash => "native_crash",
            FatalIssueType::Anr | FatalIssueType::Hang => "anr",
        }
    }

    /// Hangs can't be told apart from ANRs once encoded, both come back as `Anr`.
    pub fn from_report_type(report_type: wire::ReportType) -> Option<FatalIssueType> {
        match report_type {
            wire::ReportType::JvmCrash => Some(FatalIssueType::JvmCrash),
            wire::ReportType::NativeCrash => Some(FatalIssueType::NativeCrash),
            wire::ReportType::AppNotResponding => Some(FatalIssueType::Anr),
            wire::ReportType::Unknown => None,
        }
    }
}

impl std::fmt::Display for FatalIssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            FatalIssueType::JvmCrash => "JVM crash",
            FatalIssueType::NativeCrash => "native crash",
            FatalIssueType::Anr => "ANR",
            FatalIssueType::Hang => "hang",
        };
        f.write_str(name)
    }
}

/// A code address, printed as zero-padded hex.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub u64);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub line: i64,
}

/// A single stack location.
///
/// Native frames carry an `image_id` and `frame_address` and are left unsymbolicated. JVM
/// frames carry a class, method and source position instead.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub class_name: Option<String>,
    pub symbol_name: Option<String>,
    pub source_file: Option<SourceFile>,
    pub image_id: Option<String>,
    pub frame_address: Option<u64>,
    pub symbol_address: Option<u64>,
}

impl Frame {
    pub fn native(frame_type: FrameType, image_id: Option<String>, frame_address: Option<u64>) -> Frame {
        Frame {
            frame_type,
            image_id,
            frame_address,
            ..Frame::default()
        }
    }

    pub fn jvm(class_name: &str, symbol_name: &str, file: Option<&str>, line: i64) -> Frame {
        Frame {
            frame_type: FrameType::Jvm,
            class_name: Some(class_name.to_owned()),
            symbol_name: Some(symbol_name.to_owned()),
            source_file: file.map(|path| SourceFile {
                path: path.to_owned(),
                line,
            }),
            ..Frame::default()
        }
    }

    fn to_wire(&self) -> wire::Frame {
        wire::Frame {
            frame_type: self.frame_type.into(),
            class_name: self.class_name.clone(),
            symbol_name: self.symbol_name.clone(),
            source_file: self.source_file.as_ref().map(|file| wire::SourceFile {
                path: file.path.clone(),
                line: file.line,
            }),
            image_id: self.image_id.clone(),
            frame_address: self.frame_address,
            symbol_address: self.symbol_address,
        }
    }

    fn from_wire(frame: wire::Frame) -> Frame {
        Frame {
            frame_type: frame.frame_type(),
            class_name: frame.class_name,
            symbol_name: frame.symbol_name,
            source_file: frame.source_file.map(|file| SourceFile {
                path: file.path,
                line: file.line,
            }),
            image_id: frame.image_id,
            frame_address: frame.frame_address,
            symbol_address: frame.symbol_address,
        }
    }

    fn print<T: Write>(&self, f: &mut T, idx: usize) -> io::Result<()> {
        write!(f, "{idx:2}  ")?;
        match (&self.class_name, &self.symbol_name) {
            (Some(class), Some(symbol)) => write!(f, "{class}.{symbol}")?,
            (None, Some(symbol)) => write!(f, "{symbol}")?,
            _ => {}
        }
        if let Some(address) = self.frame_address {
            write!(f, "{}", Address(address))?;
        }
        if let Some(ref image) = self.image_id {
            write!(f, "  {image}")?;
        }
        if let Some(ref file) = self.source_file {
            write!(f, " ({}:{})", file.path, file.line)?;
        }
        writeln!(f)
    }

    fn json(&self) -> serde_json::Value {
        json!({
            "type": format!("{:?}", self.frame_type),
            "class_name": self.class_name,
            "symbol_name": self.symbol_name,
            "file": self.source_file.as_ref().map(|file| file.path.as_str()),
            "line": self.source_file.as_ref().map(|file| file.line),
            "image_id": self.image_id,
            "frame_address": self.frame_address.map(|a| Address(a).to_string()),
            "symbol_address": self.symbol_address.map(|a| Address(a).to_string()),
        })
    }
}

/// An error, or one link of a cause chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub name: String,
    pub reason: String,
    pub stack_trace: Vec<Frame>,
    pub relation: ErrorRelation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadDetail {
    /// Ordinal among all threads observed, not just the ones listed.
    pub index: u32,
    pub name: Option<String>,
    pub attributed: bool,
    pub state: Option<String>,
    pub priority: Option<f32>,
    pub stack_trace: Vec<Frame>,
}

impl ThreadDetail {
    pub fn new(index: u32, stack_trace: Vec<Frame>) -> ThreadDetail {
        ThreadDetail {
            index,
            name: None,
            attributed: false,
            state: None,
            priority: None,
            stack_trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadDetails {
    /// Total number of threads observed, including the error's own thread.
    pub count: u32,
    pub threads: Vec<ThreadDetail>,
}

/// A loaded executable or library, unique by `id` within a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryImage {
    pub id: String,
    pub path: String,
    pub load_address: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdkInfo {
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppMetrics {
    pub app_id: String,
    pub version: String,
    /// Android `versionCode`
    pub version_code: i64,
    /// Apple `CFBundleVersion`
    pub cf_bundle_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetrics {
    pub platform: Platform,
    pub arch: Architecture,
    pub manufacturer: String,
    pub model: String,
    pub os_brand: String,
    pub os_version: String,
    pub cpu_abis: Vec<String>,
}

/// Everything a report says about the SDK, app and device, as opposed to the issue itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportMetadata {
    pub sdk: SdkInfo,
    pub app: AppMetrics,
    pub device: DeviceMetrics,
}

/// A fatal issue, ready to be staged.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub issue_type: FatalIssueType,
    /// When the issue was captured.
    pub time: SystemTime,
    /// The error first, followed by its causes if there are any.
    pub errors: Vec<Error>,
    /// `None` when no thread besides the error's own was captured.
    pub thread_details: Option<ThreadDetails>,
    pub binary_images: Vec<BinaryImage>,
    pub metadata: ReportMetadata,
}

impl Report {
    pub fn to_wire(&self) -> wire::Report {
        let since_epoch = self
            .time
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        let meta = &self.metadata;

        wire::Report {
            sdk: Some(wire::SdkInfo {
                id: meta.sdk.id.clone(),
                version: meta.sdk.version.clone(),
            }),
            report_type: self.issue_type.report_type().into(),
            app_metrics: Some(wire::AppMetrics {
                app_id: meta.app.app_id.clone(),
                version: meta.app.version.clone(),
                build_number: Some(wire::AppBuildNumber {
                    version_code: meta.app.version_code,
                    cf_bundle_version: meta.app.cf_bundle_version.clone(),
                }),
            }),
            device_metrics: Some(wire::DeviceMetrics {
                time: Some(wire::Timestamp {
                    seconds: since_epoch.as_secs(),
                    nanos: since_epoch.subsec_nanos(),
                }),
                platform: meta.device.platform.into(),
                arch: meta.device.arch.into(),
                manufacturer: meta.device.manufacturer.clone(),
                model: meta.device.model.clone(),
                os_build: Some(wire::OsBuild {
                    brand: meta.device.os_brand.clone(),
                    version: meta.device.os_version.clone(),
                }),
                cpu_abis: meta.device.cpu_abis.clone(),
            }),
            errors: self
                .errors
                .iter()
                .map(|error| wire::Error {
                    name: error.name.clone(),
                    reason: error.reason.clone(),
                    stack_trace: error.stack_trace.iter().map(Frame::to_wire).collect(),
                    relation: error.relation.into(),
                })
                .collect(),
            thread_details: self.thread_details.as_ref().map(|details| wire::ThreadDetails {
                count: details.count,
                threads: details
                    .threads
                    .iter()
                    .map(|thread| wire::Thread {
                        name: thread.name.clone(),
                        active: thread.attributed,
                        index: thread.index,
                        state: thread.state.clone(),
                        priority: thread.priority,
                        quality_of_service: None,
                        stack_trace: thread.stack_trace.iter().map(Frame::to_wire).collect(),
                    })
                    .collect(),
            }),
            binary_images: self
                .binary_images
                .iter()
                .map(|image| wire::BinaryImage {
                    id: image.id.clone(),
                    path: image.path.clone(),
                    load_address: image.load_address,
                })
                .collect(),
        }
    }

    /// Encode this report as a staged artifact.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        prost::Message::encode_to_vec(&self.to_wire())
    }

    /// Decode a staged artifact.
    pub fn decode(bytes: &[u8]) -> Result<Report, ProcessError> {
        let report = <wire::Report as prost::Message>::decode(bytes)?;
        Report::from_wire(report)
    }

    pub fn from_wire(report: wire::Report) -> Result<Report, ProcessError> {
        let issue_type = FatalIssueType::from_report_type(report.report_type())
            .ok_or(ProcessError::UnknownReportType(report.report_type))?;

        let sdk = report.sdk.unwrap_or_default();
        let app = report.app_metrics.unwrap_or_default();
        let build_number = app.build_number.clone().unwrap_or_default();
        let device = report.device_metrics.unwrap_or_default();
        let os_build = device.os_build.clone().unwrap_or_default();
        let time = device
            .time
            .map(|t| UNIX_EPOCH + Duration::new(t.seconds, t.nanos))
            .unwrap_or(UNIX_EPOCH);

        Ok(Report {
            issue_type,
            time,
            errors: report
                .errors
                .into_iter()
                .map(|error| Error {
                    relation: error.relation(),
                    name: error.name,
                    reason: error.reason,
                    stack_trace: error.stack_trace.into_iter().map(Frame::from_wire).collect(),
                })
                .collect(),
            thread_details: report.thread_details.map(|details| ThreadDetails {
                count: details.count,
                threads: details
                    .threads
                    .into_iter()
                    .map(|thread| ThreadDetail {
                        index: thread.index,
                        name: thread.name,
                        attributed: thread.active,
                        state: thread.state,
                        priority: thread.priority,
                        stack_trace: thread.stack_trace.into_iter().map(Frame::from_wire).collect(),
                    })
                    .collect(),
            }),
            binary_images: report
                .binary_images
                .into_iter()
                .map(|image| BinaryImage {
                    id: image.id,
                    path: image.path,
                    load_address: image.load_address,
                })
                .collect(),
            metadata: ReportMetadata {
                sdk: SdkInfo {
                    id: sdk.id,
                    version: sdk.version,
                },
                app: AppMetrics {
                    app_id: app.app_id,
                    version: app.version,
                    version_code: build_number.version_code,
                    cf_bundle_version: build_number.cf_bundle_version,
                },
                device: DeviceMetrics {
                    platform: device.platform(),
                    arch: device.arch(),
                    manufacturer: device.manufacturer,
                    model: device.model,
                    os_brand: os_build.brand,
                    os_version: os_build.version,
                    cpu_abis: device.cpu_abis,
                },
            },
        })
    }

    fn formatted_time(&self) -> Option<String> {
        OffsetDateTime::from(self.time).format(&Rfc3339).ok()
    }

    /// Write a human-readable description of the report to `f`.
    pub fn print<T: Write>(&self, f: &mut T) -> io::Result<()> {
        let meta = &self.metadata;
        writeln!(f, "Report type: {}", self.issue_type)?;
        writeln!(f, "SDK: {} {}", meta.sdk.id, meta.sdk.version)?;
        if !meta.app.app_id.is_empty() {
            writeln!(f, "App: {} {}", meta.app.app_id, meta.app.version)?;
        }
        if !meta.device.model.is_empty() {
            writeln!(
                f,
                "Device: {} {} ({} {})",
                meta.device.manufacturer,
                meta.device.model,
                meta.device.os_brand,
                meta.device.os_version
            )?;
        }
        if let Some(time) = self.formatted_time() {
            writeln!(f, "Time: {time}")?;
        }
        writeln!(f)?;

        for (idx, error) in self.errors.iter().enumerate() {
            if idx > 0 {
                writeln!(f, "Caused by: {}", error.name)?;
            } else {
                writeln!(f, "Error: {}", error.name)?;
            }
            writeln!(f, "Reason: {}", error.reason)?;
            for (frame_idx, frame) in error.stack_trace.iter().enumerate() {
                frame.print(f, frame_idx)?;
            }
            writeln!(f)?;
        }

        if let Some(ref details) = self.thread_details {
            writeln!(f, "Threads ({} total):", details.count)?;
            for thread in &details.threads {
                match thread.name {
                    Some(ref name) => writeln!(f, "Thread {} ({name})", thread.index)?,
                    None => writeln!(f, "Thread {}", thread.index)?,
                }
                for (frame_idx, frame) in thread.stack_trace.iter().enumerate() {
                    frame.print(f, frame_idx)?;
                }
                writeln!(f)?;
            }
        }

        if !self.binary_images.is_empty() {
            writeln!(f, "Loaded images:")?;
            for image in &self.binary_images {
                writeln!(
                    f,
                    "  {}  {}  {}",
                    Address(image.load_address),
                    image.id,
                    image.path
                )?;
            }
        }
        Ok(())
    }

    /// Write the report as JSON to `f`.
    pub fn print_json<T: Write>(&self, f: &mut T, pretty: bool) -> Result<(), serde_json::Error> {
        let meta = &self.metadata;
        let output = json!({
            "type": self.issue_type.file_label(),
            "time": self.formatted_time(),
            "sdk": {
                "id": meta.sdk.id,
                "version": meta.sdk.version,
            },
            "app": {
                "app_id": meta.app.app_id,
                "version": meta.app.version,
                "version_code": meta.app.version_code,
                "cf_bundle_version": meta.app.cf_bundle_version,
            },
            "device": {
                "platform": format!("{:?}", meta.device.platform),
                "arch": format!("{:?}", meta.device.arch),
                "manufacturer": meta.device.manufacturer,
                "model": meta.device.model,
                "os_brand": meta.device.os_brand,
                "os_version": meta.device.os_version,
                "cpu_abis": meta.device.cpu_abis,
            },
            "errors": self.errors.iter().map(|error| json!({
                "name": error.name,
                "reason": error.reason,
                "relation": format!("{:?}", error.relation),
                "stack_trace": error.stack_trace.iter().map(Frame::json).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
            // optional
            "thread_details": self.thread_details.as_ref().map(|details| json!({
                "count": details.count,
                "threads": details.threads.iter().map(|thread| json!({
                    "index": thread.index,
                    "name": thread.name,
                    "attributed": thread.attributed,
                    "state": thread.state,
                    "priority": thread.priority,
                    "stack_trace": thread.stack_trace.iter().map(Frame::json).collect::<Vec<_>>(),
                })).collect::<Vec<_>>(),
            })),
            "binary_images": self.binary_images.iter().map(|image| json!({
                "id": image.id,
                "path": image.path,
                "load_address": Address(image.load_address).to_string(),
            })).collect::<Vec<_>>(),
        });

        if pretty {
            serde_json::to_writer_pretty(f, &output)
        } else {
            serde_json::to_writer(f, &output)
        }
    }
}
