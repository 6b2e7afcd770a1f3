//! Report artifact definitions.
//!
//! A staged report is a single protobuf-encoded [`Report`] message. The messages here are
//! declared with `prost` derives rather than generated from a `.proto` file, so the tags
//! below *are* the schema. Readers skip fields they do not know about, which means new
//! fields must always take a fresh tag and existing tags must never be reused.
//!
//! The layout mirrors what the uploader expects:
//!
//! ```text
//! Report
//! ├── sdk: SdkInfo
//! ├── report_type: ReportType
//! ├── app_metrics: AppMetrics
//! ├── device_metrics: DeviceMetrics
//! ├── errors: [Error]            (the faulting error, then its causes)
//! ├── thread_details: ThreadDetails
//! └── binary_images: [BinaryImage]
//! ```

/// The file extension staged report artifacts are written with.
pub const REPORT_FILE_EXTENSION: &str = "cap";

/// A single serialized fatal issue.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Report {
    #[prost(message, optional, tag = "1")]
    pub sdk: Option<SdkInfo>,
    #[prost(enumeration = "ReportType", tag = "2")]
    pub report_type: i32,
    #[prost(message, optional, tag = "3")]
    pub app_metrics: Option<AppMetrics>,
    #[prost(message, optional, tag = "4")]
    pub device_metrics: Option<DeviceMetrics>,
    #[prost(message, repeated, tag = "5")]
    pub errors: Vec<Error>,
    #[prost(message, optional, tag = "6")]
    pub thread_details: Option<ThreadDetails>,
    #[prost(message, repeated, tag = "7")]
    pub binary_images: Vec<BinaryImage>,
}

/// Identifies the SDK that produced a report.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SdkInfo {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppMetrics {
    #[prost(string, tag = "1")]
    pub app_id: String,
    #[prost(string, tag = "2")]
    pub version: String,
    #[prost(message, optional, tag = "3")]
    pub build_number: Option<AppBuildNumber>,
}

/// Platform-specific build numbers. Only one of these is usually set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppBuildNumber {
    /// Android `versionCode`
    #[prost(int64, tag = "1")]
    pub version_code: i64,
    /// Apple `CFBundleVersion`
    #[prost(string, tag = "2")]
    pub cf_bundle_version: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceMetrics {
    /// When the fatal issue was captured.
    #[prost(message, optional, tag = "1")]
    pub time: Option<Timestamp>,
    #[prost(enumeration = "Platform", tag = "2")]
    pub platform: i32,
    #[prost(enumeration = "Architecture", tag = "3")]
    pub arch: i32,
    #[prost(string, tag = "4")]
    pub manufacturer: String,
    #[prost(string, tag = "5")]
    pub model: String,
    #[prost(message, optional, tag = "6")]
    pub os_build: Option<OsBuild>,
    #[prost(string, repeated, tag = "7")]
    pub cpu_abis: Vec<String>,
}

/// Seconds and nanoseconds since the unix epoch.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Timestamp {
    #[prost(uint64, tag = "1")]
    pub seconds: u64,
    #[prost(uint32, tag = "2")]
    pub nanos: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OsBuild {
    #[prost(string, tag = "1")]
    pub brand: String,
    #[prost(string, tag = "2")]
    pub version: String,
}

/// An error (or one link of a cause chain) together with its stack trace.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub reason: String,
    #[prost(message, repeated, tag = "3")]
    pub stack_trace: Vec<Frame>,
    #[prost(enumeration = "ErrorRelation", tag = "4")]
    pub relation: i32,
}

/// A single unsymbolicated (or JVM-symbolicated) stack frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Frame {
    #[prost(enumeration = "FrameType", tag = "1")]
    pub frame_type: i32,
    #[prost(string, optional, tag = "2")]
    pub class_name: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub symbol_name: Option<String>,
    #[prost(message, optional, tag = "4")]
    pub source_file: Option<SourceFile>,
    #[prost(string, optional, tag = "5")]
    pub image_id: Option<String>,
    #[prost(uint64, optional, tag = "6")]
    pub frame_address: Option<u64>,
    #[prost(uint64, optional, tag = "7")]
    pub symbol_address: Option<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SourceFile {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(int64, tag = "2")]
    pub line: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadDetails {
    /// Total number of threads observed, including ones not listed in `threads`.
    #[prost(uint32, tag = "1")]
    pub count: u32,
    #[prost(message, repeated, tag = "2")]
    pub threads: Vec<Thread>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Thread {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    /// Whether this thread was the one the OS attributed the issue to.
    #[prost(bool, tag = "2")]
    pub active: bool,
    /// Ordinal of this thread among all observed threads.
    #[prost(uint32, tag = "3")]
    pub index: u32,
    #[prost(string, optional, tag = "4")]
    pub state: Option<String>,
    #[prost(float, optional, tag = "5")]
    pub priority: Option<f32>,
    #[prost(int32, optional, tag = "6")]
    pub quality_of_service: Option<i32>,
    #[prost(message, repeated, tag = "7")]
    pub stack_trace: Vec<Frame>,
}

/// A loaded executable or library.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BinaryImage {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub path: String,
    #[prost(uint64, tag = "3")]
    pub load_address: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ReportType {
    Unknown = 0,
    AppNotResponding = 1,
    JvmCrash = 2,
    NativeCrash = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FrameType {
    Unknown = 0,
    Jvm = 1,
    AndroidNative = 2,
    DwarfNative = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Platform {
    Unknown = 0,
    Android = 1,
    Ios = 2,
    Macos = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Architecture {
    Unknown = 0,
    Arm32 = 1,
    Arm64 = 2,
    X86 = 3,
    X86_64 = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorRelation {
    Unspecified = 0,
    CausedBy = 1,
}
