//! A library for turning the diagnostics operating systems hand back after a fatal issue into
//! compact report artifacts.
//!
//! Diagnostics come from several sources:
//!
//! * MetricKit crash and hang payloads on Apple platforms ([`metrickit`])
//! * uncaught exceptions on the JVM ([`jvm`])
//! * Android `ApplicationExitInfo` records, carrying ANR traces or native tombstones
//!   ([`app_exit`], [`tombstone`])
//!
//! Wrap one in a [`diagnostic::RawDiagnostic`] and pass it to [`process_diagnostic`] to get a
//! [`Report`], then stage it with a [`storage::ReportWriter`]. MetricKit payloads can also be
//! handed to a [`metrickit::DiagnosticEventReporter`] which does all of that per diagnostic.
//!
//! [`process_diagnostic`]: fn.process_diagnostic.html

mod processor;
mod report;

pub mod app_exit;
pub mod correlator;
pub mod diagnostic;
pub mod enhance;
pub mod jvm;
pub mod metrickit;
pub mod storage;
pub mod tombstone;

pub use processor::*;
pub use report::*;
