//! Uncaught JVM exceptions.

use std::time::SystemTime;

use crate::report::{
    Error, ErrorRelation, FatalIssueType, Frame, Report, ReportMetadata, ThreadDetail,
    ThreadDetails,
};

/// `java.lang.StackTraceElement`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTraceElement {
    pub class_name: String,
    pub method_name: String,
    pub file_name: Option<String>,
    pub line_number: i64,
}

impl StackTraceElement {
    fn to_frame(&self) -> Frame {
        Frame::jvm(
            &self.class_name,
            &self.method_name,
            self.file_name.as_deref(),
            self.line_number,
        )
    }
}

/// A throwable and its chain of causes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Throwable {
    pub class_name: String,
    pub message: Option<String>,
    pub stack_trace: Vec<StackTraceElement>,
    pub cause: Option<Box<Throwable>>,
}

impl Throwable {
    /// This throwable followed by each of its causes.
    pub fn chain(&self) -> impl Iterator<Item = &Throwable> {
        std::iter::successors(Some(self), |throwable| throwable.cause.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JvmThread {
    pub id: u64,
    pub name: String,
    pub state: Option<String>,
    pub priority: Option<i32>,
    pub stack_trace: Vec<StackTraceElement>,
}

/// Everything captured by the uncaught exception handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmCrash {
    pub time: SystemTime,
    pub throwable: Throwable,
    /// Id of the thread the exception was thrown on.
    pub crashing_thread: u64,
    /// Stacks of all live threads, the crashing one included.
    pub threads: Vec<JvmThread>,
}

pub fn jvm_crash_report(crash: &JvmCrash, metadata: &ReportMetadata) -> Report {
    let errors = crash
        .throwable
        .chain()
        .map(|throwable| Error {
            name: throwable.class_name.clone(),
            reason: throwable.message.clone().unwrap_or_default(),
            stack_trace: throwable.stack_trace.iter().map(StackTraceElement::to_frame).collect(),
            relation: ErrorRelation::CausedBy,
        })
        .collect();

    let threads: Vec<ThreadDetail> = crash
        .threads
        .iter()
        .enumerate()
        .filter(|(_, thread)| thread.id != crash.crashing_thread)
        .map(|(index, thread)| ThreadDetail {
            name: Some(thread.name.clone()),
            state: thread.state.clone(),
            priority: thread.priority.map(|priority| priority as f32),
            ..ThreadDetail::new(
                index as u32,
                thread.stack_trace.iter().map(StackTraceElement::to_frame).collect(),
            )
        })
        .collect();

    Report {
        issue_type: FatalIssueType::JvmCrash,
        time: crash.time,
        errors,
        thread_details: (!threads.is_empty()).then(|| ThreadDetails {
            count: crash.threads.len() as u32,
            threads,
        }),
        binary_images: Vec::new(),
        metadata: metadata.clone(),
    }
}
