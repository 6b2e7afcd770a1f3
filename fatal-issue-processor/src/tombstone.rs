//! Native crashes from Android tombstones.

use std::collections::HashSet;
use std::time::SystemTime;

use num_traits::FromPrimitive;
use prost::Message;
use tracing::{debug, warn};

use fatal_issue_common::tombstone::{BacktraceFrame, MemoryMapping, Tombstone};
use fatal_issue_common::SignalLinux;

use crate::report::{
    BinaryImage, Error, ErrorRelation, FatalIssueType, Frame, FrameType, Report, ReportMetadata,
    ThreadDetail, ThreadDetails,
};
use crate::ProcessError;

/// Find the mapping containing `address`. `mappings` must be sorted and non-overlapping.
fn find_mapping(mappings: &[MemoryMapping], address: u64) -> Option<usize> {
    use std::cmp::Ordering;

    mappings
        .binary_search_by(|mapping| {
            if address < mapping.begin_address {
                Ordering::Greater
            } else if address >= mapping.end_address {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        })
        .ok()
}

struct FrameResolver<'a> {
    mappings: &'a [MemoryMapping],
    /// Indices into `mappings`, in the order they were first referenced.
    referenced: Vec<usize>,
    seen: HashSet<usize>,
}

impl<'a> FrameResolver<'a> {
    fn new(mappings: &'a [MemoryMapping]) -> FrameResolver<'a> {
        FrameResolver {
            mappings,
            referenced: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn resolve(&mut self, frame: &BacktraceFrame) -> Frame {
        let image_id = match find_mapping(self.mappings, frame.pc) {
            Some(index) => {
                if self.seen.insert(index) {
                    self.referenced.push(index);
                }
                self.mappings[index].image_id()
            }
            None => {
                debug!("no mapping contains pc {:#x}", frame.pc);
                frame.file_name.clone()
            }
        };
        Frame {
            symbol_name: Some(frame.function_name.clone()).filter(|name| !name.is_empty()),
            ..Frame::native(FrameType::AndroidNative, Some(image_id), Some(frame.pc))
        }
    }

    /// One image per id, several mappings of the same library collapse into its first.
    fn binary_images(&self) -> Vec<BinaryImage> {
        let mut ids = HashSet::new();
        self.referenced
            .iter()
            .map(|&index| &self.mappings[index])
            .filter_map(|mapping| {
                let id = mapping.image_id();
                ids.insert(id.clone()).then(|| BinaryImage {
                    path: Some(mapping.mapping_name.trim())
                        .filter(|name| !name.is_empty())
                        .map(str::to_owned)
                        .unwrap_or_else(|| mapping.anonymous_name()),
                    id,
                    load_address: mapping.begin_address,
                })
            })
            .collect()
    }
}

fn crash_error(tombstone: &Tombstone, description: Option<&str>, stack_trace: Vec<Frame>) -> Error {
    let signal = tombstone.signal_info.clone().unwrap_or_default();
    let known_signal = SignalLinux::from_i32(signal.number);

    let name = Some(signal.name.clone())
        .filter(|name| !name.is_empty())
        .or_else(|| known_signal.map(|s| s.name().to_owned()))
        .or_else(|| description.map(str::to_owned))
        .unwrap_or_default();

    let reason = tombstone
        .causes
        .first()
        .map(|cause| cause.human_readable.clone())
        .filter(|text| !text.is_empty())
        .or_else(|| Some(tombstone.abort_message.clone()).filter(|text| !text.is_empty()))
        .or_else(|| known_signal.map(|s| s.description().to_owned()))
        .unwrap_or_else(|| "Native crash".to_owned());

    Error {
        name,
        reason,
        stack_trace,
        relation: ErrorRelation::CausedBy,
    }
}

/// Build a native crash report from a decoded tombstone.
///
/// Every thread is listed in the thread details by tid, the crashing one marked as attributed.
pub fn tombstone_report(
    tombstone: &Tombstone,
    description: Option<&str>,
    time: SystemTime,
    metadata: &ReportMetadata,
) -> Report {
    let mut resolver = FrameResolver::new(&tombstone.memory_mappings);
    let mut error = None;
    let mut threads = Vec::with_capacity(tombstone.threads.len());

    for (&tid, thread) in &tombstone.threads {
        let frames: Vec<Frame> = thread
            .current_backtrace
            .iter()
            .map(|frame| resolver.resolve(frame))
            .collect();
        let crashed = tid == tombstone.tid;
        if crashed {
            error = Some(crash_error(tombstone, description, frames.clone()));
        }
        threads.push(ThreadDetail {
            name: Some(if thread.name.is_empty() {
                format!("native-thread-{}", thread.id)
            } else {
                thread.name.clone()
            }),
            attributed: crashed,
            ..ThreadDetail::new(thread.id, frames)
        });
    }

    let error = error.unwrap_or_else(|| {
        warn!("tombstone has no thread {}, reporting the crash without a stack", tombstone.tid);
        crash_error(tombstone, description, Vec::new())
    });

    Report {
        issue_type: FatalIssueType::NativeCrash,
        time,
        errors: vec![error],
        thread_details: (!threads.is_empty()).then(|| ThreadDetails {
            count: threads.len() as u32,
            threads,
        }),
        binary_images: resolver.binary_images(),
        metadata: metadata.clone(),
    }
}

/// Decode a tombstone as returned by `ApplicationExitInfo::getTraceInputStream`.
pub fn decode_tombstone(bytes: &[u8]) -> Result<Tombstone, ProcessError> {
    Tombstone::decode(bytes).map_err(ProcessError::InvalidTombstone)
}
