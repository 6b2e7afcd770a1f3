//! Flattening call-stack trees into per-thread stack traces.
//!
//! MetricKit reports every captured thread as a tree of frames. For each thread we follow the
//! first child from the root frame down to a leaf, which yields that thread's stack. A frame
//! that has neither an address nor a binary ends the walk: the frames before it are kept and
//! everything below it is dropped.
//!
//! The thread the OS attributed the issue to becomes the error's stack trace. All other
//! threads that produced at least one frame are reported as [`ThreadDetail`]s, keeping their
//! position among *all* captured threads as their index.
//!
//! While walking, every frame that names a binary and knows its offset into that binary's
//! text segment also tells us where the binary was loaded:
//!
//! ```text
//! load_address = frame_address - offset_into_binary_text_segment
//! ```
//!
//! The first frame seen for a given binary decides its load address.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::diagnostic::{CallStackTree, FrameNode};
use crate::report::{BinaryImage, Frame, FrameType, ThreadDetail, ThreadDetails};

/// The order frames are emitted in.
///
/// MetricKit lists crash stacks and hang stacks in opposite orders, and we reproduce both
/// as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrder {
    /// Root first, the order the tree is walked in. Used for crashes.
    Traversal,
    /// Leaf first. Used for hangs.
    Reversed,
}

/// The result of correlating a [`CallStackTree`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correlation {
    /// Stack of the thread the error is attributed to. Empty if no thread could be blamed.
    pub error_stack: Vec<Frame>,
    pub thread_details: Option<ThreadDetails>,
    pub binary_images: Vec<BinaryImage>,
}

struct ThreadStack<'a> {
    index: u32,
    attributed: bool,
    name: Option<&'a str>,
    frames: Vec<Frame>,
}

/// Collects binary images, first occurrence wins.
#[derive(Default)]
struct ImageCollector {
    seen: HashSet<String>,
    images: Vec<BinaryImage>,
}

impl ImageCollector {
    fn observe(&mut self, node: &FrameNode) {
        let (Some(id), Some(address), Some(offset)) = (
            node.binary_uuid.as_ref(),
            node.address,
            node.offset_into_binary_text_segment,
        ) else {
            return;
        };
        if self.seen.contains(id) {
            return;
        }
        let Some(load_address) = address.checked_sub(offset) else {
            warn!("frame address {address:#x} is below its offset {offset:#x} into {id}");
            return;
        };
        self.seen.insert(id.clone());
        self.images.push(BinaryImage {
            id: id.clone(),
            path: node.binary_name.clone().unwrap_or_default(),
            load_address,
        });
    }
}

/// Walk one thread, returning its frames in traversal order.
fn walk_thread(tree: &CallStackTree, root: usize, images: &mut ImageCollector) -> Vec<Frame> {
    let mut frames = Vec::new();
    for node in tree.arena.first_child_chain(root) {
        if !node.is_valid() {
            debug!("dropping invalid frame and everything below it");
            break;
        }
        images.observe(node);
        frames.push(Frame::native(
            FrameType::DwarfNative,
            node.binary_uuid.clone(),
            node.address,
        ));
    }
    frames
}

/// Flatten `tree` into an error stack, thread details and binary images.
pub fn correlate(tree: &CallStackTree, order: FrameOrder) -> Correlation {
    let mut images = ImageCollector::default();
    let total = tree.call_stacks.len();

    let mut threads: Vec<ThreadStack> = tree
        .call_stacks
        .iter()
        .enumerate()
        .filter_map(|(index, stack)| {
            // only the first root frame is ever populated
            let root = *stack.root_frames.first()?;
            let mut frames = walk_thread(tree, root, &mut images);
            if frames.is_empty() {
                return None;
            }
            if order == FrameOrder::Reversed {
                frames.reverse();
            }
            Some(ThreadStack {
                index: index as u32,
                attributed: stack.thread_attributed,
                name: stack.name.as_deref(),
                frames,
            })
        })
        .collect();

    let error_thread = match threads.iter().position(|thread| thread.attributed) {
        Some(pos) => Some(threads.remove(pos)),
        None if threads.len() == 1 => threads.pop(),
        None => None,
    };
    debug!(
        "correlated {} of {} threads, error attributed to thread {:?}",
        threads.len() + usize::from(error_thread.is_some()),
        total,
        error_thread.as_ref().map(|thread| thread.index),
    );

    let thread_details = (!threads.is_empty()).then(|| ThreadDetails {
        count: total as u32,
        threads: threads
            .into_iter()
            .map(|thread| ThreadDetail {
                name: thread.name.map(String::from),
                attributed: thread.attributed,
                ..ThreadDetail::new(thread.index, thread.frames)
            })
            .collect(),
    });

    Correlation {
        error_stack: error_thread.map(|thread| thread.frames).unwrap_or_default(),
        thread_details,
        binary_images: images.images,
    }
}
