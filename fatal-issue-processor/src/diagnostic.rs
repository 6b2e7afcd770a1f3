//! Raw diagnostics as delivered by the OS, before correlation.

use serde::Deserialize;

use crate::app_exit::AppExitInfo;
use crate::jvm::JvmCrash;
use crate::metrickit::{CrashDiagnostic, HangDiagnostic};

/// Every diagnostic source the processor understands.
#[derive(Debug, Clone)]
pub enum RawDiagnostic {
    /// A MetricKit crash diagnostic, including watchdog terminations.
    AppleCrash(CrashDiagnostic),
    /// A MetricKit hang diagnostic.
    AppleHang(HangDiagnostic),
    /// An uncaught exception on the JVM.
    JvmCrash(JvmCrash),
    /// An Android `ApplicationExitInfo` record from a previous process.
    AppExit(AppExitInfo),
}

impl RawDiagnostic {
    pub fn kind(&self) -> &'static str {
        match self {
            RawDiagnostic::AppleCrash(_) => "apple crash",
            RawDiagnostic::AppleHang(_) => "apple hang",
            RawDiagnostic::JvmCrash(_) => "jvm crash",
            RawDiagnostic::AppExit(_) => "app exit",
        }
    }
}

/// A call-stack node as it appears in MetricKit JSON.
///
/// Only used while deserializing; the tree is flattened into a [`FrameArena`] right away.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawFrame {
    #[serde(rename = "binaryUUID")]
    pub binary_uuid: Option<String>,
    pub offset_into_binary_text_segment: Option<u64>,
    pub address: Option<u64>,
    pub binary_name: Option<String>,
    #[serde(default)]
    pub sub_frames: Vec<RawFrame>,
}

impl Drop for RawFrame {
    // The derived drop recurses once per level of `sub_frames`.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.sub_frames);
        while let Some(mut frame) = pending.pop() {
            pending.append(&mut frame.sub_frames);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawCallStack {
    #[serde(default)]
    pub thread_attributed: bool,
    #[serde(default)]
    pub call_stack_root_frames: Vec<RawFrame>,
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawCallStackTree {
    #[serde(default)]
    pub call_stacks: Vec<RawCallStack>,
}

/// Index of a frame within a [`FrameArena`].
pub type FrameId = usize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameNode {
    pub binary_uuid: Option<String>,
    pub offset_into_binary_text_segment: Option<u64>,
    pub address: Option<u64>,
    pub binary_name: Option<String>,
    pub parent: Option<FrameId>,
    pub children: Vec<FrameId>,
}

impl FrameNode {
    /// A frame with neither an address nor a binary can't be placed anywhere.
    pub fn is_valid(&self) -> bool {
        self.address.is_some() || self.binary_uuid.is_some()
    }
}

/// Owns every frame of a call-stack tree. Nodes refer to each other by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameArena {
    nodes: Vec<FrameNode>,
}

impl FrameArena {
    pub fn new() -> FrameArena {
        FrameArena::default()
    }

    /// Add a node under `parent` (or as a root) and return its id.
    pub fn push(&mut self, mut node: FrameNode, parent: Option<FrameId>) -> FrameId {
        let id = self.nodes.len();
        node.parent = parent;
        node.children.clear();
        self.nodes.push(node);
        if let Some(parent) = parent {
            self.nodes[parent].children.push(id);
        }
        id
    }

    pub fn get(&self, id: FrameId) -> Option<&FrameNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The chain obtained by starting at `root` and always following the first child.
    pub fn first_child_chain(&self, root: FrameId) -> impl Iterator<Item = &FrameNode> + '_ {
        std::iter::successors(self.get(root), move |node| {
            node.children.first().and_then(|&child| self.get(child))
        })
    }

    /// All frames below and including `root`, parents before children, siblings in order.
    pub fn preorder(&self, root: FrameId) -> Vec<&FrameNode> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Move a deserialized tree into the arena without recursing.
    pub(crate) fn insert_tree(&mut self, root: RawFrame) -> FrameId {
        let mut pending = vec![(root, None)];
        let mut root_id = None;
        while let Some((mut raw, parent)) = pending.pop() {
            let sub_frames = std::mem::take(&mut raw.sub_frames);
            let id = self.push(
                FrameNode {
                    binary_uuid: raw.binary_uuid.take(),
                    offset_into_binary_text_segment: raw.offset_into_binary_text_segment,
                    address: raw.address,
                    binary_name: raw.binary_name.take(),
                    ..FrameNode::default()
                },
                parent,
            );
            root_id.get_or_insert(id);
            // reversed so that children pop (and get pushed into the arena) in order
            pending.extend(sub_frames.into_iter().rev().map(|child| (child, Some(id))));
        }
        root_id.unwrap_or_default()
    }
}

/// The frames of one captured thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack {
    /// Set on the thread the OS blames for the issue.
    pub thread_attributed: bool,
    pub root_frames: Vec<FrameId>,
    /// Filled in when a matching in-process crash record names this thread.
    pub name: Option<String>,
}

/// Every thread captured with a diagnostic, in the order the OS listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStackTree {
    pub arena: FrameArena,
    pub call_stacks: Vec<CallStack>,
}

impl CallStackTree {
    pub(crate) fn from_raw(raw: RawCallStackTree) -> CallStackTree {
        let mut arena = FrameArena::new();
        let call_stacks = raw
            .call_stacks
            .into_iter()
            .map(|stack| CallStack {
                thread_attributed: stack.thread_attributed,
                root_frames: stack
                    .call_stack_root_frames
                    .into_iter()
                    .map(|root| arena.insert_tree(root))
                    .collect(),
                name: stack.name,
            })
            .collect();
        CallStackTree { arena, call_stacks }
    }

    /// Parse the `callStackTree` object of a MetricKit diagnostic.
    pub fn from_json(json: &str) -> Result<CallStackTree, serde_json::Error> {
        let raw: RawCallStackTree = crate::metrickit::from_json_str(json)?;
        Ok(CallStackTree::from_raw(raw))
    }
}

impl<'de> Deserialize<'de> for CallStackTree {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        RawCallStackTree::deserialize(deserializer).map(CallStackTree::from_raw)
    }
}
