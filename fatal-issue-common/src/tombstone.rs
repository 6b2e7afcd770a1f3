//! The subset of Android's `tombstone.proto` that native crash reports are built from.
//!
//! Android writes a protobuf tombstone for every native crash and hands it back through
//! `ApplicationExitInfo::getTraceInputStream` on the next launch. Only the fields used to
//! build reports are declared; everything else is skipped while decoding. Tags match
//! `system/core/debuggerd/proto/tombstone.proto`.

use std::collections::BTreeMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Tombstone {
    #[prost(string, tag = "2")]
    pub build_fingerprint: String,
    #[prost(uint32, tag = "5")]
    pub pid: u32,
    /// The thread that crashed.
    #[prost(uint32, tag = "6")]
    pub tid: u32,
    #[prost(message, optional, tag = "10")]
    pub signal_info: Option<Signal>,
    #[prost(string, tag = "14")]
    pub abort_message: String,
    #[prost(message, repeated, tag = "15")]
    pub causes: Vec<Cause>,
    /// Every thread of the process, keyed by tid.
    #[prost(btree_map = "uint32, message", tag = "16")]
    pub threads: BTreeMap<u32, Thread>,
    /// Sorted by `begin_address`, non-overlapping.
    #[prost(message, repeated, tag = "17")]
    pub memory_mappings: Vec<MemoryMapping>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Signal {
    #[prost(int32, tag = "1")]
    pub number: i32,
    /// e.g. `SIGSEGV`
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(int32, tag = "3")]
    pub code: i32,
    #[prost(string, tag = "4")]
    pub code_name: String,
    #[prost(bool, tag = "8")]
    pub has_fault_address: bool,
    #[prost(uint64, tag = "9")]
    pub fault_address: u64,
}

/// debuggerd's guess at what went wrong, e.g. "null pointer dereference".
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Cause {
    #[prost(string, tag = "1")]
    pub human_readable: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Thread {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(message, repeated, tag = "4")]
    pub current_backtrace: Vec<BacktraceFrame>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BacktraceFrame {
    #[prost(uint64, tag = "1")]
    pub rel_pc: u64,
    #[prost(uint64, tag = "2")]
    pub pc: u64,
    #[prost(uint64, tag = "3")]
    pub sp: u64,
    #[prost(string, tag = "4")]
    pub function_name: String,
    #[prost(uint64, tag = "5")]
    pub function_offset: u64,
    #[prost(string, tag = "6")]
    pub file_name: String,
    #[prost(uint64, tag = "7")]
    pub file_map_offset: u64,
    #[prost(string, tag = "8")]
    pub build_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MemoryMapping {
    #[prost(uint64, tag = "1")]
    pub begin_address: u64,
    /// Exclusive.
    #[prost(uint64, tag = "2")]
    pub end_address: u64,
    #[prost(uint64, tag = "3")]
    pub offset: u64,
    #[prost(bool, tag = "4")]
    pub read: bool,
    #[prost(bool, tag = "5")]
    pub write: bool,
    #[prost(bool, tag = "6")]
    pub execute: bool,
    #[prost(string, tag = "7")]
    pub mapping_name: String,
    #[prost(string, tag = "8")]
    pub build_id: String,
    #[prost(uint64, tag = "9")]
    pub load_bias: u64,
}

impl MemoryMapping {
    /// The name the tombstone parser gives a mapping that has none.
    pub fn anonymous_name(&self) -> String {
        format!("<anonymous:{:x}>", self.begin_address)
    }

    /// The id frames in this mapping refer to their image by.
    pub fn image_id(&self) -> String {
        [self.build_id.trim(), self.mapping_name.trim()]
            .into_iter()
            .find(|id| !id.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| self.anonymous_name())
    }

    pub fn contains(&self, address: u64) -> bool {
        self.begin_address <= address && address < self.end_address
    }
}
