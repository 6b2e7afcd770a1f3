//! Naming MetricKit threads from an in-process crash record.
//!
//! MetricKit doesn't record thread names, but an in-process crash reporter running in the
//! crashed process usually did. When both describe the same crash, threads whose backtraces
//! are identical get the in-process record's name.

use std::collections::HashMap;

use serde::Deserialize;

use crate::diagnostic::CallStackTree;
use crate::metrickit::{from_json_slice, CrashMetaData};
use crate::ProcessError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFrame {
    pub address: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordBacktrace {
    #[serde(default)]
    pub contents: Vec<RecordFrame>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordThread {
    pub name: Option<String>,
    pub backtrace: Option<RecordBacktrace>,
}

/// A crash record written by an in-process crash reporter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashRecord {
    #[serde(rename = "diagnosticMetaData")]
    pub meta: Option<CrashMetaData>,
    #[serde(default)]
    pub threads: Vec<RecordThread>,
}

struct NamedThread<'a> {
    name: &'a str,
    addresses: Vec<u64>,
    /// How many record threads carried this name.
    count: usize,
}

impl CrashRecord {
    pub fn from_slice(json: &[u8]) -> Result<CrashRecord, ProcessError> {
        Ok(from_json_slice(json)?)
    }

    /// Whether this record and a MetricKit diagnostic describe the same crash.
    pub fn matches(&self, diagnostic: &CrashMetaData) -> bool {
        let Some(ref meta) = self.meta else {
            return false;
        };
        meta.exception_type == diagnostic.exception_type
            && meta.exception_code == diagnostic.exception_code
            && meta.signal == diagnostic.signal
            && meta.pid == diagnostic.pid
    }

    fn named_threads(&self) -> Vec<NamedThread<'_>> {
        let mut named: Vec<NamedThread> = Vec::new();
        for thread in &self.threads {
            let (Some(name), Some(backtrace)) = (thread.name.as_deref(), &thread.backtrace) else {
                continue;
            };
            let Some(addresses) = backtrace
                .contents
                .iter()
                .map(|frame| frame.address)
                .collect::<Option<Vec<_>>>()
                .filter(|addresses| !addresses.is_empty())
            else {
                continue;
            };
            // repeated names keep the first backtrace
            match named.iter_mut().find(|existing| existing.name == name) {
                Some(existing) => existing.count += 1,
                None => named.push(NamedThread {
                    name,
                    addresses,
                    count: 1,
                }),
            }
        }
        named
    }
}

/// Addresses of a MetricKit thread in depth-first order, minus the last one, which
/// MetricKit records but in-process reporters never capture. `None` if any frame lacks an
/// address.
fn thread_addresses(tree: &CallStackTree, stack: usize) -> Option<Vec<u64>> {
    let root = *tree.call_stacks.get(stack)?.root_frames.first()?;
    let mut addresses = tree
        .arena
        .preorder(root)
        .into_iter()
        .map(|node| node.address)
        .collect::<Option<Vec<_>>>()?;
    addresses.pop();
    (!addresses.is_empty()).then_some(addresses)
}

/// Copy thread names from `record` into `tree`. Each named thread is used at most as many
/// times as it appears in the record. Returns how many threads were named.
pub fn merge_thread_names(tree: &mut CallStackTree, record: &CrashRecord) -> usize {
    let named_threads = record.named_threads();
    if named_threads.is_empty() {
        return 0;
    }

    let mut usage: HashMap<&str, usize> = HashMap::new();
    let mut merged = 0;
    for stack in 0..tree.call_stacks.len() {
        let Some(addresses) = thread_addresses(tree, stack) else {
            continue;
        };
        let Some(matching) = named_threads.iter().find(|thread| {
            usage.get(thread.name).copied().unwrap_or(0) < thread.count
                && thread.addresses == addresses
        }) else {
            continue;
        };
        *usage.entry(matching.name).or_insert(0) += 1;
        tree.call_stacks[stack].name = Some(matching.name.to_owned());
        merged += 1;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"{"callStacks": [
        {"callStackRootFrames": [{"address": 1, "subFrames": [
            {"address": 2, "subFrames": [{"address": 3}]},
            {"address": 4}
        ]}]},
        {"callStackRootFrames": [{"address": 1, "subFrames": [
            {"address": 2, "subFrames": [{"address": 3}]},
            {"address": 4}
        ]}]},
        {"callStackRootFrames": [{"address": 1, "subFrames": [
            {"address": 2, "subFrames": [{"address": 3}]},
            {"address": 4}
        ]}]},
        {"callStackRootFrames": [{"address": 9, "subFrames": [{"address": 8}]}]},
        {"callStackRootFrames": [{"address": 7}]}
    ]}"#;

    fn record(json: &str) -> CrashRecord {
        CrashRecord::from_slice(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_metadata_must_match() {
        let record = record(
            r#"{"diagnosticMetaData": {"exceptionType": 1, "signal": 11, "pid": 42}, "threads": []}"#,
        );
        let mut meta = CrashMetaData {
            exception_type: Some(1),
            signal: Some(11),
            pid: Some(42),
            ..CrashMetaData::default()
        };
        assert!(record.matches(&meta));
        meta.pid = Some(43);
        assert!(!record.matches(&meta));

        let no_meta = self::record(r#"{"threads": []}"#);
        assert!(!no_meta.matches(&CrashMetaData::default()));
    }

    #[test]
    fn test_names_are_used_as_often_as_recorded() {
        let mut tree = CallStackTree::from_json(TREE).unwrap();
        let record = record(
            r#"{"threads": [
                {"name": "worker", "backtrace": {"contents": [{"address": 1}, {"address": 2}, {"address": 3}]}},
                {"name": "worker", "backtrace": {"contents": [{"address": 1}, {"address": 2}, {"address": 3}]}},
                {"name": "io", "backtrace": {"contents": [{"address": 9}]}},
                {"backtrace": {"contents": [{"address": 7}]}},
                {"name": "empty", "backtrace": {"contents": []}}
            ]}"#,
        );

        assert_eq!(merge_thread_names(&mut tree, &record), 3);
        let names: Vec<_> = tree.call_stacks.iter().map(|s| s.name.as_deref()).collect();
        assert_eq!(
            names,
            vec![Some("worker"), Some("worker"), None, Some("io"), None]
        );
    }

    #[test]
    fn test_single_frame_thread_never_matches() {
        let mut tree =
            CallStackTree::from_json(r#"{"callStacks": [{"callStackRootFrames": [{"address": 7}]}]}"#)
                .unwrap();
        let record = record(r#"{"threads": [{"name": "x", "backtrace": {"contents": [{"address": 7}]}}]}"#);
        assert_eq!(merge_thread_names(&mut tree, &record), 0);
    }
}
