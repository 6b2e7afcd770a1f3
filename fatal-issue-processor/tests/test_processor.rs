use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use prost::Message;
use serde_json::{json, Value};

use fatal_issue_common::format as wire;
use fatal_issue_processor::metrickit::{DiagnosticEventReporter, DiagnosticPayload};
use fatal_issue_processor::EventTypes;

const APP_UUID: &str = "70B89F27-1634-3580-A695-57CDB41D7743";
const PROC_UUID: &str = "D366A690-4127-4BB6-B6A9-019A2ACD0D8D";
const CAMP_UUID: &str = "E41D0413-92D1-4B00-9B62-43D57A1B0CC5";

fn frame(uuid: &str, name: &str, offset: u64, address: u64, sub_frames: Vec<Value>) -> Value {
    json!({
        "binaryUUID": uuid,
        "offsetIntoBinaryTextSegment": offset,
        "sampleCount": 1,
        "binaryName": name,
        "address": address,
        "subFrames": sub_frames,
    })
}

fn crash(meta: Value, call_stacks: Vec<Value>) -> Value {
    json!({
        "callStackTree": {"callStacksPerThread": true, "callStacks": call_stacks},
        "diagnosticMetaData": meta,
    })
}

fn hang(duration: f64, hang_type: &str, call_stacks: Vec<Value>) -> Value {
    json!({
        "callStackTree": {"callStacksPerThread": true, "callStacks": call_stacks},
        "diagnosticMetaData": {"hangDuration": duration, "hangType": hang_type},
    })
}

fn payload(crashes: Vec<Value>, hangs: Vec<Value>, time_stamp_end: &str) -> DiagnosticPayload {
    let json = json!({
        "timeStampBegin": time_stamp_end,
        "timeStampEnd": time_stamp_end,
        "crashDiagnostics": crashes,
        "hangDiagnostics": hangs,
    });
    DiagnosticPayload::from_slice(json.to_string().as_bytes()).unwrap()
}

fn reporter(dir: &Path, event_types: EventTypes, minimum_hang_secs: f64) -> DiagnosticEventReporter {
    DiagnosticEventReporter::with_sdk_version(
        dir,
        "41.5.67",
        event_types,
        Duration::from_secs_f64(minimum_hang_secs),
    )
}

fn staged_files(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

/// Decode with the raw wire types, the way an uploader would.
fn read_wire(path: &Path) -> wire::Report {
    wire::Report::decode(fs::read(path).unwrap().as_slice()).unwrap()
}

#[test]
fn test_sdk_attributes() {
    let dir = tempfile::tempdir().unwrap();
    let reporter = reporter(dir.path(), EventTypes::CRASH, 2.5);
    let staged = reporter.did_receive(&[payload(
        vec![crash(json!({"signal": 9}), vec![])],
        vec![],
        "1995-03-11 00:00:00",
    )]);

    let files = staged_files(dir.path());
    assert_eq!(files, staged);
    assert_eq!(files.len(), 1);
    assert!(file_name(&files[0]).contains("_crash_"));

    let report = read_wire(&files[0]);
    let sdk = report.sdk.as_ref().unwrap();
    assert_eq!(sdk.id, "io.bitdrift.capture-apple");
    assert_eq!(sdk.version, "41.5.67");
    assert_eq!(report.report_type(), wire::ReportType::NativeCrash);
}

#[test]
fn test_device_time() {
    let dir = tempfile::tempdir().unwrap();
    reporter(dir.path(), EventTypes::CRASH, 2.5).did_receive(&[payload(
        vec![crash(json!({"signal": 9}), vec![])],
        vec![],
        "1995-03-11 00:00:00",
    )]);

    let files = staged_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(file_name(&files[0]).starts_with("794880000000_"));
    let device = read_wire(&files[0]).device_metrics.unwrap();
    assert_eq!(device.time.unwrap().seconds, 794_880_000);
    assert_eq!(device.platform(), wire::Platform::Ios);
}

#[test]
fn test_mach_exception_name_in_error() {
    let dir = tempfile::tempdir().unwrap();
    reporter(dir.path(), EventTypes::CRASH, 2.5).did_receive(&[payload(
        vec![crash(json!({"signal": 4, "exceptionType": 1}), vec![])],
        vec![],
        "1995-03-11 00:00:00",
    )]);

    let files = staged_files(dir.path());
    assert_eq!(files.len(), 1);
    let report = read_wire(&files[0]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].name, "EXC_BAD_ACCESS");
    assert_eq!(report.errors[0].reason, "SIGILL");
}

#[test]
fn test_ns_exception_name_in_error() {
    let dir = tempfile::tempdir().unwrap();
    let meta = json!({
        "signal": 4,
        "exceptionType": 1,
        "objectiveCexceptionReason": {
            "exceptionName": "NSRangeException",
            "composedMessage": "index 5 out of range [0..2]",
            "exceptionType": "NSException",
            "className": "NSException",
        },
    });
    reporter(dir.path(), EventTypes::CRASH, 2.5).did_receive(&[payload(
        vec![crash(meta, vec![])],
        vec![],
        "1995-03-11 00:00:00",
    )]);

    let report = read_wire(&staged_files(dir.path())[0]);
    assert_eq!(report.errors[0].name, "EXC_BAD_ACCESS");
    assert_eq!(
        report.errors[0].reason,
        "NSRangeException: index 5 out of range [0..2]"
    );
}

#[test]
fn test_watchdog_termination() {
    let termination = "<RBSTerminateContext| domain:10 code:0x8BADF00D explanation:[app<com.example.myapp>:123] Failed to terminate gracefully after 5.0s\nProcessVisibility: Foreground\nProcessState: Running\nWatchdogEvent: process-exit reportType:CrashLog maxTerminationResistance:Interactive>";
    let dir = tempfile::tempdir().unwrap();
    reporter(dir.path(), EventTypes::CRASH, 2.5).did_receive(&[payload(
        vec![crash(
            json!({
                "signal": 9,
                "exceptionType": 10,
                "exceptionCode": 0,
                "terminationReason": termination,
            }),
            vec![],
        )],
        vec![],
        "1995-03-11 00:00:00",
    )]);

    let files = staged_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(file_name(&files[0]).contains("_anr_"));
    let report = read_wire(&files[0]);
    assert_eq!(report.report_type(), wire::ReportType::AppNotResponding);
    assert_eq!(report.errors[0].name, "App Hang");
    assert_eq!(report.errors[0].reason, termination);
}

#[test]
fn test_send_attributed_empty_stack() {
    let dir = tempfile::tempdir().unwrap();
    let call_stacks = vec![
        json!({"threadAttributed": true, "callStackRootFrames": []}),
        json!({"callStackRootFrames": [frame(APP_UUID, "MetricKitTestApp", 165304, 7170766264, vec![
            frame(PROC_UUID, "Proc", 126721, 23786237891, vec![]),
        ])]}),
    ];
    reporter(dir.path(), EventTypes::CRASH, 2.5).did_receive(&[payload(
        vec![crash(json!({"signal": 9}), call_stacks)],
        vec![],
        "1995-03-11 00:00:00",
    )]);

    let files = staged_files(dir.path());
    assert_eq!(files.len(), 1);
    let report = read_wire(&files[0]);
    assert!(report.thread_details.is_none());

    let error = &report.errors[0];
    assert_eq!(error.name, "SIGKILL");
    assert_eq!(error.stack_trace.len(), 2);
    assert_eq!(error.stack_trace[0].image_id.as_deref(), Some(APP_UUID));
    assert_eq!(error.stack_trace[0].frame_address, Some(7170766264));
    assert_eq!(error.stack_trace[1].image_id.as_deref(), Some(PROC_UUID));
    assert_eq!(error.stack_trace[1].frame_address, Some(23786237891));

    assert_eq!(report.binary_images.len(), 2);
    assert_eq!(report.binary_images[0].path, "MetricKitTestApp");
    assert_eq!(report.binary_images[0].load_address, 7170766264 - 165304);
    assert_eq!(report.binary_images[1].path, "Proc");
    assert_eq!(report.binary_images[1].load_address, 23786237891 - 126721);
}

#[test]
fn test_discard_invalid_frame() {
    let dir = tempfile::tempdir().unwrap();
    let invalid = json!({"subFrames": [frame(PROC_UUID, "Proc", 126721, 23786237891, vec![])]});
    let call_stacks = vec![json!({"callStackRootFrames": [
        frame(APP_UUID, "MetricKitTestApp", 165304, 7170766264, vec![invalid]),
    ]})];
    reporter(dir.path(), EventTypes::CRASH, 2.5).did_receive(&[payload(
        vec![crash(json!({"signal": 6}), call_stacks)],
        vec![],
        "1995-03-11 00:00:00",
    )]);

    let report = read_wire(&staged_files(dir.path())[0]);
    assert!(report.thread_details.is_none());
    let error = &report.errors[0];
    assert_eq!(error.name, "SIGABRT");
    assert_eq!(error.stack_trace.len(), 1);
    assert_eq!(error.stack_trace[0].image_id.as_deref(), Some(APP_UUID));
    assert_eq!(report.binary_images.len(), 1);
    assert_eq!(report.binary_images[0].load_address, 7170766264 - 165304);
}

fn hang_call_stacks() -> Vec<Value> {
    vec![
        json!({"threadAttributed": true, "callStackRootFrames": [
            frame(APP_UUID, "MetricKitTestApp", 165304, 7170766264, vec![
                frame(PROC_UUID, "Proc", 126721, 23786237891, vec![]),
            ]),
        ]}),
        json!({"callStackRootFrames": [
            frame(APP_UUID, "MetricKitTestApp", 100415, 7170701375, vec![]),
        ]}),
    ]
}

#[test]
fn test_hang_under_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let staged = reporter(dir.path(), EventTypes::all(), 1.0).did_receive(&[payload(
        vec![],
        vec![hang(0.7, "Main Runloop Hang", hang_call_stacks())],
        "2022-04-07 00:00:00",
    )]);
    assert!(staged.is_empty());
    assert!(staged_files(dir.path()).is_empty());
}

#[test]
fn test_hang_over_threshold() {
    let dir = tempfile::tempdir().unwrap();
    reporter(dir.path(), EventTypes::all(), 1.0).did_receive(&[payload(
        vec![],
        vec![hang(1.7, "Main Runloop Hang", hang_call_stacks())],
        "2008-11-25 00:00:00",
    )]);

    let files = staged_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(file_name(&files[0]).contains("_anr_"));

    let report = read_wire(&files[0]);
    assert_eq!(report.report_type(), wire::ReportType::AppNotResponding);
    let details = report.thread_details.unwrap();
    assert_eq!(details.threads.len(), 1);
    assert_eq!(details.count, 2);
    assert_eq!(details.threads[0].stack_trace.len(), 1);
    assert_eq!(details.threads[0].stack_trace[0].frame_address, Some(7170701375));

    let error = &report.errors[0];
    assert_eq!(error.name, "Main Runloop Hang");
    assert_eq!(error.reason, "app was unresponsive for 1.7 sec");
    // leaf first for hangs
    assert_eq!(error.stack_trace[0].image_id.as_deref(), Some(PROC_UUID));
    assert_eq!(error.stack_trace[0].frame_address, Some(23786237891));
    assert_eq!(error.stack_trace[1].image_id.as_deref(), Some(APP_UUID));
    assert_eq!(error.stack_trace[1].frame_address, Some(7170766264));

    assert_eq!(report.binary_images.len(), 2);
    assert_eq!(report.binary_images[0].id, APP_UUID);
    assert_eq!(report.binary_images[0].load_address, 7170766264 - 165304);
    assert_eq!(report.binary_images[1].id, PROC_UUID);
    assert_eq!(report.binary_images[1].load_address, 23786237891 - 126721);
}

#[test]
fn test_hangs_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let staged = reporter(dir.path(), EventTypes::CRASH, 1.0).did_receive(&[payload(
        vec![],
        vec![hang(5.0, "Main Runloop Hang", hang_call_stacks())],
        "2008-11-25 00:00:00",
    )]);
    assert!(staged.is_empty());
}

#[test]
fn test_many_thread_crash_report() {
    let dir = tempfile::tempdir().unwrap();
    let call_stacks = vec![
        json!({"callStackRootFrames": [frame(CAMP_UUID, "Camp", 100415, 7170701375, vec![])]}),
        json!({"threadAttributed": true, "callStackRootFrames": [
            frame(APP_UUID, "MyApp", 165304, 7170766264, vec![
                frame(PROC_UUID, "Proc", 126721, 23786237891, vec![]),
            ]),
        ]}),
        json!({"callStackRootFrames": [
            frame(APP_UUID, "MyApp", 100415, 9283737662, vec![
                frame(PROC_UUID, "Proc", 126721, 23786237891, vec![]),
            ]),
        ]}),
    ];
    reporter(dir.path(), EventTypes::CRASH, 1.0).did_receive(&[payload(
        vec![crash(json!({"signal": 5}), call_stacks)],
        vec![],
        "2008-11-25 00:00:00",
    )]);

    let files = staged_files(dir.path());
    assert_eq!(files.len(), 1);
    assert!(file_name(&files[0]).contains("_crash_"));

    let report = read_wire(&files[0]);
    let details = report.thread_details.unwrap();
    assert_eq!(details.threads.len(), 2);
    assert_eq!(details.count, 3);

    assert_eq!(details.threads[0].index, 0);
    assert_eq!(details.threads[0].stack_trace.len(), 1);
    assert_eq!(details.threads[0].stack_trace[0].image_id.as_deref(), Some(CAMP_UUID));

    // the error is thread 1
    assert_eq!(details.threads[1].index, 2);
    assert_eq!(details.threads[1].stack_trace.len(), 2);
    assert_eq!(details.threads[1].stack_trace[0].frame_address, Some(9283737662));
    assert_eq!(details.threads[1].stack_trace[1].frame_address, Some(23786237891));

    let error = &report.errors[0];
    assert_eq!(error.name, "SIGTRAP");
    assert_eq!(error.stack_trace.len(), 2);
    assert_eq!(error.stack_trace[0].frame_address, Some(7170766264));

    let images: Vec<_> = report
        .binary_images
        .iter()
        .map(|image| (image.id.as_str(), image.path.as_str(), image.load_address))
        .collect();
    assert_eq!(
        images,
        vec![
            (CAMP_UUID, "Camp", 7170701375 - 100415),
            (APP_UUID, "MyApp", 7170766264 - 165304),
            (PROC_UUID, "Proc", 23786237891 - 126721),
        ]
    );
}

#[test]
fn test_crash_record_names_threads() {
    let dir = tempfile::tempdir().unwrap();
    let call_stacks = vec![
        json!({"threadAttributed": true, "callStackRootFrames": [
            frame(APP_UUID, "MyApp", 165304, 7170766264, vec![
                frame(PROC_UUID, "Proc", 126721, 23786237891, vec![]),
            ]),
        ]}),
        json!({"callStackRootFrames": [
            frame(APP_UUID, "MyApp", 100415, 9283737662, vec![
                frame(PROC_UUID, "Proc", 126721, 23786237891, vec![]),
            ]),
        ]}),
    ];
    let meta = json!({"signal": 11, "exceptionType": 1, "exceptionCode": 0, "pid": 77});
    let record = json!({
        "diagnosticMetaData": meta,
        "threads": [
            {"name": "tokio-runtime-worker", "backtrace": {"contents": [{"address": 9283737662u64}]}},
        ],
    });

    let mut reporter = reporter(dir.path(), EventTypes::CRASH, 1.0);
    reporter.set_crash_record(
        fatal_issue_processor::enhance::CrashRecord::from_slice(record.to_string().as_bytes())
            .unwrap(),
    );
    reporter.did_receive(&[payload(
        vec![crash(meta, call_stacks)],
        vec![],
        "2008-11-25 00:00:00",
    )]);

    let report = fatal_issue_processor::storage::read_report(&staged_files(dir.path())[0]).unwrap();
    let details = report.thread_details.unwrap();
    assert_eq!(details.threads[0].name.as_deref(), Some("tokio-runtime-worker"));
    assert_eq!(
        report.time,
        UNIX_EPOCH + Duration::from_secs(1_227_571_200)
    );
}

#[test]
fn test_bad_diagnostic_does_not_stop_others() {
    let dir = tempfile::tempdir().unwrap();
    let staged = reporter(dir.path(), EventTypes::all(), 1.0).did_receive(&[payload(
        vec![crash(json!({"signal": 6}), vec![])],
        // no duration, dropped
        vec![json!({"diagnosticMetaData": {"hangType": "Main Runloop Hang"}})],
        "2008-11-25 00:00:00",
    )]);
    assert_eq!(staged.len(), 1);
}
