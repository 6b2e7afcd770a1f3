// These tests check that the basic CLI configs still work.
//
// Note that `cargo test` for an application adds our binary to
// the env as `CARGO_BIN_EXE_<name>`.

use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, UNIX_EPOCH};

use serde_json::{json, Value};

fn run(args: &[&dyn AsRef<std::ffi::OsStr>]) -> Output {
    let bin = env!("CARGO_BIN_EXE_fatal-issue-reporter");
    Command::new(bin)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .unwrap()
}

fn payload_json() -> Value {
    let frame = json!({
        "binaryUUID": "70B89F27-1634-3580-A695-57CDB41D7743",
        "offsetIntoBinaryTextSegment": 165304,
        "binaryName": "Example",
        "address": 7170766264u64,
        "subFrames": [],
    });
    json!({
        "timeStampBegin": "1995-03-11 00:00:00",
        "timeStampEnd": "1995-03-11 00:00:00",
        "crashDiagnostics": [{
            "callStackTree": {
                "callStacksPerThread": true,
                "callStacks": [{"threadAttributed": true, "callStackRootFrames": [frame.clone()]}],
            },
            "diagnosticMetaData": {"signal": 9},
        }],
        "hangDiagnostics": [{
            "callStackTree": {
                "callStacksPerThread": true,
                "callStacks": [{"threadAttributed": true, "callStackRootFrames": [frame]}],
            },
            "diagnosticMetaData": {"hangDuration": "0.7 sec"},
        }],
    })
}

fn ingest(dir: &Path, extra: &[&str]) -> Output {
    let payload = dir.join("payload.json");
    fs::write(&payload, payload_json().to_string()).unwrap();
    let sdk_root = dir.join("sdk");
    let mut args: Vec<&dyn AsRef<std::ffi::OsStr>> = vec![&"ingest", &payload, &sdk_root];
    for arg in extra {
        args.push(arg);
    }
    run(&args)
}

#[test]
fn test_process() {
    let dir = tempfile::tempdir().unwrap();
    let sdk_root = dir.path().join("sdk");
    let cache_dir = dir.path().join("cache");
    let source = cache_dir.join("io.example.app");
    fs::create_dir_all(sdk_root.join("reports")).unwrap();
    fs::create_dir_all(&source).unwrap();
    fs::write(
        sdk_root.join("reports").join("config"),
        "{cache_dir}/{bundle_id},dmp\n",
    )
    .unwrap();
    fs::write(source.join("crash.dmp"), b"MDMP").unwrap();
    File::options()
        .write(true)
        .open(source.join("crash.dmp"))
        .unwrap()
        .set_modified(UNIX_EPOCH + Duration::from_millis(42))
        .unwrap();

    let output = run(&[
        &"process",
        &sdk_root,
        &"--cache-dir",
        &cache_dir,
        &"--bundle-id",
        &"io.example.app",
    ]);
    let stdout = String::from_utf8(output.stdout).unwrap();
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert!(output.status.success());
    assert_eq!(stderr, "");
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "{stdout}");
    assert_eq!(lines[0], "_fatal_issue_reporting_state: CRASH_REPORT_SENT");
    assert!(lines[1].starts_with("_fatal_issue_reporting_duration_ms: "));
    assert_eq!(lines[2], "_fatal_reporter_init_thread: main");
    assert!(sdk_root.join("reports/new/42_crash.dmp").is_file());
}

#[test]
fn test_process_missing_config() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&[&"process", &dir.path()]);
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(output.status.success());
    assert!(stdout.starts_with("_fatal_issue_reporting_state: MISSING_CRASH_CONFIG_FILE\n"));
}

#[test]
fn test_ingest_and_inspect() {
    let dir = tempfile::tempdir().unwrap();
    let output = ingest(dir.path(), &["--minimum-hang-duration-ms", "1000"]);
    let stdout = String::from_utf8(output.stdout).unwrap();
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert!(output.status.success(), "{stderr}");
    assert_eq!(stderr, "");
    // the 0.7s hang is under the minimum
    let staged: Vec<_> = stdout.lines().collect();
    assert_eq!(staged.len(), 1, "{stdout}");
    assert!(staged[0].contains("794880000000_native_crash_"));

    let output = run(&[&"inspect", &staged[0]]);
    let human = String::from_utf8(output.stdout).unwrap();
    assert!(output.status.success());
    assert!(human.contains("Error: SIGKILL"), "{human}");

    let output = run(&[&"inspect", &"--json", &"--pretty", &staged[0]]);
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["type"], "native_crash");
    assert_eq!(report["time"], "1995-03-11T00:00:00Z");
    assert_eq!(report["binary_images"][0]["load_address"], "0x00000001ab66b000");
}

#[test]
fn test_ingest_event_types() {
    let dir = tempfile::tempdir().unwrap();
    let output = ingest(
        dir.path(),
        &["--event-types", "hang", "--minimum-hang-duration-ms", "500"],
    );
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(output.status.success());
    let staged: Vec<_> = stdout.lines().collect();
    assert_eq!(staged.len(), 1, "{stdout}");
    assert!(staged[0].contains("_anr_"));
}

#[test]
fn test_inspect_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.cap");
    fs::write(&path, [0xffu8; 8]).unwrap();

    let output = run(&[&"inspect", &path]);
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert!(!output.status.success());
    assert!(stderr.contains("Invalid - Error reading report"), "{stderr}");
}

#[test]
fn test_pretty_needs_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&[&"inspect", &"--pretty", &dir.path().join("report.cap")]);
    let stderr = String::from_utf8(output.stderr).unwrap();

    assert!(!output.status.success());
    assert!(stderr.contains("--pretty"), "{stderr}");
}
