//! Output-format integration tests
//!
//! Drives the demo binary against a temp trace file and checks the written
//! Chrome-trace objects: field contract, begin/end pairing, per-thread
//! timestamp ordering, and identity stamping.

#![allow(deprecated)] // Command::cargo_bin is deprecated but still functional

use assert_cmd::Command;
use serde_json::Value;
use serial_test::serial;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

mod util;
use util::parse_trace;

fn run_workload(path: &Path, extra: &[&str]) {
    let mut cmd = Command::cargo_bin("tracefile").unwrap();
    cmd.env_remove("TRACE_MASTER")
        .env_remove("TRACE_FILE")
        .arg("--trace-file")
        .arg(path)
        .args(extra);
    cmd.assert().success();
}

#[test]
#[serial(trace_env)]
fn test_file_starts_with_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.trace");
    run_workload(&path, &["--threads", "1", "--events", "3"]);

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("[\n"));
    // Reference behavior: every object line carries a trailing comma.
    for line in content.lines().skip(1) {
        assert!(line.ends_with(','), "unterminated line: {line}");
    }
}

#[test]
#[serial(trace_env)]
fn test_base_field_contract() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.trace");
    run_workload(&path, &["--threads", "1", "--events", "5"]);

    let events = parse_trace(&path);
    assert!(!events.is_empty());
    for event in &events {
        for field in ["name", "cat", "ph", "pid", "tid", "ts", "args"] {
            assert!(event.get(field).is_some(), "missing {field}: {event}");
        }
        let ph = event["ph"].as_str().unwrap();
        assert!(["B", "E", "C", "i", "M"].contains(&ph), "bad phase {ph}");
        assert!(event["ts"].as_i64().unwrap() >= 0);
        assert_ne!(event["pid"].as_u64().unwrap(), 0);
        assert_ne!(event["tid"].as_u64().unwrap(), 0);
    }
}

#[test]
#[serial(trace_env)]
fn test_begin_end_pairing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.trace");
    run_workload(&path, &["--threads", "1", "--events", "4"]);

    let events = parse_trace(&path);
    let begins: Vec<&Value> = events
        .iter()
        .filter(|e| e["name"] == "work" && e["ph"] == "B")
        .collect();
    let ends: Vec<&Value> = events
        .iter()
        .filter(|e| e["name"] == "work" && e["ph"] == "E")
        .collect();
    assert_eq!(begins.len(), 4);
    assert_eq!(ends.len(), 4);
    for (begin, end) in begins.iter().zip(&ends) {
        assert_eq!(begin["cat"], "demo");
        assert_eq!(end["cat"], "demo");
        assert_eq!(begin["tid"], end["tid"]);
        assert!(end["ts"].as_i64().unwrap() >= begin["ts"].as_i64().unwrap());
    }
}

#[test]
#[serial(trace_env)]
fn test_metadata_events_present() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.trace");
    run_workload(
        &path,
        &["--threads", "2", "--events", "1", "--process-name", "demo-app"],
    );

    let events = parse_trace(&path);
    let process_names: Vec<&Value> = events
        .iter()
        .filter(|e| e["name"] == "process_name" && e["ph"] == "M")
        .collect();
    assert_eq!(process_names.len(), 1);
    assert_eq!(process_names[0]["args"]["name"], "demo-app");

    let thread_names: Vec<&Value> = events
        .iter()
        .filter(|e| e["name"] == "thread_name" && e["ph"] == "M")
        .collect();
    assert_eq!(thread_names.len(), 2, "one thread_name per worker");
}

#[test]
#[serial(trace_env)]
fn test_ts_monotonic_per_thread() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.trace");
    run_workload(&path, &["--threads", "3", "--events", "40"]);

    let events = parse_trace(&path);
    let mut last_ts: std::collections::HashMap<u64, i64> = std::collections::HashMap::new();
    for event in &events {
        let tid = event["tid"].as_u64().unwrap();
        let ts = event["ts"].as_i64().unwrap();
        if let Some(previous) = last_ts.insert(tid, ts) {
            assert!(ts >= previous, "ts regressed on tid {tid}");
        }
    }
    assert_eq!(last_ts.len(), 3, "expected three distinct worker tids");
}

#[test]
#[serial(trace_env)]
fn test_all_events_flushed_across_threshold() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.trace");
    // 150 iterations on one thread crosses the 100-event flush threshold;
    // nothing may be lost between the automatic and the shutdown flush.
    run_workload(&path, &["--threads", "1", "--events", "150"]);

    let events = parse_trace(&path);
    let counters = events.iter().filter(|e| e["ph"] == "C").count();
    assert_eq!(counters, 150);
}

#[test]
#[serial(trace_env)]
fn test_direct_mode_writes_strict_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.trace");
    run_workload(&path, &["--direct", "--events", "10"]);

    let content = fs::read_to_string(&path).unwrap();
    let parsed: Value = serde_json::from_str(&content).expect("direct mode must be strict JSON");
    let events = parsed.as_array().unwrap();
    assert_eq!(events.len(), 30); // begin + counter + end per iteration
    assert!(content.trim_end().ends_with(']'));
}
