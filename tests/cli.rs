// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::Value;
use std::io::Write;
use std::process::Command;

fn the_corelet() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_the-corelet"));
    command.env("RUST_LOG", "error");
    command
}

fn result_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn list_prints_builtin_types_with_locations() {
    let output = the_corelet().arg("--list").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("echo\tthe_corelet::handlers::echo::EchoHandler"));
    assert!(stdout.contains("whoami"));
}

#[test]
fn runs_one_event_per_triple_and_prints_json_results() {
    let output = the_corelet()
        .args(["echo", "sync", r#"{"a":1}"#, "ok", "thread", "null"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let results = result_lines(&output.stdout);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["success"], Value::Bool(true));
    assert_eq!(results[0]["payload"], serde_json::json!({"a": 1}));
    assert_eq!(results[1]["payload"], serde_json::json!({"ok": true}));
}

#[test]
fn corelet_mode_works_without_a_config_file() {
    let output = the_corelet()
        .args(["whoami", "corelet", "null"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let results = result_lines(&output.stdout);
    let payload = &results[0]["payload"];
    assert_eq!(payload["ok"], Value::Bool(true));
    assert_ne!(payload["pid"].as_u64(), Some(std::process::id() as u64));
}

#[test]
fn failed_event_sets_a_nonzero_exit_status() {
    let output = the_corelet().args(["fail", "thread", "{}"]).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let results = result_lines(&output.stdout);
    assert_eq!(results[0]["failure"], Value::String("handler".to_string()));
}

#[test]
fn invalid_mode_is_rejected_before_anything_runs() {
    let output = the_corelet().args(["echo", "fiber", "null"]).output().unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid execution mode"));
}

#[test]
fn config_file_sets_pool_size() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        "engine:\n  worker_threads: 2\ncorelet:\n  pool_size: 1\nlogging:\n  filter: error\n"
    )
    .unwrap();

    let output = the_corelet()
        .arg("--config")
        .arg(file.path())
        .args(["ok", "corelet", "null"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("\"max_corelets\":1"), "{}", stderr);
}
