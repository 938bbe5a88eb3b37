//! CLI E2E tests.
//!
//! Each test runs the `fieldtrack` binary against its own temporary HOME so
//! config and the SQLite store never touch the real data directory. Network
//! endpoints point at a closed local port, so sends fail fast and queue.

use std::path::Path;
use std::process::Command;

const DEAD_ENDPOINT: &str = "http://127.0.0.1:9";

fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_fieldtrack"))
        .args(args)
        .env("HOME", home)
        .env_remove("FIELDTRACK_ENV")
        .env_remove("FIELDTRACK_CLIENT_SECRET")
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_cli_success(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "CLI command failed: {args:?}\n{stderr}");
    stdout
}

/// Signed-in, offline configuration.
fn offline_home() -> tempfile::TempDir {
    let home = tempfile::tempdir().unwrap();
    for (key, value) in [
        ("employee_id", "sales01"),
        ("api.base_url", DEAD_ENDPOINT),
        ("api.token_url", "http://127.0.0.1:9/token"),
        ("geocoding.base_url", DEAD_ENDPOINT),
    ] {
        run_cli_success(home.path(), &["config", "set", key, value]);
    }
    home
}

#[test]
fn config_set_then_get() {
    let home = tempfile::tempdir().unwrap();
    run_cli_success(home.path(), &["config", "set", "tracking.min_send_interval_secs", "600"]);
    let out = run_cli_success(home.path(), &["config", "get", "tracking.min_send_interval_secs"]);
    assert_eq!(out.trim(), "600");
}

#[test]
fn config_rejects_unknown_key() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "set", "tracking.nope", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.starts_with("error:"), "{stderr}");
}

#[test]
fn config_show_masks_secret() {
    let home = tempfile::tempdir().unwrap();
    run_cli_success(home.path(), &["config", "set", "api.client_secret", "s3cret"]);
    let out = run_cli_success(home.path(), &["config", "show"]);
    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(json["api"]["client_secret"], "********");
}

#[test]
fn start_requires_sign_in() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["start", "--lat", "-6.2", "--lon", "106.8"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("No employee is signed in"), "{stderr}");
}

#[test]
fn start_without_position_asks_for_gps() {
    let home = offline_home();
    let (_, stderr, code) = run_cli(home.path(), &["start"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Could not get your location"), "{stderr}");
}

#[test]
fn offline_session_is_logged_and_queued() {
    let home = offline_home();
    let out = run_cli_success(home.path(), &["start", "--lat", "-6.2", "--lon", "106.8"]);
    assert!(out.contains("Tracking started"), "{out}");
    assert!(out.contains("queued for retry"), "{out}");

    // Session restored from the ledger in a new process.
    let (_, stderr, code) = run_cli(home.path(), &["start", "--lat", "-6.2", "--lon", "106.8"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("already active"), "{stderr}");

    let status = run_cli_success(home.path(), &["status", "--json"]);
    let status: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(status["active"], true);
    assert_eq!(status["source"], "eventLog");
    assert_eq!(status["pending"], 1);
    assert_eq!(status["sampling"]["intervalSecs"], 120);

    let log = run_cli_success(home.path(), &["log", "--json"]);
    let log: serde_json::Value = serde_json::from_str(&log).unwrap();
    assert_eq!(log["summary"]["points"], 1);
    assert_eq!(log["events"][0]["kind"], "start");

    let out = run_cli_success(home.path(), &["stop", "--lat", "-6.2", "--lon", "106.8"]);
    assert!(out.contains("Tracking stopped"), "{out}");
    let status = run_cli_success(home.path(), &["status", "--json"]);
    let status: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(status["active"], false);
    assert_eq!(status["pending"], 2);
    assert!(status["sampling"].is_null());
}

#[test]
fn sample_while_idle_is_ignored() {
    let home = offline_home();
    let out = run_cli_success(home.path(), &["sample", "--lat", "-6.2", "--lon", "106.8"]);
    assert!(out.contains("sample ignored"), "{out}");
}

#[test]
fn logout_clears_local_state() {
    let home = offline_home();
    run_cli_success(home.path(), &["start", "--lat", "-6.2", "--lon", "106.8"]);
    run_cli_success(home.path(), &["logout"]);

    let out = run_cli_success(home.path(), &["config", "get", "employee_id"]);
    assert_eq!(out.trim(), "");
    let log = run_cli_success(home.path(), &["log"]);
    assert!(log.starts_with("No events"), "{log}");
}
