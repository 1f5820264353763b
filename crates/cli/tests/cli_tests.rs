//! CLI integration tests

use std::process::{Command, Output};

fn costctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_costctl"))
        .args(args)
        .env_remove("COSTCTL_API_URL")
        .output()
        .expect("Failed to execute costctl")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = costctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Cost Guard"), "Should show app name");
    assert!(stdout.contains("executions"), "Should show executions command");
    assert!(stdout.contains("override"), "Should show override command");
    assert!(stdout.contains("recommendations"), "Should show recommendations command");
    assert!(stdout.contains("advise"), "Should show advise command");
    assert!(stdout.contains("health"), "Should show health command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = costctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("costctl"), "Should show binary name");
}

#[test]
fn test_executions_list_help() {
    let output = costctl(&["executions", "list", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--status"), "Should show status option");
    assert!(stdout.contains("--limit"), "Should show limit option");
}

#[test]
fn test_override_help() {
    let output = costctl(&["override", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("abort"));
    assert!(stdout.contains("approve"));
    assert!(stdout.contains("list"));
}

/// Test format and api-url options
#[test]
fn test_global_options() {
    let output = costctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("COSTCTL_API_URL"), "Should show env var");
}

#[test]
fn test_advise_memory_runs_offline() {
    let output = costctl(&[
        "--format",
        "json",
        "advise",
        "memory",
        "--duration-ms",
        "500",
        "--utilization",
        "20",
        "--memory-mb",
        "1024",
    ]);

    assert!(output.status.success(), "Local advice should not need the agent");
    let recommendation: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(recommendation["recommended_memory_mb"], 768);
    assert!(recommendation["estimated_monthly_savings"].as_f64().unwrap() > 0.0);
}

#[test]
fn test_advise_concurrency_runs_offline() {
    let output = costctl(&[
        "--format",
        "json",
        "advise",
        "concurrency",
        "--peak",
        "50",
        "--average",
        "10",
        "--burst-pct",
        "15",
    ]);

    assert!(output.status.success());
    let recommendation: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(recommendation["reserved_concurrency"], 15);
    assert_eq!(recommendation["optional"], false);
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = costctl(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error"), "Should show error message");
}

/// Test malformed id handling
#[test]
fn test_malformed_execution_id() {
    let output = costctl(&["executions", "show", "not-a-uuid"]);

    assert!(!output.status.success(), "Malformed id should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid value"), "Should reject the id");
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let output = costctl(&["executions", "cancel"]);

    assert!(!output.status.success(), "Missing argument should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("required"), "Should show error about missing argument");
}
