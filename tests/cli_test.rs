//! Runs the built binary on requests that must be rejected before any
//! cluster access.

use std::io::Write;
use std::process::{Command, Output};

fn ts_obs(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ts-obs"));
    cmd.args(args)
        .env_remove("PGPASSWORD_POSTGRES")
        .env_remove("RUST_LOG")
        .env_remove("KUBERNETES_SERVICE_HOST")
        .env_remove("KUBERNETES_SERVICE_PORT")
        .env("KUBECONFIG", "/nonexistent/kubeconfig");
    cmd
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn assert_rejected_locally(output: &Output, message: &str) {
    let stderr = stderr(output);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr);
    assert!(stderr.starts_with(&format!("ERROR: {}", message)), "stderr: {}", stderr);
    assert!(!stderr.contains("Kubernetes"), "reached the cluster: {}", stderr);
    assert!(output.stdout.is_empty());
}

#[test]
fn test_short_interval_exits_before_cluster_access() {
    let output = ts_obs(&["chunk-interval", "set", "cpu_usage", "30s"])
        .env("PGPASSWORD_POSTGRES", "s3cret")
        .output()
        .unwrap();

    assert_rejected_locally(&output, "Chunk interval must be at least 1 minute");
}

#[test]
fn test_missing_credential_exits_before_cluster_access() {
    let output = ts_obs(&["chunk-interval", "set", "cpu_usage", "30s"])
        .output()
        .unwrap();

    assert_rejected_locally(
        &output,
        "Password for postgres user must be set in environment variable PGPASSWORD_POSTGRES",
    );
}

#[test]
fn test_invalid_duration_exits_before_cluster_access() {
    let output = ts_obs(&["chunk-interval", "set", "cpu_usage", "2 minutes"])
        .env("PGPASSWORD_POSTGRES", "s3cret")
        .output()
        .unwrap();

    assert_rejected_locally(&output, "unknown unit");
}

#[test]
fn test_env_file_credential() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "export PGPASSWORD_POSTGRES=\"from-file\"").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let output = ts_obs(&["--env-file", &path, "chunk-interval", "reset", ""])
        .output()
        .unwrap();

    assert_rejected_locally(&output, "metric name must not be empty");
}

#[test]
fn test_valid_request_reaches_cluster() {
    let output = ts_obs(&["chunk-interval", "set", "cpu_usage", "2m"])
        .env("PGPASSWORD_POSTGRES", "s3cret")
        .output()
        .unwrap();

    let stderr = stderr(&output);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr);
    assert!(
        stderr.starts_with("ERROR: could not create Kubernetes client"),
        "stderr: {}",
        stderr
    );
}
