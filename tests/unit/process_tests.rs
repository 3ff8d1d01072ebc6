//! Unit tests for managed process handles.
//!
//! These spawn `/bin/sh` and `sleep`, so they only run on unix.

#![cfg(unix)]

use std::path::PathBuf;
use std::time::Duration;

use session_harness::config::{ProgramConfig, StopSignal};
use session_harness::process::{describe_exit, Liveness, ManagedProcess, OutputSink, SpawnOptions};
use session_harness::AppError;

fn sh(script: &str, log: Option<PathBuf>) -> ProgramConfig {
    ProgramConfig {
        program: PathBuf::from("/bin/sh"),
        args: vec!["-c".to_owned(), script.to_owned()],
        log,
    }
}

fn options() -> SpawnOptions {
    SpawnOptions {
        kill_on_drop: true,
        ..SpawnOptions::default()
    }
}

#[tokio::test]
async fn exit_code_is_reported() {
    let mut proc = ManagedProcess::spawn("exit3", &sh("exit 3", None), &options()).expect("spawn");

    let status = proc.wait().await.expect("wait");

    assert_eq!(status.code(), Some(3));
    assert_eq!(describe_exit(status), "exited with code 3");
    assert_eq!(proc.liveness(), Liveness::Exited(status));
}

#[tokio::test]
async fn clean_exit_is_described() {
    let mut proc = ManagedProcess::spawn("ok", &sh("true", None), &options()).expect("spawn");

    let status = proc.wait().await.expect("wait");

    assert_eq!(describe_exit(status), "exited normally (code 0)");
}

#[test]
fn missing_binary_is_a_spawn_error() {
    let program = ProgramConfig {
        program: PathBuf::from("/nonexistent/definitely-not-here"),
        args: Vec::new(),
        log: None,
    };

    let err = ManagedProcess::spawn("ghost", &program, &options()).expect_err("should fail");

    assert!(matches!(err, AppError::Spawn(_)), "got {err:?}");
    assert!(err.to_string().contains("ghost"));
}

#[tokio::test]
async fn output_goes_to_log_file() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let log = tmp.path().join("out.log");
    let program = sh("echo to-stdout; echo to-stderr 1>&2", Some(log.clone()));

    let mut proc = ManagedProcess::spawn("logger", &program, &options()).expect("spawn");
    proc.wait().await.expect("wait");

    assert_eq!(proc.sink(), &OutputSink::File(log.clone()));
    let contents = std::fs::read_to_string(&log).expect("read log");
    assert!(contents.contains("to-stdout"));
    assert!(contents.contains("to-stderr"));
}

#[test]
fn log_path_in_missing_directory_is_io_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let program = sh("true", Some(tmp.path().join("no/such/dir/out.log")));

    let err = ManagedProcess::spawn("logger", &program, &options()).expect_err("should fail");

    assert!(matches!(err, AppError::Io(_)), "got {err:?}");
}

#[tokio::test]
async fn environment_is_scoped_to_the_child() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let log = tmp.path().join("env.log");
    let program = sh("printf '%s' \"$HARNESS_SCOPED_VAR\"", Some(log.clone()));
    let opts = SpawnOptions {
        env: vec![("HARNESS_SCOPED_VAR".to_owned(), "wayland-9".to_owned())],
        ..options()
    };

    let mut proc = ManagedProcess::spawn("env", &program, &opts).expect("spawn");
    proc.wait().await.expect("wait");

    assert_eq!(std::fs::read_to_string(&log).expect("read"), "wayland-9");
    assert!(std::env::var_os("HARNESS_SCOPED_VAR").is_none());
}

#[tokio::test]
async fn stop_request_ends_a_sleeping_process() {
    let opts = SpawnOptions {
        stop_signal: StopSignal::Sigterm,
        ..options()
    };
    let mut proc = ManagedProcess::spawn("sleeper", &sh("exec sleep 30", None), &opts)
        .expect("spawn");

    proc.request_stop().expect("signal");
    assert_eq!(proc.liveness(), Liveness::StopRequested);

    let status = tokio::time::timeout(Duration::from_secs(5), proc.wait())
        .await
        .expect("process should exit after the stop signal")
        .expect("wait");
    assert!(!status.success());
}

#[tokio::test]
async fn graceful_shutdown_reaps_within_grace() {
    let opts = SpawnOptions {
        stop_signal: StopSignal::Sigterm,
        ..options()
    };
    let mut proc = ManagedProcess::spawn("sleeper", &sh("exec sleep 30", None), &opts)
        .expect("spawn");

    let started = std::time::Instant::now();
    let status = proc.shutdown(Duration::from_secs(5)).await.expect("shutdown");

    assert!(!status.success());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn shutdown_forces_kill_when_stop_is_ignored() {
    let program = sh("trap '' INT; while :; do sleep 1; done", None);
    let mut proc = ManagedProcess::spawn("stubborn", &program, &options()).expect("spawn");
    // Give the shell a moment to install the trap.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    let status = proc
        .shutdown(Duration::from_millis(200))
        .await
        .expect("shutdown");

    assert!(!status.success());
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn stopping_an_exited_process_is_a_noop() {
    let mut proc = ManagedProcess::spawn("done", &sh("true", None), &options()).expect("spawn");
    let status = proc.wait().await.expect("wait");

    proc.request_stop().expect("no-op");
    proc.force_kill().expect("no-op");

    assert_eq!(proc.liveness(), Liveness::Exited(status));
    assert!(proc.try_reap().expect("reap"));
}
