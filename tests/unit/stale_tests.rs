//! Unit tests for stale endpoint pruning.

#![cfg(unix)]

use std::fs;
use std::os::unix::net::UnixListener;

use session_harness::discovery::{EndpointSource, RuntimeDir};

fn wayland_dir(path: &std::path::Path) -> RuntimeDir {
    RuntimeDir::new(path, "wayland-*", &[".lock".to_owned()]).expect("valid pattern")
}

#[test]
fn dead_socket_and_lock_are_removed() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dead = tmp.path().join("wayland-3");
    drop(UnixListener::bind(&dead).expect("bind"));
    fs::write(tmp.path().join("wayland-3.lock"), b"").expect("lock");

    let removed = wayland_dir(tmp.path()).prune_stale().expect("prune");

    assert_eq!(removed, vec!["wayland-3"]);
    assert!(!dead.exists());
    assert!(!tmp.path().join("wayland-3.lock").exists());
}

#[test]
fn listening_socket_is_kept() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let live = tmp.path().join("wayland-1");
    let _listener = UnixListener::bind(&live).expect("bind");

    let removed = wayland_dir(tmp.path()).prune_stale().expect("prune");

    assert!(removed.is_empty());
    assert!(live.exists());
}

#[test]
fn regular_files_are_never_pruned() {
    let tmp = tempfile::tempdir().expect("tempdir");
    fs::write(tmp.path().join("wayland-5"), b"not a socket").expect("write");

    let removed = wayland_dir(tmp.path()).prune_stale().expect("prune");

    assert!(removed.is_empty());
    assert!(tmp.path().join("wayland-5").exists());
}

#[test]
fn only_dead_sockets_go_when_mixed() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let _live = UnixListener::bind(tmp.path().join("wayland-0")).expect("bind");
    drop(UnixListener::bind(tmp.path().join("wayland-1")).expect("bind"));

    let dir = wayland_dir(tmp.path());
    let removed = dir.prune_stale().expect("prune");
    let remaining = dir.snapshot().expect("snapshot");

    assert_eq!(removed, vec!["wayland-1"]);
    assert!(remaining.contains("wayland-0"));
    assert!(!remaining.contains("wayland-1"));
}

#[test]
fn missing_directory_prunes_nothing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dir = wayland_dir(&tmp.path().join("absent"));

    assert!(dir.prune_stale().expect("prune").is_empty());
}
