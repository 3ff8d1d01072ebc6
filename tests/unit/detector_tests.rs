//! Unit tests for the readiness detector.

use std::time::{Duration, Instant};

use session_harness::discovery::{Decision, ReadinessDetector, Snapshot};
use session_harness::AppError;

use super::fakes::ScriptedSource;

fn snap(names: &[&str]) -> Snapshot {
    Snapshot::from_names(names.iter().copied())
}

fn fast(detector: ReadinessDetector<ScriptedSource>) -> ReadinessDetector<ScriptedSource> {
    detector.backoff(Duration::from_millis(1), Duration::from_millis(2))
}

#[test]
fn classify_covers_all_cardinalities() {
    assert_eq!(Decision::classify(vec![]), Decision::Pending);
    assert_eq!(
        Decision::classify(vec!["ep-1".into()]),
        Decision::Found("ep-1".into())
    );
    assert_eq!(
        Decision::classify(vec!["ep-1".into(), "ep-2".into()]),
        Decision::Ambiguous(vec!["ep-1".into(), "ep-2".into()])
    );
}

#[test]
fn single_new_endpoint_is_found_on_first_poll() {
    let source = ScriptedSource::new(vec![snap(&["wayland-0", "wayland-1"])]);
    let mut detector = ReadinessDetector::new(source, snap(&["wayland-0"]));

    assert_eq!(
        detector.poll_once().expect("poll"),
        Decision::Found("wayland-1".into())
    );
}

#[test]
fn no_decision_without_new_endpoints() {
    let source = ScriptedSource::new(vec![snap(&["wayland-0"])]);
    let mut detector = ReadinessDetector::new(source, snap(&["wayland-0"]));

    for _ in 0..50 {
        assert_eq!(detector.poll_once().expect("poll"), Decision::Pending);
    }
    assert_eq!(detector.polls(), 50);
}

#[test]
fn existing_endpoints_never_count_as_new() {
    let baseline = snap(&["wayland-0", "wayland-5"]);
    let source = ScriptedSource::new(vec![baseline.clone()]);
    let mut detector = ReadinessDetector::new(source, baseline);

    assert_eq!(detector.poll_once().expect("poll"), Decision::Pending);
}

#[tokio::test]
async fn wait_returns_endpoint_after_several_empty_polls() {
    let source = ScriptedSource::new(vec![
        snap(&[]),
        snap(&[]),
        snap(&[]),
        snap(&["ep-1"]),
    ]);
    let mut detector = fast(ReadinessDetector::new(source, snap(&[])));

    let endpoint = detector.wait_for_endpoint().await.expect("endpoint found");

    assert_eq!(endpoint, "ep-1");
    assert_eq!(detector.polls(), 4);
}

#[tokio::test]
async fn found_endpoint_is_independent_of_poll_count() {
    for empty_polls in [0_usize, 1, 7] {
        let mut frames = vec![snap(&[]); empty_polls];
        frames.push(snap(&["ep-1"]));
        let mut detector = fast(ReadinessDetector::new(ScriptedSource::new(frames), snap(&[])));

        assert_eq!(detector.wait_for_endpoint().await.expect("found"), "ep-1");
    }
}

#[tokio::test]
async fn two_new_endpoints_are_fatal() {
    let source = ScriptedSource::new(vec![snap(&[]), snap(&["ep-1", "ep-2"])]);
    let mut detector = fast(ReadinessDetector::new(source, snap(&[])));

    let err = detector.wait_for_endpoint().await.unwrap_err();

    assert!(
        matches!(err, AppError::AmbiguousEndpoint(ref msg) if msg.contains("ep-1") && msg.contains("ep-2")),
        "expected ambiguity, got {err:?}"
    );
    assert_eq!(err.exit_code(), 1);
}

#[tokio::test]
async fn ambiguity_is_not_retried() {
    // A later frame with a single endpoint must never be reached.
    let source = ScriptedSource::new(vec![snap(&["ep-1", "ep-2"]), snap(&["ep-1"])]);
    let mut detector = fast(ReadinessDetector::new(source, snap(&[])));

    assert!(detector.wait_for_endpoint().await.is_err());
    assert_eq!(detector.into_source().calls(), 1);
}

#[tokio::test]
async fn deadline_surfaces_as_discovery_timeout() {
    let source = ScriptedSource::new(vec![snap(&[])]);
    let mut detector = fast(ReadinessDetector::new(source, snap(&[])))
        .timeout(Some(Duration::from_millis(50)));

    let started = Instant::now();
    let err = detector.wait_for_endpoint().await.unwrap_err();

    assert!(matches!(err, AppError::DiscoveryTimeout(_)), "got {err:?}");
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(detector.polls() > 1, "detector should poll repeatedly before giving up");
}

#[tokio::test]
async fn no_timeout_keeps_polling() {
    let source = ScriptedSource::new(vec![snap(&[])]);
    let mut detector = fast(ReadinessDetector::new(source, snap(&[]))).timeout(None);

    let outcome =
        tokio::time::timeout(Duration::from_millis(100), detector.wait_for_endpoint()).await;

    assert!(outcome.is_err(), "detector must not decide without a new endpoint");
}

#[tokio::test]
async fn zero_backoff_still_grows() {
    let source = ScriptedSource::new(vec![snap(&[])]);
    let mut detector = ReadinessDetector::new(source, snap(&[]))
        .backoff(Duration::ZERO, Duration::from_millis(250))
        .timeout(Some(Duration::from_millis(200)));

    let err = detector.wait_for_endpoint().await.unwrap_err();

    assert!(matches!(err, AppError::DiscoveryTimeout(_)), "got {err:?}");
    assert!(detector.polls() < 20, "polled {} times in 200ms", detector.polls());
}
