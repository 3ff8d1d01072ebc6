//! Readiness detection by snapshot diffing.
//!
//! The detector compares fresh snapshots against a baseline captured before
//! the server was spawned. Exactly one new endpoint is a success; none means
//! "ask again later"; more than one is unrecoverable because there is no way
//! to tell which endpoint belongs to this session.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, trace, warn};

use crate::config::DiscoveryConfig;
use crate::discovery::snapshot::{EndpointSource, Snapshot};
use crate::{AppError, Result};

/// Smallest pause between polls; a zero backoff would never grow.
const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Outcome of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No new endpoint yet.
    Pending,
    /// Exactly one new endpoint.
    Found(String),
    /// Several new endpoints, sorted by name.
    Ambiguous(Vec<String>),
}

impl Decision {
    /// Classify the set difference between a fresh snapshot and the baseline.
    #[must_use]
    pub fn classify(mut new_names: Vec<String>) -> Self {
        match new_names.len() {
            0 => Self::Pending,
            1 => Self::Found(new_names.remove(0)),
            _ => Self::Ambiguous(new_names),
        }
    }
}

/// Polls an [`EndpointSource`] until a single new endpoint shows up.
#[derive(Debug)]
pub struct ReadinessDetector<S> {
    source: S,
    baseline: Snapshot,
    initial_backoff: Duration,
    max_backoff: Duration,
    timeout: Option<Duration>,
    polls: u64,
}

impl<S: EndpointSource> ReadinessDetector<S> {
    /// Detector using the default backoff and timeout.
    #[must_use]
    pub fn new(source: S, baseline: Snapshot) -> Self {
        Self::with_config(source, baseline, &DiscoveryConfig::default())
    }

    /// Detector using the backoff and timeout from `config`.
    #[must_use]
    pub fn with_config(source: S, baseline: Snapshot, config: &DiscoveryConfig) -> Self {
        Self {
            source,
            baseline,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms).max(MIN_BACKOFF),
            max_backoff: Duration::from_millis(config.max_backoff_ms).max(MIN_BACKOFF),
            timeout: config.timeout(),
            polls: 0,
        }
    }

    /// Replace the overall deadline; `None` waits forever.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the poll backoff bounds.
    #[must_use]
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial.max(MIN_BACKOFF);
        self.max_backoff = max.max(self.initial_backoff);
        self
    }

    /// Snapshot the detector compares against.
    #[must_use]
    pub fn baseline(&self) -> &Snapshot {
        &self.baseline
    }

    /// Number of snapshots taken so far.
    #[must_use]
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Take one snapshot and classify it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the snapshot cannot be captured.
    pub fn poll_once(&mut self) -> Result<Decision> {
        let current = self.source.snapshot()?;
        self.polls += 1;
        let decision = Decision::classify(current.new_since(&self.baseline));
        trace!(poll = self.polls, ?decision, "endpoint poll");
        Ok(decision)
    }

    /// Poll with exponential backoff until an endpoint is found.
    ///
    /// # Errors
    ///
    /// - `AppError::AmbiguousEndpoint` when several new endpoints appear.
    /// - `AppError::DiscoveryTimeout` when the deadline passes first.
    /// - `AppError::Io` when a snapshot fails.
    pub async fn wait_for_endpoint(&mut self) -> Result<String> {
        let started = Instant::now();
        let deadline = self.timeout.map(|timeout| started + timeout);
        let mut backoff = self.initial_backoff;

        loop {
            match self.poll_once()? {
                Decision::Found(endpoint) => {
                    info!(
                        endpoint,
                        polls = self.polls,
                        elapsed = ?started.elapsed(),
                        "rendezvous endpoint discovered"
                    );
                    return Ok(endpoint);
                }
                Decision::Ambiguous(names) => {
                    warn!(count = names.len(), ?names, "too many new endpoints");
                    return Err(AppError::AmbiguousEndpoint(format!(
                        "{} new endpoints appeared: {}",
                        names.len(),
                        names.join(", ")
                    )));
                }
                Decision::Pending => {}
            }

            let pause = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(AppError::DiscoveryTimeout(format!(
                            "no new endpoint after {} polls in {:?}",
                            self.polls,
                            started.elapsed()
                        )));
                    }
                    backoff.min(remaining)
                }
                None => backoff,
            };

            tokio::time::sleep(pause).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }

    /// Give the source back, e.g. to reuse it for a later launch.
    #[must_use]
    pub fn into_source(self) -> S {
        self.source
    }
}
