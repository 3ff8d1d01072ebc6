//! Randomised client churn.
//!
//! Every interval the driver draws a pool size uniformly from
//! `[min_clients, max_clients]` and resizes the pool to it: the tail beyond
//! the new size is signalled first, then new clients are appended until the
//! size is reached. The pool length equals the drawn size at every tick
//! boundary unless a spawn failed.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::churn::pool::{ClientPool, ClientSpawner, ResizeReport};
use crate::churn::shutdown::ShutdownReport;
use crate::config::ChurnConfig;

/// Drives a [`ClientPool`] through random resize steps.
pub struct ChurnDriver<P: ClientSpawner> {
    pool: ClientPool<P>,
    rng: StdRng,
    min_clients: usize,
    max_clients: usize,
    interval: Duration,
    shutdown_grace: Duration,
    ticks: u64,
}

impl<P: ClientSpawner> ChurnDriver<P> {
    /// Driver over `pool` using the bounds and timing in `config`.
    ///
    /// The RNG uses `config.seed` when set and OS entropy otherwise.
    #[must_use]
    pub fn new(pool: ClientPool<P>, config: &ChurnConfig) -> Self {
        let rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        Self {
            pool,
            rng,
            min_clients: config.min_clients,
            max_clients: config.max_clients.max(config.min_clients),
            interval: config.interval(),
            shutdown_grace: config.shutdown_grace(),
            ticks: 0,
        }
    }

    /// Reseed the RNG so the target sequence is reproducible.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// The managed pool.
    #[must_use]
    pub fn pool(&self) -> &ClientPool<P> {
        &self.pool
    }

    /// Completed resize steps.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Draw the next target size.
    pub fn draw_target(&mut self) -> usize {
        self.rng.gen_range(self.min_clients..=self.max_clients)
    }

    /// One random resize step.
    pub fn tick(&mut self) -> ResizeReport {
        let target = self.draw_target();
        self.tick_to(target)
    }

    /// One resize step to an explicit target.
    pub fn tick_to(&mut self, target: usize) -> ResizeReport {
        let killed = self.pool.kill_overdue(self.shutdown_grace);
        let reaped = self.pool.reap_exited();
        if reaped > 0 || killed > 0 {
            debug!(reaped, killed, "cleared signalled clients");
        }

        let report = self.pool.resize(target);
        self.ticks += 1;

        info!(
            tick = self.ticks,
            clients = target,
            before = report.before,
            signaled = report.signaled,
            spawned = report.spawned,
            spawn_failures = report.spawn_failures,
            "pool resized"
        );
        report
    }

    /// Tick every interval until `cancel` fires, then shut the pool down.
    ///
    /// The first step happens one interval after the call. Cancellation is
    /// only observed between steps.
    pub async fn run(&mut self, cancel: CancellationToken) -> ShutdownReport {
        let span = info_span!("churn", interval = ?self.interval);
        let cancelled = cancel.cancelled_owned();
        async {
            tokio::pin!(cancelled);
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = &mut cancelled => break,
                    _ = ticker.tick() => {
                        self.tick();
                    }
                }
            }

            self.shutdown().await
        }
        .instrument(span)
        .await
    }

    /// Signal every live client, then drain them with the grace period.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let closed = self.pool.close_all();
        info!(signaled = closed.signaled, "closing all clients");

        let drain = self.pool.drain(self.shutdown_grace).await;

        ShutdownReport {
            signaled: closed.signaled,
            signal_failures: closed.signal_failures,
            drain,
        }
    }
}
