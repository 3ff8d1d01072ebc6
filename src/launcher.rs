//! Session bring-up: server, endpoint discovery, barrier, clients.
//!
//! Steps run strictly in order and none starts before the previous one has
//! finished:
//!
//! 1. optionally prune stale endpoints,
//! 2. capture the baseline snapshot,
//! 3. spawn the server (not awaited),
//! 4. discover the endpoint it creates,
//! 5. run the waiter to completion with the endpoint in its environment,
//! 6. spawn the clients (not awaited) with the same environment.
//!
//! The endpoint variable is scoped to the processes of this launch; the
//! harness's own environment and the already-running server never see it.

use std::process::ExitStatus;
use std::time::Duration;

use tracing::{error, info, info_span, warn, Instrument};

use crate::config::HarnessConfig;
use crate::discovery::{EndpointSource, ReadinessDetector, RuntimeDir};
use crate::process::{describe_exit, ManagedProcess, SpawnOptions};
use crate::Result;

/// A session whose clients have been started.
#[derive(Debug)]
pub struct LaunchedSession {
    /// Discovered endpoint name, e.g. `wayland-1`.
    pub endpoint: String,
    /// Server process.
    pub server: ManagedProcess,
    /// Exit status of the barrier process.
    pub waiter_status: ExitStatus,
    /// Client processes in launch order.
    pub clients: Vec<ManagedProcess>,
}

impl LaunchedSession {
    /// Stop clients (newest first), then the server, each with `grace`.
    ///
    /// Failures are logged; every process is attempted.
    pub async fn shutdown(&mut self, grace: Duration) {
        for client in self.clients.iter_mut().rev() {
            if let Err(err) = client.shutdown(grace).await {
                warn!(role = client.role(), %err, "client shutdown failed");
            }
        }

        match self.server.shutdown(grace).await {
            Ok(status) => info!(status = describe_exit(status), "server stopped"),
            Err(err) => warn!(%err, "server shutdown failed"),
        }
    }
}

/// Runs the bring-up sequence against an [`EndpointSource`].
#[derive(Debug)]
pub struct SessionLauncher<S = RuntimeDir> {
    config: HarnessConfig,
    source: S,
}

impl SessionLauncher<RuntimeDir> {
    /// Launcher watching the configured runtime directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the endpoint pattern is invalid.
    pub fn new(config: HarnessConfig) -> Result<Self> {
        let source = RuntimeDir::from_config(&config)?;
        Ok(Self { config, source })
    }
}

impl<S: EndpointSource> SessionLauncher<S> {
    /// Launcher observing endpoints through a custom source.
    #[must_use]
    pub fn with_source(config: HarnessConfig, source: S) -> Self {
        Self { config, source }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Bring the session up.
    ///
    /// # Errors
    ///
    /// - `AppError::AmbiguousEndpoint` / `AppError::DiscoveryTimeout` when
    ///   discovery fails; no waiter or client is started.
    /// - `AppError::Spawn` when any executable cannot be started.
    /// - `AppError::Io` when a snapshot or log file fails.
    pub async fn launch(&self) -> Result<LaunchedSession> {
        let span = info_span!(
            "launch_session",
            runtime_dir = %self.config.runtime_dir.display(),
        );
        self.run_sequence().instrument(span).await
    }

    async fn run_sequence(&self) -> Result<LaunchedSession> {
        let launch = &self.config.launch;

        if self.config.discovery.prune_stale {
            let removed = self.source.prune_stale()?;
            if !removed.is_empty() {
                info!(count = removed.len(), ?removed, "pruned stale endpoints");
            }
        }

        let baseline = self.source.snapshot()?;
        info!(existing = baseline.len(), "baseline endpoints captured");

        // The server outlives the harness, so it is not killed on drop.
        let server = ManagedProcess::spawn(
            "server",
            &launch.server,
            &SpawnOptions {
                stop_signal: self.config.stop_signal,
                kill_on_drop: false,
                env: Vec::new(),
            },
        )?;
        info!(pid = server.pid(), program = %launch.server.program.display(), "server spawned");

        let mut detector =
            ReadinessDetector::with_config(&self.source, baseline, &self.config.discovery);
        let endpoint = detector.wait_for_endpoint().await.map_err(|err| {
            error!(%err, server_pid = server.pid(), "endpoint discovery failed");
            err
        })?;

        let env = vec![(launch.env_key.clone(), endpoint.clone())];
        info!(key = launch.env_key, endpoint, "endpoint propagated to session processes");

        let mut waiter = ManagedProcess::spawn(
            "waiter",
            &launch.waiter,
            &SpawnOptions {
                stop_signal: self.config.stop_signal,
                kill_on_drop: true,
                env: env.clone(),
            },
        )?;
        info!(pid = waiter.pid(), "waiting for barrier process");
        let waiter_status = waiter.wait().await?;
        if waiter_status.success() {
            info!("barrier passed");
        } else {
            warn!(
                status = describe_exit(waiter_status),
                "barrier process failed, starting clients anyway"
            );
        }

        let options = SpawnOptions {
            stop_signal: self.config.stop_signal,
            kill_on_drop: false,
            env,
        };
        let mut clients = Vec::with_capacity(launch.clients.len());
        for (index, program) in launch.clients.iter().enumerate() {
            let role = format!("client-{}", index + 1);
            let client = ManagedProcess::spawn(&role, program, &options)?;
            info!(role, pid = client.pid(), "client spawned");
            clients.push(client);
        }

        info!(endpoint, clients = clients.len(), "session launched");

        Ok(LaunchedSession {
            endpoint,
            server,
            waiter_status,
            clients,
        })
    }
}
