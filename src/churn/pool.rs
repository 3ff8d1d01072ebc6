//! Ordered pool of client processes with shrink-then-grow resizing.
//!
//! Members removed from the pool are signalled and parked on a draining
//! list until their exit is reaped, so a shrink never leaves a zombie or
//! an untracked process behind.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProgramConfig;
use crate::process::{ManagedProcess, SpawnOptions};
use crate::Result;

/// Interval between reap polls while draining.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Upper bound on waiting for force-killed members to be reaped.
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// A process the pool can stop and reap.
pub trait PoolMember: Send {
    /// Label used in logs.
    fn label(&self) -> &str;

    /// Send the graceful stop signal without waiting.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Signal` if delivery fails.
    fn request_stop(&mut self) -> Result<()>;

    /// Reap if exited; `true` once the member is gone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the status cannot be queried.
    fn try_reap(&mut self) -> Result<bool>;

    /// Issue a forced kill.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Signal` if the kill cannot be issued.
    fn force_kill(&mut self) -> Result<()>;
}

impl PoolMember for ManagedProcess {
    fn label(&self) -> &str {
        self.role()
    }

    fn request_stop(&mut self) -> Result<()> {
        ManagedProcess::request_stop(self)
    }

    fn try_reap(&mut self) -> Result<bool> {
        ManagedProcess::try_reap(self)
    }

    fn force_kill(&mut self) -> Result<()> {
        ManagedProcess::force_kill(self)
    }
}

/// Produces new pool members.
pub trait ClientSpawner {
    /// Member type produced.
    type Member: PoolMember;

    /// Start one client destined for pool index `slot`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the client cannot be started.
    fn spawn_client(&mut self, slot: usize) -> Result<Self::Member>;
}

/// Spawns real client processes with discarded (or logged) output.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: ProgramConfig,
    options: SpawnOptions,
    spawned: u64,
}

impl ProcessSpawner {
    /// Spawner for `program`. Clients are killed if their handle is dropped.
    #[must_use]
    pub fn new(program: ProgramConfig, options: SpawnOptions) -> Self {
        Self {
            program,
            options: SpawnOptions {
                kill_on_drop: true,
                ..options
            },
            spawned: 0,
        }
    }

    /// Total clients started so far.
    #[must_use]
    pub fn spawned(&self) -> u64 {
        self.spawned
    }
}

impl ClientSpawner for ProcessSpawner {
    type Member = ManagedProcess;

    fn spawn_client(&mut self, slot: usize) -> Result<ManagedProcess> {
        self.spawned += 1;
        let role = format!("client-{}", self.spawned);
        let client = ManagedProcess::spawn(&role, &self.program, &self.options)?;
        debug!(role, slot, pid = client.pid(), "churn client spawned");
        Ok(client)
    }
}

/// Counts from one resize step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeReport {
    /// Requested pool size.
    pub target: usize,
    /// Pool size before the step.
    pub before: usize,
    /// Pool size after the step.
    pub after: usize,
    /// Members removed from the pool and asked to stop.
    pub signaled: usize,
    /// Stop signals that could not be delivered.
    pub signal_failures: usize,
    /// Members spawned.
    pub spawned: usize,
    /// Spawn attempts that failed.
    pub spawn_failures: usize,
}

/// Outcome of waiting for signalled members to exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Members that exited within the grace period.
    pub exited: usize,
    /// Members that had to be force-killed.
    pub killed: usize,
    /// Members still unreaped when draining gave up.
    pub abandoned: usize,
}

/// A signalled member waiting to be reaped.
struct Draining<M> {
    member: M,
    signaled_at: Instant,
    killed: bool,
}

impl<M: PoolMember> Draining<M> {
    fn new(member: M) -> Self {
        Self {
            member,
            signaled_at: Instant::now(),
            killed: false,
        }
    }

    fn kill(&mut self) -> bool {
        match self.member.force_kill() {
            Ok(()) => {
                self.killed = true;
                true
            }
            Err(err) => {
                warn!(member = self.member.label(), %err, "force kill failed");
                false
            }
        }
    }
}

/// Ordered client pool.
pub struct ClientPool<P: ClientSpawner> {
    spawner: P,
    members: Vec<P::Member>,
    draining: Vec<Draining<P::Member>>,
}

impl<P: ClientSpawner> ClientPool<P> {
    /// Empty pool.
    #[must_use]
    pub fn new(spawner: P) -> Self {
        Self {
            spawner,
            members: Vec::new(),
            draining: Vec::new(),
        }
    }

    /// Live members tracked by the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the pool holds no live members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Live members in index order.
    #[must_use]
    pub fn members(&self) -> &[P::Member] {
        &self.members
    }

    /// Signalled members whose exit has not been reaped yet.
    #[must_use]
    pub fn draining_len(&self) -> usize {
        self.draining.len()
    }

    /// The spawner.
    #[must_use]
    pub fn spawner(&self) -> &P {
        &self.spawner
    }

    /// Shrink to `target`, then grow to `target`.
    pub fn resize(&mut self, target: usize) -> ResizeReport {
        let before = self.members.len();
        let (signaled, signal_failures) = self.shrink_to(target);
        let (spawned, spawn_failures) = self.grow_to(target);

        ResizeReport {
            target,
            before,
            after: self.members.len(),
            signaled,
            signal_failures,
            spawned,
            spawn_failures,
        }
    }

    /// Signal every member at index `>= target` and move it to draining.
    ///
    /// The retained prefix keeps its order. Returns `(signaled, failures)`.
    pub fn shrink_to(&mut self, target: usize) -> (usize, usize) {
        if target >= self.members.len() {
            return (0, 0);
        }

        let tail = self.members.split_off(target);
        let signaled = tail.len();
        let mut failures = 0;

        for mut member in tail {
            if let Err(err) = member.request_stop() {
                failures += 1;
                warn!(member = member.label(), %err, "failed to signal client");
            }
            self.draining.push(Draining::new(member));
        }

        (signaled, failures)
    }

    /// Spawn members until the pool holds `target`.
    ///
    /// Stops at the first spawn failure so a missing binary costs one log
    /// line per step. Returns `(spawned, failures)`.
    pub fn grow_to(&mut self, target: usize) -> (usize, usize) {
        let mut spawned = 0;

        while self.members.len() < target {
            match self.spawner.spawn_client(self.members.len()) {
                Ok(member) => {
                    self.members.push(member);
                    spawned += 1;
                }
                Err(err) => {
                    warn!(%err, have = self.members.len(), wanted = target, "failed to spawn client");
                    return (spawned, 1);
                }
            }
        }

        (spawned, 0)
    }

    /// Signal every live member. Equivalent to a shrink to zero.
    pub fn close_all(&mut self) -> ResizeReport {
        let before = self.members.len();
        let (signaled, signal_failures) = self.shrink_to(0);
        ResizeReport {
            target: 0,
            before,
            after: 0,
            signaled,
            signal_failures,
            ..ResizeReport::default()
        }
    }

    /// Reap draining members that have exited. Returns how many were reaped.
    pub fn reap_exited(&mut self) -> usize {
        let before = self.draining.len();
        self.draining.retain_mut(|entry| match entry.member.try_reap() {
            Ok(gone) => !gone,
            Err(err) => {
                warn!(member = entry.member.label(), %err, "cannot poll client, dropping handle");
                false
            }
        });
        before - self.draining.len()
    }

    /// Force-kill draining members signalled at least `grace` ago. Returns
    /// how many kills were issued; [`Self::reap_exited`] collects them.
    ///
    /// Keeps the draining list bounded when clients ignore the stop signal.
    pub fn kill_overdue(&mut self, grace: Duration) -> usize {
        let now = Instant::now();
        let mut killed = 0;

        for entry in &mut self.draining {
            if !entry.killed && now.duration_since(entry.signaled_at) >= grace && entry.kill() {
                killed += 1;
            }
        }
        if killed > 0 {
            debug!(killed, "force-killed clients past the grace period");
        }
        killed
    }

    /// Wait up to `grace` for draining members to exit, then force-kill the
    /// rest and reap them.
    pub async fn drain(&mut self, grace: Duration) -> DrainReport {
        let mut report = DrainReport {
            exited: self.wait_reaped(grace).await,
            ..DrainReport::default()
        };

        if self.draining.is_empty() {
            return report;
        }

        for entry in &mut self.draining {
            if !entry.killed && entry.kill() {
                report.killed += 1;
            }
        }
        self.wait_reaped(KILL_REAP_TIMEOUT).await;

        report.abandoned = self.draining.len();
        if report.abandoned > 0 {
            warn!(count = report.abandoned, "clients could not be reaped");
            self.draining.clear();
        }

        info!(
            exited = report.exited,
            killed = report.killed,
            abandoned = report.abandoned,
            "pool drained"
        );
        report
    }

    async fn wait_reaped(&mut self, limit: Duration) -> usize {
        let deadline = Instant::now() + limit;
        let mut reaped = self.reap_exited();

        while !self.draining.is_empty() && Instant::now() < deadline {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            reaped += self.reap_exited();
        }

        reaped
    }
}
