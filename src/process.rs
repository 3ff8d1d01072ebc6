//! Managed handles for spawned external processes.
//!
//! A [`ManagedProcess`] owns one `tokio::process::Child` and tracks its
//! liveness explicitly. Stop requests are fire-and-forget signals; the
//! owner decides when to reap, wait with a grace period, or force-kill.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::{ProgramConfig, StopSignal};
use crate::{AppError, Result};

/// Where a spawned process writes stdout and stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Both streams truncate-and-write the same file.
    File(PathBuf),
    /// Both streams go to the null device.
    Discard,
}

impl OutputSink {
    /// Sink for an optional log path.
    #[must_use]
    pub fn from_log(log: Option<&Path>) -> Self {
        log.map_or(Self::Discard, |path| Self::File(path.to_owned()))
    }

    fn stdio_pair(&self) -> Result<(Stdio, Stdio)> {
        match self {
            Self::Discard => Ok((Stdio::null(), Stdio::null())),
            Self::File(path) => {
                let stdout = File::create(path).map_err(|err| {
                    AppError::Io(format!("cannot create log {}: {err}", path.display()))
                })?;
                let stderr = stdout.try_clone().map_err(|err| {
                    AppError::Io(format!("cannot share log {}: {err}", path.display()))
                })?;
                Ok((Stdio::from(stdout), Stdio::from(stderr)))
            }
        }
    }
}

/// Observed state of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Spawned and not yet asked to stop.
    Running,
    /// A stop signal was sent; the exit has not been observed yet.
    StopRequested,
    /// Exit observed and reaped.
    Exited(ExitStatus),
}

/// Per-spawn knobs shared by the launcher and the churn driver.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Signal sent by [`ManagedProcess::request_stop`].
    pub stop_signal: StopSignal,
    /// Kill the process if its handle is dropped without being reaped.
    pub kill_on_drop: bool,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

/// One spawned external process.
#[derive(Debug)]
pub struct ManagedProcess {
    role: String,
    pid: Option<u32>,
    sink: OutputSink,
    stop_signal: StopSignal,
    liveness: Liveness,
    child: Child,
}

impl ManagedProcess {
    /// Spawn `program` with stdin closed and output routed to its log sink.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the log file cannot be created, or
    /// `AppError::Spawn` if the executable cannot be started.
    pub fn spawn(role: &str, program: &ProgramConfig, options: &SpawnOptions) -> Result<Self> {
        let sink = OutputSink::from_log(program.log.as_deref());
        let (stdout, stderr) = sink.stdio_pair()?;

        let mut cmd = Command::new(&program.program);
        cmd.args(&program.args)
            .envs(options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(options.kill_on_drop);

        let child = cmd.spawn().map_err(|err| {
            AppError::Spawn(format!(
                "failed to spawn {role} ({}): {err}",
                program.program.display()
            ))
        })?;
        let pid = child.id();

        debug!(role, pid, program = %program.program.display(), "process spawned");

        Ok(Self {
            role: role.to_owned(),
            pid,
            sink,
            stop_signal: options.stop_signal,
            liveness: Liveness::Running,
            child,
        })
    }

    /// Role label used in logs (`server`, `waiter`, `client-3`, ...).
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// OS process id captured at spawn time.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Output destination.
    #[must_use]
    pub fn sink(&self) -> &OutputSink {
        &self.sink
    }

    /// Last observed liveness.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    /// Send the configured stop signal without waiting for the exit.
    ///
    /// A process whose exit was already observed is left alone: once
    /// reaped its pid may belong to someone else.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Signal` if the signal cannot be delivered.
    pub fn request_stop(&mut self) -> Result<()> {
        if matches!(self.liveness, Liveness::Exited(_)) {
            return Ok(());
        }

        self.send_stop_signal()?;
        self.liveness = Liveness::StopRequested;
        Ok(())
    }

    #[cfg(unix)]
    fn send_stop_signal(&mut self) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(raw) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return Err(AppError::Signal(format!("{} has no pid", self.role)));
        };
        let signal = match self.stop_signal {
            StopSignal::Sigint => Signal::SIGINT,
            StopSignal::Sigterm => Signal::SIGTERM,
        };

        match kill(Pid::from_raw(raw), signal) {
            Ok(()) => Ok(()),
            // Exited but not yet reaped by us; nothing left to stop.
            Err(Errno::ESRCH) => {
                debug!(role = self.role, pid = raw, "stop target already gone");
                Ok(())
            }
            Err(err) => Err(AppError::Signal(format!(
                "failed to signal {} (pid {raw}): {err}",
                self.role
            ))),
        }
    }

    #[cfg(not(unix))]
    fn send_stop_signal(&mut self) -> Result<()> {
        self.force_kill()
    }

    /// Reap the process if it has exited. Returns `true` once exited.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the exit status cannot be queried.
    pub fn try_reap(&mut self) -> Result<bool> {
        if matches!(self.liveness, Liveness::Exited(_)) {
            return Ok(true);
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.liveness = Liveness::Exited(status);
                debug!(role = self.role, pid = self.pid, %status, "process reaped");
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => Err(AppError::Io(format!(
                "failed to poll {} status: {err}",
                self.role
            ))),
        }
    }

    /// Start a forced kill without waiting for it to land.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Signal` if the kill cannot be issued.
    pub fn force_kill(&mut self) -> Result<()> {
        if matches!(self.liveness, Liveness::Exited(_)) {
            return Ok(());
        }

        self.child
            .start_kill()
            .map_err(|err| AppError::Signal(format!("failed to kill {}: {err}", self.role)))
    }

    /// Block until the process exits and reap it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if waiting on the child fails.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Liveness::Exited(status) = self.liveness {
            return Ok(status);
        }

        let status = self
            .child
            .wait()
            .await
            .map_err(|err| AppError::Io(format!("failed to wait for {}: {err}", self.role)))?;
        self.liveness = Liveness::Exited(status);
        Ok(status)
    }

    /// Ask the process to stop, wait up to `grace`, then force-kill.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Signal` or `AppError::Io` if neither the graceful
    /// nor the forced path manages to reap the process.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<ExitStatus> {
        if let Err(err) = self.request_stop() {
            warn!(role = self.role, %err, "graceful stop failed, forcing kill");
        }

        match tokio::time::timeout(grace, self.wait()).await {
            Ok(result) => {
                let status = result?;
                info!(role = self.role, pid = self.pid, %status, "process exited");
                Ok(status)
            }
            Err(_elapsed) => {
                warn!(
                    role = self.role,
                    pid = self.pid,
                    "process ignored stop signal within grace period, forcing kill"
                );
                self.force_kill()?;
                self.wait().await
            }
        }
    }
}

/// Human-readable exit description for logs.
#[must_use]
pub fn describe_exit(status: ExitStatus) -> String {
    if status.success() {
        "exited normally (code 0)".to_owned()
    } else {
        status.code().map_or_else(
            || "terminated by signal".to_owned(),
            |c| format!("exited with code {c}"),
        )
    }
}
