//! Harness configuration parsing, defaults, and validation.
//!
//! Every value the components need (runtime directory, program paths,
//! discovery timing, churn bounds) is resolved once here and passed in
//! explicitly. Nothing downstream reads the user id or the process
//! environment on its own.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Signal used to ask a managed process to stop.
#[derive(Debug, Copy, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopSignal {
    /// `SIGINT`, the same signal an interactive Ctrl-C delivers.
    #[default]
    Sigint,
    /// `SIGTERM`.
    Sigterm,
}

/// One external executable plus where its output goes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProgramConfig {
    /// Path to the executable, usually relative to the working directory.
    pub program: PathBuf,
    /// Arguments passed verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// Log file receiving both stdout and stderr. `None` discards output.
    #[serde(default)]
    pub log: Option<PathBuf>,
}

impl ProgramConfig {
    fn new(program: &str, log: Option<&str>) -> Self {
        Self {
            program: PathBuf::from(program),
            args: Vec::new(),
            log: log.map(PathBuf::from),
        }
    }
}

/// Rendezvous endpoint discovery settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DiscoveryConfig {
    /// Glob matched against entry names in the runtime directory.
    #[serde(default = "default_endpoint_pattern")]
    pub endpoint_pattern: String,
    /// Matching entries with one of these suffixes are not endpoints.
    #[serde(default = "default_ignored_suffixes")]
    pub ignored_suffixes: Vec<String>,
    /// First backoff between directory polls.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for the poll backoff.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Overall discovery deadline; 0 means wait forever.
    #[serde(default = "default_discovery_timeout_ms")]
    pub timeout_ms: u64,
    /// Remove dead sockets left by a crashed earlier run before the baseline.
    #[serde(default)]
    pub prune_stale: bool,
}

/// Session bring-up settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LaunchConfig {
    /// Environment variable carrying the discovered endpoint name.
    #[serde(default = "default_env_key")]
    pub env_key: String,
    /// Display server process.
    #[serde(default = "default_server")]
    pub server: ProgramConfig,
    /// Barrier process; its exit marks the endpoint as usable.
    #[serde(default = "default_waiter")]
    pub waiter: ProgramConfig,
    /// Clients started once the barrier has passed, in order.
    #[serde(default = "default_launch_clients")]
    pub clients: Vec<ProgramConfig>,
    /// Grace period per process when an attached launcher tears down.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

/// Client churn settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ChurnConfig {
    /// Client spawned for each pool slot. Output is discarded unless `log` is set.
    #[serde(default = "default_churn_client")]
    pub client: ProgramConfig,
    /// Smallest pool size a tick may draw.
    #[serde(default)]
    pub min_clients: usize,
    /// Largest pool size a tick may draw.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Delay between resize steps.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// How long shutdown waits for signalled clients before force-killing.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Fixed RNG seed; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_endpoint_pattern() -> String {
    "wayland-*".into()
}

fn default_ignored_suffixes() -> Vec<String> {
    vec![".lock".into()]
}

fn default_initial_backoff_ms() -> u64 {
    5
}

fn default_max_backoff_ms() -> u64 {
    250
}

fn default_discovery_timeout_ms() -> u64 {
    30_000
}

fn default_env_key() -> String {
    "WAYLAND_DISPLAY".into()
}

fn default_server() -> ProgramConfig {
    ProgramConfig::new("./zig-out/bin/sphwim", Some("sphwim.log"))
}

fn default_waiter() -> ProgramConfig {
    ProgramConfig::new("./zig-out/bin/wait_for_wl", Some("waiter.log"))
}

fn default_launch_clients() -> Vec<ProgramConfig> {
    vec![
        ProgramConfig::new("./zig-out/bin/sphwayland-client", Some("client1.log")),
        ProgramConfig::new("./zig-out/bin/sphwayland-client", Some("client2.log")),
    ]
}

fn default_churn_client() -> ProgramConfig {
    ProgramConfig::new("./zig-out/bin/sphwayland-client", None)
}

fn default_max_clients() -> usize {
    10
}

fn default_interval_ms() -> u64 {
    500
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

/// Per-user runtime directory, `/run/user/<uid>`.
#[cfg(unix)]
fn default_runtime_dir() -> PathBuf {
    PathBuf::from(format!("/run/user/{}", nix::unistd::getuid()))
}

#[cfg(not(unix))]
fn default_runtime_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            endpoint_pattern: default_endpoint_pattern(),
            ignored_suffixes: default_ignored_suffixes(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_ms: default_discovery_timeout_ms(),
            prune_stale: false,
        }
    }
}

impl DiscoveryConfig {
    /// Overall deadline, `None` when discovery may wait forever.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            env_key: default_env_key(),
            server: default_server(),
            waiter: default_waiter(),
            clients: default_launch_clients(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl LaunchConfig {
    /// Grace period per process on attached teardown.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            client: default_churn_client(),
            min_clients: 0,
            max_clients: default_max_clients(),
            interval_ms: default_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            seed: None,
        }
    }
}

impl ChurnConfig {
    /// Delay between resize steps.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Shutdown grace period.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Top-level harness configuration parsed from an optional TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HarnessConfig {
    /// Directory in which the server creates its endpoint.
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: PathBuf,
    /// Signal used for graceful termination of managed processes.
    #[serde(default)]
    pub stop_signal: StopSignal,
    /// Endpoint discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Session bring-up settings.
    #[serde(default)]
    pub launch: LaunchConfig,
    /// Client churn settings.
    #[serde(default)]
    pub churn: ChurnConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            runtime_dir: default_runtime_dir(),
            stop_signal: StopSignal::default(),
            discovery: DiscoveryConfig::default(),
            launch: LaunchConfig::default(),
            churn: ChurnConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string, filling in defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file is unreadable or invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.discovery.endpoint_pattern.is_empty() {
            return Err(AppError::Config(
                "discovery.endpoint_pattern must not be empty".into(),
            ));
        }
        glob::Pattern::new(&self.discovery.endpoint_pattern).map_err(|err| {
            AppError::Config(format!("discovery.endpoint_pattern invalid: {err}"))
        })?;

        if self.discovery.initial_backoff_ms == 0 {
            return Err(AppError::Config(
                "discovery.initial_backoff_ms must be greater than zero".into(),
            ));
        }

        if self.discovery.initial_backoff_ms > self.discovery.max_backoff_ms {
            return Err(AppError::Config(
                "discovery.initial_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }

        if self.launch.env_key.is_empty() {
            return Err(AppError::Config("launch.env_key must not be empty".into()));
        }

        if self.launch.clients.is_empty() {
            return Err(AppError::Config(
                "launch.clients must list at least one client".into(),
            ));
        }

        let programs = [
            ("launch.server", &self.launch.server),
            ("launch.waiter", &self.launch.waiter),
            ("churn.client", &self.churn.client),
        ];
        for (name, program) in programs
            .into_iter()
            .chain(self.launch.clients.iter().map(|c| ("launch.clients", c)))
        {
            if program.program.as_os_str().is_empty() {
                return Err(AppError::Config(format!(
                    "{name}.program must not be empty"
                )));
            }
        }

        if self.churn.min_clients > self.churn.max_clients {
            return Err(AppError::Config(format!(
                "churn.min_clients ({}) exceeds churn.max_clients ({})",
                self.churn.min_clients, self.churn.max_clients
            )));
        }

        if self.churn.interval_ms == 0 {
            return Err(AppError::Config(
                "churn.interval_ms must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
