//! Error types shared across the harness.

use std::fmt::{Display, Formatter};

/// Shared harness result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Harness error enumeration covering all failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// An external executable could not be started.
    Spawn(String),
    /// Delivering a signal to a managed process failed.
    Signal(String),
    /// More than one new rendezvous endpoint appeared after server launch.
    AmbiguousEndpoint(String),
    /// No rendezvous endpoint appeared before the discovery deadline.
    DiscoveryTimeout(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Process exit status used by the binaries when this error is fatal.
    ///
    /// Ambiguous discovery keeps the historical status `1`; a discovery
    /// timeout uses `2` so scripts can tell the two apart.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::DiscoveryTimeout(_) => 2,
            _ => 1,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Signal(msg) => write!(f, "signal: {msg}"),
            Self::AmbiguousEndpoint(msg) => write!(f, "ambiguous endpoint: {msg}"),
            Self::DiscoveryTimeout(msg) => write!(f, "discovery timed out: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
