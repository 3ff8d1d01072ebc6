//! Point-in-time captures of the endpoints present in a directory.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::{AppError, Result};

/// Immutable set of endpoint names observed at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    names: BTreeSet<String>,
}

impl Snapshot {
    /// Build a snapshot from explicit names.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of endpoints captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the capture saw no endpoints at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether `name` was present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Endpoint names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Names present here but absent from `baseline`, sorted.
    #[must_use]
    pub fn new_since(&self, baseline: &Snapshot) -> Vec<String> {
        self.names.difference(&baseline.names).cloned().collect()
    }
}

impl FromIterator<String> for Snapshot {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

/// Anything that can report which endpoints currently exist.
pub trait EndpointSource {
    /// Capture the current set of endpoints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the underlying listing fails.
    fn snapshot(&self) -> Result<Snapshot>;

    /// Remove endpoints left over from an earlier crashed session.
    ///
    /// Sources without a notion of staleness remove nothing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if a stale endpoint cannot be removed.
    fn prune_stale(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

impl<S: EndpointSource + ?Sized> EndpointSource for &S {
    fn snapshot(&self) -> Result<Snapshot> {
        (**self).snapshot()
    }

    fn prune_stale(&self) -> Result<Vec<String>> {
        (**self).prune_stale()
    }
}

/// Endpoints living in a per-user runtime directory.
#[derive(Debug, Clone)]
pub struct RuntimeDir {
    dir: PathBuf,
    pattern: Pattern,
    ignored_suffixes: Vec<String>,
}

impl RuntimeDir {
    /// Watch `dir` for entries matching the glob `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `pattern` is not a valid glob.
    pub fn new(dir: impl Into<PathBuf>, pattern: &str, ignored_suffixes: &[String]) -> Result<Self> {
        let pattern = Pattern::new(pattern)
            .map_err(|err| AppError::Config(format!("invalid endpoint pattern: {err}")))?;
        Ok(Self {
            dir: dir.into(),
            pattern,
            ignored_suffixes: ignored_suffixes.to_vec(),
        })
    }

    /// Build from the resolved harness configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the endpoint pattern is invalid.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        Self::new(
            &config.runtime_dir,
            &config.discovery.endpoint_pattern,
            &config.discovery.ignored_suffixes,
        )
    }

    /// Directory being listed.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether an entry name counts as an endpoint.
    #[must_use]
    pub fn is_endpoint(&self, name: &str) -> bool {
        self.pattern.matches(name)
            && !self
                .ignored_suffixes
                .iter()
                .any(|suffix| name.ends_with(suffix.as_str()))
    }
}

impl EndpointSource for RuntimeDir {
    fn snapshot(&self) -> Result<Snapshot> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "runtime directory missing, treating as empty");
                return Ok(Snapshot::default());
            }
            Err(err) => {
                return Err(AppError::Io(format!(
                    "cannot list {}: {err}",
                    self.dir.display()
                )))
            }
        };

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                AppError::Io(format!("cannot read entry in {}: {err}", self.dir.display()))
            })?;
            // Endpoint names are ASCII; anything else cannot match the pattern.
            if let Some(name) = entry.file_name().to_str() {
                if self.is_endpoint(name) {
                    names.insert(name.to_owned());
                }
            }
        }

        Ok(Snapshot { names })
    }

    fn prune_stale(&self) -> Result<Vec<String>> {
        crate::discovery::stale::prune_stale_endpoints(self)
    }
}
