//! Removal of endpoints left behind by a crashed earlier session.
//!
//! A leftover socket file is indistinguishable from a fresh one by name, so
//! a crashed run can make later discoveries ambiguous. Pruning only removes
//! sockets that refuse connections; a listening socket is never touched.

use std::io::ErrorKind;

use tracing::{info, warn};

use crate::discovery::snapshot::{EndpointSource, RuntimeDir};
use crate::{AppError, Result};

/// Suffix of the lock file a Wayland server keeps next to its socket.
const LOCK_SUFFIX: &str = ".lock";

/// Delete dead endpoint sockets (and their lock files) from `dir`.
///
/// Returns the names that were removed.
///
/// # Errors
///
/// Returns `AppError::Io` if the directory cannot be listed or a dead
/// socket cannot be removed.
#[cfg(unix)]
pub fn prune_stale_endpoints(dir: &RuntimeDir) -> Result<Vec<String>> {
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::net::UnixStream;

    let snapshot = dir.snapshot()?;
    let mut removed = Vec::new();

    for name in snapshot.names() {
        let path = dir.dir().join(name);
        let Ok(meta) = std::fs::symlink_metadata(&path) else {
            continue;
        };
        if !meta.file_type().is_socket() {
            continue;
        }

        match UnixStream::connect(&path) {
            Ok(_) => continue,
            Err(err) if err.kind() == ErrorKind::ConnectionRefused => {}
            Err(err) => {
                warn!(endpoint = name, %err, "cannot probe endpoint, leaving it in place");
                continue;
            }
        }

        std::fs::remove_file(&path).map_err(|err| {
            AppError::Io(format!("cannot remove stale {}: {err}", path.display()))
        })?;

        let lock = dir.dir().join(format!("{name}{LOCK_SUFFIX}"));
        if let Err(err) = std::fs::remove_file(&lock) {
            if err.kind() != ErrorKind::NotFound {
                warn!(lock = %lock.display(), %err, "cannot remove stale lock file");
            }
        }

        info!(endpoint = name, "removed stale endpoint");
        removed.push(name.to_owned());
    }

    Ok(removed)
}

/// Non-unix platforms have no socket files to prune.
///
/// # Errors
///
/// Never fails.
#[cfg(not(unix))]
pub fn prune_stale_endpoints(_dir: &RuntimeDir) -> Result<Vec<String>> {
    Ok(Vec::new())
}
