//! Rendezvous endpoint discovery.
//!
//! The server announces nothing when it creates its socket, so discovery
//! diffs directory snapshots taken before and after the server starts.

pub mod detector;
pub mod snapshot;
pub mod stale;

pub use detector::{Decision, ReadinessDetector};
pub use snapshot::{EndpointSource, RuntimeDir, Snapshot};
