#![forbid(unsafe_code)]

//! Bring-up and client-churn harness for display-server sessions.
//!
//! The [`launcher`] starts a server, discovers the endpoint it creates,
//! passes a barrier process and starts clients. The [`churn`] driver keeps
//! resizing a pool of clients at random until interrupted.

pub mod churn;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod launcher;
pub mod logging;
pub mod process;
pub mod signals;

pub use config::HarnessConfig;
pub use errors::{AppError, Result};
