//! Client churn: a randomly resized pool of client processes.

pub mod driver;
pub mod pool;
pub mod shutdown;

pub use driver::ChurnDriver;
pub use pool::{ClientPool, ClientSpawner, PoolMember, ProcessSpawner, ResizeReport};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
