/// Database access
///
/// - `pool`: connection pool setup and health checks
/// - `migrations`: embedded schema migrations
///
/// Table models live in [`crate::models`].

pub mod migrations;
pub mod pool;

pub use pool::{DatabaseConfig, PoolStats};
