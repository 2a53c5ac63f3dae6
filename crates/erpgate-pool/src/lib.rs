//! erpgate pool - bounded pools of backend connectors
//!
//! A `ConnectionPool` owns a fixed number of connected `Connector`s of one
//! kind and leases them out one caller at a time. The
//! `ConnectionPoolManager` keeps one pool per name and is the entry point
//! the application uses.
//!
//! # Example
//!
//! ```ignore
//! use erpgate_pool::ConnectionPoolManager;
//!
//! let manager = ConnectionPoolManager::new(registry);
//! manager.create_pool("dia", None, &params, 5).await?;
//!
//! let mut connector = manager.get_connection("dia").await?;
//! let value = connector.execute_with_retry("kontor_sorgula", &Params::new()).await?;
//! // Connector returned to the pool on drop
//! ```

mod config;
mod manager;
mod pool;
mod stats;

#[cfg(test)]
mod fakes;

pub use config::{DEFAULT_MAX_CONNECTIONS, PoolConfig};
pub use manager::ConnectionPoolManager;
pub use pool::{ConnectionPool, ConnectorId, PooledConnector};
pub use stats::PoolStats;
