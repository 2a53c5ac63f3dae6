//! Pool configuration types

use erpgate_core::{ErpError, Result};
use serde::{Deserialize, Serialize};

/// Connectors per pool when the settings do not say otherwise
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;

/// Configuration for a connector pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of connectors created on initialization, and the lease cap
    max_connections: usize,
    /// Ping every connector before handing it out
    health_check_on_acquire: bool,
}

impl PoolConfig {
    /// Create a pool configuration with `max_connections` connectors
    ///
    /// Fails with `ErpError::Configuration` when `max_connections` is 0.
    pub fn new(max_connections: usize) -> Result<Self> {
        if max_connections == 0 {
            return Err(ErpError::Configuration(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            max_connections,
            health_check_on_acquire: true,
        })
    }

    /// Skip or enable the ping on every acquire
    pub fn with_health_check(mut self, enabled: bool) -> Self {
        self.health_check_on_acquire = enabled;
        self
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn health_check_on_acquire(&self) -> bool {
        self.health_check_on_acquire
    }
}

impl Default for PoolConfig {
    /// Five connectors, health-checked on acquire
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            health_check_on_acquire: true,
        }
    }
}
