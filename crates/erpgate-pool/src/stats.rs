//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a pool's state for the status surface
///
/// `available + in_use` equals `max_connections` while the pool is
/// initialized. After a close both are zero until the next acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of connectors the pool creates and the most it leases at once
    pub max_connections: usize,
    /// Connectors idle in the pool, ready to be leased
    pub available: usize,
    /// Connectors currently leased to a caller
    pub in_use: usize,
    /// Whether the connector set is created and connected
    pub initialized: bool,
    /// Callers suspended in `acquire` until a connector is released
    pub waiting: usize,
}

impl PoolStats {
    /// Share of the pool currently leased (0.0 to 1.0)
    ///
    /// Returns 0.0 for a pool without capacity.
    pub fn utilization(&self) -> f64 {
        if self.max_connections == 0 {
            0.0
        } else {
            self.in_use as f64 / self.max_connections as f64
        }
    }

    /// Whether a new acquire would have to wait
    pub fn is_saturated(&self) -> bool {
        self.max_connections > 0 && self.in_use >= self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stats(max_connections: usize, in_use: usize) -> PoolStats {
        PoolStats {
            max_connections,
            available: max_connections - in_use,
            in_use,
            initialized: true,
            waiting: 0,
        }
    }

    #[test]
    fn test_utilization() {
        assert_eq!(stats(4, 1).utilization(), 0.25);
        assert_eq!(stats(0, 0).utilization(), 0.0);
    }

    #[test]
    fn test_saturation() {
        assert!(stats(2, 2).is_saturated());
        assert!(!stats(2, 1).is_saturated());
        assert!(!stats(0, 0).is_saturated());
    }

    #[test]
    fn test_serializes_flat() {
        let value = serde_json::to_value(stats(2, 1)).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "max_connections": 2,
                "available": 1,
                "in_use": 1,
                "initialized": true,
                "waiting": 0,
            })
        );
    }
}
