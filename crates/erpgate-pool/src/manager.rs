//! Named registry of connector pools

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use erpgate_connectors::ConnectorRegistry;
use erpgate_core::{ConnectionConfig, ConnectorKind, ErpError, Params, Result};
use parking_lot::RwLock;

use crate::{ConnectionPool, PoolConfig, PoolStats, PooledConnector};


/// Process-wide set of pools keyed by name
pub struct ConnectionPoolManager {
    registry: ConnectorRegistry,
    pools: RwLock<HashMap<String, Arc<ConnectionPool>>>,
}

impl ConnectionPoolManager {
    pub fn new(registry: ConnectorRegistry) -> Self {
        Self {
            registry,
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Create, initialize and register a pool.
    ///
    /// The kind comes from `kind` or, when absent, from the pool name.
    /// `params` is normalized into the pool's shared `ConnectionConfig`. A
    /// pool already registered under `name` is replaced and closed once the
    /// new one is up.
    #[tracing::instrument(skip(self, params))]
    pub async fn create_pool(
        &self,
        name: &str,
        kind: Option<ConnectorKind>,
        params: &Params,
        max_connections: usize,
    ) -> Result<Arc<ConnectionPool>> {
        let kind = kind
            .or_else(|| ConnectorKind::from_pool_name(name))
            .ok_or_else(|| ErpError::UnknownConnector(name.to_string()))?;
        let factory = self.registry.get(kind).ok_or_else(|| {
            ErpError::NotSupported(format!("connector kind '{}' is not available in this build", kind))
        })?;
        let pool_config = PoolConfig::new(max_connections)?;
        let config = Arc::new(ConnectionConfig::from_params(params)?);

        let pool = Arc::new(ConnectionPool::new(name, factory, config, pool_config));
        pool.initialize().await?;

        let previous = self
            .pools
            .write()
            .insert(name.to_string(), Arc::clone(&pool));
        if let Some(previous) = previous {
            tracing::info!(pool = %name, "replacing existing pool");
            previous.close().await;
        }

        tracing::info!(pool = %name, kind = %kind, max_connections, "pool created");
        Ok(pool)
    }

    /// Look up a pool by name
    pub fn pool(&self, name: &str) -> Option<Arc<ConnectionPool>> {
        self.pools.read().get(name).cloned()
    }

    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Lease a connector from the named pool
    pub async fn get_connection(&self, name: &str) -> Result<PooledConnector> {
        let pool = self
            .pool(name)
            .ok_or_else(|| ErpError::PoolNotFound(name.to_string()))?;
        pool.acquire().await
    }

    /// Close and remove one pool. Returns whether it existed.
    #[tracing::instrument(skip(self))]
    pub async fn close_pool(&self, name: &str) -> bool {
        let pool = self.pools.write().remove(name);
        match pool {
            Some(pool) => {
                pool.close().await;
                true
            }
            None => {
                tracing::debug!("no such pool");
                false
            }
        }
    }

    /// Close and remove every pool.
    ///
    /// Waits for connectors that are still leased, so it must not be
    /// awaited while the calling task holds a lease.
    #[tracing::instrument(skip(self))]
    pub async fn close_all(&self) {
        let pools: Vec<(String, Arc<ConnectionPool>)> = self.pools.write().drain().collect();
        let count = pools.len();
        for (_, pool) in pools {
            pool.close().await;
        }
        tracing::info!(pools = count, "all pools closed");
    }

    /// Stats for every pool, ordered by name
    pub fn get_all_stats(&self) -> BTreeMap<String, PoolStats> {
        self.pools
            .read()
            .iter()
            .map(|(name, pool)| (name.clone(), pool.get_stats()))
            .collect()
    }
}
