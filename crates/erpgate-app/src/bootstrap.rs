//! Process-wide gateway state
//!
//! `Gateway::start` is the single initialization step: it resolves the
//! connector environment once, builds the registry and the pool manager,
//! and creates the configured pools. `Gateway::shutdown` is the matching
//! teardown.

use std::time::Instant;

use erpgate_connectors::{ConnectorEnvironment, ConnectorRegistry};
use erpgate_pool::ConnectionPoolManager;

use crate::settings::GatewaySettings;

pub struct Gateway {
    environment: ConnectorEnvironment,
    manager: ConnectionPoolManager,
}

impl Gateway {
    /// Build the gateway and create every enabled pool.
    ///
    /// A pool that fails to come up is logged and skipped so one broken
    /// backend does not keep the others from starting.
    pub async fn start(settings: &GatewaySettings) -> Self {
        Self::start_with(
            ConnectorEnvironment::detect(settings.runtime.blocking_threads),
            settings,
        )
        .await
    }

    pub async fn start_with(environment: ConnectorEnvironment, settings: &GatewaySettings) -> Self {
        let started = Instant::now();
        let registry = ConnectorRegistry::with_defaults(&environment);
        tracing::info!(
            kinds = ?registry.kinds(),
            blocking_threads = environment.blocking.size(),
            sap_capability = ?environment.sap.capability(),
            "connector environment ready"
        );

        let manager = ConnectionPoolManager::new(registry);
        for (name, pool) in &settings.pools {
            if !pool.enabled {
                tracing::debug!(pool = %name, "pool disabled, skipping");
                continue;
            }

            if let Err(e) = manager
                .create_pool(name, pool.kind, &pool.params, pool.max_connections)
                .await
            {
                tracing::error!(pool = %name, error = %e, "failed to create pool, skipping");
            }
        }

        tracing::info!(
            pools = manager.pool_names().len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "gateway started"
        );

        Self {
            environment,
            manager,
        }
    }

    pub fn manager(&self) -> &ConnectionPoolManager {
        &self.manager
    }

    pub fn environment(&self) -> &ConnectorEnvironment {
        &self.environment
    }

    /// Close every pool once the leases still in flight have ended
    pub async fn shutdown(self) {
        tracing::info!("shutting down gateway");
        self.manager.close_all().await;
    }
}
