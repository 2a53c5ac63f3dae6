//! Connector trait and retry handling

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    BackoffStrategy, ConnectionConfig, ConnectorKind, ConnectorStatistics, ConnectorStats, Params,
    Result,
};

/// A live session against one backend.
///
/// Each adapter owns its transport handle and its statistics. A connector is
/// used by one caller at a time: the pool hands it out behind a lease, so the
/// mutating methods take `&mut self` and no interior locking is needed.
///
/// `connect` and `disconnect` return `Ok(true)` when the state changed and
/// `Ok(false)` when the connector was already in the requested state.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Backend family this connector talks to
    fn kind(&self) -> ConnectorKind;

    /// Shared configuration of the owning pool
    fn config(&self) -> &ConnectionConfig;

    /// Whether a transport handle is currently held
    fn is_connected(&self) -> bool;

    fn stats(&self) -> &ConnectorStats;

    fn stats_mut(&mut self) -> &mut ConnectorStats;

    /// Establish the transport and authenticate
    async fn connect(&mut self) -> Result<bool>;

    /// Release the transport. Safe to call when not connected.
    async fn disconnect(&mut self) -> Result<bool>;

    /// Run one backend operation identified by `operation`
    async fn execute(&mut self, operation: &str, params: &Params) -> Result<Value>;

    /// Cheap liveness probe. Errors are reported as `Ok(false)` by adapters
    /// that can tell a dead session from a failing backend.
    async fn ping(&mut self) -> Result<bool>;

    /// Validate an operation identifier before any attempt is made.
    ///
    /// Adapters reject unknown identifiers here so that `execute_with_retry`
    /// fails fast instead of retrying a request that can never succeed.
    fn check_operation(&self, _operation: &str) -> Result<()> {
        Ok(())
    }

    /// Open a transaction scope. Backends without transactions accept it.
    async fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether a transaction opened by `begin` has not been committed or
    /// rolled back yet
    fn in_transaction(&self) -> bool {
        false
    }

    /// Drop the current session, if any, and establish a fresh one
    async fn reconnect(&mut self) -> Result<bool> {
        if self.is_connected() {
            if let Err(e) = self.disconnect().await {
                tracing::warn!(kind = %self.kind(), error = %e, "disconnect before reconnect failed");
            }
        }
        self.connect().await
    }

    /// Execute with exponential backoff.
    ///
    /// Makes up to `max_retries` attempts (at least one). After a failed
    /// attempt `n` it sleeps `retry_delay * 2^n`, pings the backend and
    /// reconnects when the ping does not succeed. The error of the final
    /// attempt is returned unchanged.
    async fn execute_with_retry(&mut self, operation: &str, params: &Params) -> Result<Value> {
        self.check_operation(operation)?;

        let attempts = self.config().max_retries.max(1);
        let backoff = BackoffStrategy::from_config(self.config());
        let kind = self.kind();

        let mut attempt = 0;
        loop {
            let started = Instant::now();
            match self.execute(operation, params).await {
                Ok(value) => {
                    self.stats_mut().record_success(started.elapsed());
                    return Ok(value);
                }
                Err(e) => {
                    self.stats_mut().record_failure(started.elapsed());
                    tracing::warn!(
                        kind = %kind,
                        operation,
                        attempt = attempt + 1,
                        attempts,
                        error = %e,
                        "operation attempt failed"
                    );

                    if attempt + 1 >= attempts {
                        return Err(e);
                    }
                }
            }

            tokio::time::sleep(backoff.calculate_delay(attempt)).await;

            if !matches!(self.ping().await, Ok(true)) {
                tracing::debug!(kind = %kind, "backend unhealthy, reconnecting");
                if let Err(e) = self.reconnect().await {
                    tracing::warn!(kind = %kind, error = %e, "reconnect failed");
                }
            }

            attempt += 1;
        }
    }

    /// Statistics snapshot for the status surface
    fn statistics(&self) -> ConnectorStatistics {
        self.stats().snapshot(self.kind(), self.is_connected())
    }
}

/// Creates unconnected connectors for one backend family.
///
/// Creation performs no I/O; the pool connects each connector itself.
pub trait ConnectorFactory: Send + Sync {
    fn kind(&self) -> ConnectorKind;

    fn create(&self, config: Arc<ConnectionConfig>) -> Result<Box<dyn Connector>>;
}
