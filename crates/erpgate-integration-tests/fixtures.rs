//! Scripted connectors and shared test setup.
//!
//! A `Backend` is the shared, inspectable state behind every connector a
//! `ScriptedFactory` creates. Tests flip its switches (failures to inject,
//! health) and read its counters after driving the pool.
//!
//! ```rust,ignore
//! let backend = Backend::new();
//! let pool = scripted_pool("erp", 2, &backend, fast_retry(3));
//! backend.fail_next_executes(2);
//! let mut conn = pool.acquire().await?;
//! conn.execute_with_retry("query", &Params::new()).await?;
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use erpgate_connectors::ConnectorRegistry;
use erpgate_core::{
    ConnectionConfig, Connector, ConnectorFactory, ConnectorKind, ConnectorStats, ErpError,
    Params, Result,
};
use erpgate_pool::{ConnectionPool, ConnectionPoolManager, PoolConfig};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route tracing output through the test harness, honouring `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Transaction calls observed by a backend, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEvent {
    Begin,
    Commit,
    Rollback,
}

/// Shared state for every connector of one scripted backend
#[derive(Default)]
pub struct Backend {
    pub created: AtomicUsize,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub pings: AtomicUsize,
    pub executes: AtomicUsize,
    /// Executes still to fail before the backend recovers
    failures_left: AtomicUsize,
    healthy: AtomicBool,
    failing_rollbacks: AtomicBool,
    /// Currently running executes, and the highest value seen
    running: AtomicUsize,
    peak_running: AtomicUsize,
    tx_log: Mutex<Vec<TxEvent>>,
}

impl Backend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            ..Self::default()
        })
    }

    pub fn fail_next_executes(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn fail_rollbacks(&self, fail: bool) {
        self.failing_rollbacks.store(fail, Ordering::SeqCst);
    }

    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    pub fn tx_log(&self) -> Vec<TxEvent> {
        self.tx_log.lock().clone()
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct ScriptedConnector {
    index: usize,
    kind: ConnectorKind,
    config: Arc<ConnectionConfig>,
    stats: ConnectorStats,
    connected: bool,
    in_transaction: bool,
    backend: Arc<Backend>,
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> &ConnectorStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut ConnectorStats {
        &mut self.stats
    }

    async fn connect(&mut self) -> Result<bool> {
        self.backend.connects.fetch_add(1, Ordering::SeqCst);
        let was = self.connected;
        self.connected = true;
        Ok(!was)
    }

    async fn disconnect(&mut self) -> Result<bool> {
        self.backend.disconnects.fetch_add(1, Ordering::SeqCst);
        let was = self.connected;
        self.connected = false;
        self.in_transaction = false;
        Ok(was)
    }

    async fn execute(&mut self, operation: &str, params: &Params) -> Result<Value> {
        self.backend.executes.fetch_add(1, Ordering::SeqCst);
        if !self.connected {
            return Err(ErpError::NotConnected("scripted backend".into()));
        }
        if self.backend.take_failure() {
            return Err(ErpError::Timeout(format!("{} timed out", operation)));
        }

        let running = self.backend.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.backend.peak_running.fetch_max(running, Ordering::SeqCst);
        let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(0);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.backend.running.fetch_sub(1, Ordering::SeqCst);

        Ok(json!({ "connector": self.index, "operation": operation }))
    }

    async fn ping(&mut self) -> Result<bool> {
        self.backend.pings.fetch_add(1, Ordering::SeqCst);
        Ok(self.connected && self.backend.healthy.load(Ordering::SeqCst))
    }

    fn check_operation(&self, operation: &str) -> Result<()> {
        if operation.is_empty() {
            return Err(ErpError::UnknownOperation(String::new()));
        }
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        self.backend.tx_log.lock().push(TxEvent::Begin);
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.backend.tx_log.lock().push(TxEvent::Commit);
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.backend.tx_log.lock().push(TxEvent::Rollback);
        if self.backend.failing_rollbacks.load(Ordering::SeqCst) {
            return Err(ErpError::Connection("session lost".into()));
        }
        self.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

pub struct ScriptedFactory {
    kind: ConnectorKind,
    backend: Arc<Backend>,
}

impl ScriptedFactory {
    pub fn new(kind: ConnectorKind, backend: Arc<Backend>) -> Arc<Self> {
        Arc::new(Self { kind, backend })
    }
}

impl ConnectorFactory for ScriptedFactory {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    fn create(&self, config: Arc<ConnectionConfig>) -> Result<Box<dyn Connector>> {
        let index = self.backend.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnector {
            index,
            kind: self.kind,
            config,
            stats: ConnectorStats::new(),
            connected: false,
            in_transaction: false,
            backend: self.backend.clone(),
        }))
    }
}

/// Retry policy with `attempts` tries and a 100ms base delay
pub fn fast_retry(attempts: u32) -> ConnectionConfig {
    ConnectionConfig::new()
        .with_max_retries(attempts)
        .with_retry_delay(Duration::from_millis(100))
}

pub fn scripted_pool(
    name: &str,
    max_connections: usize,
    backend: &Arc<Backend>,
    config: ConnectionConfig,
) -> Arc<ConnectionPool> {
    init_tracing();
    Arc::new(ConnectionPool::new(
        name,
        ScriptedFactory::new(ConnectorKind::SqlServer, backend.clone()),
        Arc::new(config),
        PoolConfig::new(max_connections).expect("pool config"),
    ))
}

/// A manager whose registry serves every kind from `backend`
pub fn scripted_manager(backend: &Arc<Backend>) -> ConnectionPoolManager {
    init_tracing();
    let mut registry = ConnectorRegistry::new();
    for kind in ConnectorKind::ALL {
        registry.register(ScriptedFactory::new(kind, backend.clone()));
    }
    ConnectionPoolManager::new(registry)
}

/// Build a `Params` map from a JSON object literal
pub fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
}
