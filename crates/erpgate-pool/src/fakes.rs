//! Scriptable connectors shared by the pool and manager tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use erpgate_core::{
    ConnectionConfig, Connector, ConnectorFactory, ConnectorKind, ConnectorStats, ErpError,
    Params, Result,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::{ConnectionPool, PoolConfig};

/// Shared counters and switches for every connector a factory creates
#[derive(Default)]
pub struct Probe {
    pub created: AtomicUsize,
    pub connects: AtomicUsize,
    pub pings: AtomicUsize,
    pub executes: AtomicUsize,
    /// Disconnect calls per connector index
    pub disconnects: Mutex<HashMap<usize, usize>>,
    /// Connect attempts from this index on fail
    pub fail_connect_from: Mutex<Option<usize>>,
    pub unhealthy: AtomicBool,
    /// How long each connect takes
    pub connect_ms: AtomicU64,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn total_disconnects(&self) -> usize {
        self.disconnects.lock().values().sum()
    }

    pub fn disconnects_of(&self, index: usize) -> usize {
        self.disconnects.lock().get(&index).copied().unwrap_or(0)
    }

    pub fn fail_connects_from(&self, attempt: usize) {
        *self.fail_connect_from.lock() = Some(attempt);
    }

    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    pub fn slow_connects(&self, ms: u64) {
        self.connect_ms.store(ms, Ordering::SeqCst);
    }
}

pub struct FakeConnector {
    index: usize,
    config: Arc<ConnectionConfig>,
    stats: ConnectorStats,
    connected: bool,
    probe: Arc<Probe>,
}

#[async_trait]
impl Connector for FakeConnector {
    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Dia
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
        let attempt = self.probe.connects.fetch_add(1, Ordering::SeqCst);
        let ms = self.probe.connect_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if matches!(*self.probe.fail_connect_from.lock(), Some(from) if attempt >= from) {
            return Err(ErpError::Connection("connection refused".into()));
        }
        let was = self.connected;
        self.connected = true;
        Ok(!was)
    }

    async fn disconnect(&mut self) -> Result<bool> {
        *self.probe.disconnects.lock().entry(self.index).or_default() += 1;
        let was = self.connected;
        self.connected = false;
        Ok(was)
    }

    async fn execute(&mut self, operation: &str, params: &Params) -> Result<Value> {
        self.probe.executes.fetch_add(1, Ordering::SeqCst);
        if operation == "sleep" {
            let ms = params.get("ms").and_then(Value::as_u64).unwrap_or(10);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        Ok(json!({ "connector": self.index, "operation": operation }))
    }

    async fn ping(&mut self) -> Result<bool> {
        self.probe.pings.fetch_add(1, Ordering::SeqCst);
        Ok(self.connected && !self.probe.unhealthy.load(Ordering::SeqCst))
    }
}

pub struct FakeFactory {
    kind: ConnectorKind,
    probe: Arc<Probe>,
}

impl FakeFactory {
    pub fn new(kind: ConnectorKind, probe: Arc<Probe>) -> Arc<Self> {
        Arc::new(Self { kind, probe })
    }
}

impl ConnectorFactory for FakeFactory {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    fn create(&self, config: Arc<ConnectionConfig>) -> Result<Box<dyn Connector>> {
        let index = self.probe.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnector {
            index,
            config,
            stats: ConnectorStats::new(),
            connected: false,
            probe: self.probe.clone(),
        }))
    }
}

pub fn pool(max_connections: usize, probe: &Arc<Probe>) -> Arc<ConnectionPool> {
    Arc::new(ConnectionPool::new(
        "test",
        FakeFactory::new(ConnectorKind::Dia, probe.clone()),
        Arc::new(ConnectionConfig::new()),
        PoolConfig::new(max_connections).expect("pool config"),
    ))
}
