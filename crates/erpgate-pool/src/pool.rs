//! Bounded pool of connected connectors

use std::collections::HashSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use erpgate_core::{ConnectionConfig, Connector, ConnectorFactory, ConnectorKind, ErpError, Result};
use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::{PoolConfig, PoolStats};


/// Pool-assigned identity of one connector instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectorId(Uuid);

impl ConnectorId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Slot {
    id: ConnectorId,
    connector: Box<dyn Connector>,
}

/// Everything guarded by the pool lock.
///
/// A connector of the current generation is either in `available` or its
/// id is in `in_use`, never both. `close` starts a new generation; leases
/// from an older one no longer belong to the pool. Their ids move to
/// `outstanding` until the lease ends and the connector is disconnected.
struct PoolState {
    available: Vec<Slot>,
    in_use: HashSet<ConnectorId>,
    outstanding: HashSet<ConnectorId>,
    /// Returned from a closed generation, waiting for a closer
    retired: Vec<Slot>,
    closers: usize,
    initialized: bool,
    generation: u64,
}

/// Decrements the waiting count when the wait ends or is cancelled
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Registered closer of a pool.
///
/// If `close` is cancelled, connectors already handed back for it are
/// disconnected in the background, and later leases disconnect their own.
struct ClosingGuard<'a>(&'a ConnectionPool);

impl Drop for ClosingGuard<'_> {
    fn drop(&mut self) {
        let leftover = {
            let mut state = self.0.state.lock();
            state.closers -= 1;
            if state.closers == 0 {
                std::mem::take(&mut state.retired)
            } else {
                Vec::new()
            }
        };
        for slot in leftover {
            disconnect_detached(slot);
        }
    }
}

/// Disconnect a connector nobody is waiting on.
///
/// Runs on the current runtime when there is one. Outside a runtime a
/// short-lived one is built so the backend session is still closed.
fn disconnect_detached(slot: Slot) {
    let Slot { id, mut connector } = slot;
    let task = async move {
        if let Err(e) = connector.disconnect().await {
            tracing::warn!(connector = %id, error = %e, "disconnect after close failed");
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(task),
            Err(e) => {
                tracing::warn!(connector = %id, error = %e, "no runtime to disconnect a connector leased across close");
            }
        },
    }
}

/// A fixed set of connectors of one kind, leased one caller at a time.
///
/// The semaphore holds one permit per connector, so a caller that gets a
/// permit always finds a connector in `available`. A lease releases its
/// permit only after the connector is back in the pool.
pub struct ConnectionPool {
    name: String,
    factory: Arc<dyn ConnectorFactory>,
    config: Arc<ConnectionConfig>,
    pool_config: PoolConfig,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    released: Notify,
    returned: Notify,
    init_lock: tokio::sync::Mutex<()>,
    waiting: AtomicUsize,
}

impl ConnectionPool {
    /// Create an uninitialized pool. No connector is created until
    /// `initialize` or the first `acquire`.
    pub fn new(
        name: impl Into<String>,
        factory: Arc<dyn ConnectorFactory>,
        config: Arc<ConnectionConfig>,
        pool_config: PoolConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(pool_config.max_connections()));
        Self {
            name: name.into(),
            factory,
            config,
            pool_config,
            semaphore,
            state: Mutex::new(PoolState {
                available: Vec::new(),
                in_use: HashSet::new(),
                outstanding: HashSet::new(),
                retired: Vec::new(),
                closers: 0,
                initialized: false,
                generation: 0,
            }),
            released: Notify::new(),
            returned: Notify::new(),
            init_lock: tokio::sync::Mutex::new(()),
            waiting: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ConnectorKind {
        self.factory.kind()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Generation of the live connector set, if the pool is initialized
    fn live_generation(&self) -> Option<u64> {
        let state = self.state.lock();
        state.initialized.then_some(state.generation)
    }

    async fn open_connector(&self) -> Result<Box<dyn Connector>> {
        let mut connector = self.factory.create(self.config.clone())?;
        connector.connect().await?;
        Ok(connector)
    }

    /// Create and connect `max_connections` connectors.
    ///
    /// Idempotent. If any connector fails to connect, the ones already
    /// connected are disconnected again and the error is returned.
    pub async fn initialize(&self) -> Result<()> {
        self.ensure_initialized().await.map(|_| ())
    }

    /// Initialize if needed and return the generation that was live when
    /// initialization was confirmed
    #[tracing::instrument(skip(self), fields(pool = %self.name, kind = %self.kind()))]
    async fn ensure_initialized(&self) -> Result<u64> {
        if let Some(generation) = self.live_generation() {
            return Ok(generation);
        }

        let _init = self.init_lock.lock().await;
        if let Some(generation) = self.live_generation() {
            return Ok(generation);
        }

        let started = Instant::now();
        let max = self.pool_config.max_connections();
        let mut slots: Vec<Slot> = Vec::with_capacity(max);

        for _ in 0..max {
            match self.open_connector().await {
                Ok(connector) => slots.push(Slot {
                    id: ConnectorId::new(),
                    connector,
                }),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        connected = slots.len(),
                        "pool initialization failed"
                    );
                    for mut slot in slots {
                        if let Err(disconnect_error) = slot.connector.disconnect().await {
                            tracing::warn!(
                                connector = %slot.id,
                                error = %disconnect_error,
                                "cleanup disconnect failed"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        let generation = {
            let mut state = self.state.lock();
            state.available = slots;
            state.in_use.clear();
            state.initialized = true;
            state.generation
        };

        tracing::info!(
            max_connections = max,
            duration_ms = started.elapsed().as_millis() as u64,
            "pool initialized"
        );
        Ok(generation)
    }

    /// Lease a healthy connector.
    ///
    /// Initializes the pool when needed and suspends while every connector
    /// is leased. There is no acquire timeout. The connector is returned to
    /// the pool when the `PooledConnector` is dropped, including when the
    /// caller's future is cancelled. A transaction left open by an earlier
    /// lease is rolled back before the connector is handed out.
    #[tracing::instrument(skip(self), fields(pool = %self.name))]
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnector> {
        let generation = self.ensure_initialized().await?;

        let permit = {
            let _waiting = WaitingGuard::enter(&self.waiting);
            self.semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| ErpError::Connection(format!("pool '{}' is shut down", self.name)))?
        };

        let slot = loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.generation != generation || !state.initialized {
                    return Err(ErpError::Connection(format!("pool '{}' closed", self.name)));
                }
                if let Some(slot) = state.available.pop() {
                    state.in_use.insert(slot.id);
                    break slot;
                }
            }

            tracing::debug!("no connector available yet, waiting for a release");
            let _waiting = WaitingGuard::enter(&self.waiting);
            notified.await;
        };

        let mut lease = PooledConnector {
            pool: Arc::clone(self),
            slot: Some(slot),
            generation,
            _permit: permit,
        };

        if lease.in_transaction() {
            self.reset_transaction(&mut lease).await?;
        }
        if self.pool_config.health_check_on_acquire() {
            self.check_health(&mut lease).await?;
        }

        tracing::debug!(connector = %lease.id(), "connector leased");
        Ok(lease)
    }

    /// Ping the leased connector and reconnect it when the ping fails.
    ///
    /// On error the lease is dropped by the caller, which puts the
    /// connector back into `available`.
    async fn check_health(&self, lease: &mut PooledConnector) -> Result<()> {
        match lease.ping().await {
            Ok(true) => Ok(()),
            outcome => {
                if let Err(e) = &outcome {
                    tracing::debug!(connector = %lease.id(), error = %e, "ping failed");
                }
                tracing::warn!(connector = %lease.id(), "unhealthy connector, reconnecting");
                lease.reconnect().await.map(|_| ()).inspect_err(|e| {
                    tracing::error!(connector = %lease.id(), error = %e, "reconnect failed");
                })
            }
        }
    }

    /// Roll back a transaction an earlier lease left open.
    ///
    /// This happens when a transaction scope is cancelled mid-body. If the
    /// rollback fails the session is replaced, which discards the
    /// transaction on the backend.
    async fn reset_transaction(&self, lease: &mut PooledConnector) -> Result<()> {
        tracing::warn!(connector = %lease.id(), "rolling back a transaction left open by a previous lease");
        if let Err(e) = lease.rollback().await {
            tracing::warn!(connector = %lease.id(), error = %e, "rollback failed, reconnecting");
            lease.reconnect().await?;
        }
        Ok(())
    }

    fn release(&self, slot: Slot, generation: u64) {
        let mut state = self.state.lock();
        if state.generation == generation {
            state.in_use.remove(&slot.id);
            state.available.push(slot);
            drop(state);
            self.released.notify_one();
            return;
        }

        // The pool was closed while this connector was leased
        state.outstanding.remove(&slot.id);
        if state.closers > 0 {
            state.retired.push(slot);
            drop(state);
            self.returned.notify_waiters();
            return;
        }
        drop(state);
        disconnect_detached(slot);
    }

    /// Disconnect every connector and reset the pool.
    ///
    /// Idle connectors are disconnected right away. For connectors that are
    /// leased, `close` waits until each lease ends and then disconnects it,
    /// so it must not be awaited by a task that still holds a lease from
    /// this pool. Callers already waiting in `acquire` fail with a closed
    /// error. A later `acquire` initializes the pool again.
    #[tracing::instrument(skip(self), fields(pool = %self.name))]
    pub async fn close(&self) {
        let (drained, leased, _closing) = {
            let _init = self.init_lock.lock().await;
            let mut state = self.state.lock();
            state.generation += 1;
            state.initialized = false;
            let leased: Vec<ConnectorId> = state.in_use.drain().collect();
            let leased_count = leased.len();
            state.outstanding.extend(leased);
            state.closers += 1;
            (
                std::mem::take(&mut state.available),
                leased_count,
                ClosingGuard(self),
            )
        };
        self.released.notify_waiters();

        let mut disconnected = Self::disconnect_slots(drained).await;

        loop {
            let returned = self.returned.notified();
            tokio::pin!(returned);
            returned.as_mut().enable();

            let (slots, remaining) = {
                let mut state = self.state.lock();
                (std::mem::take(&mut state.retired), state.outstanding.len())
            };
            disconnected += Self::disconnect_slots(slots).await;
            if remaining == 0 {
                break;
            }

            tracing::debug!(remaining, "waiting for leased connectors to come back");
            returned.await;
        }

        tracing::info!(disconnected, leased, "pool closed");
    }

    async fn disconnect_slots(slots: Vec<Slot>) -> usize {
        let mut disconnected = 0;
        for mut slot in slots {
            match slot.connector.disconnect().await {
                Ok(_) => disconnected += 1,
                Err(e) => {
                    tracing::warn!(connector = %slot.id, error = %e, "disconnect failed during close");
                }
            }
        }
        disconnected
    }

    pub fn get_stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            max_connections: self.pool_config.max_connections(),
            available: state.available.len(),
            in_use: state.in_use.len(),
            initialized: state.initialized,
            waiting: self.waiting.load(Ordering::SeqCst),
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("stats", &self.get_stats())
            .finish()
    }
}

/// A connector leased from the pool
///
/// When dropped, the connector is returned to the pool.
pub struct PooledConnector {
    pool: Arc<ConnectionPool>,
    slot: Option<Slot>,
    generation: u64,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnector {
    pub fn id(&self) -> ConnectorId {
        self.slot().id
    }

    pub fn pool_name(&self) -> &str {
        &self.pool.name
    }

    // `slot` is only `None` once `drop` has started
    fn slot(&self) -> &Slot {
        self.slot.as_ref().expect("connector taken")
    }

    fn slot_mut(&mut self) -> &mut Slot {
        self.slot.as_mut().expect("connector taken")
    }
}

impl Deref for PooledConnector {
    type Target = dyn Connector;

    fn deref(&self) -> &Self::Target {
        self.slot().connector.as_ref()
    }
}

impl DerefMut for PooledConnector {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.slot_mut().connector.as_mut()
    }
}

impl Drop for PooledConnector {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            tracing::trace!(pool = %self.pool.name, connector = %slot.id, "connector released");
            self.pool.release(slot, self.generation);
        }
    }
}

impl fmt::Debug for PooledConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnector")
            .field("pool", &self.pool.name)
            .field("id", &self.slot.as_ref().map(|s| s.id))
            .finish()
    }
}
