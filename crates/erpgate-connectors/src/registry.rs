//! Registry of connector factories by backend kind

use std::collections::HashMap;
use std::sync::Arc;

use erpgate_core::{ConnectorFactory, ConnectorKind};

use crate::dia::DiaConnectorFactory;
use crate::sap::{SapConnectorFactory, SapSupport};
use crate::sql::{SqlConnectorFactory, SqlServerDriver};
use crate::{BlockingPool, DEFAULT_BLOCKING_THREADS};

/// Process-wide resources shared by every connector.
///
/// Built once at bootstrap and passed to the registry, so nothing in the
/// connector layer reaches for globals.
#[derive(Clone, Debug)]
pub struct ConnectorEnvironment {
    pub blocking: Arc<BlockingPool>,
    pub sap: SapSupport,
}

impl ConnectorEnvironment {
    pub fn new(blocking: Arc<BlockingPool>, sap: SapSupport) -> Self {
        Self { blocking, sap }
    }

    /// Size the worker pool and resolve SAP support from the environment.
    ///
    /// No native RFC binding ships with this crate; embedders that have one
    /// build the environment with `new` and `SapSupport::detect` themselves.
    pub fn detect(blocking_threads: usize) -> Self {
        Self::new(
            Arc::new(BlockingPool::new(blocking_threads)),
            SapSupport::detect(None, true),
        )
    }
}

impl Default for ConnectorEnvironment {
    fn default() -> Self {
        Self::detect(DEFAULT_BLOCKING_THREADS)
    }
}

/// Registry of available connector factories
pub struct ConnectorRegistry {
    factories: HashMap<ConnectorKind, Arc<dyn ConnectorFactory>>,
}

impl ConnectorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry with every compiled-in adapter registered
    pub fn with_defaults(env: &ConnectorEnvironment) -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(SapConnectorFactory::new(
            ConnectorKind::Sap,
            env.sap.clone(),
            env.blocking.clone(),
        )));
        registry.register(Arc::new(SapConnectorFactory::new(
            ConnectorKind::SapRest,
            env.sap.clone(),
            env.blocking.clone(),
        )));
        registry.register(Arc::new(SqlConnectorFactory::new(
            Arc::new(SqlServerDriver),
            env.blocking.clone(),
        )));
        #[cfg(feature = "oracle")]
        registry.register(Arc::new(SqlConnectorFactory::new(
            Arc::new(crate::sql::OracleDriver),
            env.blocking.clone(),
        )));
        registry.register(Arc::new(DiaConnectorFactory));

        registry
    }

    /// Register a factory, replacing any previous one for the same kind
    pub fn register(&mut self, factory: Arc<dyn ConnectorFactory>) {
        let kind = factory.kind();
        tracing::info!(kind = %kind, "registering connector factory");
        self.factories.insert(kind, factory);
    }

    /// Get the factory for a kind
    pub fn get(&self, kind: ConnectorKind) -> Option<Arc<dyn ConnectorFactory>> {
        let factory = self.factories.get(&kind).cloned();
        if factory.is_none() {
            tracing::warn!(kind = %kind, "connector kind not available in registry");
        }
        factory
    }

    /// Registered kinds in declaration order
    pub fn kinds(&self) -> Vec<ConnectorKind> {
        ConnectorKind::ALL
            .into_iter()
            .filter(|kind| self.factories.contains_key(kind))
            .collect()
    }

    pub fn has(&self, kind: ConnectorKind) -> bool {
        self.factories.contains_key(&kind)
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
