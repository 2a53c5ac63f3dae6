//! Dual-mode SAP connector

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use erpgate_core::{
    ConnectionConfig, Connector, ConnectorFactory, ConnectorKind, ConnectorStats, ErpError,
    Params, ParamsExt, Result,
};
use serde_json::{Value, json};

use super::rest::ODataClient;
use super::rfc::RfcClient;
use super::table::{
    DDIF_TABL_GET, RFC_READ_TABLE, TableReadRequest, check_bapi_return, parse_table_rows,
    table_metadata,
};
use super::{RfcConnectParams, SapMode, SapOperation, SapSupport};
use crate::BlockingPool;

enum Transport {
    Rfc(RfcClient),
    Rest(ODataClient),
}

/// SAP connector speaking either native RFC or OData, fixed at construction
pub struct SapConnector {
    kind: ConnectorKind,
    config: Arc<ConnectionConfig>,
    mode: SapMode,
    support: SapSupport,
    blocking: Arc<BlockingPool>,
    transport: Option<Transport>,
    stats: ConnectorStats,
}

impl SapConnector {
    pub fn new(
        kind: ConnectorKind,
        config: Arc<ConnectionConfig>,
        support: SapSupport,
        blocking: Arc<BlockingPool>,
    ) -> Result<Self> {
        let mode = support.resolve_mode(kind, &config)?;
        tracing::debug!(kind = %kind, mode = %mode, "SAP connector created");

        Ok(Self {
            kind,
            config,
            mode,
            support,
            blocking,
            transport: None,
            stats: ConnectorStats::new(),
        })
    }

    pub fn mode(&self) -> SapMode {
        self.mode
    }

    fn rfc(&self) -> Result<&RfcClient> {
        match &self.transport {
            Some(Transport::Rfc(client)) => Ok(client),
            _ => Err(ErpError::NotConnected("SAP RFC session is not open".to_string())),
        }
    }

    fn rest(&self) -> Result<&ODataClient> {
        match &self.transport {
            Some(Transport::Rest(client)) => Ok(client),
            _ => Err(ErpError::NotConnected("SAP REST session is not open".to_string())),
        }
    }

    async fn open_transport(&self) -> Result<Transport> {
        match self.mode {
            SapMode::Rfc => {
                let binding = self.support.binding().cloned().ok_or_else(|| {
                    ErpError::Configuration("native RFC binding is not registered".to_string())
                })?;
                let params = RfcConnectParams::from_config(&self.config)?;
                let client = RfcClient::open(
                    binding,
                    params,
                    self.blocking.clone(),
                    self.config.timeout,
                )
                .await?;
                Ok(Transport::Rfc(client))
            }
            SapMode::Rest => {
                let mut client = ODataClient::new(&self.config)?;
                client.connect().await?;
                Ok(Transport::Rest(client))
            }
        }
    }

    /// Invoke an arbitrary function module over RFC
    pub async fn call_rfc(&self, function: &str, params: Params) -> Result<Value> {
        let started = Instant::now();
        let result = self.rfc()?.call(function, params).await;
        tracing::debug!(
            function,
            duration_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "RFC call finished"
        );
        result
    }

    /// Read table rows through RFC_READ_TABLE
    pub async fn read_table(&self, request: &TableReadRequest) -> Result<Vec<Params>> {
        let result = self.call_rfc(RFC_READ_TABLE, request.to_rfc_params()).await?;
        let rows = parse_table_rows(&result);
        tracing::info!(table = %request.table, rows = rows.len(), "read SAP table");
        Ok(rows)
    }

    /// Call a BAPI and fail on an error entry in its RETURN structure.
    ///
    /// Over REST the BAPI is reached as a function import of `service`.
    pub async fn call_bapi(&self, args: &Params) -> Result<Value> {
        let bapi = args.require_str("bapi")?;

        let mut params = Params::new();
        for key in ["import_params", "table_params"] {
            if let Some(values) = args.opt_object(key) {
                params.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }

        let result = match self.mode {
            SapMode::Rfc => self.call_rfc(bapi, params).await?,
            SapMode::Rest => {
                let rest = self.rest()?;
                let service = args.opt_str("service").unwrap_or(rest.default_service());
                rest.call_function(service, bapi, Some(&params)).await?
            }
        };

        check_bapi_return(bapi, &result)?;
        Ok(result)
    }

    pub async fn table_metadata(&self, table: &str) -> Result<Value> {
        let mut params = Params::new();
        params.insert("TABNAME".into(), json!(table));
        let result = self.call_rfc(DDIF_TABL_GET, params).await?;
        Ok(table_metadata(table, &result))
    }

    async fn dispatch(&self, op: SapOperation, args: &Params) -> Result<Value> {
        match op {
            SapOperation::ReadTable => {
                let request = TableReadRequest::from_params(args)?;
                let rows = self.read_table(&request).await?;
                Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
            }
            SapOperation::CallBapi => self.call_bapi(args).await,
            SapOperation::TableMetadata => {
                let table = args
                    .opt_str("table")
                    .or_else(|| args.opt_str("table_name"))
                    .ok_or_else(|| ErpError::InvalidArgument("'table' is required".to_string()))?;
                self.table_metadata(table).await
            }
            SapOperation::CallRfc => {
                let function = args.require_str("function")?;
                let params = args.opt_object("params").cloned().unwrap_or_default();
                self.call_rfc(function, params).await
            }
            SapOperation::ReadEntity => self.rest()?.read_entity(args).await,
            SapOperation::ReadCollection => self.rest()?.read_collection(args).await,
            SapOperation::CreateEntity => self.rest()?.create_entity(args).await,
            SapOperation::UpdateEntity => self.rest()?.update_entity(args).await,
            SapOperation::DeleteEntity => self.rest()?.delete_entity(args).await,
            SapOperation::CallFunction => {
                let service = args.require_str("service")?;
                let function = args.require_str("function")?;
                self.rest()?
                    .call_function(service, function, args.opt_object("params"))
                    .await
            }
            SapOperation::ServiceMetadata => {
                let service = args.require_str("service")?;
                self.rest()?.service_metadata(service).await
            }
            SapOperation::ListServices => self.rest()?.list_services().await,
        }
    }
}

#[async_trait]
impl Connector for SapConnector {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn stats(&self) -> &ConnectorStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut ConnectorStats {
        &mut self.stats
    }

    #[tracing::instrument(skip(self), fields(kind = %self.kind, mode = %self.mode, host = ?self.config.host))]
    async fn connect(&mut self) -> Result<bool> {
        if self.transport.is_some() {
            return Ok(false);
        }

        let started = Instant::now();
        let transport = self.open_transport().await.inspect_err(|e| {
            tracing::error!(error = %e, "failed to connect to SAP");
        })?;
        self.transport = Some(transport);
        self.stats.record_connect(started.elapsed());

        tracing::info!(
            duration_ms = started.elapsed().as_millis() as u64,
            "connected to SAP"
        );
        Ok(true)
    }

    async fn disconnect(&mut self) -> Result<bool> {
        match self.transport.take() {
            Some(Transport::Rfc(client)) => {
                client.close().await?;
                tracing::info!(mode = %self.mode, "disconnected from SAP");
                Ok(true)
            }
            Some(Transport::Rest(client)) => {
                tracing::info!(mode = %self.mode, base_url = client.base_url(), "disconnected from SAP");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn execute(&mut self, operation: &str, params: &Params) -> Result<Value> {
        let op = SapOperation::for_mode(operation, self.mode)?;
        if self.transport.is_none() {
            return Err(ErpError::NotConnected("not connected to SAP".to_string()));
        }
        self.dispatch(op, params).await
    }

    async fn ping(&mut self) -> Result<bool> {
        match &self.transport {
            Some(Transport::Rfc(client)) => Ok(client.ping().await.is_ok()),
            Some(Transport::Rest(client)) => Ok(client.ping().await),
            None => Ok(false),
        }
    }

    fn check_operation(&self, operation: &str) -> Result<()> {
        SapOperation::for_mode(operation, self.mode).map(|_| ())
    }
}

/// Creates SAP connectors sharing the process-wide SAP support
pub struct SapConnectorFactory {
    kind: ConnectorKind,
    support: SapSupport,
    blocking: Arc<BlockingPool>,
}

impl SapConnectorFactory {
    /// `kind` is `Sap` for mode resolution, or `SapRest` to force OData
    pub fn new(kind: ConnectorKind, support: SapSupport, blocking: Arc<BlockingPool>) -> Self {
        Self {
            kind,
            support,
            blocking,
        }
    }
}

impl ConnectorFactory for SapConnectorFactory {
    fn kind(&self) -> ConnectorKind {
        self.kind
    }

    fn create(&self, config: Arc<ConnectionConfig>) -> Result<Box<dyn Connector>> {
        Ok(Box::new(SapConnector::new(
            self.kind,
            config,
            self.support.clone(),
            self.blocking.clone(),
        )?))
    }
}
