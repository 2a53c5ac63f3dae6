//! Connector for relational backends

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use erpgate_core::{
    ConnectionConfig, Connector, ConnectorFactory, ConnectorKind, ConnectorStats, ErpError,
    Params, ParamsExt, Result,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::{SqlArgs, SqlDialect, SqlDriver, SqlSession, StatementKind};
use crate::BlockingPool;

type SharedSession = Arc<Mutex<Box<dyn SqlSession>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlOperation {
    /// `sql`, optional `params`
    Query,
    /// `sql`, `rows`
    ExecuteMany,
    /// `name`, optional `args`
    CallProcedure,
    /// `table_name`
    TableMetadata,
}

impl SqlOperation {
    pub const ALL: [SqlOperation; 4] = [
        SqlOperation::Query,
        SqlOperation::ExecuteMany,
        SqlOperation::CallProcedure,
        SqlOperation::TableMetadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SqlOperation::Query => "query",
            SqlOperation::ExecuteMany => "execute_many",
            SqlOperation::CallProcedure => "call_procedure",
            SqlOperation::TableMetadata => "table_metadata",
        }
    }
}

impl fmt::Display for SqlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SqlOperation {
    type Err = ErpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ErpError::UnknownOperation(format!("SQL operation '{}'", s)))
    }
}

/// Oracle or SQL Server connector. Each driver call runs on the blocking pool.
pub struct SqlConnector {
    driver: Arc<dyn SqlDriver>,
    config: Arc<ConnectionConfig>,
    blocking: Arc<BlockingPool>,
    session: Option<SharedSession>,
    in_transaction: bool,
    stats: ConnectorStats,
}

impl SqlConnector {
    pub fn new(
        driver: Arc<dyn SqlDriver>,
        config: Arc<ConnectionConfig>,
        blocking: Arc<BlockingPool>,
    ) -> Self {
        Self {
            driver,
            config,
            blocking,
            session: None,
            in_transaction: false,
            stats: ConnectorStats::new(),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.driver.dialect()
    }

    async fn with_session<T, F>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut dyn SqlSession) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let session = self.session.clone().ok_or_else(|| {
            ErpError::NotConnected(format!("not connected to {}", self.dialect()))
        })?;
        self.blocking
            .run(self.config.timeout, move || {
                let mut guard = session.lock();
                task(guard.as_mut())
            })
            .await
    }

    /// Run one statement, shaping the result by its kind
    pub async fn query(&self, sql: &str, args: SqlArgs) -> Result<Value> {
        let started = Instant::now();
        let kind = StatementKind::classify(sql);
        let autocommit = !self.in_transaction;
        let statement = sql.to_string();

        let result = match kind {
            StatementKind::Query => {
                let rows = self
                    .with_session(move |s| s.query(&statement, &args))
                    .await?;
                Value::Array(rows.into_iter().map(Value::Object).collect())
            }
            StatementKind::Modification => {
                let affected = self
                    .with_session(move |s| {
                        let affected = s.execute(&statement, &args)?;
                        if autocommit {
                            s.commit()?;
                        }
                        Ok(affected)
                    })
                    .await?;
                json!({ "rows_affected": affected })
            }
            StatementKind::Other => {
                self.with_session(move |s| s.execute(&statement, &args))
                    .await?;
                json!({ "status": "success" })
            }
        };

        tracing::debug!(
            dialect = %self.dialect(),
            statement = truncate_sql(sql),
            ?kind,
            duration_ms = started.elapsed().as_millis() as u64,
            "statement executed"
        );
        Ok(result)
    }

    /// Run one statement for every argument row, then commit
    pub async fn execute_many(&self, sql: &str, rows: Vec<SqlArgs>) -> Result<Value> {
        let batch_size = rows.len();
        let autocommit = !self.in_transaction;
        let statement = sql.to_string();

        let affected = self
            .with_session(move |s| {
                let affected = s.execute_many(&statement, &rows)?;
                if autocommit {
                    s.commit()?;
                }
                Ok(affected)
            })
            .await?;

        tracing::info!(dialect = %self.dialect(), affected, batch_size, "batch executed");
        Ok(json!({ "rows_affected": affected, "batch_size": batch_size }))
    }

    pub async fn call_procedure(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let autocommit = !self.in_transaction;
        let procedure = name.to_string();

        let rows = self
            .with_session(move |s| {
                let rows = s.call_procedure(&procedure, &args)?;
                if autocommit {
                    s.commit()?;
                }
                Ok(rows)
            })
            .await?;

        tracing::info!(dialect = %self.dialect(), procedure = name, "procedure called");
        Ok(match rows {
            Some(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
            None => json!({ "status": "success" }),
        })
    }

    /// Columns and comment of a table from the dialect's catalog views
    pub async fn table_metadata(&self, table: &str) -> Result<Value> {
        let dialect = self.dialect();
        let name = dialect.normalize_table_name(table);

        let lookup = name.clone();
        let (columns, descriptions) = self
            .with_session(move |s| {
                let args = SqlArgs::Positional(vec![json!(lookup)]);
                let columns = s.query(dialect.columns_sql(), &args)?;
                let descriptions = s.query(dialect.description_sql(), &args)?;
                Ok((columns, descriptions))
            })
            .await?;

        let description = descriptions
            .first()
            .and_then(|row| row.get("DESCRIPTION"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(json!({
            "table_name": table,
            "description": description,
            "columns": columns,
        }))
    }

    async fn dispatch(&self, op: SqlOperation, args: &Params) -> Result<Value> {
        match op {
            SqlOperation::Query => {
                let sql = args.require_str("sql")?;
                self.query(sql, SqlArgs::from_value(args.get("params"))?)
                    .await
            }
            SqlOperation::ExecuteMany => {
                let sql = args.require_str("sql")?;
                let rows = args
                    .opt_array("rows")
                    .ok_or_else(|| ErpError::InvalidArgument("'rows' array is required".into()))?;
                self.execute_many(sql, SqlArgs::batch(rows)?).await
            }
            SqlOperation::CallProcedure => {
                let name = args.require_str("name")?;
                let call_args = args.opt_array("args").cloned().unwrap_or_default();
                self.call_procedure(name, call_args).await
            }
            SqlOperation::TableMetadata => {
                let table = args
                    .opt_str("table_name")
                    .or_else(|| args.opt_str("table"))
                    .ok_or_else(|| ErpError::InvalidArgument("'table_name' is required".into()))?;
                self.table_metadata(table).await
            }
        }
    }
}

#[async_trait]
impl Connector for SqlConnector {
    fn kind(&self) -> ConnectorKind {
        self.dialect().kind()
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn stats(&self) -> &ConnectorStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut ConnectorStats {
        &mut self.stats
    }

    #[tracing::instrument(skip(self), fields(dialect = %self.dialect(), host = ?self.config.host, database = ?self.config.database))]
    async fn connect(&mut self) -> Result<bool> {
        if self.session.is_some() {
            return Ok(false);
        }

        let started = Instant::now();
        let driver = self.driver.clone();
        let config = self.config.clone();
        let session = self
            .blocking
            .run(self.config.timeout, move || driver.open(&config))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to connect"))?;

        self.session = Some(Arc::new(Mutex::new(session)));
        self.in_transaction = false;
        self.stats.record_connect(started.elapsed());

        tracing::info!(
            duration_ms = started.elapsed().as_millis() as u64,
            "connected"
        );
        Ok(true)
    }

    async fn disconnect(&mut self) -> Result<bool> {
        let Some(session) = self.session.take() else {
            return Ok(false);
        };
        self.in_transaction = false;

        self.blocking
            .run(self.config.timeout, move || session.lock().close())
            .await?;
        tracing::info!(dialect = %self.dialect(), "disconnected");
        Ok(true)
    }

    async fn execute(&mut self, operation: &str, params: &Params) -> Result<Value> {
        let op: SqlOperation = operation.parse()?;
        self.dispatch(op, params).await
    }

    async fn ping(&mut self) -> Result<bool> {
        if self.session.is_none() {
            return Ok(false);
        }
        match self.with_session(|s| s.ping()).await {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::debug!(dialect = %self.dialect(), error = %e, "ping failed");
                Ok(false)
            }
        }
    }

    fn check_operation(&self, operation: &str) -> Result<()> {
        operation.parse::<SqlOperation>().map(|_| ())
    }

    async fn begin(&mut self) -> Result<()> {
        self.with_session(|s| s.begin()).await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let result = self.with_session(|s| s.commit()).await;
        self.in_transaction = false;
        result
    }

    async fn rollback(&mut self) -> Result<()> {
        let result = self.with_session(|s| s.rollback()).await;
        self.in_transaction = false;
        result
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

fn truncate_sql(sql: &str) -> &str {
    const LIMIT: usize = 100;
    match sql.char_indices().nth(LIMIT) {
        Some((idx, _)) => &sql[..idx],
        None => sql,
    }
}

pub struct SqlConnectorFactory {
    driver: Arc<dyn SqlDriver>,
    blocking: Arc<BlockingPool>,
}

impl SqlConnectorFactory {
    pub fn new(driver: Arc<dyn SqlDriver>, blocking: Arc<BlockingPool>) -> Self {
        Self { driver, blocking }
    }
}

impl ConnectorFactory for SqlConnectorFactory {
    fn kind(&self) -> ConnectorKind {
        self.driver.dialect().kind()
    }

    fn create(&self, config: Arc<ConnectionConfig>) -> Result<Box<dyn Connector>> {
        Ok(Box::new(SqlConnector::new(
            self.driver.clone(),
            config,
            self.blocking.clone(),
        )))
    }
}
