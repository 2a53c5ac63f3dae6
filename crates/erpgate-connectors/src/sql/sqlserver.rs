//! SQL Server driver using tiberius
//!
//! tiberius is async, while `SqlSession` is a blocking surface driven from
//! the worker pool. Each session therefore owns a current-thread runtime and
//! blocks on it for every call. Worker threads are outside the main
//! executor, so `block_on` there is allowed.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use erpgate_core::{ConnectionConfig, ErpError, Params, Result};
use serde_json::{Value, json};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql, Row, ToSql};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{SqlArgs, SqlDialect, SqlDriver, SqlSession, validate_identifier};

/// SQL Server login failure
const LOGIN_FAILED: u32 = 18456;

type TdsClient = Client<Compat<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum SqlServerError {
    #[error("{0}")]
    Configuration(String),

    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tiberius(#[from] tiberius::error::Error),

    #[error("named parameters are not supported; bind @P1, @P2, ... positionally")]
    NamedParameters,

    #[error("session is closed")]
    Closed,
}

impl From<SqlServerError> for ErpError {
    fn from(err: SqlServerError) -> Self {
        use tiberius::error::Error as TdsError;

        let message = err.to_string();
        match err {
            SqlServerError::Configuration(_) => ErpError::Configuration(message),
            SqlServerError::Io(_) => ErpError::Connection(message),
            SqlServerError::Tiberius(TdsError::Server(token)) if token.code() == LOGIN_FAILED => {
                ErpError::Authentication(token.message().to_string())
            }
            SqlServerError::Tiberius(TdsError::Server(token)) => {
                ErpError::Backend(format!("{} (error {})", token.message(), token.code()))
            }
            SqlServerError::Tiberius(TdsError::Io { .. } | TdsError::Routing { .. }) => {
                ErpError::Connection(message)
            }
            SqlServerError::Tiberius(_) => ErpError::Driver(message),
            SqlServerError::NamedParameters => ErpError::InvalidArgument(message),
            SqlServerError::Closed => {
                ErpError::NotConnected("SQL Server session is closed".to_string())
            }
        }
    }
}

/// Build the tiberius configuration.
///
/// `encrypt` turns on TLS, `trust_server_certificate` skips certificate
/// validation. Without `encrypt` the session runs unencrypted.
pub fn tds_config(config: &ConnectionConfig) -> std::result::Result<Config, SqlServerError> {
    let mut tds = Config::new();
    tds.host(config.host.as_deref().unwrap_or("localhost"));
    tds.port(config.port.unwrap_or(SqlDialect::SqlServer.default_port()));
    tds.application_name("erpgate");

    if let Some(database) = &config.database {
        tds.database(database);
    }

    let username = config.username.as_deref().ok_or_else(|| {
        SqlServerError::Configuration("SQL Server connection requires 'username'".to_string())
    })?;
    tds.authentication(AuthMethod::sql_server(
        username,
        config.password.as_deref().unwrap_or_default(),
    ));

    if config.param_bool("encrypt").unwrap_or(false) {
        tds.encryption(EncryptionLevel::Required);
    } else {
        tds.encryption(EncryptionLevel::NotSupported);
    }
    if config.param_bool("trust_server_certificate").unwrap_or(false) {
        tds.trust_cert();
    }

    Ok(tds)
}

pub struct SqlServerDriver;

impl SqlDriver for SqlServerDriver {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SqlServer
    }

    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SqlSession>> {
        Ok(Box::new(TiberiusSession::connect(config)?))
    }
}

pub struct TiberiusSession {
    runtime: Option<Runtime>,
    client: Option<TdsClient>,
    in_transaction: bool,
}

impl TiberiusSession {
    pub fn connect(config: &ConnectionConfig) -> std::result::Result<Self, SqlServerError> {
        let tds = tds_config(config)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let client = runtime.block_on(async move {
            let tcp = TcpStream::connect(tds.get_addr()).await?;
            tcp.set_nodelay(true)?;
            let client = Client::connect(tds, tcp.compat_write()).await?;
            Ok::<_, SqlServerError>(client)
        })?;

        tracing::debug!("SQL Server session established");
        Ok(Self {
            runtime: Some(runtime),
            client: Some(client),
            in_transaction: false,
        })
    }

    fn parts(&mut self) -> std::result::Result<(&Runtime, &mut TdsClient), SqlServerError> {
        match (&self.runtime, &mut self.client) {
            (Some(runtime), Some(client)) => Ok((runtime, client)),
            _ => Err(SqlServerError::Closed),
        }
    }

    fn fetch(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> std::result::Result<Option<Vec<Row>>, SqlServerError> {
        let (runtime, client) = self.parts()?;
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();

        let rows = runtime.block_on(async {
            let mut stream = client.query(sql, &refs[..]).await?;
            if stream.columns().await?.is_none() {
                return Ok(None);
            }
            Ok::<_, SqlServerError>(Some(stream.into_first_result().await?))
        })?;
        Ok(rows)
    }

    fn run(&mut self, sql: &str, params: &[SqlParam]) -> std::result::Result<u64, SqlServerError> {
        let (runtime, client) = self.parts()?;
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p as &dyn ToSql).collect();

        let result = runtime.block_on(client.execute(sql, &refs[..]))?;
        Ok(result.rows_affected().iter().sum())
    }
}

impl SqlSession for TiberiusSession {
    fn query(&mut self, sql: &str, args: &SqlArgs) -> Result<Vec<Params>> {
        let params = bind_params(args)?;
        let rows = self.fetch(sql, &params)?.unwrap_or_default();
        Ok(rows.into_iter().map(row_to_params).collect())
    }

    fn execute(&mut self, sql: &str, args: &SqlArgs) -> Result<u64> {
        let params = bind_params(args)?;
        Ok(self.run(sql, &params)?)
    }

    fn call_procedure(&mut self, name: &str, args: &[Value]) -> Result<Option<Vec<Params>>> {
        let name = validate_identifier(name)?;
        let placeholders: Vec<String> = (1..=args.len()).map(|i| format!("@P{}", i)).collect();
        let sql = format!("EXEC {} {}", name, placeholders.join(", "));

        let params: Vec<SqlParam> = args.iter().map(SqlParam::from).collect();
        let rows = self.fetch(sql.trim_end(), &params)?;
        Ok(rows.map(|rows| rows.into_iter().map(row_to_params).collect()))
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.run("BEGIN TRANSACTION", &[])?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.run("COMMIT TRANSACTION", &[])?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.run("ROLLBACK TRANSACTION", &[])?;
        }
        Ok(())
    }

    fn ping(&mut self) -> Result<()> {
        self.fetch("SELECT 1", &[])?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let (Some(runtime), Some(client)) = (self.runtime.as_ref(), self.client.take()) else {
            return Ok(());
        };
        runtime
            .block_on(client.close())
            .map_err(SqlServerError::from)?;
        tracing::debug!("SQL Server session closed");
        Ok(())
    }
}

impl Drop for TiberiusSession {
    fn drop(&mut self) {
        self.client.take();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Bind value for one `@Pn` placeholder
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlParam {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
}

impl From<&Value> for SqlParam {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::I64(i),
                None => n.as_f64().map(SqlParam::F64).unwrap_or(SqlParam::Null),
            },
            Value::String(s) => SqlParam::Text(s.clone()),
            other => SqlParam::Text(other.to_string()),
        }
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            SqlParam::Null => ColumnData::I32(None),
            SqlParam::Bool(v) => ColumnData::Bit(Some(*v)),
            SqlParam::I64(v) => ColumnData::I64(Some(*v)),
            SqlParam::F64(v) => ColumnData::F64(Some(*v)),
            SqlParam::Text(v) => ColumnData::String(Some(Cow::Borrowed(v.as_str()))),
        }
    }
}

pub(crate) fn bind_params(args: &SqlArgs) -> std::result::Result<Vec<SqlParam>, SqlServerError> {
    match args {
        SqlArgs::None => Ok(Vec::new()),
        SqlArgs::Positional(values) => Ok(values.iter().map(SqlParam::from).collect()),
        SqlArgs::Named(_) => Err(SqlServerError::NamedParameters),
    }
}

fn row_to_params(row: Row) -> Params {
    let names: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    names.into_iter().zip(row.into_iter().map(column_value)).collect()
}

/// Convert one column to JSON. Decimals and temporal values become strings.
pub(crate) fn column_value(data: ColumnData<'static>) -> Value {
    match data {
        ColumnData::Bit(v) => json!(v),
        ColumnData::U8(v) => json!(v),
        ColumnData::I16(v) => json!(v),
        ColumnData::I32(v) => json!(v),
        ColumnData::I64(v) => json!(v),
        ColumnData::F32(v) => json!(v),
        ColumnData::F64(v) => json!(v),
        ColumnData::String(v) => json!(v.as_deref()),
        ColumnData::Guid(v) => json!(v.map(|g| g.to_string())),
        ColumnData::Numeric(v) => json!(v.map(|n| n.to_string())),
        ColumnData::Binary(v) => json!(v.as_deref().map(hex)),
        ColumnData::Xml(v) => json!(v.map(|x| x.into_owned().into_string())),
        other => temporal_value(&other),
    }
}

fn temporal_value(data: &ColumnData<'static>) -> Value {
    let rendered = match data {
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .ok()
            .flatten()
            .map(|d| d.to_string()),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .ok()
            .flatten()
            .map(|t| t.to_string()),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)
            .ok()
            .flatten()
            .map(|dt| dt.to_rfc3339()),
        _ => NaiveDateTime::from_sql(data)
            .ok()
            .flatten()
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
    };
    rendered.map(Value::String).unwrap_or(Value::Null)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bind_positional_params() {
        let args = SqlArgs::Positional(vec![
            json!(null),
            json!(true),
            json!(42),
            json!(1.5),
            json!("ACME"),
            json!({"a": 1}),
        ]);
        assert_eq!(
            bind_params(&args).expect("bind"),
            vec![
                SqlParam::Null,
                SqlParam::Bool(true),
                SqlParam::I64(42),
                SqlParam::F64(1.5),
                SqlParam::Text("ACME".into()),
                SqlParam::Text("{\"a\":1}".into()),
            ]
        );
    }

    #[test]
    fn test_named_params_rejected() {
        let args = SqlArgs::Named(vec![("id".into(), json!(1))]);
        let err: ErpError = bind_params(&args).unwrap_err().into();
        assert!(matches!(err, ErpError::InvalidArgument(_)));
    }

    #[test]
    fn test_column_values() {
        assert_eq!(column_value(ColumnData::I32(Some(7))), json!(7));
        assert_eq!(column_value(ColumnData::I32(None)), Value::Null);
        assert_eq!(column_value(ColumnData::Bit(Some(false))), json!(false));
        assert_eq!(
            column_value(ColumnData::String(Some(Cow::Owned("Müşteri".into())))),
            json!("Müşteri")
        );
        assert_eq!(
            column_value(ColumnData::Binary(Some(Cow::Owned(vec![0xde, 0xad])))),
            json!("dead")
        );
        assert_eq!(column_value(ColumnData::DateTime2(None)), Value::Null);
    }

    #[test]
    fn test_config_requires_username() {
        let config = ConnectionConfig::new().with_host("mssql.internal");
        let err: ErpError = tds_config(&config).unwrap_err().into();
        assert!(matches!(err, ErpError::Configuration(_)));
    }

    #[test]
    fn test_config_address() {
        let config = ConnectionConfig::new()
            .with_host("mssql.internal")
            .with_credentials("sa", "pw")
            .with_database("ERP")
            .with_param("trust_server_certificate", true);
        let tds = tds_config(&config).expect("config");
        assert_eq!(tds.get_addr(), "mssql.internal:1433");
    }

    #[test]
    fn test_io_errors_map_to_connection() {
        let err: ErpError =
            SqlServerError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"))
                .into();
        assert!(matches!(err, ErpError::Connection(_)));
    }
}
