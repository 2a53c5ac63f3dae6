//! Oracle driver using the `oracle` crate (ODPI-C)

use erpgate_core::{ConnectionConfig, ErpError, Params, Result};
use oracle::sql_type::{OracleType, ToSql};
use oracle::{Connection, ResultSet, Row};
use serde_json::{Value, json};

use super::{SqlArgs, SqlDialect, SqlDriver, SqlSession, validate_identifier};

/// Server codes that mean the session or listener is gone
const CONNECTION_CODES: &[&str] = &[
    "ORA-03113", "ORA-03114", "ORA-03135", "ORA-12170", "ORA-12514", "ORA-12541", "DPI-1010",
    "DPI-1080",
];
const LOGIN_CODES: &[&str] = &["ORA-01017", "ORA-28000", "ORA-28001"];

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Driver(#[from] oracle::Error),
}

impl From<OracleError> for ErpError {
    fn from(err: OracleError) -> Self {
        let message = err.to_string();
        match err {
            OracleError::Configuration(_) => ErpError::Configuration(message),
            OracleError::Driver(_) => classify(message),
        }
    }
}

fn classify(message: String) -> ErpError {
    if LOGIN_CODES.iter().any(|code| message.contains(code)) {
        ErpError::Authentication(message)
    } else if CONNECTION_CODES.iter().any(|code| message.contains(code)) {
        ErpError::Connection(message)
    } else if message.contains("ORA-") {
        ErpError::Backend(message)
    } else {
        ErpError::Driver(message)
    }
}

/// Easy Connect string `host:port/service`
pub fn connect_string(config: &ConnectionConfig) -> std::result::Result<String, OracleError> {
    let host = config
        .host
        .as_deref()
        .ok_or_else(|| OracleError::Configuration("Oracle connection requires 'host'".into()))?;
    let port = config.port.unwrap_or(SqlDialect::Oracle.default_port());
    let service = config.database.as_deref().ok_or_else(|| {
        OracleError::Configuration("Oracle connection requires 'service_name'".into())
    })?;
    Ok(format!("{}:{}/{}", host, port, service))
}

pub struct OracleDriver;

impl SqlDriver for OracleDriver {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Oracle
    }

    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SqlSession>> {
        let dsn = connect_string(config)?;
        let username = config.username.as_deref().unwrap_or_default();
        let password = config.password.as_deref().unwrap_or_default();

        let conn = Connection::connect(username, password, &dsn).map_err(OracleError::from)?;
        tracing::debug!(dsn = %dsn, "Oracle session established");
        Ok(Box::new(OracleSession { conn: Some(conn) }))
    }
}

pub struct OracleSession {
    conn: Option<Connection>,
}

impl OracleSession {
    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| ErpError::NotConnected("Oracle session is closed".to_string()))
    }
}

impl SqlSession for OracleSession {
    fn query(&mut self, sql: &str, args: &SqlArgs) -> Result<Vec<Params>> {
        let conn = self.conn()?;
        let rows = match args {
            SqlArgs::None => conn.query(sql, &[]),
            SqlArgs::Positional(values) => {
                let binds = bind_values(values);
                let refs: Vec<&dyn ToSql> = binds.iter().map(|b| b.as_ref()).collect();
                conn.query(sql, &refs)
            }
            SqlArgs::Named(pairs) => {
                let binds: Vec<(&str, Box<dyn ToSql>)> = pairs
                    .iter()
                    .map(|(name, value)| (name.as_str(), bind_value(value)))
                    .collect();
                let refs: Vec<(&str, &dyn ToSql)> =
                    binds.iter().map(|(n, b)| (*n, b.as_ref())).collect();
                conn.query_named(sql, &refs)
            }
        }
        .map_err(OracleError::from)?;

        Ok(collect_rows(rows)?)
    }

    fn execute(&mut self, sql: &str, args: &SqlArgs) -> Result<u64> {
        let conn = self.conn()?;
        let statement = match args {
            SqlArgs::None => conn.execute(sql, &[]),
            SqlArgs::Positional(values) => {
                let binds = bind_values(values);
                let refs: Vec<&dyn ToSql> = binds.iter().map(|b| b.as_ref()).collect();
                conn.execute(sql, &refs)
            }
            SqlArgs::Named(pairs) => {
                let binds: Vec<(&str, Box<dyn ToSql>)> = pairs
                    .iter()
                    .map(|(name, value)| (name.as_str(), bind_value(value)))
                    .collect();
                let refs: Vec<(&str, &dyn ToSql)> =
                    binds.iter().map(|(n, b)| (*n, b.as_ref())).collect();
                conn.execute_named(sql, &refs)
            }
        }
        .map_err(OracleError::from)?;

        Ok(statement.row_count().map_err(OracleError::from)?)
    }

    fn call_procedure(&mut self, name: &str, args: &[Value]) -> Result<Option<Vec<Params>>> {
        let name = validate_identifier(name)?;
        let placeholders: Vec<String> = (1..=args.len()).map(|i| format!(":{}", i)).collect();
        let block = format!("BEGIN {}({}); END;", name, placeholders.join(", "));

        let binds = bind_values(args);
        let refs: Vec<&dyn ToSql> = binds.iter().map(|b| b.as_ref()).collect();
        self.conn()?
            .execute(&block, &refs)
            .map_err(OracleError::from)?;
        Ok(None)
    }

    /// Oracle opens transactions implicitly
    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(self.conn()?.commit().map_err(OracleError::from)?)
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(self.conn()?.rollback().map_err(OracleError::from)?)
    }

    fn ping(&mut self) -> Result<()> {
        Ok(self.conn()?.ping().map_err(OracleError::from)?)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(OracleError::from)?;
            tracing::debug!("Oracle session closed");
        }
        Ok(())
    }
}

fn bind_values(values: &[Value]) -> Vec<Box<dyn ToSql>> {
    values.iter().map(bind_value).collect()
}

/// Booleans bind as 0/1 since NUMBER(1) is the usual flag column
fn bind_value(value: &Value) -> Box<dyn ToSql> {
    match value {
        Value::Null => Box::new(None::<String>),
        Value::Bool(b) => Box::new(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Box::new(i),
            None => Box::new(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Box::new(s.clone()),
        other => Box::new(other.to_string()),
    }
}

fn collect_rows(rows: ResultSet<'_, Row>) -> std::result::Result<Vec<Params>, OracleError> {
    let columns: Vec<(String, OracleType)> = rows
        .column_info()
        .iter()
        .map(|c| (c.name().to_string(), c.oracle_type().clone()))
        .collect();

    let mut records = Vec::new();
    for row in rows {
        let row = row?;
        let mut record = Params::new();
        for (idx, (name, oracle_type)) in columns.iter().enumerate() {
            record.insert(name.clone(), column_value(&row, idx, oracle_type)?);
        }
        records.push(record);
    }
    Ok(records)
}

fn column_value(row: &Row, idx: usize, oracle_type: &OracleType) -> oracle::Result<Value> {
    Ok(match oracle_type {
        OracleType::Int64 => json!(row.get::<_, Option<i64>>(idx)?),
        OracleType::Number(precision, 0) if *precision > 0 && *precision <= 18 => {
            json!(row.get::<_, Option<i64>>(idx)?)
        }
        OracleType::Number(_, _)
        | OracleType::Float(_)
        | OracleType::BinaryFloat
        | OracleType::BinaryDouble => json!(row.get::<_, Option<f64>>(idx)?),
        OracleType::Boolean => json!(row.get::<_, Option<bool>>(idx)?),
        _ => json!(row.get::<_, Option<String>>(idx)?),
    })
}
