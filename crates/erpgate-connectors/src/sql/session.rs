//! Blocking session surface implemented by each SQL driver

use erpgate_core::{ConnectionConfig, Params, Result};
use serde_json::Value;

use super::{SqlArgs, SqlDialect};

/// One open database session.
///
/// Every method blocks; `SqlConnector` only calls them from the blocking
/// worker pool.
pub trait SqlSession: Send {
    /// Run a statement that returns rows
    fn query(&mut self, sql: &str, args: &SqlArgs) -> Result<Vec<Params>>;

    /// Run a statement and return the affected row count
    fn execute(&mut self, sql: &str, args: &SqlArgs) -> Result<u64>;

    /// Run one statement once per argument row
    fn execute_many(&mut self, sql: &str, rows: &[SqlArgs]) -> Result<u64> {
        let mut affected = 0;
        for args in rows {
            affected += self.execute(sql, args)?;
        }
        Ok(affected)
    }

    /// Call a stored procedure. `None` when it produced no result set.
    fn call_procedure(&mut self, name: &str, args: &[Value]) -> Result<Option<Vec<Params>>>;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn ping(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Opens sessions for one database dialect
pub trait SqlDriver: Send + Sync {
    fn dialect(&self) -> SqlDialect;

    /// Open a session. Blocks until the server accepted the login.
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn SqlSession>>;
}
