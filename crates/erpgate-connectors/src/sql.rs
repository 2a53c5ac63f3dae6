//! Relational backends
//!
//! Oracle and SQL Server share one connector. The driver opens a blocking
//! `SqlSession`; `SqlConnector` moves every session call onto the worker
//! pool and shapes results by statement kind.

mod connector;
mod dialect;
#[cfg(feature = "oracle")]
mod oracle;
mod session;
mod sqlserver;
mod statement;


pub use connector::*;
pub use dialect::SqlDialect;
#[cfg(feature = "oracle")]
pub use oracle::{OracleDriver, OracleError};
pub use session::{SqlDriver, SqlSession};
pub use sqlserver::{SqlServerDriver, SqlServerError, TiberiusSession};
pub use statement::*;
