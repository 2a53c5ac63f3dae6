//! erpgate connectors - backend adapters for the connection pool
//!
//! Every adapter implements `erpgate_core::Connector`:
//!
//! - `sap` - SAP over native RFC or SAP Gateway OData
//! - `sql` - Oracle and SQL Server through blocking drivers
//! - `dia` - the DIA ERP session-token JSON API
//!
//! `ConnectorRegistry` maps each `ConnectorKind` to the factory the pool
//! uses to create connectors.

mod blocking;
mod http;
mod registry;

pub mod dia;
pub mod sap;
pub mod sql;

pub use blocking::{BlockingPool, DEFAULT_BLOCKING_THREADS};
pub use registry::{ConnectorEnvironment, ConnectorRegistry};
