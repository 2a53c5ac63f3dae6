//! erpgate core - shared abstractions for the connector and pool layers
//!
//! This crate provides the types every other erpgate crate depends on:
//!
//! - `Connector` - the capability contract each backend adapter fulfils
//! - `ConnectionConfig` - the immutable description of one backend target
//! - `BackoffStrategy` - exponential retry delays
//! - `transaction` - scoped begin/commit/rollback around a connector
//! - `ErpError` and the `Result` alias

mod config;
mod connector;
mod error;
mod kind;
mod retry;
mod stats;
mod transaction;

pub use config::*;
pub use connector::*;
pub use error::*;
pub use kind::*;
pub use retry::*;
pub use stats::*;
pub use transaction::*;
