//! DIA ERP connector
//!
//! DIA exposes JSON web services behind a login call. The session id it
//! returns is passed explicitly in every request body; the connector only
//! tracks when that session expires and logs in again once it has.

mod connector;
mod operation;
mod settings;

#[cfg(test)]
mod tests;

pub use connector::{DiaConnector, DiaConnectorFactory};
pub use operation::{DiaOperation, ScfAction, ScfEntity};
pub use settings::{DEFAULT_DONEM_KODU, DEFAULT_SESSION_TIMEOUT, DiaSettings};
