//! SAP connector
//!
//! One connector type covers both SAP transports. The transport is resolved
//! once per connector from explicit configuration, the `SAP_CONNECTION_MODE`
//! override captured at startup, and the process capability:
//!
//! - **RFC**: function modules and BAPIs through a registered `RfcBinding`,
//!   with every blocking call on the shared worker pool
//! - **REST**: SAP Gateway OData v2 services over `reqwest`

mod capability;
mod connector;
mod operation;
mod rest;
mod rfc;
mod table;


pub use capability::*;
pub use connector::*;
pub use operation::SapOperation;
pub use rest::{DEFAULT_ODATA_SERVICE, base_url};
pub use rfc::{RfcBinding, RfcConnectParams, RfcSession};
pub use table::*;
