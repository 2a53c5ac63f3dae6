//! erpgate gateway process
//!
//! Wires settings, logging and the pool manager together. The `erpgate`
//! binary is a thin shell over `cli::run`.

pub mod bootstrap;
pub mod cli;
pub mod logging;
pub mod settings;

pub use bootstrap::Gateway;
pub use settings::GatewaySettings;
