//! SAP transport capability and mode resolution

use std::fmt;
use std::sync::Arc;

use erpgate_core::{ConnectionConfig, ConnectorKind, ErpError, Result};

use super::RfcBinding;

/// Process-level override for the SAP transport, read once at startup
pub const SAP_CONNECTION_MODE_ENV: &str = "SAP_CONNECTION_MODE";

/// Which SAP transports this process can use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SapCapability {
    /// A native RFC binding is registered and its probe succeeded
    NativeBinding,
    /// No usable RFC binding, OData/REST is available
    RestFallback,
    /// Neither transport is usable
    Unavailable,
}

/// Transport a SAP connector uses for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SapMode {
    Rfc,
    Rest,
}

impl SapMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SapMode::Rfc => "rfc",
            SapMode::Rest => "rest",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rfc" => Some(SapMode::Rfc),
            "rest" | "odata" => Some(SapMode::Rest),
            _ => None,
        }
    }
}

impl fmt::Display for SapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SAP support resolved once at bootstrap and shared by every SAP connector
#[derive(Clone)]
pub struct SapSupport {
    capability: SapCapability,
    binding: Option<Arc<dyn RfcBinding>>,
    rest_enabled: bool,
    env_mode: Option<SapMode>,
}

impl SapSupport {
    /// Probe the binding and capture `SAP_CONNECTION_MODE`
    pub fn detect(binding: Option<Arc<dyn RfcBinding>>, rest_enabled: bool) -> Self {
        let env_mode = std::env::var(SAP_CONNECTION_MODE_ENV)
            .ok()
            .and_then(|value| {
                let mode = SapMode::parse(&value);
                if mode.is_none() && !value.trim().is_empty() {
                    tracing::warn!(value = %value, "ignoring unrecognised {}", SAP_CONNECTION_MODE_ENV);
                }
                mode
            });
        Self::from_parts(binding, rest_enabled, env_mode)
    }

    /// Build from explicit inputs, without touching the environment
    pub fn from_parts(
        binding: Option<Arc<dyn RfcBinding>>,
        rest_enabled: bool,
        env_mode: Option<SapMode>,
    ) -> Self {
        let binding = binding.filter(|binding| match binding.probe() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "native RFC binding failed its probe");
                false
            }
        });

        let capability = match (&binding, rest_enabled) {
            (Some(_), _) => SapCapability::NativeBinding,
            (None, true) => SapCapability::RestFallback,
            (None, false) => SapCapability::Unavailable,
        };

        tracing::info!(?capability, env_mode = ?env_mode, "SAP support resolved");

        Self {
            capability,
            binding,
            rest_enabled,
            env_mode,
        }
    }

    /// REST only, the usual setup when no RFC SDK is installed
    pub fn rest_only() -> Self {
        Self::from_parts(None, true, None)
    }

    pub fn capability(&self) -> SapCapability {
        self.capability
    }

    pub fn binding(&self) -> Option<&Arc<dyn RfcBinding>> {
        self.binding.as_ref()
    }

    pub fn env_mode(&self) -> Option<SapMode> {
        self.env_mode
    }

    /// Pick the transport for a new connector.
    ///
    /// Explicit `connection_mode` wins over the environment override, which
    /// wins over the detected capability. Asking for RFC without a binding
    /// falls back to REST.
    pub fn resolve_mode(&self, kind: ConnectorKind, config: &ConnectionConfig) -> Result<SapMode> {
        if self.capability == SapCapability::Unavailable {
            return Err(ErpError::Configuration(
                "no SAP transport available: native RFC binding missing and REST disabled"
                    .to_string(),
            ));
        }

        if kind == ConnectorKind::SapRest {
            return self.require_rest();
        }

        let requested = match config.param_str(&["connection_mode"]) {
            Some(value) => Some(SapMode::parse(&value).ok_or_else(|| {
                ErpError::Configuration(format!(
                    "invalid connection_mode '{}', expected 'rfc' or 'rest'",
                    value
                ))
            })?),
            None => self.env_mode,
        };

        match requested {
            Some(SapMode::Rfc) if self.binding.is_none() => {
                tracing::warn!("RFC mode requested but no native binding is available, falling back to REST");
                self.require_rest()
            }
            Some(SapMode::Rfc) => Ok(SapMode::Rfc),
            Some(SapMode::Rest) => self.require_rest(),
            None if self.capability == SapCapability::NativeBinding => Ok(SapMode::Rfc),
            None => self.require_rest(),
        }
    }

    fn require_rest(&self) -> Result<SapMode> {
        if self.rest_enabled {
            Ok(SapMode::Rest)
        } else {
            Err(ErpError::Configuration(
                "SAP REST transport is disabled".to_string(),
            ))
        }
    }
}

impl fmt::Debug for SapSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SapSupport")
            .field("capability", &self.capability)
            .field("rest_enabled", &self.rest_enabled)
            .field("env_mode", &self.env_mode)
            .finish()
    }
}
