//! Backend connector kinds

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ErpError;

/// The backend families a pool can be created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    /// SAP, RFC or OData depending on the resolved mode
    Sap,
    /// SAP pinned to OData/REST
    SapRest,
    Oracle,
    #[serde(rename = "sqlserver", alias = "mssql")]
    SqlServer,
    /// DIA ERP (session-token JSON API)
    Dia,
}

impl ConnectorKind {
    pub const ALL: [ConnectorKind; 5] = [
        ConnectorKind::Sap,
        ConnectorKind::SapRest,
        ConnectorKind::Oracle,
        ConnectorKind::SqlServer,
        ConnectorKind::Dia,
    ];

    /// Canonical name, also the pool name that resolves to this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorKind::Sap => "sap",
            ConnectorKind::SapRest => "sap_rest",
            ConnectorKind::Oracle => "oracle",
            ConnectorKind::SqlServer => "sqlserver",
            ConnectorKind::Dia => "dia",
        }
    }

    /// Resolve a kind from a pool name using the fixed name table.
    ///
    /// Returns `None` for names that do not identify a backend family, in
    /// which case the caller must pass the kind explicitly.
    pub fn from_pool_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sap" => Some(ConnectorKind::Sap),
            "sap_rest" | "sap-rest" => Some(ConnectorKind::SapRest),
            "oracle" => Some(ConnectorKind::Oracle),
            "sqlserver" | "mssql" => Some(ConnectorKind::SqlServer),
            "dia" => Some(ConnectorKind::Dia),
            _ => None,
        }
    }

    /// Whether the adapter for this kind issues blocking driver calls
    pub fn uses_blocking_driver(&self) -> bool {
        matches!(self, ConnectorKind::Oracle | ConnectorKind::SqlServer)
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectorKind {
    type Err = ErpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_pool_name(s).ok_or_else(|| ErpError::UnknownConnector(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::sap("sap", ConnectorKind::Sap)]
    #[case::sap_rest("sap_rest", ConnectorKind::SapRest)]
    #[case::sap_rest_dash("sap-rest", ConnectorKind::SapRest)]
    #[case::oracle("Oracle", ConnectorKind::Oracle)]
    #[case::sqlserver("sqlserver", ConnectorKind::SqlServer)]
    #[case::mssql("mssql", ConnectorKind::SqlServer)]
    #[case::dia(" dia ", ConnectorKind::Dia)]
    fn test_pool_name_table(#[case] name: &str, #[case] expected: ConnectorKind) {
        assert_eq!(ConnectorKind::from_pool_name(name), Some(expected));
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(ConnectorKind::from_pool_name("salesforce"), None);
        let err = "salesforce".parse::<ConnectorKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown connector type: salesforce");
    }

    #[test]
    fn test_display_round_trips_through_name_table() {
        for kind in ConnectorKind::ALL {
            assert_eq!(ConnectorKind::from_pool_name(&kind.to_string()), Some(kind));
        }
    }

    #[test]
    fn test_serde_names() {
        let kind: ConnectorKind = serde_json::from_str("\"mssql\"").expect("alias");
        assert_eq!(kind, ConnectorKind::SqlServer);
        let json = serde_json::to_string(&ConnectorKind::SapRest).expect("serialize");
        assert_eq!(json, "\"sap_rest\"");
    }
}
