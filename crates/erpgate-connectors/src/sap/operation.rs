//! SAP operation identifiers

use std::fmt;
use std::str::FromStr;

use erpgate_core::{ErpError, Result};

use super::SapMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SapOperation {
    ReadTable,
    CallBapi,
    TableMetadata,
    CallRfc,
    ReadEntity,
    ReadCollection,
    CreateEntity,
    UpdateEntity,
    DeleteEntity,
    CallFunction,
    ServiceMetadata,
    ListServices,
}

impl SapOperation {
    pub const ALL: [SapOperation; 12] = [
        SapOperation::ReadTable,
        SapOperation::CallBapi,
        SapOperation::TableMetadata,
        SapOperation::CallRfc,
        SapOperation::ReadEntity,
        SapOperation::ReadCollection,
        SapOperation::CreateEntity,
        SapOperation::UpdateEntity,
        SapOperation::DeleteEntity,
        SapOperation::CallFunction,
        SapOperation::ServiceMetadata,
        SapOperation::ListServices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SapOperation::ReadTable => "read_table",
            SapOperation::CallBapi => "call_bapi",
            SapOperation::TableMetadata => "table_metadata",
            SapOperation::CallRfc => "call_rfc",
            SapOperation::ReadEntity => "read_entity",
            SapOperation::ReadCollection => "read_collection",
            SapOperation::CreateEntity => "create_entity",
            SapOperation::UpdateEntity => "update_entity",
            SapOperation::DeleteEntity => "delete_entity",
            SapOperation::CallFunction => "call_function",
            SapOperation::ServiceMetadata => "service_metadata",
            SapOperation::ListServices => "list_services",
        }
    }

    /// Whether the operation can run over the given transport
    pub fn supports(&self, mode: SapMode) -> bool {
        match self {
            SapOperation::CallBapi => true,
            SapOperation::ReadTable | SapOperation::TableMetadata | SapOperation::CallRfc => {
                mode == SapMode::Rfc
            }
            _ => mode == SapMode::Rest,
        }
    }

    /// Parse and check against the connector's transport
    pub fn for_mode(operation: &str, mode: SapMode) -> Result<Self> {
        let op: SapOperation = operation.parse()?;
        if op.supports(mode) {
            Ok(op)
        } else {
            Err(ErpError::NotSupported(format!(
                "SAP operation '{}' is not available in {} mode",
                op, mode
            )))
        }
    }
}

impl fmt::Display for SapOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SapOperation {
    type Err = ErpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| ErpError::UnknownOperation(format!("SAP operation '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for op in SapOperation::ALL {
            assert_eq!(op.as_str().parse::<SapOperation>().expect("parse"), op);
        }
    }

    #[test]
    fn test_unknown_operation() {
        let err = "read_tabel".parse::<SapOperation>().unwrap_err();
        assert!(matches!(err, ErpError::UnknownOperation(_)));
    }

    #[test]
    fn test_mode_gating() {
        assert!(SapOperation::for_mode("read_table", SapMode::Rfc).is_ok());
        assert!(matches!(
            SapOperation::for_mode("read_table", SapMode::Rest),
            Err(ErpError::NotSupported(_))
        ));
        assert!(SapOperation::for_mode("call_bapi", SapMode::Rest).is_ok());
        assert!(matches!(
            SapOperation::for_mode("read_collection", SapMode::Rfc),
            Err(ErpError::NotSupported(_))
        ));
    }
}
