//! Per-database SQL differences

use std::fmt;

use erpgate_core::ConnectorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    Oracle,
    SqlServer,
}

impl SqlDialect {
    pub fn kind(&self) -> ConnectorKind {
        match self {
            SqlDialect::Oracle => ConnectorKind::Oracle,
            SqlDialect::SqlServer => ConnectorKind::SqlServer,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            SqlDialect::Oracle => 1521,
            SqlDialect::SqlServer => 1433,
        }
    }

    /// Column listing for a table, one positional parameter
    pub fn columns_sql(&self) -> &'static str {
        match self {
            SqlDialect::Oracle => {
                "SELECT column_name, data_type, data_length, nullable, data_default \
                 FROM user_tab_columns WHERE table_name = :1 ORDER BY column_id"
            }
            SqlDialect::SqlServer => {
                "SELECT COLUMN_NAME, DATA_TYPE, CHARACTER_MAXIMUM_LENGTH, IS_NULLABLE, COLUMN_DEFAULT \
                 FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = @P1 ORDER BY ORDINAL_POSITION"
            }
        }
    }

    /// Table comment lookup returning a `DESCRIPTION` column
    pub fn description_sql(&self) -> &'static str {
        match self {
            SqlDialect::Oracle => {
                "SELECT comments AS description FROM user_tab_comments WHERE table_name = :1"
            }
            SqlDialect::SqlServer => {
                "SELECT CAST(ep.value AS NVARCHAR(4000)) AS DESCRIPTION \
                 FROM sys.extended_properties ep \
                 WHERE ep.major_id = OBJECT_ID(@P1) AND ep.minor_id = 0 AND ep.name = 'MS_Description'"
            }
        }
    }

    /// Oracle stores unquoted identifiers upper-cased
    pub fn normalize_table_name(&self, table: &str) -> String {
        match self {
            SqlDialect::Oracle => table.to_ascii_uppercase(),
            SqlDialect::SqlServer => table.to_string(),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_defaults() {
        assert_eq!(SqlDialect::Oracle.default_port(), 1521);
        assert_eq!(SqlDialect::SqlServer.default_port(), 1433);
        assert_eq!(SqlDialect::SqlServer.kind(), ConnectorKind::SqlServer);
    }

    #[test]
    fn test_placeholders_match_driver() {
        assert!(SqlDialect::Oracle.columns_sql().contains(":1"));
        assert!(SqlDialect::SqlServer.columns_sql().contains("@P1"));
        assert!(SqlDialect::Oracle.description_sql().contains("user_tab_comments"));
    }

    #[test]
    fn test_table_name_normalization() {
        assert_eq!(SqlDialect::Oracle.normalize_table_name("orders"), "ORDERS");
        assert_eq!(SqlDialect::SqlServer.normalize_table_name("Orders"), "Orders");
    }
}
