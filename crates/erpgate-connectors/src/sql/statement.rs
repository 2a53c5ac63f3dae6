//! Statement classification and bind arguments

use erpgate_core::{ErpError, Result};
use serde_json::Value;

/// How a statement's outcome is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT / WITH: rows come back
    Query,
    /// INSERT / UPDATE / DELETE: affected row count, committed outside a
    /// transaction scope
    Modification,
    /// DDL and everything else
    Other,
}

impl StatementKind {
    /// Classify by the first keyword, ignoring case and leading whitespace
    pub fn classify(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" => StatementKind::Query,
            "INSERT" | "UPDATE" | "DELETE" => StatementKind::Modification,
            _ => StatementKind::Other,
        }
    }
}

/// Check a procedure name before it is spliced into a call statement.
///
/// Accepts dotted, optionally bracketed or quoted identifiers such as
/// `dbo.[Post Order]` or `PKG."PROC"`.
pub fn validate_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.chars().all(|c| {
            c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '#' | '[' | ']' | '"' | ' ')
        })
        && !name.starts_with(' ');
    if valid {
        Ok(name)
    } else {
        Err(ErpError::InvalidArgument(format!(
            "invalid procedure name '{}'",
            name
        )))
    }
}

/// Bind arguments for one statement execution
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SqlArgs {
    #[default]
    None,
    /// `:1`, `@P1`, ... in order
    Positional(Vec<Value>),
    /// `:name` placeholders
    Named(Vec<(String, Value)>),
}

impl SqlArgs {
    /// Arrays bind positionally, objects by name, null binds nothing
    pub fn from_value(value: Option<&Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(SqlArgs::None),
            Some(Value::Array(items)) if items.is_empty() => Ok(SqlArgs::None),
            Some(Value::Array(items)) => Ok(SqlArgs::Positional(items.clone())),
            Some(Value::Object(map)) if map.is_empty() => Ok(SqlArgs::None),
            Some(Value::Object(map)) => Ok(SqlArgs::Named(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            Some(other) => Err(ErpError::InvalidArgument(format!(
                "statement parameters must be an array or object, got {}",
                other
            ))),
        }
    }

    /// Parse the `rows` argument of a batch execution
    pub fn batch(rows: &[Value]) -> Result<Vec<Self>> {
        rows.iter().map(|row| Self::from_value(Some(row))).collect()
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SqlArgs::None => true,
            SqlArgs::Positional(values) => values.is_empty(),
            SqlArgs::Named(values) => values.is_empty(),
        }
    }
}
