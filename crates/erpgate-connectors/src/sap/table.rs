//! RFC_READ_TABLE encoding and BAPI RETURN inspection

use erpgate_core::{ErpError, Params, ParamsExt, Result};
use serde_json::{Value, json};

pub const RFC_READ_TABLE: &str = "RFC_READ_TABLE";
pub const DDIF_TABL_GET: &str = "DDIF_TABL_GET";

/// Longest OPTIONS line RFC_READ_TABLE accepts
pub const OPTION_CHUNK_LEN: usize = 72;

/// Separator between fields in each returned `WA` line
pub const FIELD_DELIMITER: &str = "|";

/// Split a WHERE clause into successive lines of at most 72 characters.
///
/// The split is positional, so concatenating the chunks gives back the
/// original clause. Chunks never cut a multi-byte character in half.
pub fn chunk_where_clause(clause: &str) -> Vec<String> {
    let chars: Vec<char> = clause.chars().collect();
    chars
        .chunks(OPTION_CHUNK_LEN)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// A `read_table` request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableReadRequest {
    pub table: String,
    pub fields: Vec<String>,
    pub where_clause: Option<String>,
    /// 0 means no limit
    pub max_rows: u64,
}

impl TableReadRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_where(mut self, clause: impl Into<String>) -> Self {
        self.where_clause = Some(clause.into());
        self
    }

    pub fn with_max_rows(mut self, max_rows: u64) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Parse operation arguments: `table`, `fields`, `where`, `max_rows`
    pub fn from_params(params: &Params) -> Result<Self> {
        let table = params
            .opt_str("table")
            .or_else(|| params.opt_str("table_name"))
            .ok_or_else(|| ErpError::InvalidArgument("'table' is required".to_string()))?;

        Ok(Self {
            table: table.to_string(),
            fields: params.opt_str_list("fields"),
            where_clause: params
                .opt_str("where")
                .or_else(|| params.opt_str("where_clause"))
                .map(String::from),
            max_rows: params.opt_u64("max_rows").unwrap_or(0),
        })
    }

    /// Encode as RFC_READ_TABLE import and table parameters
    pub fn to_rfc_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("QUERY_TABLE".into(), json!(self.table));
        params.insert("DELIMITER".into(), json!(FIELD_DELIMITER));

        if !self.fields.is_empty() {
            let fields: Vec<Value> = self
                .fields
                .iter()
                .map(|f| json!({ "FIELDNAME": f }))
                .collect();
            params.insert("FIELDS".into(), Value::Array(fields));
        }

        if let Some(clause) = self.where_clause.as_deref().filter(|c| !c.is_empty()) {
            let options: Vec<Value> = chunk_where_clause(clause)
                .into_iter()
                .map(|text| json!({ "TEXT": text }))
                .collect();
            params.insert("OPTIONS".into(), Value::Array(options));
        }

        if self.max_rows > 0 {
            params.insert("ROWCOUNT".into(), json!(self.max_rows));
        }

        params
    }
}

/// Turn an RFC_READ_TABLE result into records keyed by field name.
///
/// Column order comes from the returned `FIELDS` table. Values are trimmed;
/// a short `WA` line leaves the trailing fields out of its record.
pub fn parse_table_rows(result: &Value) -> Vec<Params> {
    let field_names: Vec<&str> = result
        .get("FIELDS")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| f.get("FIELDNAME").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    let Some(data) = result.get("DATA").and_then(Value::as_array) else {
        return Vec::new();
    };

    data.iter()
        .filter_map(|row| row.get("WA").and_then(Value::as_str))
        .map(|wa| {
            field_names
                .iter()
                .zip(wa.split(FIELD_DELIMITER))
                .map(|(name, value)| ((*name).to_string(), Value::String(value.trim().to_string())))
                .collect()
        })
        .collect()
}

/// Inspect the `RETURN` structure of a BAPI result.
///
/// RETURN may be a single structure or a table. The first entry of type `E`
/// fails the call with its message; entries of type `W` are logged.
pub fn check_bapi_return(bapi: &str, result: &Value) -> Result<()> {
    let entries: Vec<&Value> = match result.get("RETURN") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(entry @ Value::Object(_)) => vec![entry],
        _ => return Ok(()),
    };

    for entry in entries {
        let message = entry
            .get("MESSAGE")
            .and_then(Value::as_str)
            .unwrap_or_default();
        match entry.get("TYPE").and_then(Value::as_str) {
            Some("E") => {
                tracing::error!(bapi, message, "BAPI returned an error");
                return Err(ErpError::Backend(format!("BAPI error: {}", message)));
            }
            Some("W") => {
                tracing::warn!(bapi, message, "BAPI returned a warning");
            }
            _ => {}
        }
    }

    Ok(())
}

/// Shape a DDIF_TABL_GET result
pub fn table_metadata(table: &str, result: &Value) -> Value {
    json!({
        "table_name": table,
        "description": result
            .pointer("/DD02V_WA/DDTEXT")
            .and_then(Value::as_str)
            .unwrap_or_default(),
        "fields": result.get("DD03P_TAB").cloned().unwrap_or_else(|| json!([])),
        "indexes": result.get("DD05M_TAB").cloned().unwrap_or_else(|| json!([])),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case::empty(0, 0)]
    #[case::short(10, 1)]
    #[case::exact(72, 1)]
    #[case::one_over(73, 2)]
    #[case::two_hundred(200, 3)]
    fn test_chunk_counts(#[case] len: usize, #[case] expected: usize) {
        let clause: String = "ABCDEFGHIJ".chars().cycle().take(len).collect();
        let chunks = chunk_where_clause(&clause);

        assert_eq!(chunks.len(), expected);
        assert!(chunks.iter().all(|c| c.chars().count() <= OPTION_CHUNK_LEN));
        assert_eq!(chunks.concat(), clause);
    }

    #[test]
    fn test_chunks_respect_multibyte_characters() {
        let clause = "NAME1 = 'Müller' AND ORT01 = 'Düsseldorf' ".repeat(3);
        let chunks = chunk_where_clause(&clause);
        assert_eq!(chunks.concat(), clause);
        assert!(chunks.iter().all(|c| c.chars().count() <= OPTION_CHUNK_LEN));
    }

    #[test]
    fn test_rfc_params_encoding() {
        let clause = format!("MATNR LIKE 'A%' AND {}", "MTART = 'FERT' OR ".repeat(6));
        let request = TableReadRequest::new("MARA")
            .with_fields(["MATNR", "MTART"])
            .with_where(clause.clone())
            .with_max_rows(50);

        let params = Value::Object(request.to_rfc_params());

        assert_eq!(params["QUERY_TABLE"], "MARA");
        assert_eq!(params["DELIMITER"], "|");
        assert_eq!(
            params["FIELDS"],
            json!([{"FIELDNAME": "MATNR"}, {"FIELDNAME": "MTART"}])
        );
        assert_eq!(params["ROWCOUNT"], 50);

        let options = params["OPTIONS"].as_array().expect("options");
        let rebuilt: String = options
            .iter()
            .map(|o| o["TEXT"].as_str().expect("text"))
            .collect();
        assert_eq!(rebuilt, clause);
    }

    #[test]
    fn test_optional_params_omitted() {
        let params = TableReadRequest::new("T001").to_rfc_params();
        assert!(!params.contains_key("FIELDS"));
        assert!(!params.contains_key("OPTIONS"));
        assert!(!params.contains_key("ROWCOUNT"));
    }

    #[test]
    fn test_request_from_params() {
        let args = json!({
            "table_name": "KNA1",
            "fields": "KUNNR, NAME1",
            "where_clause": "LAND1 = 'TR'",
            "max_rows": 5,
        });
        let request = TableReadRequest::from_params(args.as_object().expect("object"))
            .expect("request");

        assert_eq!(
            request,
            TableReadRequest::new("KNA1")
                .with_fields(["KUNNR", "NAME1"])
                .with_where("LAND1 = 'TR'")
                .with_max_rows(5)
        );
    }

    #[test]
    fn test_parse_rows_uses_returned_field_order() {
        let result = json!({
            "FIELDS": [{"FIELDNAME": "MATNR"}, {"FIELDNAME": "MTART"}, {"FIELDNAME": "MATKL"}],
            "DATA": [
                {"WA": "000000000000001234|FERT|01   "},
                {"WA": "  5678            |HALB"},
            ],
        });

        let rows = parse_table_rows(&result);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["MATNR"], "000000000000001234");
        assert_eq!(rows[0]["MATKL"], "01");
        assert_eq!(rows[1]["MATNR"], "5678");
        assert!(!rows[1].contains_key("MATKL"));
    }

    #[test]
    fn test_bapi_error_entry_fails() {
        let result = json!({
            "RETURN": [
                {"TYPE": "W", "MESSAGE": "Material is flagged for deletion"},
                {"TYPE": "E", "MESSAGE": "Material 42 does not exist"},
            ]
        });

        let err = check_bapi_return("BAPI_MATERIAL_GET_DETAIL", &result).unwrap_err();
        assert!(matches!(err, ErpError::Backend(ref m) if m.contains("Material 42 does not exist")));
    }

    #[test]
    fn test_bapi_single_structure_and_warnings() {
        let warning = json!({"RETURN": {"TYPE": "W", "MESSAGE": "check later"}});
        assert!(check_bapi_return("BAPI_X", &warning).is_ok());

        let error = json!({"RETURN": {"TYPE": "E", "MESSAGE": "locked"}});
        assert!(check_bapi_return("BAPI_X", &error).is_err());

        assert!(check_bapi_return("BAPI_X", &json!({"EXPORT": 1})).is_ok());
    }

    #[test]
    fn test_table_metadata_shape() {
        let result = json!({
            "DD02V_WA": {"DDTEXT": "General Material Data"},
            "DD03P_TAB": [{"FIELDNAME": "MATNR"}],
        });
        let meta = table_metadata("MARA", &result);
        assert_eq!(meta["description"], "General Material Data");
        assert_eq!(meta["fields"], json!([{"FIELDNAME": "MATNR"}]));
        assert_eq!(meta["indexes"], json!([]));
    }
}
