use model::config::table::TableConfig;
use thiserror::Error;

/// An identifier was about to be interpolated into SQL without appearing
/// in the analyzer-captured schema for its table.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("column `{column}` is not part of the configured schema for `{table}`")]
pub struct UnknownColumn {
    pub table: String,
    pub column: String,
}

/// Every identifier interpolated into SQL must come from the parsed
/// table configuration; anything else is rejected before it reaches a
/// query string.
pub fn ensure_known_columns(cfg: &TableConfig, columns: &[&str]) -> Result<(), UnknownColumn> {
    for column in columns {
        if !cfg.is_known_column(column) {
            return Err(UnknownColumn {
                table: cfg.table_name.clone(),
                column: (*column).to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_columns_pass() {
        let cfg: TableConfig = serde_json::from_str(
            r#"{
                "table_name": "patient",
                "primary_keys": ["PatNum"],
                "columns": [{"name": "PatNum", "type": "bigint"}, {"name": "LName", "type": "varchar(100)"}]
            }"#,
        )
        .unwrap();
        assert!(ensure_known_columns(&cfg, &["PatNum", "LName"]).is_ok());
    }

    #[test]
    fn unlisted_identifier_is_rejected() {
        let cfg: TableConfig = serde_json::from_str(
            r#"{"table_name": "patient", "columns": [{"name": "PatNum", "type": "bigint"}]}"#,
        )
        .unwrap();
        let err = ensure_known_columns(&cfg, &["PatNum", "LName; --"]).unwrap_err();
        assert_eq!(err.column, "LName; --");
        assert_eq!(err.table, "patient");
    }
}
