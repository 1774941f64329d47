//! Per-row coercion of MySQL-shaped scalars into the declared Postgres
//! types, applied by the loader just before writing.

use crate::adapter::TableSchema;
use crate::translate::PgType;
use bigdecimal::BigDecimal;
use model::core::value::Value;
use std::str::FromStr;

/// Coerces every value in `row` to its declared analytics type.
/// `columns` gives the position-to-name mapping of the extraction query.
pub fn coerce_row(schema: &TableSchema, columns: &[String], row: Vec<Value>) -> Vec<Value> {
    row.into_iter()
        .enumerate()
        .map(|(idx, value)| match columns.get(idx) {
            Some(name) => match schema.pg_type_of(name) {
                Some(pg_type) => coerce_value(pg_type, value),
                None => value,
            },
            None => value,
        })
        .collect()
}

pub fn coerce_value(pg_type: &PgType, value: Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match pg_type {
        PgType::Boolean => match value {
            Value::Boolean(_) => value,
            Value::SmallInt(v) => Value::Boolean(v != 0),
            Value::Int(v) => Value::Boolean(v != 0),
            Value::Uint(v) => Value::Boolean(v != 0),
            Value::String(ref s) => match s.as_str() {
                "0" | "false" => Value::Boolean(false),
                "1" | "true" => Value::Boolean(true),
                _ => value,
            },
            other => other,
        },
        PgType::SmallInt => match value {
            Value::Int(v) => match i16::try_from(v) {
                Ok(small) => Value::SmallInt(small),
                Err(_) => Value::Int(v),
            },
            Value::Uint(v) => match i16::try_from(v) {
                Ok(small) => Value::SmallInt(small),
                Err(_) => Value::Uint(v),
            },
            Value::Boolean(b) => Value::SmallInt(if b { 1 } else { 0 }),
            other => other,
        },
        PgType::Integer | PgType::BigInt => match value {
            Value::Boolean(b) => Value::Int(if b { 1 } else { 0 }),
            Value::SmallInt(v) => Value::Int(i64::from(v)),
            other => other,
        },
        PgType::Text | PgType::Character(_) | PgType::CharacterVarying(_) => match value {
            Value::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).to_string()),
            other => other,
        },
        PgType::Numeric(_) => match value {
            Value::String(s) => match BigDecimal::from_str(&s) {
                Ok(decimal) => Value::Decimal(decimal),
                Err(_) => Value::String(s),
            },
            other => other,
        },
        PgType::Jsonb => match value {
            Value::String(s) => match serde_json::from_str(&s) {
                Ok(json) => Value::Json(json),
                Err(_) => Value::String(s),
            },
            other => other,
        },
        PgType::Timestamp => match value {
            Value::Date(d) => match d.and_hms_opt(0, 0, 0) {
                Some(ts) => Value::Timestamp(ts),
                None => Value::Date(d),
            },
            other => other,
        },
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PgColumn;

    fn schema() -> TableSchema {
        TableSchema {
            table: "patient".to_string(),
            columns: vec![
                PgColumn {
                    name: "PatNum".to_string(),
                    pg_type: PgType::BigInt,
                    not_null: true,
                    boolean_candidate: false,
                },
                PgColumn {
                    name: "IsActive".to_string(),
                    pg_type: PgType::Boolean,
                    not_null: false,
                    boolean_candidate: true,
                },
            ],
            primary_key: vec!["PatNum".to_string()],
        }
    }

    #[test]
    fn tinyint_integers_become_booleans() {
        assert_eq!(
            coerce_value(&PgType::Boolean, Value::Int(1)),
            Value::Boolean(true)
        );
        assert_eq!(
            coerce_value(&PgType::Boolean, Value::Int(0)),
            Value::Boolean(false)
        );
        assert_eq!(coerce_value(&PgType::Boolean, Value::Null), Value::Null);
    }

    #[test]
    fn narrowing_only_when_it_fits() {
        assert_eq!(
            coerce_value(&PgType::SmallInt, Value::Int(12)),
            Value::SmallInt(12)
        );
        assert_eq!(
            coerce_value(&PgType::SmallInt, Value::Int(40_000)),
            Value::Int(40_000)
        );
    }

    #[test]
    fn row_coercion_follows_query_columns() {
        let columns = vec!["PatNum".to_string(), "IsActive".to_string()];
        let row = coerce_row(&schema(), &columns, vec![Value::Int(5), Value::Int(1)]);
        assert_eq!(row, vec![Value::Int(5), Value::Boolean(true)]);
    }

    #[test]
    fn numeric_strings_parse_to_decimals() {
        let coerced = coerce_value(
            &PgType::Numeric(Some((10, 2))),
            Value::String("12.50".to_string()),
        );
        assert_eq!(
            coerced,
            Value::Decimal(BigDecimal::from_str("12.50").unwrap())
        );
    }

    #[test]
    fn bytes_to_text_columns_are_lossy_decoded() {
        let coerced = coerce_value(&PgType::Text, Value::Bytes(b"note".to_vec()));
        assert_eq!(coerced, Value::String("note".to_string()));
    }
}
