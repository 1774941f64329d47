use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use model::core::value::Value;
use tokio_postgres::types::Type;
use tokio_postgres::Row as PgRow;

pub fn column_names(row: &PgRow) -> Vec<String> {
    row.columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect()
}

/// Decodes a Postgres row into pipeline values. Only the types the
/// pipeline reads back from the warehouse (tracking rows, counts,
/// introspection text) are mapped; anything else comes through as text
/// when the driver can render it.
pub fn decode_row(row: &PgRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| decode_value(row, idx, col.type_()))
        .collect()
}

fn decode_value(row: &PgRow, idx: usize, ty: &Type) -> Value {
    if *ty == Type::BOOL {
        opt(row.try_get::<_, Option<bool>>(idx), Value::Boolean)
    } else if *ty == Type::INT2 {
        opt(row.try_get::<_, Option<i16>>(idx), Value::SmallInt)
    } else if *ty == Type::INT4 {
        opt(row.try_get::<_, Option<i32>>(idx), |v| {
            Value::Int(i64::from(v))
        })
    } else if *ty == Type::INT8 {
        opt(row.try_get::<_, Option<i64>>(idx), Value::Int)
    } else if *ty == Type::FLOAT4 {
        opt(row.try_get::<_, Option<f32>>(idx), |v| {
            Value::Float(f64::from(v))
        })
    } else if *ty == Type::FLOAT8 {
        opt(row.try_get::<_, Option<f64>>(idx), Value::Float)
    } else if *ty == Type::TIMESTAMP {
        opt(
            row.try_get::<_, Option<NaiveDateTime>>(idx),
            Value::Timestamp,
        )
    } else if *ty == Type::DATE {
        opt(row.try_get::<_, Option<NaiveDate>>(idx), Value::Date)
    } else if *ty == Type::TIME {
        opt(row.try_get::<_, Option<NaiveTime>>(idx), Value::Time)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        opt(
            row.try_get::<_, Option<serde_json::Value>>(idx),
            Value::Json,
        )
    } else if *ty == Type::BYTEA {
        opt(row.try_get::<_, Option<Vec<u8>>>(idx), Value::Bytes)
    } else {
        opt(row.try_get::<_, Option<String>>(idx), Value::String)
    }
}

fn opt<T>(
    fetched: Result<Option<T>, tokio_postgres::Error>,
    wrap: impl FnOnce(T) -> Value,
) -> Value {
    match fetched {
        Ok(Some(v)) => wrap(v),
        _ => Value::Null,
    }
}
