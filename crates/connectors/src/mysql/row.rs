use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveTime};
use model::core::value::Value;
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::{Column, Row as MySqlRow, Value as MySqlValue};
use std::str::FromStr;
use tracing::warn;

pub fn column_names(row: &MySqlRow) -> Vec<String> {
    row.columns_ref()
        .iter()
        .map(|col| col.name_str().to_string())
        .collect()
}

/// Decodes a driver row into pipeline values, positionally.
pub fn decode_row(row: &MySqlRow) -> Vec<Value> {
    let columns = row.columns_ref();
    (0..columns.len())
        .map(|idx| {
            let raw = row.as_ref(idx).unwrap_or(&MySqlValue::NULL);
            decode_value(raw, &columns[idx])
        })
        .collect()
}

fn decode_value(raw: &MySqlValue, column: &Column) -> Value {
    match raw {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Int(v) => Value::Int(*v),
        MySqlValue::UInt(v) => Value::Uint(*v),
        MySqlValue::Float(v) => Value::Float(*v as f64),
        MySqlValue::Double(v) => Value::Float(*v),
        MySqlValue::Date(year, month, day, hour, minute, second, micros) => {
            decode_temporal(
                column,
                *year,
                *month,
                *day,
                *hour,
                *minute,
                *second,
                *micros,
            )
        }
        MySqlValue::Time(negative, days, hours, minutes, seconds, micros) => {
            if *negative || *days > 0 {
                // Durations beyond a day do not fit a TIME column value;
                // carry the driver's text form.
                Value::String(format!(
                    "{}{}:{:02}:{:02}",
                    if *negative { "-" } else { "" },
                    u32::from(*hours) + days * 24,
                    minutes,
                    seconds
                ))
            } else {
                NaiveTime::from_hms_micro_opt(
                    u32::from(*hours),
                    u32::from(*minutes),
                    u32::from(*seconds),
                    *micros,
                )
                .map(Value::Time)
                .unwrap_or(Value::Null)
            }
        }
        MySqlValue::Bytes(bytes) => decode_bytes(bytes, column),
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_temporal(
    column: &Column,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
    micros: u32,
) -> Value {
    // MySQL zero dates have no chrono representation.
    let Some(date) = NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
    else {
        return Value::Null;
    };

    if column.column_type() == ColumnType::MYSQL_TYPE_DATE {
        return Value::Date(date);
    }

    match date.and_hms_micro_opt(
        u32::from(hour),
        u32::from(minute),
        u32::from(second),
        micros,
    ) {
        Some(ts) => Value::Timestamp(ts),
        None => Value::Null,
    }
}

fn decode_bytes(bytes: &[u8], column: &Column) -> Value {
    match column.column_type() {
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            let text = String::from_utf8_lossy(bytes);
            match BigDecimal::from_str(&text) {
                Ok(decimal) => Value::Decimal(decimal),
                Err(_) => {
                    warn!(column = %column.name_str(), "undecodable DECIMAL value, passing through as text");
                    Value::String(text.to_string())
                }
            }
        }
        ColumnType::MYSQL_TYPE_JSON => match serde_json::from_slice(bytes) {
            Ok(json) => Value::Json(json),
            Err(_) => Value::String(String::from_utf8_lossy(bytes).to_string()),
        },
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_STRING
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_VARCHAR
            if column.flags().contains(ColumnFlags::BINARY_FLAG) =>
        {
            Value::Bytes(bytes.to_vec())
        }
        _ => Value::String(String::from_utf8_lossy(bytes).to_string()),
    }
}
