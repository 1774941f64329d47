use chrono::{Datelike, Timelike};
use model::core::value::Value;
use mysql_async::Value as MySqlValue;
use mysql_common::params::Params;

fn to_mysql_value(value: &Value) -> MySqlValue {
    match value {
        Value::SmallInt(v) => MySqlValue::Int(i64::from(*v)),
        Value::Int(v) => MySqlValue::Int(*v),
        Value::Uint(v) => MySqlValue::UInt(*v),
        Value::Float(v) => MySqlValue::Double(*v),
        Value::Decimal(v) => MySqlValue::Bytes(v.to_string().into_bytes()),
        Value::String(v) => MySqlValue::Bytes(v.clone().into_bytes()),
        Value::Boolean(v) => MySqlValue::Int(if *v { 1 } else { 0 }),
        Value::Json(v) => MySqlValue::Bytes(v.to_string().into_bytes()),
        Value::Bytes(v) => MySqlValue::Bytes(v.clone()),
        Value::Date(d) => MySqlValue::Date(
            d.year() as u16,
            d.month() as u8,
            d.day() as u8,
            0,
            0,
            0,
            0,
        ),
        Value::Time(t) => MySqlValue::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
        Value::Timestamp(ts) => MySqlValue::Date(
            ts.year() as u16,
            ts.month() as u8,
            ts.day() as u8,
            ts.hour() as u8,
            ts.minute() as u8,
            ts.second() as u8,
            ts.and_utc().timestamp_subsec_micros(),
        ),
        Value::Null => MySqlValue::NULL,
    }
}

/// Positional driver parameters for a slice of values.
pub fn params_from_values(values: &[Value]) -> Params {
    if values.is_empty() {
        return Params::Empty;
    }
    Params::Positional(values.iter().map(to_mysql_value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slice_is_empty_params() {
        assert!(matches!(params_from_values(&[]), Params::Empty));
    }

    #[test]
    fn scalars_bind_positionally() {
        let params = params_from_values(&[
            Value::Int(7),
            Value::String("x".into()),
            Value::Null,
        ]);
        match params {
            Params::Positional(values) => {
                assert_eq!(values.len(), 3);
                assert!(matches!(values[0], MySqlValue::Int(7)));
                assert!(matches!(values[2], MySqlValue::NULL));
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }
}
