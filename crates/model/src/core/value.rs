use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A single scalar moved between the source, replication and analytics
/// databases. Only the variants the MySQL and Postgres drivers can
/// produce for OpenDental tables are represented.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    SmallInt(i16),
    Int(i64),
    Uint(u64),
    Float(f64),
    Decimal(BigDecimal),
    String(String),
    Boolean(bool),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::SmallInt(v) => Some(*v as i64),
            Value::Int(v) => Some(*v),
            Value::Uint(v) => i64::try_from(*v).ok(),
            Value::Float(v) => Some(*v as i64),
            Value::Decimal(v) => v.to_i64(),
            Value::String(v) => v.parse::<i64>().ok(),
            Value::Boolean(v) => Some(if *v { 1 } else { 0 }),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::SmallInt(v) => u64::try_from(*v).ok(),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Uint(v) => Some(*v),
            Value::Decimal(v) => v.to_u64(),
            Value::String(v) => v.parse::<u64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    /// Text form used for watermark bookkeeping in the tracking tables.
    /// Returns `None` for NULL so the status column stays NULL.
    pub fn encode_text(&self) -> Option<String> {
        match self {
            Value::SmallInt(v) => Some(v.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::Uint(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Decimal(v) => Some(v.to_string()),
            Value::String(v) => Some(v.clone()),
            Value::Boolean(v) => Some(if *v { "1" } else { "0" }.to_string()),
            Value::Json(v) => Some(v.to_string()),
            Value::Bytes(v) => Some(String::from_utf8_lossy(v).to_string()),
            Value::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
            Value::Time(v) => Some(v.format("%H:%M:%S").to_string()),
            Value::Timestamp(v) => Some(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::Null => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn integer_coercions() {
        assert_eq!(Value::SmallInt(3).as_i64(), Some(3));
        assert_eq!(Value::Uint(u64::MAX).as_i64(), None);
        assert_eq!(Value::String("42".into()).as_u64(), Some(42));
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn watermark_text_encoding() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 7)
            .unwrap()
            .and_hms_opt(13, 30, 0)
            .unwrap();
        assert_eq!(
            Value::Timestamp(ts).encode_text().unwrap(),
            "2024-01-07 13:30:00"
        );
        assert_eq!(Value::Null.encode_text(), None);
    }
}
