use model::core::value::Value;
use std::fmt::Write as _;

/// Text-format COPY encoding: tab-delimited fields, `\N` for NULL,
/// backslash escapes per the Postgres COPY TEXT rules.
pub fn encode_line(row: &[Value]) -> String {
    let mut line = String::new();
    for (idx, value) in row.iter().enumerate() {
        if idx > 0 {
            line.push('\t');
        }
        match encode_value(value) {
            Some(text) => line.push_str(&escape_copy_text(&text)),
            None => line.push_str("\\N"),
        }
    }
    line.push('\n');
    line
}

fn encode_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::SmallInt(v) => Some(v.to_string()),
        Value::Int(v) => Some(v.to_string()),
        Value::Uint(v) => Some(v.to_string()),
        Value::Float(v) => Some(v.to_string()),
        Value::Decimal(v) => Some(v.to_string()),
        Value::String(v) => Some(v.clone()),
        Value::Boolean(v) => Some(if *v { "t" } else { "f" }.to_string()),
        Value::Json(v) => Some(v.to_string()),
        Value::Bytes(v) => Some(encode_bytea(v)),
        Value::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
        Value::Time(v) => Some(v.format("%H:%M:%S%.6f").to_string()),
        Value::Timestamp(v) => Some(v.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
    }
}

fn escape_copy_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\n' => escaped.push_str(r"\n"),
            '\r' => escaped.push_str(r"\r"),
            '\t' => escaped.push_str(r"\t"),
            '\\' => escaped.push_str(r"\\"),
            '\0' => escaped.push_str(r"\000"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn encode_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + 2 * bytes.len());
    out.push_str("\\x");
    for b in bytes {
        write!(&mut out, "{b:02x}").expect("writing to a String cannot fail");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn nulls_and_tabs_are_escaped() {
        let line = encode_line(&[
            Value::Int(5),
            Value::Null,
            Value::String("a\tb\nc".into()),
        ]);
        assert_eq!(line, "5\t\\N\ta\\tb\\nc\n");
    }

    #[test]
    fn booleans_use_short_form() {
        let line = encode_line(&[Value::Boolean(true), Value::Boolean(false)]);
        assert_eq!(line, "t\tf\n");
    }

    #[test]
    fn bytea_is_hex_with_escaped_backslash() {
        let line = encode_line(&[Value::Bytes(vec![0xde, 0xad])]);
        assert_eq!(line, "\\\\xdead\n");
    }

    #[test]
    fn timestamps_render_with_microseconds() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(8, 15, 0, 250)
            .unwrap();
        let line = encode_line(&[Value::Timestamp(ts)]);
        assert_eq!(line, "2024-03-01 08:15:00.000250\n");
    }
}
