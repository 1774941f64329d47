use crate::error::ReplicationError;
use chrono::NaiveDateTime;
use connectors::{DbError, MySqlConnectionManager};
use model::core::value::Value;
use model::status::{CopyStatus, StatusKind};

/// Tracking table owned by the replicator in the replication database.
pub const COPY_STATUS_TABLE: &str = "etl_copy_status";

const UPSERT_SQL: &str = "INSERT INTO etl_copy_status \
    (table_name, last_copied, rows_copied, copy_status, last_primary_value, primary_column_name) \
    VALUES (?, ?, ?, ?, ?, ?) \
    ON DUPLICATE KEY UPDATE \
    last_copied = VALUES(last_copied), \
    rows_copied = VALUES(rows_copied), \
    copy_status = VALUES(copy_status), \
    last_primary_value = VALUES(last_primary_value), \
    primary_column_name = VALUES(primary_column_name)";

const GET_SQL: &str = "SELECT last_copied, rows_copied, copy_status, \
    last_primary_value, primary_column_name \
    FROM etl_copy_status WHERE table_name = ?";

const EXISTS_SQL: &str = "SELECT COUNT(*) FROM information_schema.tables \
    WHERE table_schema = DATABASE() AND table_name = ?";

/// The replicator never issues DDL: the tracking table is deployed with
/// the replication database, and its absence is fatal.
pub async fn ensure_exists(manager: &mut MySqlConnectionManager) -> Result<(), ReplicationError> {
    let count = manager
        .query_scalar(EXISTS_SQL, &[Value::String(COPY_STATUS_TABLE.to_string())])
        .await?;
    if count.as_u64().unwrap_or(0) == 0 {
        return Err(ReplicationError::TrackingTableMissing(
            COPY_STATUS_TABLE.to_string(),
        ));
    }
    Ok(())
}

pub async fn get(
    manager: &mut MySqlConnectionManager,
    table: &str,
) -> Result<Option<CopyStatus>, DbError> {
    let batch = manager
        .query(GET_SQL, &[Value::String(table.to_string())])
        .await?;
    if batch.is_empty() {
        return Ok(None);
    }

    let last_copied = match batch.value(0, "last_copied") {
        Value::Timestamp(ts) => ts,
        Value::Date(d) => d.and_hms_opt(0, 0, 0).unwrap_or_default(),
        other => {
            return Err(DbError::Decode(format!(
                "unexpected last_copied value for `{table}`: {other:?}"
            )));
        }
    };
    let copy_status = batch
        .value(0, "copy_status")
        .as_str()
        .and_then(StatusKind::parse)
        .unwrap_or(StatusKind::Failed);

    Ok(Some(CopyStatus {
        table_name: table.to_string(),
        last_copied,
        rows_copied: batch.value(0, "rows_copied").as_u64().unwrap_or(0),
        copy_status,
        last_primary_value: batch.value(0, "last_primary_value").encode_text(),
        primary_column_name: batch.value(0, "primary_column_name").encode_text(),
    }))
}

/// Idempotent write of one table's outcome; runs outside any data
/// transaction so a failed copy still leaves a `failed` row behind.
pub async fn upsert(
    manager: &mut MySqlConnectionManager,
    status: &CopyStatus,
) -> Result<(), DbError> {
    let params = vec![
        Value::String(status.table_name.clone()),
        Value::Timestamp(status.last_copied),
        Value::Uint(status.rows_copied),
        Value::String(status.copy_status.as_str().to_string()),
        status
            .last_primary_value
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
        status
            .primary_column_name
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    ];
    manager.execute(UPSERT_SQL, &params).await?;
    Ok(())
}

pub fn running(table: &str, now: NaiveDateTime) -> CopyStatus {
    CopyStatus {
        table_name: table.to_string(),
        last_copied: now,
        rows_copied: 0,
        copy_status: StatusKind::Running,
        last_primary_value: None,
        primary_column_name: None,
    }
}

pub fn failed(table: &str, now: NaiveDateTime) -> CopyStatus {
    CopyStatus {
        table_name: table.to_string(),
        last_copied: now,
        rows_copied: 0,
        copy_status: StatusKind::Failed,
        last_primary_value: None,
        primary_column_name: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn upsert_sql_updates_every_tracked_column() {
        for column in [
            "last_copied",
            "rows_copied",
            "copy_status",
            "last_primary_value",
            "primary_column_name",
        ] {
            assert!(
                UPSERT_SQL.contains(&format!("{column} = VALUES({column})")),
                "missing upsert assignment for {column}"
            );
        }
    }

    #[test]
    fn failure_rows_carry_no_watermark() {
        let status = failed("patient", Utc::now().naive_utc());
        assert_eq!(status.copy_status, StatusKind::Failed);
        assert_eq!(status.rows_copied, 0);
        assert_eq!(status.last_primary_value, None);
    }
}
