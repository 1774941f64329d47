use chrono::NaiveDateTime;
use connectors::query::quote_pg;
use connectors::{DbError, PgConnectionManager};
use model::core::value::Value;
use model::status::{LoadStatus, StatusKind};

/// Tracking table owned by the loader in the analytics warehouse.
pub const LOAD_STATUS_TABLE: &str = "etl_load_status";

/// The loader owns its tracking table, so unlike the replicator it
/// creates the table on first use.
pub async fn ensure_exists(analytics: &mut PgConnectionManager) -> Result<(), DbError> {
    let schema = analytics.schema();
    let ddl = format!(
        "CREATE SCHEMA IF NOT EXISTS {schema_ident}; \
         CREATE TABLE IF NOT EXISTS {schema_ident}.{table_ident} (\
         table_name text PRIMARY KEY, \
         last_loaded timestamp NOT NULL, \
         rows_loaded bigint NOT NULL, \
         load_status text NOT NULL)",
        schema_ident = quote_pg(schema.as_str()),
        table_ident = quote_pg(LOAD_STATUS_TABLE),
    );
    analytics.batch_execute(&ddl).await
}

/// Watermark for incremental extraction, when a successful load exists.
pub async fn last_loaded(
    analytics: &mut PgConnectionManager,
    table: &str,
) -> Result<Option<NaiveDateTime>, DbError> {
    let sql = format!(
        "SELECT last_loaded FROM {}.{} WHERE table_name = $1 AND load_status = 'success'",
        quote_pg(analytics.schema().as_str()),
        quote_pg(LOAD_STATUS_TABLE),
    );
    let value = analytics
        .query_scalar(&sql, &[Value::String(table.to_string())])
        .await?;
    match value {
        Value::Timestamp(ts) => Ok(Some(ts)),
        _ => Ok(None),
    }
}

/// Idempotent status write; runs outside the data transaction so a
/// failed load still leaves a `failed` row behind.
pub async fn upsert(
    analytics: &mut PgConnectionManager,
    status: &LoadStatus,
) -> Result<(), DbError> {
    let sql = format!(
        "INSERT INTO {}.{} (table_name, last_loaded, rows_loaded, load_status) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (table_name) DO UPDATE SET \
         last_loaded = EXCLUDED.last_loaded, \
         rows_loaded = EXCLUDED.rows_loaded, \
         load_status = EXCLUDED.load_status",
        quote_pg(analytics.schema().as_str()),
        quote_pg(LOAD_STATUS_TABLE),
    );
    let params = vec![
        Value::String(status.table_name.clone()),
        Value::Timestamp(status.last_loaded),
        Value::Int(status.rows_loaded as i64),
        Value::String(status.load_status.as_str().to_string()),
    ];
    analytics.execute(&sql, &params).await?;
    Ok(())
}

pub fn running(table: &str, now: NaiveDateTime) -> LoadStatus {
    LoadStatus {
        table_name: table.to_string(),
        last_loaded: now,
        rows_loaded: 0,
        load_status: StatusKind::Running,
    }
}

pub fn failed(table: &str, now: NaiveDateTime) -> LoadStatus {
    LoadStatus {
        table_name: table.to_string(),
        last_loaded: now,
        rows_loaded: 0,
        load_status: StatusKind::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn failed_rows_report_zero() {
        let status = failed("claim", Utc::now().naive_utc());
        assert_eq!(status.rows_loaded, 0);
        assert_eq!(status.load_status, StatusKind::Failed);
    }
}
