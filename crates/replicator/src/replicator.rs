use crate::error::ReplicationError;
use crate::strategy::{
    choose_strategy, full_select, multi_count_query, multi_select, primary_batch_query,
    primary_count_query, primary_seed_query, CopyStrategy,
};
use crate::tracking;
use chrono::Utc;
use connectors::factory;
use connectors::query::{mysql_count, mysql_insert, mysql_max, mysql_truncate, mysql_upsert};
use connectors::{DbError, MySqlBatchReader, MySqlConnectionManager, ReadPlan};
use engine_core::filter::priority_groups;
use engine_core::scheduler::{run_priority_groups, run_tables};
use engine_core::{ensure_known_columns, PerformanceOptimizer, TableFilter, UnknownColumn};
use etl_config::Settings;
use model::config::table::{PerformanceCategory, TableConfig, TableImportance};
use model::core::value::Value;
use model::records::batch::RowBatch;
use model::status::{CopyStatus, StatusKind};
use mysql_async::Pool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The MySQL wire protocol caps prepared-statement placeholders at
/// u16::MAX; staying well under keeps statements cheap to parse.
const MAX_BIND_PARAMS: usize = 10_000;

#[derive(Debug, Error)]
enum CopyError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    UnknownColumn(#[from] UnknownColumn),

    #[error("table has no captured column list")]
    MissingColumns,

    #[error("copy cancelled")]
    Cancelled,
}

struct CopyOutcome {
    rows_copied: u64,
    last_primary_value: Option<String>,
    primary_column_name: Option<String>,
}

/// Copies configured tables from the source database into the
/// replication database. One worker per table; each worker runs its own
/// pair of connection managers against the shared pools.
#[derive(Clone)]
pub struct MySqlReplicator {
    settings: Settings,
    source: Pool,
    replication: Pool,
    optimizer: Arc<PerformanceOptimizer>,
    cancel: CancellationToken,
}

impl MySqlReplicator {
    pub fn new(settings: Settings) -> Result<Self, ReplicationError> {
        let source = factory::source_pool(&settings)?;
        let replication = factory::replication_pool(&settings)?;
        Ok(MySqlReplicator {
            settings,
            source,
            replication,
            optimizer: Arc::new(PerformanceOptimizer::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Honors `cancel` between batches: in-flight batches finish and
    /// connections close cleanly.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Copies one table. `Err` only for fatal configuration problems;
    /// per-table failures are recorded in `etl_copy_status` and returned
    /// as `Ok(false)`.
    pub async fn copy_table(
        &self,
        table: &str,
        force_full: bool,
    ) -> Result<bool, ReplicationError> {
        let mut target = MySqlConnectionManager::new(self.replication.clone());
        tracking::ensure_exists(&mut target).await?;
        let ok = self.copy_with_status(&mut target, table, force_full).await;
        target.close().await;
        Ok(ok)
    }

    /// Copies a set of tables with up to `max_workers` in parallel
    /// (default: `general.parallel_jobs`).
    pub async fn copy_tables(
        &self,
        filter: TableFilter,
        force_full: bool,
        max_workers: Option<usize>,
    ) -> Result<HashMap<String, bool>, ReplicationError> {
        self.check_tracking_table().await?;

        let names = dedupe(filter.resolve(&self.settings.tables()));
        let workers = self.worker_count(max_workers);
        info!(tables = names.len(), workers, "starting replication batch");

        let replicator = self.clone();
        let results = run_tables(names, workers, self.cancel.clone(), move |name| {
            let replicator = replicator.clone();
            async move { replicator.copy_table_worker(&name, force_full).await }
        })
        .await;
        Ok(results)
    }

    pub async fn copy_tables_by_category(
        &self,
        category: PerformanceCategory,
        max_workers: Option<usize>,
    ) -> Result<HashMap<String, bool>, ReplicationError> {
        self.copy_tables(TableFilter::Category(category), false, max_workers)
            .await
    }

    pub async fn copy_tables_by_importance(
        &self,
        importance: TableImportance,
        max_workers: Option<usize>,
    ) -> Result<HashMap<String, bool>, ReplicationError> {
        self.copy_tables(TableFilter::Importance(importance), false, max_workers)
            .await
    }

    /// Runs every table with `processing_priority <= max_priority`,
    /// finishing each priority level before the next begins.
    pub async fn copy_tables_by_priority(
        &self,
        max_priority: u8,
        max_workers: Option<usize>,
    ) -> Result<HashMap<String, bool>, ReplicationError> {
        self.check_tracking_table().await?;

        let groups = priority_groups(&self.settings.tables(), max_priority);
        let workers = self.worker_count(max_workers);

        let replicator = self.clone();
        let results = run_priority_groups(groups, workers, self.cancel.clone(), move |name| {
            let replicator = replicator.clone();
            async move { replicator.copy_table_worker(&name, false).await }
        })
        .await;
        Ok(results)
    }

    async fn check_tracking_table(&self) -> Result<(), ReplicationError> {
        let mut target = MySqlConnectionManager::new(self.replication.clone());
        let checked = tracking::ensure_exists(&mut target).await;
        target.close().await;
        checked
    }

    fn worker_count(&self, max_workers: Option<usize>) -> usize {
        max_workers
            .unwrap_or(self.settings.pipeline().general.parallel_jobs)
            .max(1)
    }

    async fn copy_table_worker(&self, table: &str, force_full: bool) -> bool {
        let mut target = MySqlConnectionManager::new(self.replication.clone());
        let ok = self.copy_with_status(&mut target, table, force_full).await;
        target.close().await;
        ok
    }

    async fn copy_with_status(
        &self,
        target: &mut MySqlConnectionManager,
        table: &str,
        force_full: bool,
    ) -> bool {
        let cfg = match self.settings.table_config(table) {
            Ok(cfg) => cfg.clone(),
            Err(_) => {
                warn!(table, "no configuration for table, skipping");
                return false;
            }
        };

        let mut source = MySqlConnectionManager::new(self.source.clone());
        let started = Instant::now();
        let result = self
            .copy_table_inner(&mut source, target, &cfg, force_full)
            .await;
        source.close().await;

        match result {
            Ok(outcome) => {
                let rate = self
                    .optimizer
                    .record(table, outcome.rows_copied, started.elapsed());
                if outcome.rows_copied > 0
                    && cfg.monitoring.alert_on_slow_extraction
                    && self.optimizer.is_slow(cfg.performance_category, rate)
                {
                    warn!(
                        table,
                        rate = rate as u64,
                        expected = self.optimizer.expected_rate_for(cfg.performance_category),
                        "slow extraction"
                    );
                }

                let status = CopyStatus {
                    table_name: table.to_string(),
                    last_copied: Utc::now().naive_utc(),
                    rows_copied: outcome.rows_copied,
                    copy_status: StatusKind::Success,
                    last_primary_value: outcome.last_primary_value,
                    primary_column_name: outcome.primary_column_name,
                };
                if let Err(err) = tracking::upsert(target, &status).await {
                    error!(table, %err, "failed to record copy status");
                    return false;
                }
                info!(
                    table,
                    rows = outcome.rows_copied,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "copy complete"
                );
                true
            }
            Err(err) => {
                if cfg.monitoring.alert_on_failure {
                    error!(table, %err, alert = true, "table copy failed");
                } else {
                    error!(table, %err, "table copy failed");
                }
                let status = tracking::failed(table, Utc::now().naive_utc());
                if let Err(status_err) = tracking::upsert(target, &status).await {
                    error!(table, %status_err, "failed to record failed copy status");
                }
                false
            }
        }
    }

    async fn copy_table_inner(
        &self,
        source: &mut MySqlConnectionManager,
        target: &mut MySqlConnectionManager,
        cfg: &TableConfig,
        force_full: bool,
    ) -> Result<CopyOutcome, CopyError> {
        if cfg.columns.is_empty() {
            return Err(CopyError::MissingColumns);
        }

        let status = tracking::get(target, &cfg.table_name).await?;
        let strategy = choose_strategy(
            cfg,
            force_full,
            status.as_ref().map(|s| s.last_copied),
            &self.optimizer,
        );
        debug!(table = %cfg.table_name, ?strategy, "chose copy strategy");

        tracking::upsert(
            target,
            &tracking::running(&cfg.table_name, Utc::now().naive_utc()),
        )
        .await?;

        match strategy {
            CopyStrategy::Full => self.copy_full(source, target, cfg).await,
            CopyStrategy::PrimaryIncremental { column } => {
                self.copy_primary(source, target, cfg, &column).await
            }
            CopyStrategy::MultiColumnIncremental { columns } => {
                self.copy_multi(source, target, cfg, &columns).await
            }
        }
    }

    async fn copy_full(
        &self,
        source: &mut MySqlConnectionManager,
        target: &mut MySqlConnectionManager,
        cfg: &TableConfig,
    ) -> Result<CopyOutcome, CopyError> {
        let columns = cfg.column_names();
        let batch_size = self.optimizer.calculate_adaptive_batch_size(cfg);

        target
            .execute(&mysql_truncate(&cfg.table_name), &[])
            .await?;

        let total = source
            .query_scalar(&mysql_count(&cfg.table_name, None), &[])
            .await?
            .as_u64()
            .unwrap_or(0);
        debug!(table = %cfg.table_name, total, batch_size, "full refresh");

        let plan = ReadPlan::Paged {
            base_sql: full_select(&cfg.table_name, &columns, &cfg.primary_keys),
            params: Vec::new(),
        };
        let mut reader = MySqlBatchReader::new(source, plan, batch_size);
        let mut rows_copied = 0u64;
        loop {
            self.check_cancelled()?;
            let Some(batch) = reader.read_batch().await? else {
                break;
            };
            rows_copied += batch.len() as u64;
            self.write_batch(target, cfg, &columns, &batch, false)
                .await?;
        }

        if rows_copied != total {
            debug!(
                table = %cfg.table_name,
                counted = total,
                copied = rows_copied,
                "row count moved during copy"
            );
        }

        Ok(CopyOutcome {
            rows_copied,
            last_primary_value: None,
            primary_column_name: None,
        })
    }

    async fn copy_primary(
        &self,
        source: &mut MySqlConnectionManager,
        target: &mut MySqlConnectionManager,
        cfg: &TableConfig,
        column: &str,
    ) -> Result<CopyOutcome, CopyError> {
        ensure_known_columns(cfg, &[column])?;
        let columns = cfg.column_names();
        let batch_size = self.optimizer.calculate_adaptive_batch_size(cfg);

        // The watermark lives in the target's data, not the status row,
        // so out-of-band edits to the replica are tolerated.
        let watermark = target
            .query_scalar(&mysql_max(&cfg.table_name, column), &[])
            .await?;
        let cursor = if watermark.is_null() {
            None
        } else {
            Some(watermark)
        };

        if let Some(mark) = &cursor {
            let new_rows = source
                .query_scalar(&primary_count_query(&cfg.table_name, column), &[mark.clone()])
                .await?
                .as_u64()
                .unwrap_or(0);
            debug!(table = %cfg.table_name, column, new_rows, "incremental copy");
        }

        let plan = ReadPlan::Keyset {
            seed_sql: primary_seed_query(&cfg.table_name, &columns, column, batch_size),
            next_sql: primary_batch_query(&cfg.table_name, &columns, column, batch_size),
            cursor_column: column.to_string(),
            cursor,
        };
        let mut reader = MySqlBatchReader::new(source, plan, batch_size);
        let mut rows_copied = 0u64;
        loop {
            self.check_cancelled()?;
            let Some(batch) = reader.read_batch().await? else {
                break;
            };
            rows_copied += batch.len() as u64;
            self.write_batch(target, cfg, &columns, &batch, true).await?;
        }
        let high_water = reader.cursor().cloned();

        Ok(CopyOutcome {
            rows_copied,
            last_primary_value: high_water.and_then(|mark| mark.encode_text()),
            primary_column_name: Some(column.to_string()),
        })
    }

    async fn copy_multi(
        &self,
        source: &mut MySqlConnectionManager,
        target: &mut MySqlConnectionManager,
        cfg: &TableConfig,
        inc_columns: &[String],
    ) -> Result<CopyOutcome, CopyError> {
        let refs: Vec<&str> = inc_columns.iter().map(String::as_str).collect();
        ensure_known_columns(cfg, &refs)?;
        let columns = cfg.column_names();
        let batch_size = self.optimizer.calculate_adaptive_batch_size(cfg);

        // Single watermark: the greatest MAX over all candidate columns
        // in the target.
        let mut watermark: Option<Value> = None;
        for inc_column in inc_columns {
            let max = target
                .query_scalar(&mysql_max(&cfg.table_name, inc_column), &[])
                .await?;
            watermark = greatest_watermark(watermark, max);
        }

        let plan = match watermark {
            Some(mark) => {
                let params: Vec<Value> = vec![mark.clone(); inc_columns.len()];
                let new_rows = source
                    .query_scalar(&multi_count_query(&cfg.table_name, inc_columns), &params)
                    .await?
                    .as_u64()
                    .unwrap_or(0);
                debug!(table = %cfg.table_name, new_rows, "multi-column incremental copy");

                ReadPlan::Paged {
                    base_sql: multi_select(
                        &cfg.table_name,
                        &columns,
                        inc_columns,
                        &cfg.primary_keys,
                    ),
                    params,
                }
            }
            // Empty target: copy everything, still via upsert.
            None => ReadPlan::Paged {
                base_sql: full_select(&cfg.table_name, &columns, &cfg.primary_keys),
                params: Vec::new(),
            },
        };

        let mut reader = MySqlBatchReader::new(source, plan, batch_size);
        let mut rows_copied = 0u64;
        loop {
            self.check_cancelled()?;
            let Some(batch) = reader.read_batch().await? else {
                break;
            };
            rows_copied += batch.len() as u64;
            self.write_batch(target, cfg, &columns, &batch, true).await?;
        }

        Ok(CopyOutcome {
            rows_copied,
            last_primary_value: None,
            primary_column_name: None,
        })
    }

    async fn write_batch(
        &self,
        target: &mut MySqlConnectionManager,
        cfg: &TableConfig,
        columns: &[&str],
        batch: &RowBatch,
        upsert: bool,
    ) -> Result<(), CopyError> {
        let rows_per_statement = (MAX_BIND_PARAMS / columns.len().max(1)).max(1);
        for chunk in batch.rows.chunks(rows_per_statement) {
            let sql = if upsert {
                mysql_upsert(&cfg.table_name, columns, &cfg.primary_keys, chunk.len())
            } else {
                mysql_insert(&cfg.table_name, columns, chunk.len())
            };
            let params: Vec<Value> = chunk
                .iter()
                .flat_map(|row| row.iter().cloned())
                .collect();
            target.execute(&sql, &params).await?;
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), CopyError> {
        if self.cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        Ok(())
    }
}

fn dedupe(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

fn greatest_watermark(current: Option<Value>, candidate: Value) -> Option<Value> {
    if candidate.is_null() {
        return current;
    }
    match current {
        None => Some(candidate),
        Some(held) => {
            if watermark_gt(&candidate, &held) {
                Some(candidate)
            } else {
                Some(held)
            }
        }
    }
}

fn watermark_gt(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Timestamp(x), Value::Timestamp(y)) => x > y,
        (Value::Date(x), Value::Date(y)) => x > y,
        (Value::Timestamp(x), Value::Date(y)) => {
            y.and_hms_opt(0, 0, 0).map(|ts| *x > ts).unwrap_or(false)
        }
        (Value::Date(x), Value::Timestamp(y)) => {
            x.and_hms_opt(0, 0, 0).map(|ts| ts > *y).unwrap_or(false)
        }
        (Value::Int(x), Value::Int(y)) => x > y,
        (Value::Uint(x), Value::Uint(y)) => x > y,
        _ => a.encode_text() > b.encode_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn ts(y: i32, m: u32, d: u32) -> Value {
        Value::Timestamp(
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn watermark_picks_the_greatest_non_null() {
        // MAX(ProcDate) = 2024-01-07, MAX(DateTStamp) = 2024-01-06.
        let mark = greatest_watermark(None, date(2024, 1, 7));
        let mark = greatest_watermark(mark, ts(2024, 1, 6));
        assert_eq!(mark, Some(date(2024, 1, 7)));
    }

    #[test]
    fn null_maxes_are_ignored() {
        let mark = greatest_watermark(None, Value::Null);
        assert_eq!(mark, None);
        let mark = greatest_watermark(Some(date(2024, 1, 7)), Value::Null);
        assert_eq!(mark, Some(date(2024, 1, 7)));
    }

    #[test]
    fn mixed_date_and_timestamp_compare_chronologically() {
        assert!(watermark_gt(&ts(2024, 2, 1), &date(2024, 1, 7)));
        assert!(!watermark_gt(&date(2024, 1, 7), &ts(2024, 2, 1)));
    }

    #[test]
    fn duplicate_names_run_once() {
        let names = dedupe(vec![
            "patient".to_string(),
            "claim".to_string(),
            "patient".to_string(),
        ]);
        assert_eq!(names, vec!["patient".to_string(), "claim".to_string()]);
    }
}
