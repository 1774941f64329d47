use crate::error::LoadError;
use crate::strategy::{full_query, incremental_query, select_strategy, LoadStrategy};
use crate::tracking;
use bytes::Bytes;
use chrono::Utc;
use connectors::factory::{self, PgConnector};
use connectors::postgres::copy::encode_line;
use connectors::postgres::PgParamStore;
use connectors::query::{
    pg_copy_from_stdin, pg_count, pg_insert, pg_truncate, pg_upsert, quote_mysql,
};
use connectors::{
    DbError, MySqlBatchReader, MySqlConnectionManager, PgConnectionManager, ReadPlan,
};
use engine_core::scheduler::run_tables;
use engine_core::{ensure_known_columns, PerformanceOptimizer, TableFilter, UnknownColumn};
use etl_config::{AnalyticsSchema, Settings};
use futures_util::{pin_mut, SinkExt};
use model::config::table::{ExtractionStrategy, TableConfig};
use model::core::value::Value;
use model::records::batch::RowBatch;
use model::status::{LoadStatus, StatusKind};
use mysql_async::Pool;
use schema::coerce::coerce_row;
use schema::{SchemaAdapter, SchemaError, TableSchema};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Headroom under the Postgres bind-parameter limit.
const MAX_PG_BIND_PARAMS: usize = 10_000;

#[derive(Debug, Error)]
enum LoadTableError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    UnknownColumn(#[from] UnknownColumn),

    #[error("table has no captured column list")]
    MissingColumns,

    #[error("SHOW CREATE TABLE returned no DDL")]
    MissingDdl,

    #[error("load cancelled")]
    Cancelled,
}

/// Loads configured tables from the replication database into the
/// analytics warehouse. Schema translation happens up front; rows pass
/// through the type-coercion hook on the way in.
#[derive(Clone)]
pub struct PostgresLoader {
    settings: Settings,
    replication: Pool,
    /// Analyzer-side connection, used only for boolean sampling.
    source: Pool,
    analytics: PgConnector,
    adapter: Arc<SchemaAdapter>,
    optimizer: Arc<PerformanceOptimizer>,
    cancel: CancellationToken,
}

impl PostgresLoader {
    /// Loader landing rows in the `raw` schema.
    pub fn new(settings: Settings) -> Result<Self, LoadError> {
        Self::with_schema(settings, AnalyticsSchema::Raw)
    }

    pub fn with_schema(settings: Settings, schema: AnalyticsSchema) -> Result<Self, LoadError> {
        let replication = factory::replication_pool(&settings)?;
        let source = factory::source_pool(&settings)?;
        let analytics = factory::analytics_connector(&settings, schema)?;
        Ok(PostgresLoader {
            settings,
            replication,
            source,
            analytics,
            adapter: Arc::new(SchemaAdapter::new(schema)),
            optimizer: Arc::new(PerformanceOptimizer::new()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Loads one table with the strategy chosen from its configuration.
    /// `Err` only for fatal configuration problems; per-table failures
    /// are recorded in `etl_load_status` and returned as `Ok(false)`.
    pub async fn load_table(&self, table: &str, force_full: bool) -> Result<bool, LoadError> {
        self.load_table_with_chunk(table, force_full, None).await
    }

    /// Like [`load_table`](Self::load_table), but forces the chunked
    /// strategy. An explicit `chunk_size` wins over the optimizer.
    pub async fn load_table_chunked(
        &self,
        table: &str,
        force_full: bool,
        chunk_size: Option<u32>,
    ) -> Result<bool, LoadError> {
        let mut analytics = PgConnectionManager::new(self.analytics.clone());
        tracking::ensure_exists(&mut analytics).await?;
        let ok = self
            .load_with_status(
                &mut analytics,
                table,
                force_full,
                Some(LoadStrategy::ChunkedStreaming),
                chunk_size,
            )
            .await;
        analytics.close().await;
        Ok(ok)
    }

    async fn load_table_with_chunk(
        &self,
        table: &str,
        force_full: bool,
        chunk_size: Option<u32>,
    ) -> Result<bool, LoadError> {
        let mut analytics = PgConnectionManager::new(self.analytics.clone());
        tracking::ensure_exists(&mut analytics).await?;
        let ok = self
            .load_with_status(&mut analytics, table, force_full, None, chunk_size)
            .await;
        analytics.close().await;
        Ok(ok)
    }

    /// Loads a set of tables with up to `max_workers` in parallel
    /// (default: `general.parallel_jobs`).
    pub async fn load_tables(
        &self,
        filter: TableFilter,
        force_full: bool,
        max_workers: Option<usize>,
    ) -> Result<HashMap<String, bool>, LoadError> {
        let mut analytics = PgConnectionManager::new(self.analytics.clone());
        tracking::ensure_exists(&mut analytics).await?;
        analytics.close().await;

        let names = dedupe(filter.resolve(&self.settings.tables()));
        let workers = max_workers
            .unwrap_or(self.settings.pipeline().general.parallel_jobs)
            .max(1);
        info!(tables = names.len(), workers, "starting load batch");

        let loader = self.clone();
        let results = run_tables(names, workers, self.cancel.clone(), move |name| {
            let loader = loader.clone();
            async move { loader.load_table_worker(&name, force_full).await }
        })
        .await;
        Ok(results)
    }

    /// Advisory row-count check: equal counts on both sides of the load.
    pub async fn verify_load(&self, table: &str) -> Result<bool, LoadError> {
        let (replication_count, analytics_count) = self.count_both_sides(table).await?;
        let matched = replication_count == analytics_count;
        if !matched {
            warn!(
                table,
                replication = replication_count,
                analytics = analytics_count,
                "row count mismatch"
            );
        }
        Ok(matched)
    }

    /// Per-table `(replication, analytics)` row counts, for operational
    /// audits.
    pub async fn audit_counts(
        &self,
        tables: &[String],
    ) -> Result<HashMap<String, (u64, u64)>, LoadError> {
        let mut counts = HashMap::new();
        for table in tables {
            counts.insert(table.clone(), self.count_both_sides(table).await?);
        }
        Ok(counts)
    }

    async fn count_both_sides(&self, table: &str) -> Result<(u64, u64), LoadError> {
        let mut replication = MySqlConnectionManager::new(self.replication.clone());
        let replication_count = replication
            .query_scalar(
                &format!("SELECT COUNT(*) FROM {}", quote_mysql(table)),
                &[],
            )
            .await?
            .as_u64()
            .unwrap_or(0);
        replication.close().await;

        let mut analytics = PgConnectionManager::new(self.analytics.clone());
        let analytics_count = analytics
            .query_scalar(&pg_count(self.adapter.schema().as_str(), table), &[])
            .await?
            .as_u64()
            .unwrap_or(0);
        analytics.close().await;

        Ok((replication_count, analytics_count))
    }

    async fn load_table_worker(&self, table: &str, force_full: bool) -> bool {
        let mut analytics = PgConnectionManager::new(self.analytics.clone());
        let ok = self
            .load_with_status(&mut analytics, table, force_full, None, None)
            .await;
        analytics.close().await;
        ok
    }

    async fn load_with_status(
        &self,
        analytics: &mut PgConnectionManager,
        table: &str,
        force_full: bool,
        strategy_override: Option<LoadStrategy>,
        chunk_size: Option<u32>,
    ) -> bool {
        let cfg = match self.settings.table_config(table) {
            Ok(cfg) => cfg.clone(),
            Err(_) => {
                warn!(table, "no configuration for table, skipping");
                return false;
            }
        };

        let started = Instant::now();
        let result = self
            .load_table_inner(analytics, &cfg, force_full, strategy_override, chunk_size)
            .await;

        match result {
            Ok(rows_loaded) => {
                let status = LoadStatus {
                    table_name: table.to_string(),
                    last_loaded: Utc::now().naive_utc(),
                    rows_loaded,
                    load_status: StatusKind::Success,
                };
                if let Err(err) = tracking::upsert(analytics, &status).await {
                    error!(table, %err, "failed to record load status");
                    return false;
                }
                info!(
                    table,
                    rows = rows_loaded,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "load complete"
                );
                true
            }
            Err(err) => {
                if cfg.monitoring.alert_on_failure {
                    error!(table, %err, alert = true, "table load failed");
                } else {
                    error!(table, %err, "table load failed");
                }
                let status = tracking::failed(table, Utc::now().naive_utc());
                if let Err(status_err) = tracking::upsert(analytics, &status).await {
                    error!(table, %status_err, "failed to record failed load status");
                }
                false
            }
        }
    }

    async fn load_table_inner(
        &self,
        analytics: &mut PgConnectionManager,
        cfg: &TableConfig,
        force_full: bool,
        strategy_override: Option<LoadStrategy>,
        chunk_size: Option<u32>,
    ) -> Result<u64, LoadTableError> {
        if cfg.columns.is_empty() {
            return Err(LoadTableError::MissingColumns);
        }

        tracking::upsert(
            analytics,
            &tracking::running(&cfg.table_name, Utc::now().naive_utc()),
        )
        .await?;

        let mut replication = MySqlConnectionManager::new(self.replication.clone());
        let result = self
            .load_table_stages(
                analytics,
                &mut replication,
                cfg,
                force_full,
                strategy_override,
                chunk_size,
            )
            .await;
        replication.close().await;
        result
    }

    async fn load_table_stages(
        &self,
        analytics: &mut PgConnectionManager,
        replication: &mut MySqlConnectionManager,
        cfg: &TableConfig,
        force_full: bool,
        strategy_override: Option<LoadStrategy>,
        chunk_size: Option<u32>,
    ) -> Result<u64, LoadTableError> {
        // Current source-side DDL drives schema translation.
        let ddl = self.fetch_ddl(replication, &cfg.table_name).await?;
        let mut sampler = MySqlConnectionManager::new(self.source.clone());
        let resolved = self
            .adapter
            .ensure_table_exists(analytics, Some(&mut sampler), &cfg.table_name, &ddl)
            .await;
        sampler.close().await;
        let resolved = resolved?;

        let strategy = strategy_override.unwrap_or_else(|| select_strategy(cfg));
        let batch_size = chunk_size.unwrap_or_else(|| self.optimizer.calculate_adaptive_batch_size(cfg));

        let inc_columns = self.incremental_columns(cfg)?;
        let watermark = if force_full || inc_columns.is_empty() {
            None
        } else {
            tracking::last_loaded(analytics, &cfg.table_name).await?
        };
        let full_load =
            force_full || cfg.extraction_strategy == ExtractionStrategy::FullTable || watermark.is_none();

        debug!(
            table = %cfg.table_name,
            ?strategy,
            batch_size,
            full_load,
            "starting load"
        );

        let columns = cfg.column_names();
        let params: Vec<Value> = match watermark {
            Some(ts) if !full_load => vec![Value::Timestamp(ts); inc_columns.len()],
            _ => Vec::new(),
        };

        match strategy {
            LoadStrategy::Standard => {
                let sql = if full_load {
                    full_query(&cfg.table_name, &columns, &cfg.primary_keys)
                } else {
                    incremental_query(&cfg.table_name, &columns, &inc_columns, &cfg.primary_keys)
                };
                let batch = replication.query(&sql, &params).await?;
                let rows = batch.len() as u64;
                self.write_transaction(analytics, cfg, &resolved, &columns, batch, full_load, full_load)
                    .await?;
                Ok(rows)
            }
            LoadStrategy::StandardBatched | LoadStrategy::ChunkedStreaming => {
                let use_copy = strategy == LoadStrategy::ChunkedStreaming && full_load;
                let base_sql = if full_load {
                    full_query(&cfg.table_name, &columns, &cfg.primary_keys)
                } else {
                    incremental_query(&cfg.table_name, &columns, &inc_columns, &cfg.primary_keys)
                };
                let plan = ReadPlan::Paged {
                    base_sql,
                    params: params.clone(),
                };
                let mut reader = MySqlBatchReader::new(replication, plan, batch_size);

                let mut rows_loaded = 0u64;
                let mut first = true;
                loop {
                    self.check_cancelled()?;
                    let Some(batch) = reader.read_batch().await? else {
                        break;
                    };
                    let truncate = full_load && first;
                    rows_loaded += batch.len() as u64;
                    if use_copy {
                        self.write_copy_chunk(analytics, cfg, &resolved, &columns, batch, truncate)
                            .await?;
                    } else {
                        self.write_transaction(
                            analytics, cfg, &resolved, &columns, batch, truncate, full_load,
                        )
                        .await?;
                    }
                    first = false;
                }

                // A full refresh of a source that emptied out still has
                // to clear the target.
                if first && full_load {
                    self.truncate_only(analytics, &cfg.table_name).await?;
                }
                Ok(rows_loaded)
            }
        }
    }

    fn incremental_columns(&self, cfg: &TableConfig) -> Result<Vec<String>, LoadTableError> {
        let columns: Vec<String> = if cfg.has_incremental_columns() {
            cfg.incremental_columns.clone()
        } else if let Some(primary) = cfg.primary_incremental_column() {
            vec![primary.to_string()]
        } else {
            Vec::new()
        };
        let refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        ensure_known_columns(cfg, &refs)?;
        Ok(columns)
    }

    async fn fetch_ddl(
        &self,
        replication: &mut MySqlConnectionManager,
        table: &str,
    ) -> Result<String, LoadTableError> {
        let batch = replication
            .query(&format!("SHOW CREATE TABLE {}", quote_mysql(table)), &[])
            .await?;
        if batch.is_empty() {
            return Err(LoadTableError::MissingDdl);
        }
        match batch.value(0, "Create Table") {
            Value::String(ddl) => Ok(ddl),
            _ => Err(LoadTableError::MissingDdl),
        }
    }

    async fn truncate_only(
        &self,
        analytics: &mut PgConnectionManager,
        table: &str,
    ) -> Result<(), LoadTableError> {
        let schema_name = self.adapter.schema().as_str().to_string();
        let client = analytics.client().await?;
        let tx = client.transaction().await.map_err(DbError::Pg)?;
        tx.batch_execute(&pg_truncate(&schema_name, table))
            .await
            .map_err(DbError::Pg)?;
        tx.commit().await.map_err(DbError::Pg)?;
        Ok(())
    }

    /// One transaction: optional truncate, then parameterized writes.
    /// Full loads append plain inserts into the just-truncated table;
    /// incremental loads upsert on the primary key when there is one.
    async fn write_transaction(
        &self,
        analytics: &mut PgConnectionManager,
        cfg: &TableConfig,
        resolved: &TableSchema,
        columns: &[&str],
        batch: RowBatch,
        truncate: bool,
        plain_insert: bool,
    ) -> Result<(), LoadTableError> {
        let schema_name = self.adapter.schema().as_str().to_string();
        let rows_per_statement = (MAX_PG_BIND_PARAMS / columns.len().max(1)).max(1);

        let client = analytics.client().await?;
        let tx = client.transaction().await.map_err(DbError::Pg)?;

        if truncate {
            tx.batch_execute(&pg_truncate(&schema_name, &cfg.table_name))
                .await
                .map_err(DbError::Pg)?;
        }

        for chunk in batch.rows.chunks(rows_per_statement) {
            let sql = if plain_insert || cfg.primary_keys.is_empty() {
                pg_insert(&schema_name, &cfg.table_name, columns, chunk.len())
            } else {
                pg_upsert(
                    &schema_name,
                    &cfg.table_name,
                    columns,
                    &cfg.primary_keys,
                    chunk.len(),
                )
            };
            let values: Vec<Value> = chunk
                .iter()
                .flat_map(|row| coerce_row(resolved, &batch.columns, row.clone()))
                .collect();
            let store = PgParamStore::from_values(values);
            tx.execute(&sql, &store.as_refs()).await.map_err(DbError::Pg)?;
        }

        tx.commit().await.map_err(DbError::Pg)?;
        Ok(())
    }

    /// One transaction per chunk on the COPY wire protocol, for
    /// full-refresh streaming of big tables.
    async fn write_copy_chunk(
        &self,
        analytics: &mut PgConnectionManager,
        cfg: &TableConfig,
        resolved: &TableSchema,
        columns: &[&str],
        batch: RowBatch,
        truncate: bool,
    ) -> Result<(), LoadTableError> {
        let schema_name = self.adapter.schema().as_str().to_string();

        let client = analytics.client().await?;
        let tx = client.transaction().await.map_err(DbError::Pg)?;

        if truncate {
            tx.batch_execute(&pg_truncate(&schema_name, &cfg.table_name))
                .await
                .map_err(DbError::Pg)?;
        }

        let statement = pg_copy_from_stdin(&schema_name, &cfg.table_name, columns);
        let sink = tx.copy_in(&statement).await.map_err(DbError::Pg)?;
        pin_mut!(sink);

        for row in &batch.rows {
            let coerced = coerce_row(resolved, &batch.columns, row.clone());
            sink.as_mut()
                .send(Bytes::from(encode_line(&coerced)))
                .await
                .map_err(DbError::Pg)?;
        }
        sink.as_mut().close().await.map_err(DbError::Pg)?;

        tx.commit().await.map_err(DbError::Pg)?;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), LoadTableError> {
        if self.cancel.is_cancelled() {
            return Err(LoadTableError::Cancelled);
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
