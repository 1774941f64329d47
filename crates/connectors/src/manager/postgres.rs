use crate::error::DbError;
use crate::factory::PgConnector;
use crate::gate::RateGate;
use crate::postgres::{decode_row, PgParamStore};
use crate::retry::{classify_db_error, RetryDisposition, RetryPolicy};
use etl_config::AnalyticsSchema;
use model::core::value::Value;
use model::records::batch::RowBatch;
use tokio::time::sleep;
use tokio_postgres::Client;
use tracing::warn;

/// Postgres counterpart of the MySQL manager. `tokio_postgres` has no
/// pool, so a retry reconnects through the stored [`PgConnector`].
pub struct PgConnectionManager {
    connector: PgConnector,
    client: Option<Client>,
    gate: RateGate,
    policy: RetryPolicy,
}

impl PgConnectionManager {
    pub fn new(connector: PgConnector) -> Self {
        Self::with_policy(connector, RetryPolicy::for_queries())
    }

    pub fn with_policy(connector: PgConnector, policy: RetryPolicy) -> Self {
        PgConnectionManager {
            connector,
            client: None,
            gate: RateGate::default(),
            policy,
        }
    }

    pub fn schema(&self) -> AnalyticsSchema {
        self.connector.schema()
    }

    /// Runs a statement and returns the affected-row count.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let mut attempt = 0;
        loop {
            self.gate.wait().await;
            match self.try_execute(sql, params).await {
                Ok(affected) => return Ok(affected),
                Err(err) => self.handle_failure(err, &mut attempt).await?,
            }
        }
    }

    /// Runs one or more statements with no result, for DDL.
    pub async fn batch_execute(&mut self, sql: &str) -> Result<(), DbError> {
        let mut attempt = 0;
        loop {
            self.gate.wait().await;
            let result = async {
                let client = self.client().await?;
                client.batch_execute(sql).await.map_err(DbError::Pg)
            }
            .await;
            match result {
                Ok(()) => return Ok(()),
                Err(err) => self.handle_failure(err, &mut attempt).await?,
            }
        }
    }

    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<RowBatch, DbError> {
        let mut attempt = 0;
        loop {
            self.gate.wait().await;
            match self.try_query(sql, params).await {
                Ok(batch) => return Ok(batch),
                Err(err) => self.handle_failure(err, &mut attempt).await?,
            }
        }
    }

    /// First column of the first row, `Value::Null` on an empty result.
    pub async fn query_scalar(&mut self, sql: &str, params: &[Value]) -> Result<Value, DbError> {
        let batch = self.query(sql, params).await?;
        Ok(batch
            .rows
            .first()
            .and_then(|row| row.first())
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Direct client access for transactional scopes (COPY, truncate-and-
    /// load). Transaction failures are terminal for the caller; the
    /// manager's retry applies only to its own statement helpers.
    pub async fn client(&mut self) -> Result<&mut Client, DbError> {
        if let Some(ref client) = self.client
            && client.is_closed()
        {
            self.client = None;
        }
        if self.client.is_none() {
            self.client = Some(self.connector.connect().await?);
        }
        Ok(self.client.as_mut().expect("client was just connected"))
    }

    pub async fn close(mut self) {
        self.dispose();
    }

    async fn try_execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        let store = PgParamStore::from_values(params.to_vec());
        let client = self.client().await?;
        let affected = client.execute(sql, &store.as_refs()).await?;
        Ok(affected)
    }

    async fn try_query(&mut self, sql: &str, params: &[Value]) -> Result<RowBatch, DbError> {
        let store = PgParamStore::from_values(params.to_vec());
        let client = self.client().await?;
        let rows = client.query(sql, &store.as_refs()).await?;
        let columns = rows
            .first()
            .map(crate::postgres::column_names)
            .unwrap_or_default();
        let decoded = rows.iter().map(decode_row).collect();
        Ok(RowBatch {
            columns,
            rows: decoded,
        })
    }

    async fn handle_failure(&mut self, err: DbError, attempt: &mut usize) -> Result<(), DbError> {
        if classify_db_error(&err) == RetryDisposition::Stop {
            return Err(err);
        }
        *attempt += 1;
        if *attempt >= self.policy.max_attempts {
            return Err(DbError::RetriesExhausted {
                attempts: *attempt,
                source: Box::new(err),
            });
        }
        warn!(error = %err, attempt, "Postgres query failed, retrying on a fresh connection");
        self.dispose();
        sleep(self.policy.backoff_delay(*attempt - 1)).await;
        Ok(())
    }

    fn dispose(&mut self) {
        // Dropping the client tears down the spawned connection task.
        self.client = None;
    }
}
