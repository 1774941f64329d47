use crate::error::ConnectorError;
use crate::postgres::connect_client;
use crate::query::quote_pg;
use etl_config::{AnalyticsSchema, DatabaseType, Settings};
use model::config::pipeline::ConnectionPoolConfig;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts};
use std::time::Duration;
use tokio_postgres::Client;
use tracing::debug;

/// Pooled handle to the operational OpenDental database.
pub fn source_pool(settings: &Settings) -> Result<Pool, ConnectorError> {
    mysql_pool(settings, DatabaseType::Source)
}

/// Pooled handle to the replication staging database.
pub fn replication_pool(settings: &Settings) -> Result<Pool, ConnectorError> {
    mysql_pool(settings, DatabaseType::Replication)
}

fn mysql_pool(settings: &Settings, db_type: DatabaseType) -> Result<Pool, ConnectorError> {
    let conn = settings.database_config(db_type, None)?;
    let pool_cfg = pool_config(settings, db_type);

    let constraints = PoolConstraints::new(1, pool_cfg.pool_size).ok_or_else(|| {
        ConnectorError::InvalidParameter(format!(
            "pool_size {} for the {db_type} database",
            pool_cfg.pool_size
        ))
    })?;

    let opts: Opts = OptsBuilder::default()
        .ip_or_hostname(conn.host)
        .tcp_port(conn.port)
        .db_name(Some(conn.database))
        .user(Some(conn.user))
        .pass(Some(conn.password))
        .conn_ttl(Duration::from_secs(pool_cfg.pool_recycle))
        .pool_opts(PoolOpts::default().with_constraints(constraints))
        .into();

    debug!(database = %db_type, "created MySQL pool");
    Ok(Pool::new(opts))
}

fn pool_config(settings: &Settings, db_type: DatabaseType) -> ConnectionPoolConfig {
    let connections = &settings.pipeline().connections;
    match db_type {
        DatabaseType::Source => connections.source.clone(),
        DatabaseType::Replication => connections.replication.clone(),
        DatabaseType::Analytics => connections.analytics.clone(),
    }
}

/// Reconnectable description of one analytics connection. The loader's
/// connection manager opens (and reopens, on retry) clients from this.
#[derive(Clone)]
pub struct PgConnector {
    config: tokio_postgres::Config,
    schema: AnalyticsSchema,
}

impl PgConnector {
    pub fn schema(&self) -> AnalyticsSchema {
        self.schema
    }

    /// Opens a client and binds its `search_path` to the schema.
    pub async fn connect(&self) -> Result<Client, ConnectorError> {
        let client = connect_client(&self.config).await?;
        client
            .batch_execute(&format!(
                "SET search_path TO {}",
                quote_pg(self.schema.as_str())
            ))
            .await
            .map_err(ConnectorError::Pg)?;
        Ok(client)
    }
}

/// Connection description for the analytics warehouse, bound to `schema`.
pub fn analytics_connector(
    settings: &Settings,
    schema: AnalyticsSchema,
) -> Result<PgConnector, ConnectorError> {
    let conn = settings.database_config(DatabaseType::Analytics, Some(schema))?;
    let pool_cfg = pool_config(settings, DatabaseType::Analytics);

    let mut config = tokio_postgres::Config::new();
    config
        .host(&conn.host)
        .port(conn.port)
        .dbname(&conn.database)
        .user(&conn.user)
        .password(&conn.password)
        .application_name(&settings.pipeline().general.pipeline_name)
        .connect_timeout(Duration::from_secs(pool_cfg.connect_timeout));

    Ok(PgConnector { config, schema })
}

pub fn raw_connector(settings: &Settings) -> Result<PgConnector, ConnectorError> {
    analytics_connector(settings, AnalyticsSchema::Raw)
}

pub fn staging_connector(settings: &Settings) -> Result<PgConnector, ConnectorError> {
    analytics_connector(settings, AnalyticsSchema::Staging)
}

pub fn intermediate_connector(settings: &Settings) -> Result<PgConnector, ConnectorError> {
    analytics_connector(settings, AnalyticsSchema::Intermediate)
}

pub fn marts_connector(settings: &Settings) -> Result<PgConnector, ConnectorError> {
    analytics_connector(settings, AnalyticsSchema::Marts)
}
