use thiserror::Error;

/// Errors from the query layer.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any MySQL driver error.
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    /// Any Postgres driver error.
    #[error("Postgres error: {0}")]
    Pg(#[from] tokio_postgres::Error),

    /// Reopening the connection for a retry failed.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectorError),

    /// A retryable query kept failing until the attempt budget ran out.
    #[error("query failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: Box<DbError>,
    },

    /// A row did not have the shape the caller expected.
    #[error("row decode error: {0}")]
    Decode(String),

    /// Writing rows failed at the application level.
    #[error("write error: {0}")]
    Write(String),
}

/// Errors happening while building connections or pools.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("MySQL connector creation failed: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("Postgres connection failed: {0}")]
    Pg(#[from] tokio_postgres::Error),

    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] native_tls::Error),

    #[error("invalid connection parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Config(#[from] etl_config::ConfigError),
}
