use connectors::{ConnectorError, DbError};
use etl_config::ConfigError;
use schema::SchemaError;
use thiserror::Error;

/// Fatal loading failures. Per-table data errors are recorded in
/// `etl_load_status` and reported as a `false` return for the table.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}
