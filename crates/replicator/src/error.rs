use connectors::{ConnectorError, DbError};
use etl_config::ConfigError;
use thiserror::Error;

/// Fatal replication failures. Per-table data errors never surface here;
/// they are recorded in `etl_copy_status` and reported as a `false`
/// return for the table.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Creating the tracking schema is the deployment's job, not the
    /// replicator's; its absence means the environment is misconfigured.
    #[error("tracking table `{0}` does not exist in the replication database")]
    TrackingTableMissing(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Db(#[from] DbError),
}
