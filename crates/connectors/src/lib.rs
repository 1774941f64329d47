pub mod error;
pub mod factory;
pub mod gate;
pub mod manager;
pub mod mysql;
pub mod postgres;
pub mod query;
pub mod reader;
pub mod retry;

pub use error::{ConnectorError, DbError};
pub use reader::{MySqlBatchReader, ReadPlan};
pub use manager::mysql::MySqlConnectionManager;
pub use manager::postgres::PgConnectionManager;
