pub mod adapter;
pub mod coerce;
pub mod ddl;
pub mod error;
pub mod translate;

pub use adapter::{PgColumn, SchemaAdapter, TableSchema};
pub use error::SchemaError;
