use connectors::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("could not parse MySQL DDL for `{table}`: {reason}")]
    DdlParse { table: String, reason: String },

    #[error("no columns found in MySQL DDL for `{table}`")]
    NoColumns { table: String },

    #[error(transparent)]
    Db(#[from] DbError),
}
