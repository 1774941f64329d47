use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-table outcome persisted in the tracking tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Success,
    Failed,
    Running,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Success => "success",
            StatusKind::Failed => "failed",
            StatusKind::Running => "running",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(StatusKind::Success),
            "failed" => Some(StatusKind::Failed),
            "running" => Some(StatusKind::Running),
            _ => None,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of `etl_copy_status` in the replication MySQL database. Owned by
/// the replicator; one row per table, upserted on every copy attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyStatus {
    pub table_name: String,
    /// UTC wall-clock time of the copy attempt.
    pub last_copied: NaiveDateTime,
    pub rows_copied: u64,
    pub copy_status: StatusKind,
    /// High-water mark of the primary incremental column, when one exists.
    pub last_primary_value: Option<String>,
    pub primary_column_name: Option<String>,
}

/// Row of `etl_load_status` in the analytics Postgres database. Owned by
/// the loader; `last_loaded` is the watermark for incremental loads.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadStatus {
    pub table_name: String,
    pub last_loaded: NaiveDateTime,
    pub rows_loaded: u64,
    pub load_status: StatusKind,
}
