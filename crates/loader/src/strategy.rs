use connectors::query::quote_mysql;
use model::config::table::{PerformanceCategory, TableConfig};

/// Size boundary between the in-memory strategy and the batched one.
const STANDARD_MAX_MB: f64 = 50.0;

/// Row-count boundary above which a table streams in chunks regardless
/// of its size estimate.
const CHUNKED_ROW_THRESHOLD: u64 = 1_000_000;

/// How a table moves from the replication database into the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// One extraction query, one transaction.
    Standard,
    /// Paginated extraction, one transaction per batch.
    StandardBatched,
    /// Paginated extraction with COPY-based writes, one transaction per
    /// chunk.
    ChunkedStreaming,
}

pub fn select_strategy(cfg: &TableConfig) -> LoadStrategy {
    if cfg.is_large() || cfg.estimated_rows > CHUNKED_ROW_THRESHOLD {
        return LoadStrategy::ChunkedStreaming;
    }
    if cfg.performance_category == PerformanceCategory::Medium
        || cfg.estimated_size_mb > STANDARD_MAX_MB
    {
        return LoadStrategy::StandardBatched;
    }
    LoadStrategy::Standard
}

fn select_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_mysql(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn order_by(primary_key: &[String]) -> String {
    if primary_key.is_empty() {
        return String::new();
    }
    let list = primary_key
        .iter()
        .map(|c| quote_mysql(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ORDER BY {list}")
}

fn watermark_predicate(inc_columns: &[String]) -> String {
    inc_columns
        .iter()
        .map(|c| format!("{} > ?", quote_mysql(c)))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Whole-table extraction against the replication database.
pub fn full_query(table: &str, columns: &[&str], primary_key: &[String]) -> String {
    format!(
        "SELECT {} FROM {}{}",
        select_list(columns),
        quote_mysql(table),
        order_by(primary_key),
    )
}

/// Incremental extraction: rows past the `loaded_at` watermark on any
/// configured incremental column. One bind of the watermark per column.
pub fn incremental_query(
    table: &str,
    columns: &[&str],
    inc_columns: &[String],
    primary_key: &[String],
) -> String {
    format!(
        "SELECT {} FROM {} WHERE {}{}",
        select_list(columns),
        quote_mysql(table),
        watermark_predicate(inc_columns),
        order_by(primary_key),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(json: &str) -> TableConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn small_tables_load_standard() {
        assert_eq!(
            select_strategy(&cfg(
                r#"{"performance_category": "small", "estimated_size_mb": 10.0}"#
            )),
            LoadStrategy::Standard
        );
        assert_eq!(
            select_strategy(&cfg(r#"{"performance_category": "tiny"}"#)),
            LoadStrategy::Standard
        );
    }

    #[test]
    fn medium_tables_batch() {
        assert_eq!(
            select_strategy(&cfg(
                r#"{"performance_category": "medium", "estimated_size_mb": 80.0}"#
            )),
            LoadStrategy::StandardBatched
        );
        // A small-category table past the standard boundary batches too.
        assert_eq!(
            select_strategy(&cfg(
                r#"{"performance_category": "small", "estimated_size_mb": 70.0}"#
            )),
            LoadStrategy::StandardBatched
        );
    }

    #[test]
    fn big_tables_stream_in_chunks() {
        assert_eq!(
            select_strategy(&cfg(r#"{"performance_category": "xlarge"}"#)),
            LoadStrategy::ChunkedStreaming
        );
        assert_eq!(
            select_strategy(&cfg(
                r#"{"performance_category": "small", "estimated_size_mb": 150.0}"#
            )),
            LoadStrategy::ChunkedStreaming
        );
        assert_eq!(
            select_strategy(&cfg(
                r#"{"performance_category": "small", "estimated_rows": 2000000}"#
            )),
            LoadStrategy::ChunkedStreaming
        );
    }

    #[test]
    fn extraction_queries_are_ordered_and_whitelisted() {
        let sql = full_query("claim", &["ClaimNum", "PatNum"], &["ClaimNum".to_string()]);
        assert_eq!(
            sql,
            "SELECT `ClaimNum`, `PatNum` FROM `claim` ORDER BY `ClaimNum`"
        );

        let sql = incremental_query(
            "procedurelog",
            &["ProcNum", "ProcDate"],
            &["ProcDate".to_string(), "DateTStamp".to_string()],
            &["ProcNum".to_string()],
        );
        assert_eq!(
            sql,
            "SELECT `ProcNum`, `ProcDate` FROM `procedurelog` \
             WHERE `ProcDate` > ? OR `DateTStamp` > ? ORDER BY `ProcNum`"
        );
    }

}
