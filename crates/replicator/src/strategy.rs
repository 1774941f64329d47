use connectors::query::quote_mysql;
use engine_core::PerformanceOptimizer;
use chrono::NaiveDateTime;
use model::config::table::TableConfig;

/// How one table gets copied tonight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStrategy {
    /// Truncate the target and stream everything.
    Full,
    /// Keyset cursor over one ordered column; the target's MAX of that
    /// column is the watermark.
    PrimaryIncremental { column: String },
    /// OR over several candidate columns against a single watermark; no
    /// ordered cursor, so "new" may be a superset of the minimal set.
    MultiColumnIncremental { columns: Vec<String> },
}

/// The decision tree from the table configuration: forced or stale
/// watermarks go full, then the primary column wins, then the
/// multi-column fallback, then full.
pub fn choose_strategy(
    cfg: &TableConfig,
    force_full: bool,
    last_copied: Option<NaiveDateTime>,
    optimizer: &PerformanceOptimizer,
) -> CopyStrategy {
    if force_full || optimizer.should_use_full_refresh(cfg, last_copied) {
        return CopyStrategy::Full;
    }

    if let Some(column) = cfg.primary_incremental_column() {
        return CopyStrategy::PrimaryIncremental {
            column: column.to_string(),
        };
    }

    if cfg.has_incremental_columns() {
        return CopyStrategy::MultiColumnIncremental {
            columns: cfg.incremental_columns.clone(),
        };
    }

    CopyStrategy::Full
}

fn select_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_mysql(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn order_by(columns: &[String]) -> String {
    if columns.is_empty() {
        return String::new();
    }
    let list = columns
        .iter()
        .map(|c| quote_mysql(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ORDER BY {list}")
}

/// Base query for full copies: every column, primary-key ordered for a
/// deterministic stream. The batch reader appends pagination.
pub fn full_select(table: &str, columns: &[&str], primary_key: &[String]) -> String {
    format!(
        "SELECT {} FROM {}{}",
        select_list(columns),
        quote_mysql(table),
        order_by(primary_key),
    )
}

/// First keyset batch when the target holds no watermark yet.
pub fn primary_seed_query(table: &str, columns: &[&str], cursor: &str, batch_size: u32) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY {} LIMIT {batch_size}",
        select_list(columns),
        quote_mysql(table),
        quote_mysql(cursor),
    )
}

/// Keyset batch: everything past the cursor, in cursor order. The bound
/// parameter is the last value seen.
pub fn primary_batch_query(table: &str, columns: &[&str], cursor: &str, batch_size: u32) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} > ? ORDER BY {} LIMIT {batch_size}",
        select_list(columns),
        quote_mysql(table),
        quote_mysql(cursor),
        quote_mysql(cursor),
    )
}

pub fn primary_count_query(table: &str, cursor: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {} > ?",
        quote_mysql(table),
        quote_mysql(cursor),
    )
}

/// `col1 > ? OR col2 > ? ...`, one bind of the same watermark per column.
pub fn multi_column_predicate(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("{} > ?", quote_mysql(c)))
        .collect::<Vec<_>>()
        .join(" OR ")
}

pub fn multi_count_query(table: &str, columns: &[String]) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        quote_mysql(table),
        multi_column_predicate(columns),
    )
}

/// Base query over the OR predicate, primary-key ordered. The batch
/// reader appends pagination.
pub fn multi_select(
    table: &str,
    columns: &[&str],
    predicate_columns: &[String],
    primary_key: &[String],
) -> String {
    format!(
        "SELECT {} FROM {} WHERE {}{}",
        select_list(columns),
        quote_mysql(table),
        multi_column_predicate(predicate_columns),
        order_by(primary_key),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, Utc};

    fn cfg(json: &str) -> TableConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn force_full_wins_over_everything() {
        let optimizer = PerformanceOptimizer::new();
        let table = cfg(r#"{"primary_incremental_column": "DateTStamp"}"#);
        assert_eq!(
            choose_strategy(&table, true, None, &optimizer),
            CopyStrategy::Full
        );
    }

    #[test]
    fn primary_column_takes_precedence() {
        let optimizer = PerformanceOptimizer::new();
        let table = cfg(
            r#"{"primary_incremental_column": "AptDateTime", "incremental_columns": ["AptDateTime", "DateTStamp"]}"#,
        );
        assert_eq!(
            choose_strategy(&table, false, None, &optimizer),
            CopyStrategy::PrimaryIncremental {
                column: "AptDateTime".to_string()
            }
        );
    }

    #[test]
    fn none_literal_falls_back_to_multi_column() {
        let optimizer = PerformanceOptimizer::new();
        let table = cfg(
            r#"{"primary_incremental_column": "none", "incremental_columns": ["ProcDate", "DateTStamp"]}"#,
        );
        assert_eq!(
            choose_strategy(&table, false, None, &optimizer),
            CopyStrategy::MultiColumnIncremental {
                columns: vec!["ProcDate".to_string(), "DateTStamp".to_string()]
            }
        );
    }

    #[test]
    fn no_incremental_config_means_full() {
        let optimizer = PerformanceOptimizer::new();
        assert_eq!(
            choose_strategy(&cfg("{}"), false, None, &optimizer),
            CopyStrategy::Full
        );
    }

    #[test]
    fn stale_watermark_forces_full() {
        let optimizer = PerformanceOptimizer::new();
        let table = cfg(
            r#"{"primary_incremental_column": "DateTStamp", "time_gap_threshold_days": 30}"#,
        );
        let stale = Utc::now().naive_utc() - Days::new(60);
        assert_eq!(
            choose_strategy(&table, false, Some(stale), &optimizer),
            CopyStrategy::Full
        );
    }

    #[test]
    fn keyset_queries_order_by_the_cursor() {
        let sql = primary_batch_query("appointment", &["AptNum", "AptDateTime"], "AptDateTime", 5000);
        assert_eq!(
            sql,
            "SELECT `AptNum`, `AptDateTime` FROM `appointment` WHERE `AptDateTime` > ? \
             ORDER BY `AptDateTime` LIMIT 5000"
        );
        assert_eq!(
            primary_count_query("appointment", "AptDateTime"),
            "SELECT COUNT(*) FROM `appointment` WHERE `AptDateTime` > ?"
        );
    }

    #[test]
    fn or_predicate_binds_once_per_column() {
        let columns = vec!["ProcDate".to_string(), "DateTStamp".to_string()];
        assert_eq!(
            multi_column_predicate(&columns),
            "`ProcDate` > ? OR `DateTStamp` > ?"
        );
        assert_eq!(
            multi_count_query("procedurelog", &columns),
            "SELECT COUNT(*) FROM `procedurelog` WHERE `ProcDate` > ? OR `DateTStamp` > ?"
        );
    }

    #[test]
    fn full_select_is_primary_key_ordered() {
        let sql = full_select("patient", &["PatNum", "LName"], &["PatNum".to_string()]);
        assert_eq!(sql, "SELECT `PatNum`, `LName` FROM `patient` ORDER BY `PatNum`");
    }

    #[test]
    fn multi_select_combines_predicate_and_order() {
        let sql = multi_select(
            "procedurelog",
            &["ProcNum", "ProcDate", "DateTStamp"],
            &["ProcDate".to_string(), "DateTStamp".to_string()],
            &["ProcNum".to_string()],
        );
        assert_eq!(
            sql,
            "SELECT `ProcNum`, `ProcDate`, `DateTStamp` FROM `procedurelog` \
             WHERE `ProcDate` > ? OR `DateTStamp` > ? ORDER BY `ProcNum`"
        );
    }
}
