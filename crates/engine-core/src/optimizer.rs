use chrono::{NaiveDateTime, Utc};
use model::config::table::{PerformanceCategory, TableConfig, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// A copy is flagged as slow when its rate falls below this fraction of
/// the category's expected throughput.
const SLOW_RATE_FRACTION: f64 = 0.5;

/// Batch ceiling for tiny tables; anything larger buys nothing.
const TINY_BATCH_CAP: u32 = 25_000;

/// Floor for large-table batches.
const LARGE_BATCH_FLOOR: u32 = 50_000;

/// Stateless sizing and strategy decisions, plus process-local rate
/// history kept for diagnostics only.
#[derive(Default)]
pub struct PerformanceOptimizer {
    history: Mutex<HashMap<String, Vec<f64>>>,
}

impl PerformanceOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch size for one table, always within
    /// `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`. Large tables are biased
    /// upward; tiny tables are capped; for small tables the configured
    /// `batch_size` is the upper bound.
    pub fn calculate_adaptive_batch_size(&self, cfg: &TableConfig) -> u32 {
        let base = cfg.effective_batch_size();
        let sized = if cfg.is_large() {
            base.max(LARGE_BATCH_FLOOR)
        } else {
            match cfg.performance_category {
                PerformanceCategory::Tiny => base.min(TINY_BATCH_CAP),
                _ => base,
            }
        };
        sized.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
    }

    /// Whether the next copy must be a full refresh. True when the table
    /// has no incremental configuration at all, or when the watermark is
    /// older than `time_gap_threshold_days` (the recovery path for
    /// backdated edits an incremental copy misses by construction).
    pub fn should_use_full_refresh(
        &self,
        cfg: &TableConfig,
        last_watermark: Option<NaiveDateTime>,
    ) -> bool {
        if cfg.primary_incremental_column().is_none() && !cfg.has_incremental_columns() {
            return true;
        }

        if let Some(watermark) = last_watermark {
            let gap = Utc::now().naive_utc() - watermark;
            if gap.num_days() > i64::from(cfg.time_gap_threshold_days) {
                debug!(
                    table = %cfg.table_name,
                    gap_days = gap.num_days(),
                    threshold = cfg.time_gap_threshold_days,
                    "watermark gap exceeds threshold, forcing full refresh"
                );
                return true;
            }
        }

        false
    }

    /// Expected sustained throughput per category, records per second.
    pub fn expected_rate_for(&self, category: PerformanceCategory) -> u64 {
        match category {
            PerformanceCategory::Tiny => 10_000,
            PerformanceCategory::Small => 8_000,
            PerformanceCategory::Medium => 5_000,
            PerformanceCategory::Large => 3_000,
            PerformanceCategory::Xlarge => 2_000,
        }
    }

    /// Whether an observed rate is far enough below the expected band to
    /// warrant a slow-extraction alert.
    pub fn is_slow(&self, category: PerformanceCategory, actual_rate: f64) -> bool {
        actual_rate < self.expected_rate_for(category) as f64 * SLOW_RATE_FRACTION
    }

    /// Records one copy's throughput and returns the rate. History is
    /// process-local and never consulted for correctness.
    pub fn record(&self, table: &str, rows: u64, elapsed: Duration) -> f64 {
        let rate = if elapsed.as_secs_f64() > 0.0 {
            rows as f64 / elapsed.as_secs_f64()
        } else {
            rows as f64
        };
        if let Ok(mut history) = self.history.lock() {
            history.entry(table.to_string()).or_default().push(rate);
        }
        rate
    }

    pub fn average_rate(&self, table: &str) -> Option<f64> {
        let history = self.history.lock().ok()?;
        let rates = history.get(table)?;
        if rates.is_empty() {
            return None;
        }
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn cfg(json: &str) -> TableConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn batch_size_is_always_in_bounds() {
        let optimizer = PerformanceOptimizer::new();
        let cases = [
            r#"{}"#,
            r#"{"batch_size": 1}"#,
            r#"{"batch_size": 1000000}"#,
            r#"{"performance_category": "tiny", "batch_size": 90000}"#,
            r#"{"performance_category": "xlarge"}"#,
            r#"{"estimated_size_mb": 500.0}"#,
        ];
        for case in cases {
            let size = optimizer.calculate_adaptive_batch_size(&cfg(case));
            assert!((MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size), "case {case}: {size}");
        }
    }

    #[test]
    fn large_tables_bias_upward() {
        let optimizer = PerformanceOptimizer::new();
        let size = optimizer.calculate_adaptive_batch_size(&cfg(
            r#"{"performance_category": "large", "batch_size": 5000}"#,
        ));
        assert_eq!(size, 50_000);
    }

    #[test]
    fn tiny_tables_are_capped() {
        let optimizer = PerformanceOptimizer::new();
        let size = optimizer.calculate_adaptive_batch_size(&cfg(
            r#"{"performance_category": "tiny", "batch_size": 80000}"#,
        ));
        assert_eq!(size, 25_000);
    }

    #[test]
    fn small_tables_keep_their_configured_bound() {
        let optimizer = PerformanceOptimizer::new();
        let size = optimizer.calculate_adaptive_batch_size(&cfg(
            r#"{"performance_category": "small", "batch_size": 2000}"#,
        ));
        assert_eq!(size, 2_000);
    }

    #[test]
    fn no_incremental_config_forces_full_refresh() {
        let optimizer = PerformanceOptimizer::new();
        assert!(optimizer.should_use_full_refresh(&cfg("{}"), None));
        assert!(optimizer.should_use_full_refresh(
            &cfg(r#"{"primary_incremental_column": "none"}"#),
            None
        ));
        assert!(!optimizer.should_use_full_refresh(
            &cfg(r#"{"primary_incremental_column": "DateTStamp"}"#),
            None
        ));
        assert!(!optimizer.should_use_full_refresh(
            &cfg(r#"{"incremental_columns": ["ProcDate"]}"#),
            None
        ));
    }

    #[test]
    fn stale_watermark_forces_full_refresh() {
        let optimizer = PerformanceOptimizer::new();
        let table = cfg(
            r#"{"primary_incremental_column": "DateTStamp", "time_gap_threshold_days": 30}"#,
        );

        let recent = Utc::now().naive_utc() - Days::new(2);
        assert!(!optimizer.should_use_full_refresh(&table, Some(recent)));

        let stale = Utc::now().naive_utc() - Days::new(45);
        assert!(optimizer.should_use_full_refresh(&table, Some(stale)));
    }

    #[test]
    fn slow_extraction_threshold() {
        let optimizer = PerformanceOptimizer::new();
        assert!(optimizer.is_slow(PerformanceCategory::Medium, 1_000.0));
        assert!(!optimizer.is_slow(PerformanceCategory::Medium, 4_000.0));
    }

    #[test]
    fn rate_history_averages() {
        let optimizer = PerformanceOptimizer::new();
        optimizer.record("patient", 10_000, Duration::from_secs(2));
        optimizer.record("patient", 20_000, Duration::from_secs(2));
        let avg = optimizer.average_rate("patient").unwrap();
        assert!((avg - 7_500.0).abs() < f64::EPSILON);
        assert_eq!(optimizer.average_rate("claim"), None);
    }
}
