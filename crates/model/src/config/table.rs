use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;

/// Batch sizes outside this window thrash either the source server or the
/// driver; out-of-range configuration is clamped, not rejected.
pub const MIN_BATCH_SIZE: u32 = 1_000;
pub const MAX_BATCH_SIZE: u32 = 100_000;
pub const DEFAULT_BATCH_SIZE: u32 = 5_000;
pub const DEFAULT_TIME_GAP_DAYS: u32 = 30;

/// How a table is pulled out of the source database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    #[default]
    FullTable,
    Incremental,
    IncrementalChunked,
}

/// Coarse size bucket assigned by the schema analyzer; drives batch sizing
/// and the loader's copy strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceCategory {
    Tiny,
    Small,
    #[default]
    Medium,
    Large,
    Xlarge,
}

impl PerformanceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceCategory::Tiny => "tiny",
            PerformanceCategory::Small => "small",
            PerformanceCategory::Medium => "medium",
            PerformanceCategory::Large => "large",
            PerformanceCategory::Xlarge => "xlarge",
        }
    }
}

impl fmt::Display for PerformanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TableImportance {
    Critical,
    Important,
    Audit,
    Reference,
    #[default]
    Standard,
}

impl TableImportance {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableImportance::Critical => "critical",
            TableImportance::Important => "important",
            TableImportance::Audit => "audit",
            TableImportance::Reference => "reference",
            TableImportance::Standard => "standard",
        }
    }
}

/// One column as captured by the schema analyzer.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub alert_on_failure: bool,
    #[serde(default)]
    pub alert_on_slow_extraction: bool,
}

/// Per-table record from `tables.yml`. Owned by the schema analyzer;
/// the pipeline treats it as read-only input.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TableConfig {
    /// Filled in from the map key by the config loader, not the YAML body.
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub table_importance: TableImportance,
    #[serde(default)]
    pub extraction_strategy: ExtractionStrategy,
    #[serde(default)]
    pub performance_category: PerformanceCategory,
    #[serde(
        default = "default_priority",
        deserialize_with = "deserialize_priority"
    )]
    pub processing_priority: u8,
    #[serde(default)]
    pub estimated_rows: u64,
    #[serde(default)]
    pub estimated_size_mb: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default)]
    pub primary_incremental_column: Option<String>,
    #[serde(default)]
    pub incremental_columns: Vec<String>,
    #[serde(default = "default_time_gap")]
    pub time_gap_threshold_days: u32,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub schema_hash: Option<String>,
    #[serde(default, alias = "primary_key", deserialize_with = "deserialize_keys")]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

fn default_priority() -> u8 {
    5
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_time_gap() -> u32 {
    DEFAULT_TIME_GAP_DAYS
}

/// `processing_priority` is an integer 1..10 in current analyzer output,
/// but older files carry the aliases `high`/`medium`/`low`.
fn deserialize_priority<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Alias(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n.clamp(1, 10) as u8),
        Raw::Alias(s) => match s.as_str() {
            "high" => Ok(1),
            "medium" => Ok(5),
            "low" => Ok(10),
            other => Err(serde::de::Error::custom(format!(
                "invalid processing_priority alias `{other}`"
            ))),
        },
    }
}

/// `primary_keys` is a list, but the `primary_key` alias in older files
/// holds a single column name.
fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    match Raw::deserialize(deserializer)? {
        Raw::One(s) => Ok(vec![s]),
        Raw::Many(v) => Ok(v),
    }
}

impl TableConfig {
    /// Configured batch size clamped into the supported window.
    pub fn effective_batch_size(&self) -> u32 {
        self.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
    }

    /// The primary incremental column, treating the literal `"none"` left
    /// behind by older analyzer runs as absent.
    pub fn primary_incremental_column(&self) -> Option<&str> {
        match self.primary_incremental_column.as_deref() {
            Some(col) if !col.is_empty() && !col.eq_ignore_ascii_case("none") => Some(col),
            _ => None,
        }
    }

    pub fn has_incremental_columns(&self) -> bool {
        !self.incremental_columns.is_empty()
    }

    pub fn is_large(&self) -> bool {
        matches!(
            self.performance_category,
            PerformanceCategory::Large | PerformanceCategory::Xlarge
        ) || self.estimated_size_mb > 100.0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Whether `name` appears in the analyzer-captured schema. Every
    /// identifier interpolated into SQL for this table must pass this
    /// check; values always go through parameter binding.
    pub fn is_known_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
            || self.primary_keys.iter().any(|k| k.eq_ignore_ascii_case(name))
    }
}

/// `metadata` block at the top of `tables.yml`. Read-only provenance.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct TablesMetadata {
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub source_database: Option<String>,
    #[serde(default)]
    pub total_tables: Option<u64>,
    #[serde(default)]
    pub configuration_version: Option<String>,
    #[serde(default)]
    pub analyzer_version: Option<String>,
    #[serde(default)]
    pub schema_hash: Option<String>,
    #[serde(default)]
    pub analysis_timestamp: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
}

/// The whole `tables.yml` document. BTreeMap keeps table iteration
/// deterministic.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct TablesFile {
    #[serde(default)]
    pub metadata: TablesMetadata,
    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,
}
