use crate::environment::{ETL_ENVIRONMENT_VAR, Environment};
use crate::error::ConfigError;
use model::config::pipeline::PipelineConfig;
use model::config::table::TablesFile;
use serde_yaml::Value as YamlValue;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Source of the three configuration sections: pipeline settings, table
/// definitions and environment variables. Production uses the file
/// provider; tests inject a dictionary provider.
pub trait ConfigProvider: Send + Sync {
    fn pipeline(&self) -> &PipelineConfig;
    fn tables(&self) -> &TablesFile;
    fn env_var(&self, name: &str) -> Option<String>;
}

/// Reads `pipeline.yml` and `tables.yml` from a configuration directory
/// once at construction, and merges the process environment with the
/// `.env_<environment>` file selected by `ETL_ENVIRONMENT`.
pub struct FileConfigProvider {
    pipeline: PipelineConfig,
    tables: TablesFile,
    env: HashMap<String, String>,
}

impl FileConfigProvider {
    pub fn load(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_inner(config_dir.as_ref(), false)
    }

    /// Like [`load`](Self::load), but rejects unknown per-table fields
    /// instead of ignoring them.
    pub fn load_strict(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_inner(config_dir.as_ref(), true)
    }

    fn load_inner(config_dir: &Path, strict: bool) -> Result<Self, ConfigError> {
        let environment = process_environment()?;
        let env = load_env_map(config_dir, environment)?;

        let pipeline_path = config_dir.join("pipeline.yml");
        let pipeline = read_yaml::<PipelineConfig>("pipeline", &pipeline_path)?;

        let tables_path = config_dir.join("tables.yml");
        let tables_text = std::fs::read_to_string(&tables_path).map_err(|source| {
            ConfigError::ConfigFile {
                section: "tables",
                path: tables_path.display().to_string(),
                source,
            }
        })?;
        let tables = parse_tables_yaml(&tables_text, &tables_path, strict)?;
        debug!(
            tables = tables.tables.len(),
            environment = %environment,
            "loaded configuration from {}",
            config_dir.display()
        );

        Ok(FileConfigProvider {
            pipeline,
            tables,
            env,
        })
    }
}

impl ConfigProvider for FileConfigProvider {
    fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    fn tables(&self) -> &TablesFile {
        &self.tables
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }
}

/// In-memory provider for tests. Never touches the filesystem or the
/// process environment; safe to read from many workers concurrently.
pub struct DictConfigProvider {
    pipeline: PipelineConfig,
    tables: TablesFile,
    env: HashMap<String, String>,
}

impl DictConfigProvider {
    pub fn new(
        pipeline: PipelineConfig,
        tables: TablesFile,
        env: HashMap<String, String>,
    ) -> Self {
        let tables = name_tables(tables);
        DictConfigProvider {
            pipeline,
            tables,
            env,
        }
    }
}

impl ConfigProvider for DictConfigProvider {
    fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    fn tables(&self) -> &TablesFile {
        &self.tables
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }
}

fn process_environment() -> Result<Environment, ConfigError> {
    let raw = std::env::var(ETL_ENVIRONMENT_VAR).map_err(|_| ConfigError::EnvironmentUnset)?;
    Environment::parse(&raw)
}

/// Environment-file values fill the gaps; the process environment wins on
/// conflict.
fn load_env_map(
    config_dir: &Path,
    environment: Environment,
) -> Result<HashMap<String, String>, ConfigError> {
    let mut env = HashMap::new();

    let env_file: PathBuf = config_dir.join(environment.env_file_name());
    if env_file.exists() {
        let iter = dotenvy::from_filename_iter(&env_file).map_err(|source| {
            ConfigError::EnvFile {
                path: env_file.display().to_string(),
                source,
            }
        })?;
        for item in iter {
            let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                path: env_file.display().to_string(),
                source,
            })?;
            env.insert(key, value);
        }
    } else {
        warn!(path = %env_file.display(), "environment file not found, using process environment only");
    }

    env.extend(std::env::vars());
    Ok(env)
}

fn read_yaml<T: serde::de::DeserializeOwned>(
    section: &'static str,
    path: &Path,
) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ConfigFile {
        section,
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::ConfigParse {
        section,
        path: path.display().to_string(),
        source,
    })
}

/// Per-table keys the analyzer is known to emit. Anything else is a
/// forward-compatibility concern in lenient mode and an error in strict
/// mode.
const KNOWN_TABLE_KEYS: [&str; 15] = [
    "table_name",
    "table_importance",
    "extraction_strategy",
    "performance_category",
    "processing_priority",
    "estimated_rows",
    "estimated_size_mb",
    "batch_size",
    "primary_incremental_column",
    "incremental_columns",
    "time_gap_threshold_days",
    "monitoring",
    "schema_hash",
    "primary_keys",
    "columns",
];

pub(crate) fn parse_tables_yaml(
    text: &str,
    path: &Path,
    strict: bool,
) -> Result<TablesFile, ConfigError> {
    let doc: YamlValue =
        serde_yaml::from_str(text).map_err(|source| ConfigError::ConfigParse {
            section: "tables",
            path: path.display().to_string(),
            source,
        })?;

    if strict {
        check_unknown_table_keys(&doc)?;
    }

    let tables: TablesFile =
        serde_yaml::from_value(doc).map_err(|source| ConfigError::ConfigParse {
            section: "tables",
            path: path.display().to_string(),
            source,
        })?;
    Ok(name_tables(tables))
}

fn check_unknown_table_keys(doc: &YamlValue) -> Result<(), ConfigError> {
    let Some(tables) = doc.get("tables").and_then(YamlValue::as_mapping) else {
        return Ok(());
    };
    for (table_key, body) in tables {
        let table = table_key.as_str().unwrap_or_default();
        let Some(mapping) = body.as_mapping() else {
            continue;
        };
        for key in mapping.keys() {
            let Some(field) = key.as_str() else { continue };
            // `primary_key` is a still-honored alias from older analyzer output.
            if field == "primary_key" || KNOWN_TABLE_KEYS.contains(&field) {
                continue;
            }
            return Err(ConfigError::UnknownField {
                table: table.to_string(),
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

/// The YAML map key is the table name; copy it into each record.
fn name_tables(mut file: TablesFile) -> TablesFile {
    for (name, cfg) in file.tables.iter_mut() {
        cfg.table_name = name.clone();
    }
    file
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::config::table::{ExtractionStrategy, PerformanceCategory};

    const SAMPLE_TABLES: &str = r#"
metadata:
  generated_at: "2024-06-01T02:00:00"
  source_database: opendental
  total_tables: 2
tables:
  patient:
    table_importance: critical
    extraction_strategy: incremental
    performance_category: small
    processing_priority: high
    primary_incremental_column: DateTStamp
    incremental_columns: [DateTStamp]
    batch_size: 2000
    primary_keys: [PatNum]
    columns:
      - {name: PatNum, type: "bigint(20)", nullable: false, primary_key: true}
      - {name: LName, type: "varchar(100)"}
      - {name: DateTStamp, type: timestamp}
  procedurelog:
    extraction_strategy: incremental
    primary_incremental_column: "none"
    incremental_columns: [ProcDate, DateTStamp]
"#;

    #[test]
    fn tables_yaml_parses_and_names_tables() {
        let file = parse_tables_yaml(SAMPLE_TABLES, Path::new("tables.yml"), false).unwrap();
        assert_eq!(file.tables.len(), 2);
        let patient = &file.tables["patient"];
        assert_eq!(patient.table_name, "patient");
        assert_eq!(patient.extraction_strategy, ExtractionStrategy::Incremental);
        assert_eq!(patient.performance_category, PerformanceCategory::Small);
        assert_eq!(patient.processing_priority, 1);
        assert_eq!(patient.primary_incremental_column(), Some("DateTStamp"));
        assert_eq!(patient.columns.len(), 3);

        let proclog = &file.tables["procedurelog"];
        assert_eq!(proclog.primary_incremental_column(), None);
        assert_eq!(proclog.incremental_columns.len(), 2);
    }

    #[test]
    fn strict_mode_rejects_unknown_fields() {
        let doc = r#"
tables:
  patient:
    extraction_strategy: full_table
    estimated_rowz: 12
"#;
        let err = parse_tables_yaml(doc, Path::new("tables.yml"), true).unwrap_err();
        match err {
            ConfigError::UnknownField { table, field } => {
                assert_eq!(table, "patient");
                assert_eq!(field, "estimated_rowz");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lenient_mode_ignores_unknown_fields() {
        let doc = r#"
tables:
  patient:
    extraction_strategy: full_table
    estimated_rowz: 12
"#;
        let file = parse_tables_yaml(doc, Path::new("tables.yml"), false).unwrap();
        assert_eq!(
            file.tables["patient"].extraction_strategy,
            ExtractionStrategy::FullTable
        );
    }
}
