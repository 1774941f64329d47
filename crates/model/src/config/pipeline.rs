use serde::Deserialize;

/// Global pipeline settings from `pipeline.yml`. Every field has a
/// default so a partial file parses.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub stages: StagesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GeneralConfig {
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_parallel_jobs")]
    pub parallel_jobs: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            pipeline_name: default_pipeline_name(),
            environment: None,
            batch_size: default_batch_size(),
            parallel_jobs: default_parallel_jobs(),
        }
    }
}

fn default_pipeline_name() -> String {
    "dental_etl".to_string()
}

fn default_batch_size() -> u32 {
    5_000
}

fn default_parallel_jobs() -> usize {
    4
}

/// One pool class per database role.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ConnectionsConfig {
    #[serde(default)]
    pub source: ConnectionPoolConfig,
    #[serde(default)]
    pub replication: ConnectionPoolConfig,
    #[serde(default)]
    pub analytics: ConnectionPoolConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Seconds to wait for a connection before giving up.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Seconds before an idle pooled connection is recycled.
    #[serde(default = "default_pool_recycle")]
    pub pool_recycle: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        ConnectionPoolConfig {
            pool_size: default_pool_size(),
            connect_timeout: default_connect_timeout(),
            pool_recycle: default_pool_recycle(),
        }
    }
}

fn default_pool_size() -> usize {
    5
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_pool_recycle() -> u64 {
    3_600
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct StagesConfig {
    #[serde(default)]
    pub extract: StageConfig,
    #[serde(default)]
    pub load: StageConfig,
    #[serde(default)]
    pub transform: StageConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_stage_timeout")]
    pub timeout_minutes: u64,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfig {
            enabled: true,
            timeout_minutes: default_stage_timeout(),
            error_threshold: default_error_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_stage_timeout() -> u64 {
    30
}

fn default_error_threshold() -> f64 {
    0.01
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: FileLogConfig,
    #[serde(default)]
    pub console: ConsoleLogConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            file: FileLogConfig::default(),
            console: ConsoleLogConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct FileLogConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
    #[serde(default)]
    pub backup_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConsoleLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ConsoleLogConfig {
    fn default() -> Self {
        ConsoleLogConfig {
            enabled: true,
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ErrorHandlingConfig {
    #[serde(default = "default_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default)]
    pub auto_retry: AutoRetryConfig,
}

impl Default for ErrorHandlingConfig {
    fn default() -> Self {
        ErrorHandlingConfig {
            max_consecutive_failures: default_consecutive_failures(),
            auto_retry: AutoRetryConfig::default(),
        }
    }
}

fn default_consecutive_failures() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AutoRetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub delay_minutes: u64,
}

impl Default for AutoRetryConfig {
    fn default() -> Self {
        AutoRetryConfig {
            enabled: true,
            max_attempts: default_retry_attempts(),
            delay_minutes: default_retry_delay(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_fills_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(
            r#"{"general": {"pipeline_name": "nightly", "parallel_jobs": 2}}"#,
        )
        .unwrap();
        assert_eq!(cfg.general.pipeline_name, "nightly");
        assert_eq!(cfg.general.parallel_jobs, 2);
        assert_eq!(cfg.general.batch_size, 5_000);
        assert_eq!(cfg.connections.source.pool_size, 5);
        assert!(cfg.stages.extract.enabled);
        assert_eq!(cfg.stages.load.timeout_minutes, 30);
        assert_eq!(cfg.error_handling.auto_retry.max_attempts, 3);
    }

    #[test]
    fn empty_document_is_valid() {
        let cfg: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.general.pipeline_name, "dental_etl");
        assert_eq!(cfg.connections.analytics.pool_recycle, 3_600);
    }
}
