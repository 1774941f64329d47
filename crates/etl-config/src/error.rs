use thiserror::Error;

/// Environment and configuration failures. All of these are fatal: the
/// process is misconfigured and must not fall back to a default.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ETL_ENVIRONMENT is not set; set it to `production` or `test`")]
    EnvironmentUnset,

    #[error("invalid ETL_ENVIRONMENT value `{0}`; expected `production` or `test`")]
    EnvironmentInvalid(String),

    #[error("missing required environment variable `{name}` for the {database} database")]
    MissingEnvVar {
        name: String,
        database: &'static str,
    },

    #[error("environment variable `{name}` has invalid value `{value}`")]
    InvalidEnvVar { name: String, value: String },

    #[error("failed to read {section} configuration at {path}: {source}")]
    ConfigFile {
        section: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {section} configuration at {path}: {source}")]
    ConfigParse {
        section: &'static str,
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to read environment file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: dotenvy::Error,
    },

    #[error("unknown field `{field}` in table configuration `{table}`")]
    UnknownField { table: String, field: String },

    #[error("no configuration for table `{0}`")]
    UnknownTable(String),
}
