use crate::environment::{AnalyticsSchema, DatabaseType, Environment, ETL_ENVIRONMENT_VAR};
use crate::error::ConfigError;
use crate::provider::ConfigProvider;
use model::config::pipeline::PipelineConfig;
use model::config::table::{TableConfig, TablesMetadata};
use std::sync::Arc;
use tracing::warn;

/// Connection parameters for one database, resolved from the environment
/// namespace of the active [`Environment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Set for analytics connections only.
    pub schema: Option<AnalyticsSchema>,
}

/// Environment-aware facade over a [`ConfigProvider`]. A plain value:
/// construct it once at the program edge and pass it into the replicator,
/// loader and connection factory.
#[derive(Clone)]
pub struct Settings {
    environment: Environment,
    provider: Arc<dyn ConfigProvider>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Fails fast when `ETL_ENVIRONMENT` is unset or invalid in the
    /// provider's environment map. No database configuration is read
    /// before this check passes.
    pub fn new(provider: Arc<dyn ConfigProvider>) -> Result<Self, ConfigError> {
        let raw = provider
            .env_var(ETL_ENVIRONMENT_VAR)
            .ok_or(ConfigError::EnvironmentUnset)?;
        let environment = Environment::parse(&raw)?;
        Ok(Settings {
            environment,
            provider,
        })
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn pipeline(&self) -> &PipelineConfig {
        self.provider.pipeline()
    }

    pub fn tables_metadata(&self) -> &TablesMetadata {
        &self.provider.tables().metadata
    }

    pub fn table_config(&self, name: &str) -> Result<&TableConfig, ConfigError> {
        self.provider
            .tables()
            .tables
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> Vec<&TableConfig> {
        self.provider.tables().tables.values().collect()
    }

    /// Resolve `{host, port, database, user, password}` for `db_type`
    /// from the environment namespace of the active environment. For
    /// analytics, the schema argument wins over the `*_SCHEMA` variable;
    /// both default to `raw`.
    pub fn database_config(
        &self,
        db_type: DatabaseType,
        schema: Option<AnalyticsSchema>,
    ) -> Result<ConnectionConfig, ConfigError> {
        let host = self.required_var(db_type, "HOST")?;
        let port_raw = self.required_var(db_type, "PORT")?;
        let port = port_raw
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidEnvVar {
                name: self.var_name(db_type, "PORT"),
                value: port_raw,
            })?;
        let database = self.required_var(db_type, "DB")?;
        let user = self.required_var(db_type, "USER")?;
        let password = self.required_var(db_type, "PASSWORD")?;

        let schema = match db_type {
            DatabaseType::Analytics => Some(match schema {
                Some(s) => s,
                None => self
                    .optional_var(db_type, "SCHEMA")
                    .and_then(|raw| AnalyticsSchema::parse(&raw))
                    .unwrap_or(AnalyticsSchema::Raw),
            }),
            _ => None,
        };

        Ok(ConnectionConfig {
            host,
            port,
            database,
            user,
            password,
            schema,
        })
    }

    /// Whether every required variable for every database is present and
    /// non-empty under the current environment.
    pub fn validate(&self) -> bool {
        let mut ok = true;
        for db_type in DatabaseType::ALL {
            for field in ["HOST", "PORT", "DB", "USER", "PASSWORD"] {
                let name = self.var_name(db_type, field);
                match self.provider.env_var(&name) {
                    Some(value) if !value.trim().is_empty() => {}
                    _ => {
                        warn!(variable = %name, database = %db_type, "missing required environment variable");
                        ok = false;
                    }
                }
            }
        }
        ok
    }

    fn var_name(&self, db_type: DatabaseType, field: &str) -> String {
        self.environment
            .var_name(&format!("{}_{field}", db_type.env_prefix()))
    }

    fn required_var(&self, db_type: DatabaseType, field: &str) -> Result<String, ConfigError> {
        let name = self.var_name(db_type, field);
        match self.provider.env_var(&name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::MissingEnvVar {
                name,
                database: db_type.as_str(),
            }),
        }
    }

    fn optional_var(&self, db_type: DatabaseType, field: &str) -> Option<String> {
        self.provider.env_var(&self.var_name(db_type, field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DictConfigProvider;
    use model::config::table::TablesFile;
    use std::collections::HashMap;

    fn test_env() -> HashMap<String, String> {
        let pairs = [
            ("ETL_ENVIRONMENT", "test"),
            ("TEST_OPENDENTAL_SOURCE_HOST", "localhost"),
            ("TEST_OPENDENTAL_SOURCE_PORT", "3306"),
            ("TEST_OPENDENTAL_SOURCE_DB", "test_opendental"),
            ("TEST_OPENDENTAL_SOURCE_USER", "test_source_user"),
            ("TEST_OPENDENTAL_SOURCE_PASSWORD", "test_source_pass"),
            ("TEST_MYSQL_REPLICATION_HOST", "localhost"),
            ("TEST_MYSQL_REPLICATION_PORT", "3305"),
            ("TEST_MYSQL_REPLICATION_DB", "test_opendental_replication"),
            ("TEST_MYSQL_REPLICATION_USER", "test_repl_user"),
            ("TEST_MYSQL_REPLICATION_PASSWORD", "test_repl_pass"),
            ("TEST_POSTGRES_ANALYTICS_HOST", "localhost"),
            ("TEST_POSTGRES_ANALYTICS_PORT", "5432"),
            ("TEST_POSTGRES_ANALYTICS_DB", "test_opendental_analytics"),
            ("TEST_POSTGRES_ANALYTICS_SCHEMA", "raw"),
            ("TEST_POSTGRES_ANALYTICS_USER", "test_analytics_user"),
            ("TEST_POSTGRES_ANALYTICS_PASSWORD", "test_analytics_pass"),
        ];
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn settings_with_env(env: HashMap<String, String>) -> Result<Settings, ConfigError> {
        let provider = DictConfigProvider::new(
            PipelineConfig::default(),
            TablesFile::default(),
            env,
        );
        Settings::new(Arc::new(provider))
    }

    #[test]
    fn missing_environment_fails_fast() {
        let err = settings_with_env(HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::EnvironmentUnset));
    }

    #[test]
    fn invalid_environment_fails_fast() {
        let mut env = HashMap::new();
        env.insert("ETL_ENVIRONMENT".to_string(), "staging".to_string());
        let err = settings_with_env(env).unwrap_err();
        assert!(matches!(err, ConfigError::EnvironmentInvalid(v) if v == "staging"));
    }

    #[test]
    fn test_environment_reads_prefixed_namespace() {
        let settings = settings_with_env(test_env()).unwrap();
        assert_eq!(settings.environment(), Environment::Test);

        let repl = settings
            .database_config(DatabaseType::Replication, None)
            .unwrap();
        assert_eq!(repl.host, "localhost");
        assert_eq!(repl.port, 3305);
        assert_eq!(repl.database, "test_opendental_replication");
        assert_eq!(repl.schema, None);

        let analytics = settings
            .database_config(DatabaseType::Analytics, None)
            .unwrap();
        assert_eq!(analytics.schema, Some(AnalyticsSchema::Raw));
    }

    #[test]
    fn explicit_schema_wins_over_env() {
        let settings = settings_with_env(test_env()).unwrap();
        let analytics = settings
            .database_config(DatabaseType::Analytics, Some(AnalyticsSchema::Staging))
            .unwrap();
        assert_eq!(analytics.schema, Some(AnalyticsSchema::Staging));
    }

    #[test]
    fn missing_variable_names_itself() {
        let mut env = test_env();
        env.remove("TEST_MYSQL_REPLICATION_PASSWORD");
        let settings = settings_with_env(env).unwrap();
        let err = settings
            .database_config(DatabaseType::Replication, None)
            .unwrap_err();
        match err {
            ConfigError::MissingEnvVar { name, database } => {
                assert_eq!(name, "TEST_MYSQL_REPLICATION_PASSWORD");
                assert_eq!(database, "replication");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut env = test_env();
        env.insert(
            "TEST_OPENDENTAL_SOURCE_PORT".to_string(),
            "not-a-port".to_string(),
        );
        let settings = settings_with_env(env).unwrap();
        let err = settings
            .database_config(DatabaseType::Source, None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn validate_reports_complete_namespaces() {
        let settings = settings_with_env(test_env()).unwrap();
        assert!(settings.validate());

        let mut env = test_env();
        env.insert("TEST_POSTGRES_ANALYTICS_USER".to_string(), "".to_string());
        let settings = settings_with_env(env).unwrap();
        assert!(!settings.validate());
    }

    #[test]
    fn unknown_table_is_an_error() {
        let settings = settings_with_env(test_env()).unwrap();
        let err = settings.table_config("no_such_table").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTable(name) if name == "no_such_table"));
    }
}
