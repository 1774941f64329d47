use crate::error::ConfigError;
use std::fmt;

/// The variable that selects the active environment. There is no default:
/// an unset or unrecognized value aborts Settings construction.
pub const ETL_ENVIRONMENT_VAR: &str = "ETL_ENVIRONMENT";

/// Which deployment the pipeline is running against. Test and production
/// resolve their database credentials from disjoint variable namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim() {
            "production" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(ConfigError::EnvironmentInvalid(other.to_string())),
        }
    }

    /// Name of the variable holding `base` under this environment. Test
    /// credentials live in a `TEST_`-prefixed namespace so a test run can
    /// never pick up production secrets.
    pub fn var_name(&self, base: &str) -> String {
        match self {
            Environment::Production => base.to_string(),
            Environment::Test => format!("TEST_{base}"),
        }
    }

    /// Name of the `.env` file for this environment.
    pub fn env_file_name(&self) -> String {
        format!(".env_{}", self.as_str())
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three databases the pipeline talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    Source,
    Replication,
    Analytics,
}

impl DatabaseType {
    pub const ALL: [DatabaseType; 3] = [
        DatabaseType::Source,
        DatabaseType::Replication,
        DatabaseType::Analytics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Source => "source",
            DatabaseType::Replication => "replication",
            DatabaseType::Analytics => "analytics",
        }
    }

    /// Prefix of the environment variables carrying this database's
    /// connection parameters.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            DatabaseType::Source => "OPENDENTAL_SOURCE",
            DatabaseType::Replication => "MYSQL_REPLICATION",
            DatabaseType::Analytics => "POSTGRES_ANALYTICS",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schemas in the analytics warehouse. The pipeline core only ever lands
/// rows in `raw`; the rest exist for connection plumbing used by the
/// transformation layers downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyticsSchema {
    Raw,
    Staging,
    Intermediate,
    Marts,
}

impl AnalyticsSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsSchema::Raw => "raw",
            AnalyticsSchema::Staging => "staging",
            AnalyticsSchema::Intermediate => "intermediate",
            AnalyticsSchema::Marts => "marts",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "raw" => Some(AnalyticsSchema::Raw),
            "staging" => Some(AnalyticsSchema::Staging),
            "intermediate" => Some(AnalyticsSchema::Intermediate),
            "marts" => Some(AnalyticsSchema::Marts),
            _ => None,
        }
    }
}

impl fmt::Display for AnalyticsSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_is_strict() {
        assert_eq!(Environment::parse("production").unwrap(), Environment::Production);
        assert_eq!(Environment::parse("test").unwrap(), Environment::Test);
        assert!(Environment::parse("staging").is_err());
        assert!(Environment::parse("").is_err());
    }

    #[test]
    fn test_namespace_is_prefixed() {
        assert_eq!(
            Environment::Test.var_name("OPENDENTAL_SOURCE_HOST"),
            "TEST_OPENDENTAL_SOURCE_HOST"
        );
        assert_eq!(
            Environment::Production.var_name("OPENDENTAL_SOURCE_HOST"),
            "OPENDENTAL_SOURCE_HOST"
        );
    }

    #[test]
    fn schema_names_round_trip() {
        for schema in [
            AnalyticsSchema::Raw,
            AnalyticsSchema::Staging,
            AnalyticsSchema::Intermediate,
            AnalyticsSchema::Marts,
        ] {
            assert_eq!(AnalyticsSchema::parse(schema.as_str()), Some(schema));
        }
    }
}
