pub mod environment;
pub mod error;
pub mod provider;
pub mod settings;

pub use environment::{AnalyticsSchema, DatabaseType, Environment, ETL_ENVIRONMENT_VAR};
pub use error::ConfigError;
pub use provider::{ConfigProvider, DictConfigProvider, FileConfigProvider};
pub use settings::{ConnectionConfig, Settings};
