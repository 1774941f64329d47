use crate::ddl::{parse_create_table, MySqlTableDef};
use crate::error::SchemaError;
use crate::translate::{translate_type, PgType};
use connectors::manager::mysql::MySqlConnectionManager;
use connectors::manager::postgres::PgConnectionManager;
use connectors::query::{quote_mysql, quote_pg};
use connectors::DbError;
use etl_config::AnalyticsSchema;
use model::core::value::Value;
use tracing::{debug, info, warn};

/// One analytics column after translation.
#[derive(Debug, Clone, PartialEq)]
pub struct PgColumn {
    pub name: String,
    pub pg_type: PgType,
    pub not_null: bool,
    /// The column was `TINYINT(1)` on the MySQL side; its Postgres type
    /// was decided by data sampling.
    pub boolean_candidate: bool,
}

/// Translated shape of one analytics table, used both for DDL emission
/// and for the loader's per-row type coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<PgColumn>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn pg_type_of(&self, column: &str) -> Option<&PgType> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column))
            .map(|c| &c.pg_type)
    }
}

/// Converts MySQL `CREATE TABLE` statements into analytics tables under
/// one schema. Never alters an existing table; drift handling belongs to
/// the analyzer, not the nightly load.
pub struct SchemaAdapter {
    schema: AnalyticsSchema,
}

impl SchemaAdapter {
    pub fn new(schema: AnalyticsSchema) -> Self {
        SchemaAdapter { schema }
    }

    pub fn schema(&self) -> AnalyticsSchema {
        self.schema
    }

    /// Translates the MySQL DDL, deciding `TINYINT(1)` columns by
    /// sampling through `sampler` when one is supplied.
    pub async fn resolve(
        &self,
        table_def: &MySqlTableDef,
        mut sampler: Option<&mut MySqlConnectionManager>,
    ) -> TableSchema {
        let mut columns = Vec::with_capacity(table_def.columns.len());
        for column in &table_def.columns {
            let translation = translate_type(&column.name, &column.column_type);
            let pg_type = if translation.boolean_candidate {
                let sample = match sampler.as_deref_mut() {
                    Some(manager) => {
                        Some(sample_non_boolean_count(manager, &table_def.name, &column.name).await)
                    }
                    None => None,
                };
                decide_tinyint(&table_def.name, &column.name, sample)
            } else {
                translation.pg_type
            };

            columns.push(PgColumn {
                name: column.name.clone(),
                pg_type,
                not_null: column.not_null,
                boolean_candidate: translation.boolean_candidate,
            });
        }

        TableSchema {
            table: table_def.name.clone(),
            columns,
            primary_key: table_def.primary_key.clone(),
        }
    }

    pub async fn ensure_schema_exists(
        &self,
        analytics: &mut PgConnectionManager,
    ) -> Result<(), SchemaError> {
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_pg(self.schema.as_str())
        );
        analytics.batch_execute(&sql).await?;
        Ok(())
    }

    /// Ensures the analytics table exists, creating it from the
    /// translated DDL when missing. An existing table is left untouched.
    /// Returns the translated schema either way.
    pub async fn ensure_table_exists(
        &self,
        analytics: &mut PgConnectionManager,
        sampler: Option<&mut MySqlConnectionManager>,
        table: &str,
        mysql_ddl: &str,
    ) -> Result<TableSchema, SchemaError> {
        let table_def = parse_create_table(mysql_ddl)?;
        let resolved = self.resolve(&table_def, sampler).await;

        self.ensure_schema_exists(analytics).await?;

        if self.table_exists(analytics, table).await? {
            debug!(table, schema = %self.schema, "analytics table already exists");
            // The sampling decision can drift between runs; coercion has
            // to follow the column type the table actually has.
            let resolved = self.reconcile_candidates(analytics, table, resolved).await?;
            return Ok(resolved);
        }

        let create = self.build_create_table(&resolved);
        info!(table, schema = %self.schema, "creating analytics table");
        analytics.batch_execute(&create).await?;
        Ok(resolved)
    }

    /// Whether the analytics table's columns match the expected
    /// translation of `mysql_ddl`: same column-name set, each type equal
    /// to its translation. Boolean candidates accept either outcome of
    /// the sampling decision.
    pub async fn verify_schema(
        &self,
        analytics: &mut PgConnectionManager,
        table: &str,
        mysql_ddl: &str,
    ) -> Result<bool, SchemaError> {
        let table_def = parse_create_table(mysql_ddl)?;
        let expected = self.resolve(&table_def, None).await;

        let batch = analytics
            .query(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2",
                &[
                    Value::String(self.schema.as_str().to_string()),
                    Value::String(table.to_string()),
                ],
            )
            .await?;

        let actual: Vec<(String, String)> = batch
            .rows
            .iter()
            .map(|row| {
                (
                    row.first().and_then(Value::as_str).unwrap_or("").to_string(),
                    row.get(1).and_then(Value::as_str).unwrap_or("").to_string(),
                )
            })
            .collect();

        if actual.len() != expected.columns.len() {
            warn!(
                table,
                expected = expected.columns.len(),
                actual = actual.len(),
                "column count mismatch"
            );
            return Ok(false);
        }

        for column in &expected.columns {
            let Some((_, actual_type)) = actual.iter().find(|(name, _)| name == &column.name)
            else {
                warn!(table, column = %column.name, "column missing in analytics table");
                return Ok(false);
            };

            let matches = if column.boolean_candidate {
                actual_type == "boolean" || actual_type == "smallint"
            } else {
                actual_type == column.pg_type.information_schema_name()
            };
            if !matches {
                warn!(
                    table,
                    column = %column.name,
                    expected = column.pg_type.information_schema_name(),
                    actual = %actual_type,
                    "column type mismatch"
                );
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn build_create_table(&self, resolved: &TableSchema) -> String {
        let mut parts: Vec<String> = resolved
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_pg(&c.name), c.pg_type.sql()))
            .collect();

        if !resolved.primary_key.is_empty() {
            let keys = resolved
                .primary_key
                .iter()
                .map(|k| quote_pg(k))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("PRIMARY KEY ({keys})"));
        }

        format!(
            "CREATE TABLE {}.{} ({});",
            quote_pg(self.schema.as_str()),
            quote_pg(&resolved.table),
            parts.join(", ")
        )
    }

    /// Pins every boolean candidate to the type the existing analytics
    /// table declares for it.
    async fn reconcile_candidates(
        &self,
        analytics: &mut PgConnectionManager,
        table: &str,
        mut resolved: TableSchema,
    ) -> Result<TableSchema, SchemaError> {
        if !resolved.columns.iter().any(|c| c.boolean_candidate) {
            return Ok(resolved);
        }

        let batch = analytics
            .query(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2",
                &[
                    Value::String(self.schema.as_str().to_string()),
                    Value::String(table.to_string()),
                ],
            )
            .await?;

        for column in resolved.columns.iter_mut().filter(|c| c.boolean_candidate) {
            let actual = batch.rows.iter().find_map(|row| {
                match (row.first(), row.get(1)) {
                    (Some(Value::String(name)), Some(Value::String(data_type)))
                        if name == &column.name =>
                    {
                        Some(data_type.clone())
                    }
                    _ => None,
                }
            });
            if let Some(actual) = actual {
                column.pg_type = if actual == "boolean" {
                    PgType::Boolean
                } else {
                    PgType::SmallInt
                };
            }
        }
        Ok(resolved)
    }

    async fn table_exists(
        &self,
        analytics: &mut PgConnectionManager,
        table: &str,
    ) -> Result<bool, SchemaError> {
        let exists = analytics
            .query_scalar(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2)",
                &[
                    Value::String(self.schema.as_str().to_string()),
                    Value::String(table.to_string()),
                ],
            )
            .await?;
        Ok(matches!(exists, Value::Boolean(true)))
    }
}

async fn sample_non_boolean_count(
    manager: &mut MySqlConnectionManager,
    table: &str,
    column: &str,
) -> Result<u64, DbError> {
    let sql = format!(
        "SELECT COUNT(*) FROM {table} WHERE {col} NOT IN (0, 1) AND {col} IS NOT NULL",
        table = quote_mysql(table),
        col = quote_mysql(column),
    );
    let count = manager.query_scalar(&sql, &[]).await?;
    Ok(count.as_u64().unwrap_or(0))
}

/// `TINYINT(1)` becomes `boolean` only when a sample proves the column
/// holds nothing but 0, 1 and NULL. No connection or a failed sample
/// keeps the conservative `smallint`.
fn decide_tinyint(table: &str, column: &str, sample: Option<Result<u64, DbError>>) -> PgType {
    match sample {
        Some(Ok(0)) => PgType::Boolean,
        Some(Ok(count)) => {
            debug!(table, column, non_boolean_rows = count, "keeping smallint");
            PgType::SmallInt
        }
        Some(Err(error)) => {
            warn!(table, column, %error, "boolean sampling failed, falling back to smallint");
            PgType::SmallInt
        }
        None => PgType::SmallInt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tinyint_with_clean_sample_becomes_boolean() {
        assert_eq!(
            decide_tinyint("patient", "IsActive", Some(Ok(0))),
            PgType::Boolean
        );
    }

    #[test]
    fn tinyint_with_out_of_range_values_stays_smallint() {
        assert_eq!(
            decide_tinyint("patient", "Status", Some(Ok(3))),
            PgType::SmallInt
        );
    }

    #[test]
    fn tinyint_without_connection_stays_smallint() {
        assert_eq!(decide_tinyint("patient", "IsActive", None), PgType::SmallInt);
    }

    #[test]
    fn tinyint_with_failed_sample_stays_smallint() {
        let err = DbError::Write("sampling failed".to_string());
        assert_eq!(
            decide_tinyint("patient", "IsActive", Some(Err(err))),
            PgType::SmallInt
        );
    }

    #[test]
    fn create_table_quotes_everything() {
        let adapter = SchemaAdapter::new(AnalyticsSchema::Raw);
        let resolved = TableSchema {
            table: "patient".to_string(),
            columns: vec![
                PgColumn {
                    name: "PatNum".to_string(),
                    pg_type: PgType::BigInt,
                    not_null: true,
                    boolean_candidate: false,
                },
                PgColumn {
                    name: "IsActive".to_string(),
                    pg_type: PgType::Boolean,
                    not_null: false,
                    boolean_candidate: true,
                },
            ],
            primary_key: vec!["PatNum".to_string()],
        };
        assert_eq!(
            adapter.build_create_table(&resolved),
            r#"CREATE TABLE "raw"."patient" ("PatNum" bigint, "IsActive" boolean, PRIMARY KEY ("PatNum"));"#
        );
    }
}
