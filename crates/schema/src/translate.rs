use crate::ddl::MySqlColumnType;
use std::fmt;
use tracing::warn;

/// Postgres column type as rendered into analytics DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgType {
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric(Option<(u32, u32)>),
    Character(Option<u32>),
    CharacterVarying(Option<u32>),
    Text,
    Timestamp,
    Date,
    Time,
    Boolean,
    Bit(Option<u32>),
    Bytea,
    Jsonb,
}

impl PgType {
    /// SQL spelling for CREATE TABLE.
    pub fn sql(&self) -> String {
        match self {
            PgType::SmallInt => "smallint".to_string(),
            PgType::Integer => "integer".to_string(),
            PgType::BigInt => "bigint".to_string(),
            PgType::Real => "real".to_string(),
            PgType::DoublePrecision => "double precision".to_string(),
            PgType::Numeric(Some((p, s))) => format!("numeric({p},{s})"),
            PgType::Numeric(None) => "numeric".to_string(),
            PgType::Character(Some(n)) => format!("character({n})"),
            PgType::Character(None) => "character".to_string(),
            PgType::CharacterVarying(Some(n)) => format!("character varying({n})"),
            PgType::CharacterVarying(None) => "character varying".to_string(),
            PgType::Text => "text".to_string(),
            PgType::Timestamp => "timestamp".to_string(),
            PgType::Date => "date".to_string(),
            PgType::Time => "time".to_string(),
            PgType::Boolean => "boolean".to_string(),
            PgType::Bit(Some(n)) => format!("bit({n})"),
            PgType::Bit(None) => "bit".to_string(),
            PgType::Bytea => "bytea".to_string(),
            PgType::Jsonb => "jsonb".to_string(),
        }
    }

    /// The `data_type` value `information_schema.columns` reports for
    /// this type, used by schema verification.
    pub fn information_schema_name(&self) -> &'static str {
        match self {
            PgType::SmallInt => "smallint",
            PgType::Integer => "integer",
            PgType::BigInt => "bigint",
            PgType::Real => "real",
            PgType::DoublePrecision => "double precision",
            PgType::Numeric(_) => "numeric",
            PgType::Character(_) => "character",
            PgType::CharacterVarying(_) => "character varying",
            PgType::Text => "text",
            PgType::Timestamp => "timestamp without time zone",
            PgType::Date => "date",
            PgType::Time => "time without time zone",
            PgType::Boolean => "boolean",
            PgType::Bit(_) => "bit",
            PgType::Bytea => "bytea",
            PgType::Jsonb => "jsonb",
        }
    }
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

/// Outcome of translating one MySQL column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub pg_type: PgType,
    /// `TINYINT(1)`: candidate for boolean, pending data sampling.
    pub boolean_candidate: bool,
}

impl Translation {
    fn plain(pg_type: PgType) -> Self {
        Translation {
            pg_type,
            boolean_candidate: false,
        }
    }
}

/// Deterministic MySQL→Postgres type mapping. Genuinely unknown MySQL
/// types fall back to `text` with a warning; everything else is exact.
pub fn translate_type(column: &str, ty: &MySqlColumnType) -> Translation {
    if ty.is_tinyint_bool() {
        return Translation {
            pg_type: PgType::SmallInt,
            boolean_candidate: true,
        };
    }

    let pg_type = match ty.base.as_str() {
        "tinyint" => PgType::SmallInt,
        "smallint" => PgType::SmallInt,
        "mediumint" | "int" | "integer" => PgType::Integer,
        "bigint" => PgType::BigInt,
        "float" => PgType::Real,
        "double" | "real" => PgType::DoublePrecision,
        "decimal" | "numeric" => PgType::Numeric(ty.precision_scale()),
        "char" => PgType::Character(ty.display_width()),
        "varchar" => PgType::CharacterVarying(ty.display_width()),
        "tinytext" | "text" | "mediumtext" | "longtext" => PgType::Text,
        "datetime" | "timestamp" => PgType::Timestamp,
        "date" => PgType::Date,
        "time" => PgType::Time,
        "year" => PgType::Integer,
        "boolean" | "bool" => PgType::Boolean,
        "bit" => PgType::Bit(ty.display_width()),
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => PgType::Bytea,
        "json" => PgType::Jsonb,
        other => {
            warn!(column, mysql_type = other, "unknown MySQL type, falling back to text");
            PgType::Text
        }
    };

    Translation::plain(pg_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(base: &str, args: &[&str]) -> MySqlColumnType {
        MySqlColumnType {
            base: base.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            unsigned: false,
        }
    }

    #[test]
    fn integer_family() {
        assert_eq!(translate_type("c", &ty("int", &["11"])).pg_type, PgType::Integer);
        assert_eq!(translate_type("c", &ty("mediumint", &[])).pg_type, PgType::Integer);
        assert_eq!(translate_type("c", &ty("bigint", &["20"])).pg_type, PgType::BigInt);
        assert_eq!(translate_type("c", &ty("smallint", &[])).pg_type, PgType::SmallInt);
        assert_eq!(translate_type("c", &ty("year", &[])).pg_type, PgType::Integer);
    }

    #[test]
    fn tinyint_width_one_is_a_boolean_candidate() {
        let t = translate_type("IsActive", &ty("tinyint", &["1"]));
        assert!(t.boolean_candidate);
        assert_eq!(t.pg_type, PgType::SmallInt);

        let t = translate_type("Status", &ty("tinyint", &["4"]));
        assert!(!t.boolean_candidate);
        assert_eq!(t.pg_type, PgType::SmallInt);
    }

    #[test]
    fn numeric_carries_precision_and_scale() {
        let t = translate_type("c", &ty("decimal", &["10", "2"]));
        assert_eq!(t.pg_type, PgType::Numeric(Some((10, 2))));
        assert_eq!(t.pg_type.sql(), "numeric(10,2)");
    }

    #[test]
    fn string_family() {
        assert_eq!(
            translate_type("c", &ty("varchar", &["100"])).pg_type.sql(),
            "character varying(100)"
        );
        assert_eq!(
            translate_type("c", &ty("char", &["2"])).pg_type.sql(),
            "character(2)"
        );
        assert_eq!(translate_type("c", &ty("longtext", &[])).pg_type, PgType::Text);
    }

    #[test]
    fn temporal_binary_json() {
        assert_eq!(translate_type("c", &ty("datetime", &[])).pg_type, PgType::Timestamp);
        assert_eq!(translate_type("c", &ty("date", &[])).pg_type, PgType::Date);
        assert_eq!(translate_type("c", &ty("mediumblob", &[])).pg_type, PgType::Bytea);
        assert_eq!(translate_type("c", &ty("json", &[])).pg_type, PgType::Jsonb);
    }

    #[test]
    fn unknown_type_falls_back_to_text() {
        assert_eq!(
            translate_type("c", &ty("geometry", &[])).pg_type,
            PgType::Text
        );
        assert_eq!(
            translate_type("c", &ty("enum", &["a", "b"])).pg_type,
            PgType::Text
        );
    }

    #[test]
    fn information_schema_names_match_introspection() {
        assert_eq!(
            PgType::Timestamp.information_schema_name(),
            "timestamp without time zone"
        );
        assert_eq!(
            PgType::CharacterVarying(Some(5)).information_schema_name(),
            "character varying"
        );
    }
}
