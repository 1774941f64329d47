//! Narrow parser for MySQL `SHOW CREATE TABLE` output: column
//! definitions and the `PRIMARY KEY (...)` clause. Index and constraint
//! lines are skipped; a column line that cannot be recognized is an
//! error rather than a guess.

use crate::error::SchemaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlColumnType {
    /// Lowercased base name, e.g. `tinyint`, `varchar`, `decimal`.
    pub base: String,
    /// Raw arguments inside the parentheses: display width, length,
    /// `(precision, scale)`, or enum members.
    pub args: Vec<String>,
    pub unsigned: bool,
}

impl MySqlColumnType {
    pub fn display_width(&self) -> Option<u32> {
        self.args.first().and_then(|a| a.parse().ok())
    }

    pub fn precision_scale(&self) -> Option<(u32, u32)> {
        match self.args.as_slice() {
            [p] => Some((p.parse().ok()?, 0)),
            [p, s, ..] => Some((p.parse().ok()?, s.parse().ok()?)),
            [] => None,
        }
    }

    /// `TINYINT(1)` is MySQL's boolean idiom; whether it really holds
    /// booleans is decided by sampling.
    pub fn is_tinyint_bool(&self) -> bool {
        self.base == "tinyint" && self.display_width() == Some(1) && !self.unsigned
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlColumnDef {
    pub name: String,
    pub column_type: MySqlColumnType,
    pub not_null: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlTableDef {
    pub name: String,
    pub columns: Vec<MySqlColumnDef>,
    pub primary_key: Vec<String>,
}

pub fn parse_create_table(ddl: &str) -> Result<MySqlTableDef, SchemaError> {
    let (header, body) = split_header_body(ddl).map_err(|reason| SchemaError::DdlParse {
        table: String::new(),
        reason,
    })?;
    let name = table_name(header).map_err(|reason| SchemaError::DdlParse {
        table: String::new(),
        reason,
    })?;

    let mut columns = Vec::new();
    let mut primary_key = Vec::new();

    for item in split_top_level(body) {
        let upper = strip_quoted(&item).to_ascii_uppercase();
        if upper.starts_with("PRIMARY KEY") {
            primary_key = parse_key_columns(&item).map_err(|reason| SchemaError::DdlParse {
                table: name.clone(),
                reason,
            })?;
        } else if is_constraint_line(&upper) {
            continue;
        } else {
            let column = parse_column(&item).map_err(|reason| SchemaError::DdlParse {
                table: name.clone(),
                reason,
            })?;
            columns.push(column);
        }
    }

    if columns.is_empty() {
        return Err(SchemaError::NoColumns { table: name });
    }

    // An inline `PRIMARY KEY` on a column definition counts too.
    if primary_key.is_empty() {
        primary_key = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
    } else {
        for column in columns.iter_mut() {
            if primary_key.iter().any(|k| k == &column.name) {
                column.primary_key = true;
            }
        }
    }

    Ok(MySqlTableDef {
        name,
        columns,
        primary_key,
    })
}

fn is_constraint_line(upper: &str) -> bool {
    ["KEY", "UNIQUE", "INDEX", "CONSTRAINT", "FULLTEXT", "SPATIAL", "FOREIGN", "CHECK"]
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}

/// Splits the statement into its header and the parenthesized column
/// list, honoring backticks and string literals so a `)` inside a
/// comment or default value does not end the body.
fn split_header_body(ddl: &str) -> Result<(&str, &str), String> {
    let open = ddl.find('(').ok_or("missing column list")?;
    let header = &ddl[..open];

    let mut depth = 1usize;
    let mut in_backtick = false;
    let mut in_quote = false;
    let bytes = ddl.as_bytes();
    let mut idx = open + 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'`' if !in_quote => in_backtick = !in_backtick,
            b'\'' if !in_backtick => in_quote = !in_quote,
            b'(' if !in_backtick && !in_quote => depth += 1,
            b')' if !in_backtick && !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return Ok((header, &ddl[open + 1..idx]));
                }
            }
            _ => {}
        }
        idx += 1;
    }
    Err("unterminated column list".to_string())
}

fn table_name(header: &str) -> Result<String, String> {
    let upper = header.to_ascii_uppercase();
    let rest = upper
        .find("CREATE TABLE")
        .map(|pos| &header[pos + "CREATE TABLE".len()..])
        .ok_or("not a CREATE TABLE statement")?;
    let rest = rest.trim();
    let rest = if rest.to_ascii_uppercase().starts_with("IF NOT EXISTS") {
        rest["IF NOT EXISTS".len()..].trim_start()
    } else {
        rest
    };
    let (name, _) = parse_identifier(rest)?;
    Ok(name)
}

fn split_top_level(body: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_backtick = false;
    let mut in_quote = false;

    for ch in body.chars() {
        match ch {
            '`' if !in_quote => {
                in_backtick = !in_backtick;
                current.push(ch);
            }
            '\'' if !in_backtick => {
                in_quote = !in_quote;
                current.push(ch);
            }
            '(' if !in_backtick && !in_quote => {
                depth += 1;
                current.push(ch);
            }
            ')' if !in_backtick && !in_quote => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 && !in_backtick && !in_quote => {
                if !current.trim().is_empty() {
                    items.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

/// Reads a backquoted or bare identifier off the front of `input`.
fn parse_identifier(input: &str) -> Result<(String, &str), String> {
    let input = input.trim_start();
    if let Some(stripped) = input.strip_prefix('`') {
        let mut name = String::new();
        let mut chars = stripped.char_indices().peekable();
        while let Some((idx, ch)) = chars.next() {
            if ch == '`' {
                if chars.peek().map(|(_, next)| *next) == Some('`') {
                    name.push('`');
                    chars.next();
                } else {
                    return Ok((name, &stripped[idx + 1..]));
                }
            } else {
                name.push(ch);
            }
        }
        Err("unterminated backquoted identifier".to_string())
    } else {
        let end = input
            .find(|ch: char| !ch.is_alphanumeric() && ch != '_' && ch != '$')
            .unwrap_or(input.len());
        if end == 0 {
            return Err(format!("expected identifier at `{input}`"));
        }
        Ok((input[..end].to_string(), &input[end..]))
    }
}

fn parse_column(item: &str) -> Result<MySqlColumnDef, String> {
    let (name, rest) = parse_identifier(item)?;
    let rest = rest.trim_start();
    let (column_type, rest) = parse_type(rest)?;

    let attrs = strip_quoted(rest).to_ascii_uppercase();
    let mut column_type = column_type;
    if attrs.split_whitespace().any(|word| word == "UNSIGNED") {
        column_type.unsigned = true;
    }

    Ok(MySqlColumnDef {
        name,
        column_type,
        not_null: attrs.contains("NOT NULL"),
        primary_key: attrs.contains("PRIMARY KEY"),
    })
}

fn parse_type(input: &str) -> Result<(MySqlColumnType, &str), String> {
    let end = input
        .find(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
        .unwrap_or(input.len());
    if end == 0 {
        return Err(format!("expected column type at `{input}`"));
    }
    let base = input[..end].to_ascii_lowercase();
    let rest = &input[end..];

    if let Some(after_open) = rest.strip_prefix('(') {
        let close = matching_paren(after_open)
            .ok_or_else(|| format!("unterminated type arguments for `{base}`"))?;
        let args = after_open[..close]
            .split(',')
            .map(|a| a.trim().trim_matches('\'').to_string())
            .filter(|a| !a.is_empty())
            .collect();
        Ok((
            MySqlColumnType {
                base,
                args,
                unsigned: false,
            },
            &after_open[close + 1..],
        ))
    } else {
        Ok((
            MySqlColumnType {
                base,
                args: Vec::new(),
                unsigned: false,
            },
            rest,
        ))
    }
}

fn matching_paren(input: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut in_quote = false;
    for (idx, ch) in input.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_key_columns(item: &str) -> Result<Vec<String>, String> {
    let open = item.find('(').ok_or("PRIMARY KEY without column list")?;
    let inner = matching_paren(&item[open + 1..])
        .map(|close| &item[open + 1..open + 1 + close])
        .ok_or("unterminated PRIMARY KEY column list")?;

    inner
        .split(',')
        .map(|raw| {
            let (name, _) = parse_identifier(raw.trim())?;
            Ok(name)
        })
        .collect()
}

/// Removes single-quoted segments so keyword scans never match text
/// inside DEFAULT or COMMENT literals.
fn strip_quoted(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_quote = false;
    for ch in input.chars() {
        if ch == '\'' {
            in_quote = !in_quote;
        } else if !in_quote {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATIENT_DDL: &str = r#"CREATE TABLE `patient` (
  `PatNum` bigint(20) NOT NULL AUTO_INCREMENT,
  `LName` varchar(100) NOT NULL DEFAULT '',
  `IsActive` tinyint(1) DEFAULT NULL,
  `EstBalance` decimal(10,2) NOT NULL DEFAULT '0.00',
  `Birthdate` date NOT NULL DEFAULT '0001-01-01',
  `DateTStamp` timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
  PRIMARY KEY (`PatNum`),
  KEY `indexLName` (`LName`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb3 COMMENT='patients (active, archived)'"#;

    #[test]
    fn parses_show_create_table_output() {
        let table = parse_create_table(PATIENT_DDL).unwrap();
        assert_eq!(table.name, "patient");
        assert_eq!(table.columns.len(), 6);
        assert_eq!(table.primary_key, vec!["PatNum".to_string()]);

        let patnum = &table.columns[0];
        assert_eq!(patnum.name, "PatNum");
        assert_eq!(patnum.column_type.base, "bigint");
        assert!(patnum.not_null);
        assert!(patnum.primary_key);

        let is_active = &table.columns[2];
        assert!(is_active.column_type.is_tinyint_bool());
        assert!(!is_active.not_null);

        let balance = &table.columns[3];
        assert_eq!(balance.column_type.precision_scale(), Some((10, 2)));
    }

    #[test]
    fn comment_parenthesis_does_not_end_body() {
        let table = parse_create_table(PATIENT_DDL).unwrap();
        assert!(table.columns.iter().all(|c| !c.name.contains("ENGINE")));
    }

    #[test]
    fn inline_primary_key_is_detected() {
        let ddl = "CREATE TABLE log (id bigint NOT NULL PRIMARY KEY, note text)";
        let table = parse_create_table(ddl).unwrap();
        assert_eq!(table.primary_key, vec!["id".to_string()]);
    }

    #[test]
    fn unsigned_flag_is_read() {
        let ddl = "CREATE TABLE t (`n` int(10) unsigned NOT NULL)";
        let table = parse_create_table(ddl).unwrap();
        assert!(table.columns[0].column_type.unsigned);
        assert_eq!(table.columns[0].column_type.display_width(), Some(10));
    }

    #[test]
    fn unsigned_tinyint1_is_not_a_boolean_candidate() {
        let ddl = "CREATE TABLE t (`flag` tinyint(1) unsigned NOT NULL)";
        let table = parse_create_table(ddl).unwrap();
        assert!(!table.columns[0].column_type.is_tinyint_bool());
    }

    #[test]
    fn default_literal_cannot_fake_not_null() {
        let ddl = "CREATE TABLE t (`note` varchar(20) DEFAULT 'NOT NULL HERE')";
        let table = parse_create_table(ddl).unwrap();
        assert!(!table.columns[0].not_null);
    }

    #[test]
    fn composite_primary_key() {
        let ddl = "CREATE TABLE m (`a` int NOT NULL, `b` int NOT NULL, PRIMARY KEY (`a`,`b`))";
        let table = parse_create_table(ddl).unwrap();
        assert_eq!(table.primary_key, vec!["a".to_string(), "b".to_string()]);
        assert!(table.columns.iter().all(|c| c.primary_key));
    }

    #[test]
    fn statement_without_columns_is_rejected() {
        let err = parse_create_table("CREATE TABLE empty ()").unwrap_err();
        assert!(matches!(err, SchemaError::NoColumns { .. }));
    }

    #[test]
    fn garbage_column_line_is_rejected() {
        let err = parse_create_table("CREATE TABLE t (!!nonsense!!)").unwrap_err();
        assert!(matches!(err, SchemaError::DdlParse { .. }));
    }

    #[test]
    fn enum_arguments_are_captured() {
        let ddl = "CREATE TABLE t (`status` enum('new','sent','paid') NOT NULL)";
        let table = parse_create_table(ddl).unwrap();
        assert_eq!(
            table.columns[0].column_type.args,
            vec!["new".to_string(), "sent".to_string(), "paid".to_string()]
        );
    }
}
