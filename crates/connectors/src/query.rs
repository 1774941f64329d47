//! SQL text builders for both dialects. Identifiers interpolated here
//! must already have passed the per-table whitelist; literal values are
//! always bound as parameters, never rendered.

/// MySQL backtick quoting.
pub fn quote_mysql(ident: &str) -> String {
    let escaped = ident.replace('`', "``");
    format!("`{escaped}`")
}

/// Postgres double-quote quoting.
pub fn quote_pg(ident: &str) -> String {
    let escaped = ident.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn quoted_list(columns: &[&str], quote: fn(&str) -> String) -> String {
    columns
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn mysql_placeholders(columns: usize, rows: usize) -> String {
    let row = format!("({})", vec!["?"; columns].join(", "));
    vec![row; rows].join(", ")
}

fn pg_placeholders(columns: usize, rows: usize) -> String {
    let mut out = Vec::with_capacity(rows);
    let mut n = 1;
    for _ in 0..rows {
        let row: Vec<String> = (0..columns)
            .map(|_| {
                let p = format!("${n}");
                n += 1;
                p
            })
            .collect();
        out.push(format!("({})", row.join(", ")));
    }
    out.join(", ")
}

pub fn mysql_insert(table: &str, columns: &[&str], rows: usize) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_mysql(table),
        quoted_list(columns, quote_mysql),
        mysql_placeholders(columns.len(), rows)
    )
}

/// `INSERT ... ON DUPLICATE KEY UPDATE` keyed on the table's primary
/// key(s). When every column is part of the key there is nothing to
/// update, so the statement degrades to `INSERT IGNORE`.
pub fn mysql_upsert(table: &str, columns: &[&str], key_columns: &[String], rows: usize) -> String {
    let non_key: Vec<&&str> = columns
        .iter()
        .filter(|c| !key_columns.iter().any(|k| k.eq_ignore_ascii_case(c)))
        .collect();

    if non_key.is_empty() {
        return format!(
            "INSERT IGNORE INTO {} ({}) VALUES {}",
            quote_mysql(table),
            quoted_list(columns, quote_mysql),
            mysql_placeholders(columns.len(), rows)
        );
    }

    let assignments = non_key
        .iter()
        .map(|c| format!("{col} = VALUES({col})", col = quote_mysql(c)))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {}",
        quote_mysql(table),
        quoted_list(columns, quote_mysql),
        mysql_placeholders(columns.len(), rows),
        assignments
    )
}

pub fn pg_insert(schema: &str, table: &str, columns: &[&str], rows: usize) -> String {
    format!(
        "INSERT INTO {}.{} ({}) VALUES {}",
        quote_pg(schema),
        quote_pg(table),
        quoted_list(columns, quote_pg),
        pg_placeholders(columns.len(), rows)
    )
}

/// `INSERT ... ON CONFLICT (...) DO UPDATE SET`; with no non-key columns
/// it degrades to `DO NOTHING`.
pub fn pg_upsert(
    schema: &str,
    table: &str,
    columns: &[&str],
    key_columns: &[String],
    rows: usize,
) -> String {
    let insert = pg_insert(schema, table, columns, rows);
    let keys = key_columns
        .iter()
        .map(|k| quote_pg(k))
        .collect::<Vec<_>>()
        .join(", ");

    let non_key: Vec<&&str> = columns
        .iter()
        .filter(|c| !key_columns.iter().any(|k| k.eq_ignore_ascii_case(c)))
        .collect();

    if non_key.is_empty() {
        return format!("{insert} ON CONFLICT ({keys}) DO NOTHING");
    }

    let assignments = non_key
        .iter()
        .map(|c| format!("{col} = EXCLUDED.{col}", col = quote_pg(c)))
        .collect::<Vec<_>>()
        .join(", ");

    format!("{insert} ON CONFLICT ({keys}) DO UPDATE SET {assignments}")
}

pub fn pg_copy_from_stdin(schema: &str, table: &str, columns: &[&str]) -> String {
    format!(
        "COPY {}.{} ({}) FROM STDIN WITH (FORMAT text)",
        quote_pg(schema),
        quote_pg(table),
        quoted_list(columns, quote_pg)
    )
}

pub fn mysql_truncate(table: &str) -> String {
    format!("TRUNCATE TABLE {}", quote_mysql(table))
}

pub fn pg_truncate(schema: &str, table: &str) -> String {
    format!("TRUNCATE TABLE {}.{}", quote_pg(schema), quote_pg(table))
}

pub fn mysql_count(table: &str, predicate: Option<&str>) -> String {
    match predicate {
        Some(pred) => format!("SELECT COUNT(*) FROM {} WHERE {pred}", quote_mysql(table)),
        None => format!("SELECT COUNT(*) FROM {}", quote_mysql(table)),
    }
}

pub fn pg_count(schema: &str, table: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {}.{}",
        quote_pg(schema),
        quote_pg(table)
    )
}

pub fn mysql_max(table: &str, column: &str) -> String {
    format!(
        "SELECT MAX({}) FROM {}",
        quote_mysql(column),
        quote_mysql(table)
    )
}
