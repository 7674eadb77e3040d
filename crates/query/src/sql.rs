//! SQL text builders shared by the backends.
//!
//! Layer queries are embedded as subqueries; identifiers are always quoted.
//! A layer query must be a single statement: text that would continue after
//! the wrapping subquery is rejected before anything reaches a database.

use crate::error::{QueryError, QueryResult};

/// Alias given to the wrapped layer query.
const SUBQUERY_ALIAS: &str = "_layergroup_subquery";

/// Alias of the row wrapped by [`json_rows_sql`].
const JSON_ROW_ALIAS: &str = "_layergroup_row";

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The statement text of a layer query, ready to be nested.
///
/// Trailing semicolons and comments are dropped. Anything else after a
/// top-level `;` is a second statement and fails with
/// [`QueryError::MultipleStatements`]. Semicolons inside string literals,
/// quoted identifiers, comments and dollar-quoted bodies are ignored.
pub fn as_subquery(sql: &str) -> QueryResult<&str> {
    let bytes = sql.as_bytes();
    let mut end: Option<usize> = None;
    let mut i = 0;

    while i < bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(b"--") {
            i = skip_past(bytes, i + 2, b"\n");
            continue;
        }
        if rest.starts_with(b"/*") {
            i = skip_past(bytes, i + 2, b"*/");
            continue;
        }

        let byte = bytes[i];
        if byte == b';' {
            end.get_or_insert(i);
            i += 1;
            continue;
        }
        if byte.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if end.is_some() {
            return Err(QueryError::MultipleStatements);
        }

        i = match byte {
            b'\'' | b'"' | b'`' => skip_quoted(bytes, i, byte),
            b'[' => skip_past(bytes, i + 1, b"]"),
            b'$' => match dollar_tag_len(rest) {
                Some(len) => skip_past(bytes, i + len, &rest[..len]),
                None => i + 1,
            },
            _ => i + 1,
        };
    }

    let statement = match end {
        Some(end) => &sql[..end],
        None => sql,
    };
    Ok(statement.trim())
}

/// Index just past the next `pattern` at or after `from`, or the end.
fn skip_past(bytes: &[u8], from: usize, pattern: &[u8]) -> usize {
    if from >= bytes.len() {
        return bytes.len();
    }
    bytes[from..]
        .windows(pattern.len())
        .position(|window| window == pattern)
        .map_or(bytes.len(), |pos| from + pos + pattern.len())
}

/// Index just past a quoted run starting at `start`; doubled quotes escape.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Length of a PostgreSQL dollar-quote tag (`$$` or `$tag$`) at the start of
/// `rest`. Positional parameters such as `$1` are not tags.
fn dollar_tag_len(rest: &[u8]) -> Option<usize> {
    let body = rest.get(1..)?;
    let name_len = body
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
        .count();
    if body.first().is_some_and(u8::is_ascii_digit) || body.get(name_len) != Some(&b'$') {
        return None;
    }
    Some(name_len + 2)
}

fn select_list<'a>(columns: impl IntoIterator<Item = &'a str>) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for column in columns {
        if !seen.contains(&column) {
            seen.push(column);
        }
    }
    seen.into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Select `columns` of the rows of `sql` whose `id_column` equals the bound
/// parameter `placeholder` (`?` or `$1`).
///
/// With no columns, the id column alone is selected.
pub fn feature_sql(
    sql: &str,
    id_column: &str,
    columns: &[String],
    placeholder: &str,
) -> QueryResult<String> {
    let list = if columns.is_empty() {
        quote_ident(id_column)
    } else {
        select_list(columns.iter().map(String::as_str))
    };
    Ok(format!(
        "SELECT {list} FROM ({}\n) AS {SUBQUERY_ALIAS} WHERE {} = {placeholder}",
        as_subquery(sql)?,
        quote_ident(id_column)
    ))
}

/// Fetch at most one row with the id column and every exposed column, so
/// unknown names fail before a configuration is accepted.
pub fn check_columns_sql(sql: &str, id_column: &str, columns: &[String]) -> QueryResult<String> {
    let list = select_list(std::iter::once(id_column).chain(columns.iter().map(String::as_str)));
    Ok(format!(
        "SELECT {list} FROM ({}\n) AS {SUBQUERY_ALIAS} LIMIT 1",
        as_subquery(sql)?
    ))
}

/// Turn each row of `sql` into one JSONB object (PostgreSQL), so every
/// column type reaches clients with its database rendering.
pub fn json_rows_sql(sql: &str) -> QueryResult<String> {
    Ok(format!(
        "SELECT to_jsonb({JSON_ROW_ALIAS}) FROM ({}\n) AS {JSON_ROW_ALIAS}",
        as_subquery(sql)?
    ))
}
