//! Pagination strategy implementations
//!
//! Each strategy handles one upstream paging pattern.

use super::types::Cursor;
use crate::error::{Error, Result};
use crate::types::{JsonValue, Record};
use serde_json::Value;

// ============================================================================
// Key-Column Pagination
// ============================================================================

/// Key-column (seek) pagination for SQL tables
///
/// Each page is `SELECT * FROM t WHERE key > ? ORDER BY key LIMIT n`, where
/// the bound value is the key of the last row of the previous page. The first
/// page has no filter. A page shorter than the limit is the last one.
#[derive(Debug, Clone)]
pub struct KeyColumnPaginator {
    /// Table reference as it appears in the FROM clause
    pub table: String,
    /// Key column name as returned in result rows
    pub key_column: String,
    /// Key column as it appears in SQL text
    pub quoted_key: String,
}

impl KeyColumnPaginator {
    /// Create a new key-column paginator
    pub fn new(
        table: impl Into<String>,
        key_column: impl Into<String>,
        quoted_key: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            key_column: key_column.into(),
            quoted_key: quoted_key.into(),
        }
    }

    /// Build the query text and bound parameters for the page after `cursor`
    pub fn query(&self, cursor: Option<&Cursor>, limit: usize) -> Result<(String, Vec<JsonValue>)> {
        match cursor {
            None => Ok((
                format!(
                    "SELECT * FROM {} ORDER BY {} LIMIT {limit}",
                    self.table, self.quoted_key
                ),
                Vec::new(),
            )),
            Some(Cursor::Key(value)) => Ok((
                format!(
                    "SELECT * FROM {} WHERE {key} > ? ORDER BY {key} LIMIT {limit}",
                    self.table,
                    key = self.quoted_key
                ),
                vec![value.clone()],
            )),
            Some(Cursor::Token(token)) => Err(Error::validation(format!(
                "Key-column pagination cannot resume from token '{token}'"
            ))),
        }
    }

    /// Cursor for the page following `records`
    pub fn next_cursor(&self, records: &[Record], limit: usize) -> Result<Option<Cursor>> {
        if records.len() < limit {
            return Ok(None);
        }
        let Some(last) = records.last() else {
            return Ok(None);
        };

        let value = last.get(&self.key_column).or_else(|| {
            last.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&self.key_column))
                .map(|(_, value)| value)
        });

        match value {
            Some(value) if !value.is_null() => Ok(Some(Cursor::Key(value.clone()))),
            _ => Err(Error::database(format!(
                "Key column '{}' missing or null in the last row of {}",
                self.key_column, self.table
            ))),
        }
    }
}

// ============================================================================
// Token Pagination
// ============================================================================

/// Opaque-token pagination (e.g., HubSpot `after`)
///
/// The response body carries the token for the next page at `token_path`.
/// A missing or empty token, or an empty page, ends the stream.
#[derive(Debug, Clone)]
pub struct TokenPaginator {
    /// Request parameter carrying the token
    pub token_param: String,
    /// Dotted path to the token in the response body
    pub token_path: String,
}

impl Default for TokenPaginator {
    fn default() -> Self {
        Self::new("after", "paging.next.after")
    }
}

impl TokenPaginator {
    /// Create a new token paginator
    pub fn new(token_param: impl Into<String>, token_path: impl Into<String>) -> Self {
        Self {
            token_param: token_param.into(),
            token_path: token_path.into(),
        }
    }

    /// Cursor for the page following this response
    pub fn next_cursor(&self, body: &Value, records_count: usize) -> Option<Cursor> {
        if records_count == 0 {
            return None;
        }

        let token = match extract_path(body, &self.token_path)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        (!token.is_empty()).then_some(Cursor::Token(token))
    }
}

/// Extract a value from JSON using a dotted path such as `$.paging.next.after`
pub fn extract_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);

    let mut current = value;
    for part in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}
