//! ODBC SQL backend
//!
//! Reaches DSNs registered with the system driver manager, for example a
//! QuickBooks Desktop data source served by QODBC. Values are fetched as text.

use super::SqlBackend;
use crate::error::{Error, Result};
use crate::types::{JsonValue, Record};
use odbc_api::buffers::TextRowSet;
use odbc_api::{
    Connection, ConnectionOptions, Cursor as _, Environment, IntoParameter, ResultSetMetadata,
};
use std::sync::OnceLock;
use tracing::debug;

/// Rows fetched per round trip
const FETCH_ROWS: usize = 500;

/// Upper bound for a single text value; longer values fail the fetch
const MAX_TEXT_LEN: usize = 4096;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new()
        .map_err(|e| Error::connection("odbc", format!("Failed to create ODBC environment: {e}")))?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

/// SQL backend over an ODBC connection
pub struct OdbcBackend {
    conn: Connection<'static>,
    dsn: String,
}

impl OdbcBackend {
    /// Connect to a DSN name or a full `KEY=value;...` connection string
    pub fn connect(dsn: &str) -> Result<Self> {
        let env = environment()?;
        let conn = if dsn.contains('=') {
            env.connect_with_connection_string(dsn, ConnectionOptions::default())
        } else {
            env.connect(dsn, "", "", ConnectionOptions::default())
        }
        .map_err(|e| Error::connection(dsn, e.to_string()))?;

        Ok(Self {
            conn,
            dsn: dsn.to_string(),
        })
    }
}

impl SqlBackend for OdbcBackend {
    fn query_rows(&self, sql: &str, bindings: &[JsonValue]) -> Result<Vec<Record>> {
        debug!(query = sql, bindings = bindings.len(), "executing ODBC query");

        let cursor = match bindings {
            [] => self.conn.execute(sql, (), None),
            [value] => {
                let text = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                self.conn.execute(sql, &text.into_parameter(), None)
            }
            _ => {
                return Err(Error::database(format!(
                    "Expected at most one binding, got {}",
                    bindings.len()
                )))
            }
        }
        .map_err(|e| Error::database(format!("Query failed: {e}")))?;

        let Some(mut cursor) = cursor else {
            return Ok(Vec::new());
        };

        let columns: Vec<String> = cursor
            .column_names()
            .map_err(|e| Error::database(e.to_string()))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::database(e.to_string()))?;

        let buffer = TextRowSet::for_cursor(FETCH_ROWS, &mut cursor, Some(MAX_TEXT_LEN))
            .map_err(|e| Error::database(e.to_string()))?;
        let mut row_set = cursor
            .bind_buffer(buffer)
            .map_err(|e| Error::database(e.to_string()))?;

        let mut records = Vec::new();
        while let Some(batch) = row_set
            .fetch_with_truncation_check(true)
            .map_err(|e| fetch_error(e, &columns))?
        {
            for row in 0..batch.num_rows() {
                let mut record = Record::new();
                for (col, name) in columns.iter().enumerate() {
                    let value = batch.at(col, row).map_or(JsonValue::Null, |bytes| {
                        JsonValue::String(String::from_utf8_lossy(bytes).into_owned())
                    });
                    record.insert(name.clone(), value);
                }
                records.push(record);
            }
        }

        Ok(records)
    }

    fn qualify(&self, table: &str) -> String {
        table.to_string()
    }

    fn quote_ident(&self, ident: &str) -> String {
        ident.to_string()
    }

    fn check_connection(&self) -> Result<()> {
        if self.conn.is_dead().unwrap_or(true) {
            return Err(Error::connection(&self.dsn, "connection is dead"));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.dsn.clone()
    }
}

/// Map a fetch failure, naming the column when a value did not fit its buffer
fn fetch_error(error: odbc_api::Error, columns: &[String]) -> Error {
    match error {
        odbc_api::Error::TooLargeValueForBuffer {
            indicator,
            buffer_index,
        } => {
            let column = columns
                .get(buffer_index)
                .map_or("<unknown>", String::as_str);
            let size = indicator.map_or_else(|| "unknown".to_string(), |len| len.to_string());
            Error::database(format!(
                "Value in column '{column}' is {size} bytes, over the {MAX_TEXT_LEN} byte limit"
            ))
        }
        other => Error::database(format!("Failed to fetch rows: {other}")),
    }
}

#[cfg(test)]
mod odbc_tests {
    use super::*;

    #[test]
    fn test_truncated_value_fails_the_fetch() {
        let columns = vec!["TxnID".to_string(), "Memo".to_string()];
        let err = fetch_error(
            odbc_api::Error::TooLargeValueForBuffer {
                indicator: Some(5000),
                buffer_index: 1,
            },
            &columns,
        );

        assert!(matches!(err, Error::Database { .. }));
        assert_eq!(
            err.to_string(),
            "Database error: Value in column 'Memo' is 5000 bytes, over the 4096 byte limit"
        );
    }

    #[test]
    fn test_truncated_value_of_unknown_size() {
        let err = fetch_error(
            odbc_api::Error::TooLargeValueForBuffer {
                indicator: None,
                buffer_index: 7,
            },
            &[],
        );
        assert!(err.to_string().contains("column '<unknown>' is unknown bytes"));
    }
}
