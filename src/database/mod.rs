//! SQL backends for key-column sources
//!
//! A [`SqlBackend`] runs one parameterized query and returns its rows as
//! records. DuckDB serves connection URLs (PostgreSQL, MySQL and SQLite are
//! attached through DuckDB extensions) and local DuckDB files. Plain ODBC DSN
//! names such as a QuickBooks Desktop data source go through `odbc-api` when
//! the `odbc` feature is enabled.

mod engine;
#[cfg(feature = "odbc")]
mod odbc;

pub use engine::{DbType, DuckDbBackend};
#[cfg(feature = "odbc")]
pub use odbc::OdbcBackend;

use crate::error::{Error, Result};
use crate::types::{JsonValue, Record};

/// A connection able to run paged row queries
pub trait SqlBackend: Send {
    /// Run `sql` with positional `?` bindings and return all result rows
    fn query_rows(&self, sql: &str, bindings: &[JsonValue]) -> Result<Vec<Record>>;

    /// Table reference for use in a FROM clause
    fn qualify(&self, table: &str) -> String;

    /// Identifier as it should appear in SQL text
    fn quote_ident(&self, ident: &str) -> String;

    /// Verify the connection can answer queries
    fn check_connection(&self) -> Result<()>;

    /// Connection description safe for logs
    fn describe(&self) -> String;
}

/// Open the backend for a DSN
pub fn connect_backend(dsn: &str) -> Result<Box<dyn SqlBackend>> {
    if let Some(db_type) = DbType::from_dsn(dsn) {
        return Ok(Box::new(DuckDbBackend::connect(db_type, dsn)?));
    }
    connect_odbc(dsn)
}

#[cfg(feature = "odbc")]
fn connect_odbc(dsn: &str) -> Result<Box<dyn SqlBackend>> {
    Ok(Box::new(OdbcBackend::connect(dsn)?))
}

#[cfg(not(feature = "odbc"))]
fn connect_odbc(dsn: &str) -> Result<Box<dyn SqlBackend>> {
    Err(Error::connection(
        dsn,
        "ODBC data sources need a build with `--features odbc`",
    ))
}
