//! Remote path naming
//!
//! Every uploaded object lands at `client/source/yyyy-mm-dd_HH/name.csv`. The
//! hour prefix is computed once per run so that all objects of a run share it
//! and a rerun within the same hour addresses the same paths.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Format of the hour-granularity date prefix
pub const DATE_PREFIX_FORMAT: &str = "%Y-%m-%d_%H";

static DATE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}_\d{2}$").unwrap());

/// Compose the remote path of one object
pub fn resolve(client: &str, source: &str, date_prefix: &str, name: &str) -> String {
    format!("{client}/{source}/{date_prefix}/{name}.csv")
}

/// Hour-granularity partition key, e.g. `2024-01-01_09`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatePrefix(String);

impl DatePrefix {
    /// Prefix for the current UTC hour
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Prefix for the hour containing `instant`
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant.format(DATE_PREFIX_FORMAT).to_string())
    }

    /// Parse and validate a prefix string
    pub fn parse(value: &str) -> Result<Self> {
        let valid = DATE_PREFIX_RE.is_match(value)
            && NaiveDateTime::parse_from_str(&format!("{value}:00"), "%Y-%m-%d_%H:%M").is_ok();
        if !valid {
            return Err(Error::validation(format!(
                "Invalid date prefix '{value}', expected yyyy-mm-dd_HH"
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// The prefix text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where one object was committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDestination {
    /// Bucket or container
    pub bucket: String,
    /// Object path inside the bucket
    pub path: String,
}

impl fmt::Display for RemoteDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket.trim_end_matches('/'), self.path)
    }
}
