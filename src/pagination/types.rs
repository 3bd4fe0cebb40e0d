//! Pagination types
//!
//! Defines the page/cursor contract shared by all source adapters.

use crate::error::{Error, Result};
use crate::types::{JsonValue, Record};
use std::fmt;

/// Continuation marker for the next page
#[derive(Debug, Clone, PartialEq)]
pub enum Cursor {
    /// Last-seen value of the key column
    Key(JsonValue),
    /// Opaque token handed out by the upstream API
    Token(String),
}

impl Cursor {
    /// The token string, if this is a token cursor
    pub fn as_token(&self) -> Option<&str> {
        match self {
            Cursor::Token(token) => Some(token),
            Cursor::Key(_) => None,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Key(JsonValue::String(s)) | Cursor::Token(s) => f.write_str(s),
            Cursor::Key(value) => write!(f, "{value}"),
        }
    }
}

/// One page of records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Records in upstream order
    pub records: Vec<Record>,
    /// Cursor for the following page; `None` ends the stream
    pub next: Option<Cursor>,
}

impl Page {
    /// Create a page
    pub fn new(records: Vec<Record>, next: Option<Cursor>) -> Self {
        Self { records, next }
    }

    /// An empty terminal page
    pub fn end() -> Self {
        Self::default()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the page has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether no page follows this one
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

/// Tracks pagination state for one object stream
#[derive(Debug, Clone, Default)]
pub struct PaginationState {
    /// Pages consumed so far
    pub pages: usize,
    /// Records consumed so far
    pub total_fetched: u64,
    /// Cursor for the next fetch
    pub cursor: Option<Cursor>,
    /// Is the stream exhausted?
    pub done: bool,
}

impl PaginationState {
    /// Create a new pagination state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fetched page and move to its cursor.
    ///
    /// Fails if the page hands back the cursor it was fetched with, which
    /// would otherwise loop forever.
    pub fn advance(&mut self, object: &str, page: &Page) -> Result<()> {
        self.pages += 1;
        self.total_fetched += page.len() as u64;

        match &page.next {
            None => {
                self.done = true;
                self.cursor = None;
            }
            Some(next) if self.cursor.as_ref() == Some(next) => {
                self.done = true;
                return Err(Error::fetch(
                    object,
                    Error::Other(format!("cursor did not advance past {next}")),
                ));
            }
            Some(next) => self.cursor = Some(next.clone()),
        }
        Ok(())
    }

    /// Mark the stream as exhausted
    pub fn mark_done(&mut self) {
        self.done = true;
    }
}
