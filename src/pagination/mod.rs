//! Pagination module
//!
//! Supports: key-column cursors (SQL) and opaque continuation tokens (CRM)
//!
//! # Overview
//!
//! Every source adapter returns [`Page`]s. A page carries its records and the
//! cursor for the following page; `None` ends the stream. The strategies here
//! hold the per-kind rules for building the next request and reading the next
//! cursor, and [`PaginationState`] guards the stream against cursors that do
//! not advance.

mod strategies;
mod types;

pub use strategies::{extract_path, KeyColumnPaginator, TokenPaginator};
pub use types::{Cursor, Page, PaginationState};
