//! Source adapters
//!
//! A [`Source`] turns one configured upstream into a sequence of [`Page`]s per
//! object. Connection and authentication problems surface while the adapter
//! is built, before any page is fetched; per-page problems surface as
//! [`Error::Fetch`](crate::Error::Fetch).

mod crm;
mod sql;

pub use crm::HubspotSource;
pub use sql::SqlSource;

use crate::config::SourceDescriptor;
use crate::error::Result;
use crate::pagination::{Cursor, Page};
use crate::types::SourceKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Source Trait
// ============================================================================

/// Core trait that all source adapters implement
#[async_trait]
pub trait Source: Send {
    /// Descriptor this adapter was built from
    fn descriptor(&self) -> &SourceDescriptor;

    /// Labels of the objects to extract, in extraction order
    fn objects(&self) -> Vec<String>;

    /// Fetch the page of `object` that follows `cursor` (`None` = first page)
    async fn fetch_page(
        &mut self,
        object: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page>;

    /// Check that `[start, end)` lies inside the descriptor's window
    fn validate_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        self.descriptor().validate_window(start, end)
    }
}

/// Build and connect the adapter for a descriptor
pub async fn connect_source(descriptor: &SourceDescriptor) -> Result<Box<dyn Source>> {
    match descriptor.source_type {
        SourceKind::Sql => Ok(Box::new(SqlSource::connect(descriptor)?)),
        SourceKind::Hubspot => Ok(Box::new(HubspotSource::connect(descriptor).await?)),
    }
}

// ============================================================================
// Check Result
// ============================================================================

/// Result of a connection check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// Whether the check succeeded
    pub success: bool,

    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    /// Create a successful check result
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Create a failed check result
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}
