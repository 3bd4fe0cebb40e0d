//! Key-column paged SQL source

use super::Source;
use crate::config::SourceDescriptor;
use crate::database::{connect_backend, SqlBackend};
use crate::error::{Error, Result};
use crate::pagination::{Cursor, KeyColumnPaginator, Page};
use async_trait::async_trait;
use tracing::{debug, info};

/// Source reading one table page by page, ordered by its key column
pub struct SqlSource {
    descriptor: SourceDescriptor,
    backend: Box<dyn SqlBackend>,
    table: String,
    paginator: KeyColumnPaginator,
}

impl SqlSource {
    /// Open the descriptor's DSN and verify the table can be read
    pub fn connect(descriptor: &SourceDescriptor) -> Result<Self> {
        let dsn = &descriptor.sql_config()?.dsn;
        let backend = connect_backend(dsn)?;
        Self::with_backend(descriptor, backend)
    }

    /// Build on an already opened backend
    pub fn with_backend(descriptor: &SourceDescriptor, backend: Box<dyn SqlBackend>) -> Result<Self> {
        let config = descriptor.sql_config()?;
        let key_column = config.resolved_key_column()?;
        let paginator = KeyColumnPaginator::new(
            backend.qualify(&config.table),
            key_column,
            backend.quote_ident(key_column),
        );

        backend.check_connection()?;
        let (probe, _) = paginator.query(None, 1)?;
        backend
            .query_rows(&probe, &[])
            .map_err(|e| Error::connection(backend.describe(), e.to_string()))?;

        info!(
            source = %descriptor.name,
            backend = %backend.describe(),
            table = %config.table,
            key = key_column,
            "connected to SQL source"
        );

        Ok(Self {
            descriptor: descriptor.clone(),
            backend,
            table: config.table.clone(),
            paginator,
        })
    }
}

#[async_trait]
impl Source for SqlSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn objects(&self) -> Vec<String> {
        vec![self.table.clone()]
    }

    async fn fetch_page(
        &mut self,
        object: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page> {
        if object != self.table {
            return Err(Error::validation(format!(
                "Source '{}' does not serve object '{object}'",
                self.descriptor.name
            )));
        }

        let (sql, bindings) = self.paginator.query(cursor, limit)?;
        let records = self
            .backend
            .query_rows(&sql, &bindings)
            .map_err(|e| Error::fetch(object, e))?;
        let next = self
            .paginator
            .next_cursor(&records, limit)
            .map_err(|e| Error::fetch(object, e))?;

        debug!(object, rows = records.len(), has_next = next.is_some(), "fetched page");
        Ok(Page::new(records, next))
    }
}
