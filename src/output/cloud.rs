//! Cloud storage (GCS, S3, R2, Azure, local)

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions};
use std::path::Path;
use std::sync::Arc;

/// Minimal object store surface used by the upload phase
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Bucket, container or directory objects are written to
    fn bucket(&self) -> &str;

    /// Whether an object exists at `path`
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create or overwrite the object at `path`
    async fn put_object(&self, path: &str, data: Bytes) -> Result<()>;

    /// Read the whole object at `path`
    async fn get_object(&self, path: &str) -> Result<Bytes>;

    /// Delete the object at `path`
    async fn delete_object(&self, path: &str) -> Result<()>;
}

/// Object storage backed by the `object_store` crate
#[derive(Debug, Clone)]
pub struct CloudStore {
    /// The object store implementation
    store: Arc<dyn ObjectStore>,
    /// Bucket or container name (directory for local stores)
    bucket: String,
    /// Base path prefix within the bucket/container
    prefix: String,
    /// URL scheme for logging
    scheme: String,
}

impl CloudStore {
    /// Wrap an existing store
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: String::new(),
            scheme: "memory".to_string(),
        }
    }

    /// Build the store named by the storage configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Self::parse(&config.bucket_name, config.credentials_path.as_deref())
    }

    /// Parse a bucket name or destination URL
    ///
    /// Supported formats:
    /// - `my-bucket` or `gs://bucket/path/` - Google Cloud Storage
    /// - `s3://bucket/path/` - AWS S3
    /// - `r2://bucket/path/` - Cloudflare R2 (S3-compatible)
    /// - `az://container/path/` - Azure Blob Storage
    /// - `/local/path/`, `./path/` or `file:///path` - Local filesystem
    pub fn parse(url: &str, credentials_path: Option<&Path>) -> Result<Self> {
        if url.starts_with("s3://") {
            Self::parse_s3(url, false)
        } else if url.starts_with("r2://") {
            Self::parse_s3(url, true)
        } else if let Some(rest) = url.strip_prefix("gs://") {
            Self::build_gcs(rest, credentials_path)
        } else if url.starts_with("az://") {
            Self::parse_azure(url)
        } else if url.starts_with('/') || url.starts_with('.') || url.starts_with("file://") {
            Self::parse_local(url)
        } else {
            Self::build_gcs(url, credentials_path)
        }
    }

    /// Parse S3 or R2 URL
    fn parse_s3(url: &str, is_r2: bool) -> Result<Self> {
        let scheme = if is_r2 { "r2" } else { "s3" };
        let (bucket, prefix) = split_bucket(&url[scheme.len() + 3..]);

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if is_r2 {
            // https://<account_id>.r2.cloudflarestorage.com; AWS_ENDPOINT is read by from_env()
            if let Ok(endpoint) = std::env::var("R2_ENDPOINT_URL") {
                builder = builder.with_endpoint(endpoint);
            }
        }

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to create {scheme} client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.to_string(),
            prefix,
            scheme: scheme.to_string(),
        })
    }

    /// Build a GCS store from `bucket[/prefix]`
    fn build_gcs(location: &str, credentials_path: Option<&Path>) -> Result<Self> {
        let (bucket, prefix) = split_bucket(location);

        let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        if let Some(path) = credentials_path {
            builder = builder.with_service_account_path(path.to_string_lossy());
        }

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to create GCS client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.to_string(),
            prefix,
            scheme: "gs".to_string(),
        })
    }

    /// Parse Azure Blob URL
    fn parse_azure(url: &str) -> Result<Self> {
        let (container, prefix) = split_bucket(&url["az://".len()..]);

        let store = MicrosoftAzureBuilder::from_env()
            .with_container_name(container)
            .build()
            .map_err(|e| Error::config(format!("Failed to create Azure client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: container.to_string(),
            prefix,
            scheme: "az".to_string(),
        })
    }

    /// Parse local filesystem path
    fn parse_local(path: &str) -> Result<Self> {
        let path = path.strip_prefix("file://").unwrap_or(path);

        std::fs::create_dir_all(path)
            .map_err(|e| Error::config(format!("Failed to create directory {path}: {e}")))?;

        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: path.to_string(),
            prefix: String::new(),
            scheme: "file".to_string(),
        })
    }

    /// Get the scheme (gs, s3, r2, az, file, memory)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    fn object_path(&self, path: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(path)
        } else {
            ObjectPath::from(format!("{}/{path}", self.prefix.trim_end_matches('/')))
        }
    }
}

#[async_trait]
impl ObjectStorage for CloudStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self.store.head(&self.object_path(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_object(&self, path: &str, data: Bytes) -> Result<()> {
        let mut options = PutOptions::default();
        // Local stores reject attributes
        if self.scheme != "file" {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, "text/csv".into());
            options.attributes = attributes;
        }

        self.store
            .put_opts(&self.object_path(path), data.into(), options)
            .await
            .map_err(|e| Error::upload(format!("{}://{}/{path}", self.scheme, self.bucket), e.to_string()))?;
        Ok(())
    }

    async fn get_object(&self, path: &str) -> Result<Bytes> {
        let result = self.store.get(&self.object_path(path)).await?;
        Ok(result.bytes().await?)
    }

    async fn delete_object(&self, path: &str) -> Result<()> {
        self.store.delete(&self.object_path(path)).await?;
        Ok(())
    }
}

/// Split `bucket/some/prefix` into the bucket and the prefix
fn split_bucket(location: &str) -> (&str, String) {
    match location.find('/') {
        Some(idx) => (
            &location[..idx],
            location[idx + 1..].trim_end_matches('/').to_string(),
        ),
        None => (location, String::new()),
    }
}
