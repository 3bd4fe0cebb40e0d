//! Configuration types for gaon runs
//!
//! A configuration file (JSON or YAML) names the client, the storage bucket
//! and one or more source descriptors. The loaded [`Config`] is validated once
//! and then passed by reference into every component; there is no global
//! configuration state.

use crate::error::{Error, Result, ResultExt};
use crate::types::{BackoffType, Cadence, ObjectType, SourceKind};
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Client name, first segment of every remote path
    #[serde(default = "default_client")]
    pub client: String,

    /// Remote storage settings
    pub storage: StorageConfig,

    /// Local directory used to stage artifacts before upload
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Configured sources
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

fn default_client() -> String {
    "default".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("temp")
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// Files ending in `.yaml`/`.yml` are parsed as YAML, everything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML configuration
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.client.trim().is_empty() {
            return Err(Error::invalid_value("client", "must not be empty"));
        }
        self.storage.validate()?;

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                return Err(Error::invalid_value(
                    "sources",
                    format!("duplicate source name '{}'", source.name),
                ));
            }
            source.validate()?;
        }
        Ok(())
    }

    /// Look up a source by name
    pub fn source(&self, name: &str) -> Result<&SourceDescriptor> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::validation(format!("Source '{name}' not found in config")))
    }
}

// ============================================================================
// Storage Config
// ============================================================================

/// Remote storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket name, or a destination URL (`gs://`, `s3://`, `r2://`, `az://`, local path)
    pub bucket_name: String,

    /// Service account file for GCS
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if self.bucket_name.trim().is_empty() {
            return Err(Error::missing_field("storage.bucket_name"));
        }
        if let Some(path) = &self.credentials_path {
            if !path.exists() {
                return Err(Error::invalid_value(
                    "storage.credentials_path",
                    format!("credentials file not found at {}", path.display()),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Source Descriptor
// ============================================================================

/// One upstream source instance
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDescriptor {
    /// Unique source name, second segment of every remote path
    pub name: String,

    /// Kind of source
    pub source_type: SourceKind,

    /// Records requested per page
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Earliest instant an extraction window may start at
    pub start_time: DateTime<Utc>,

    /// Latest instant an extraction window may end at
    pub end_time: DateTime<Utc>,

    /// Expected extraction cadence
    #[serde(default)]
    pub cadence: Cadence,

    /// Kind-specific settings
    pub source_config: SourceSettings,
}

fn default_batch_size() -> usize {
    1000
}

impl SourceDescriptor {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::missing_field("sources[].name"));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid_value(
                format!("{}.batch_size", self.name),
                "must be greater than zero",
            ));
        }
        if self.start_time >= self.end_time {
            return Err(Error::invalid_value(
                format!("{}.start_time", self.name),
                format!(
                    "start time {} must be before end time {}",
                    self.start_time, self.end_time
                ),
            ));
        }

        match (&self.source_type, &self.source_config) {
            (SourceKind::Sql, SourceSettings::Sql(sql)) => sql.validate(&self.name),
            (SourceKind::Hubspot, SourceSettings::Hubspot(hubspot)) => hubspot.validate(&self.name),
            (kind, _) => Err(Error::invalid_value(
                format!("{}.source_config", self.name),
                format!("settings do not match source type '{kind}'"),
            )),
        }
    }

    /// Check that `[start, end)` is a non-empty sub-interval of this source's window
    pub fn validate_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        if start >= end {
            return Err(Error::validation(format!(
                "Start time {start} must be before end time {end}"
            )));
        }
        if start < self.start_time {
            return Err(Error::validation(format!(
                "Start time {start} is before source start time {}",
                self.start_time
            )));
        }
        if end > self.end_time {
            return Err(Error::validation(format!(
                "End time {end} is after source end time {}",
                self.end_time
            )));
        }
        Ok(())
    }

    /// SQL settings, if this is a SQL source
    pub fn sql_config(&self) -> Result<&SqlSourceConfig> {
        match &self.source_config {
            SourceSettings::Sql(sql) => Ok(sql),
            SourceSettings::Hubspot(_) => Err(Error::config(format!(
                "Source '{}' is not a SQL source",
                self.name
            ))),
        }
    }

    /// HubSpot settings, if this is a HubSpot source
    pub fn hubspot_config(&self) -> Result<&HubspotSourceConfig> {
        match &self.source_config {
            SourceSettings::Hubspot(hubspot) => Ok(hubspot),
            SourceSettings::Sql(_) => Err(Error::config(format!(
                "Source '{}' is not a HubSpot source",
                self.name
            ))),
        }
    }

    /// Object labels this source extracts, in extraction order
    pub fn object_labels(&self) -> Vec<String> {
        match &self.source_config {
            SourceSettings::Sql(sql) => vec![sql.table.clone()],
            SourceSettings::Hubspot(hubspot) => hubspot
                .objects
                .enabled()
                .map(|(object_type, _)| object_type.to_string())
                .collect(),
        }
    }
}

/// Kind-specific source settings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceSettings {
    Sql(SqlSourceConfig),
    Hubspot(HubspotSourceConfig),
}

// ============================================================================
// SQL Source
// ============================================================================

/// Settings for a key-column paged SQL source
#[derive(Debug, Clone, Deserialize)]
pub struct SqlSourceConfig {
    /// ODBC DSN name or a connection URL
    pub dsn: String,

    /// Table to extract
    pub table: String,

    /// Monotonic key column; defaults to the table's well-known key
    #[serde(default)]
    pub key_column: Option<String>,
}

impl SqlSourceConfig {
    fn validate(&self, source: &str) -> Result<()> {
        if self.dsn.trim().is_empty() {
            return Err(Error::missing_field(format!("{source}.source_config.dsn")));
        }
        if self.table.trim().is_empty() {
            return Err(Error::missing_field(format!("{source}.source_config.table")));
        }
        self.resolved_key_column().map(|_| ())
    }

    /// The key column used for pagination
    pub fn resolved_key_column(&self) -> Result<&str> {
        if let Some(column) = self.key_column.as_deref() {
            return Ok(column);
        }
        well_known_key_column(&self.table).ok_or_else(|| {
            Error::validation(format!(
                "No key column configured for table '{}' and none is known",
                self.table
            ))
        })
    }
}

/// Key columns of the accounting tables extracted most often
fn well_known_key_column(table: &str) -> Option<&'static str> {
    match table.to_ascii_lowercase().as_str() {
        "customers" | "customer" | "items" | "item" | "vendors" | "vendor" => Some("ListID"),
        "invoices" | "invoice" => Some("TxnID"),
        _ => None,
    }
}

// ============================================================================
// HubSpot Source
// ============================================================================

/// Settings for the HubSpot CRM source
#[derive(Clone, Deserialize)]
pub struct HubspotSourceConfig {
    /// Private app access token
    pub api_key: String,

    /// API base URL
    #[serde(default = "default_hubspot_url")]
    pub base_url: String,

    /// Per-object settings in declared order
    pub objects: ObjectConfigs,

    /// HTTP transport settings
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_hubspot_url() -> String {
    "https://api.hubapi.com".to_string()
}

impl fmt::Debug for HubspotSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubspotSourceConfig")
            .field("api_key", &"****")
            .field("base_url", &self.base_url)
            .field("objects", &self.objects)
            .field("http", &self.http)
            .finish()
    }
}

impl HubspotSourceConfig {
    fn validate(&self, source: &str) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::missing_field(format!("{source}.source_config.api_key")));
        }
        if self.objects.enabled().next().is_none() {
            return Err(Error::validation(format!(
                "Source '{source}' has no enabled object types configured"
            )));
        }
        Ok(())
    }
}

/// Settings for one CRM object type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectTypeConfig {
    /// Whether this object type is extracted
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Properties to request
    #[serde(default)]
    pub properties: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Object settings keyed by object type, in the order they were declared
///
/// Order survives parsing from JSON or YAML text. A `serde_json::Value`
/// map is key-sorted, so `from_value` sees the objects alphabetically.
#[derive(Debug, Clone, Default)]
pub struct ObjectConfigs(Vec<(ObjectType, ObjectTypeConfig)>);

impl ObjectConfigs {
    /// Build from pairs, keeping their order
    pub fn new(entries: Vec<(ObjectType, ObjectTypeConfig)>) -> Self {
        Self(entries)
    }

    /// All entries in declared order
    pub fn iter(&self) -> impl Iterator<Item = &(ObjectType, ObjectTypeConfig)> {
        self.0.iter()
    }

    /// Enabled entries in declared order
    pub fn enabled(&self) -> impl Iterator<Item = (ObjectType, &ObjectTypeConfig)> {
        self.0
            .iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(ty, cfg)| (*ty, cfg))
    }

    /// Settings for one object type
    pub fn get(&self, object_type: ObjectType) -> Option<&ObjectTypeConfig> {
        self.0
            .iter()
            .find(|(ty, _)| *ty == object_type)
            .map(|(_, cfg)| cfg)
    }
}

impl Serialize for ObjectConfigs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (ty, cfg) in &self.0 {
            map.serialize_entry(ty, cfg)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ObjectConfigs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = ObjectConfigs;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of object type to object settings")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries: Vec<(ObjectType, ObjectTypeConfig)> = Vec::new();
                while let Some((ty, cfg)) = access.next_entry::<ObjectType, ObjectTypeConfig>()? {
                    if entries.iter().any(|(seen, _)| *seen == ty) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate object type '{ty}'"
                        )));
                    }
                    entries.push((ty, cfg));
                }
                Ok(ObjectConfigs(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

// ============================================================================
// HTTP Config
// ============================================================================

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Retry backoff configuration
    #[serde(default)]
    pub retry_backoff: BackoffConfig,

    /// Requests per second
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            retry_backoff: BackoffConfig::default(),
            requests_per_second: default_rps(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

// HubSpot allows 100 requests per 10 seconds for private apps
fn default_rps() -> u32 {
    10
}

/// Backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Type of backoff
    #[serde(rename = "type", default)]
    pub backoff_type: BackoffType,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
        }
    }
}

fn default_initial_ms() -> u64 {
    100
}

fn default_max_ms() -> u64 {
    60000
}
