//! HubSpot CRM source
//!
//! Contacts are read through the search endpoint sorted by last
//! modification; the other object types through the plain list endpoint.
//! Both page with the opaque `after` token.

use super::Source;
use crate::auth::AuthConfig;
use crate::config::SourceDescriptor;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig, RequestConfig};
use crate::pagination::{Cursor, Page, TokenPaginator};
use crate::types::{ObjectType, Record};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Largest page the CRM API hands out
const MAX_PAGE_SIZE: usize = 100;

/// How one object type is read
enum Endpoint {
    List,
    Search,
}

fn endpoint(object_type: ObjectType) -> Endpoint {
    match object_type {
        ObjectType::Contacts => Endpoint::Search,
        ObjectType::Companies | ObjectType::Deals | ObjectType::Tickets => Endpoint::List,
    }
}

/// Source reading enabled CRM object types through the HubSpot REST API
pub struct HubspotSource {
    descriptor: SourceDescriptor,
    client: HttpClient,
    objects: Vec<(ObjectType, Vec<String>)>,
    paginator: TokenPaginator,
}

impl HubspotSource {
    /// Build the client and probe every enabled object type with a one-record request
    pub async fn connect(descriptor: &SourceDescriptor) -> Result<Self> {
        let config = descriptor.hubspot_config()?;

        let objects: Vec<(ObjectType, Vec<String>)> = config
            .objects
            .enabled()
            .map(|(ty, cfg)| (ty, cfg.properties.clone()))
            .collect();
        if objects.is_empty() {
            return Err(Error::validation("No enabled object types configured"));
        }

        let client = HttpClient::new(
            HttpClientConfig::from(&config.http).with_base_url(&config.base_url),
            AuthConfig::Bearer {
                token: config.api_key.clone(),
            },
        )?;

        let source = Self {
            descriptor: descriptor.clone(),
            client,
            objects,
            paginator: TokenPaginator::default(),
        };

        for (object_type, properties) in &source.objects {
            source
                .request_page(*object_type, properties, None, 1)
                .await
                .map_err(|e| Error::connection(format!("hubspot {object_type}"), e.to_string()))?;
            debug!(object = %object_type, "probe succeeded");
        }

        info!(
            source = %descriptor.name,
            objects = source.objects.len(),
            "connected to HubSpot"
        );
        Ok(source)
    }

    async fn request_page(
        &self,
        object_type: ObjectType,
        properties: &[String],
        after: Option<&str>,
        limit: usize,
    ) -> Result<Value> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        match endpoint(object_type) {
            Endpoint::List => {
                let mut request = RequestConfig::new().query("limit", limit.to_string());
                if let Some(after) = after {
                    request = request.query("after", after);
                }
                if !properties.is_empty() {
                    request = request.query("properties", properties.join(","));
                }
                self.client
                    .get_json(&format!("/crm/v3/objects/{object_type}"), &request)
                    .await
            }
            Endpoint::Search => {
                let mut body = json!({
                    "sorts": [{ "propertyName": "lastmodifieddate", "direction": "ASCENDING" }],
                    "properties": properties,
                    "limit": limit,
                });
                if let Some(after) = after {
                    body["after"] = Value::String(after.to_string());
                }
                self.client
                    .post_json(&format!("/crm/v3/objects/{object_type}/search"), body)
                    .await
            }
        }
    }

    fn properties_for(&self, object_type: ObjectType) -> Option<&[String]> {
        self.objects
            .iter()
            .find(|(ty, _)| *ty == object_type)
            .map(|(_, props)| props.as_slice())
    }
}

#[async_trait]
impl Source for HubspotSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn objects(&self) -> Vec<String> {
        self.objects
            .iter()
            .map(|(ty, _)| ty.as_str().to_string())
            .collect()
    }

    async fn fetch_page(
        &mut self,
        object: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page> {
        let object_type: ObjectType = object.parse()?;
        let properties = self.properties_for(object_type).ok_or_else(|| {
            Error::validation(format!("Object type '{object}' is not enabled"))
        })?;

        let after = match cursor {
            None => None,
            Some(Cursor::Token(token)) => Some(token.as_str()),
            Some(Cursor::Key(value)) => {
                return Err(Error::validation(format!(
                    "Token pagination cannot resume from key {value}"
                )))
            }
        };

        let body = self
            .request_page(object_type, properties, after, limit)
            .await
            .map_err(|e| Error::fetch(object, e))?;
        let records = parse_results(&body).map_err(|e| Error::fetch(object, e))?;
        let next = self.paginator.next_cursor(&body, records.len());

        debug!(object, records = records.len(), has_next = next.is_some(), "fetched page");
        Ok(Page::new(records, next))
    }
}

/// Properties of each result object, in response order
fn parse_results(body: &Value) -> Result<Vec<Record>> {
    let results = match body.get("results") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(results)) => results,
        Some(_) => return Err(Error::Other("'results' is not an array".to_string())),
    };

    Ok(results
        .iter()
        .map(|result| match result.get("properties") {
            Some(Value::Object(properties)) => properties.clone(),
            _ => Record::new(),
        })
        .collect())
}
