//! Notion REST client implementing the engine's document-store boundary.
//!
//! Endpoints and payload shapes follow the published API contract pinned
//! by `NOTION_VERSION`. The client holds no credential; the caller passes
//! the integration token per request.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use ledgersync_core::store::{
    DateRangeFilter, DocumentStore, PropertySpec, PropertyValue, RawDatabase, RecordPage,
    StoreError,
};

use crate::error::{NotionError, Result};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Versioned API contract this client is written against.
const NOTION_VERSION: &str = "2022-06-28";
const DEFAULT_BASE_URL: &str = "https://api.notion.com";

/// Error body shape returned by the Notion API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    code: String,
    message: String,
}

/// Search response envelope.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<RawDatabase>,
}

/// Client for the Notion REST API.
#[derive(Debug, Clone)]
pub struct NotionClient {
    client: reqwest::Client,
    base_url: String,
}

impl NotionClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client against a non-default endpoint (tests, proxies).
    pub fn with_base_url(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create headers for an API request.
    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| NotionError::invalid_request("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    /// Parse a JSON response body, mapping error bodies onto `Api` errors.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!("API response error ({}): {}", status, body);
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(NotionError::api(status.as_u16(), error.code, error.message));
            }
            return Err(NotionError::api(
                status.as_u16(),
                status.as_str().to_string(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            NotionError::Json(e)
        })
    }

    /// Fetch a database definition.
    ///
    /// GET /v1/databases/{database_id}
    pub async fn retrieve_database(&self, token: &str, database_id: &str) -> Result<RawDatabase> {
        let url = format!("{}/v1/databases/{}", self.base_url, database_id);

        let response = self
            .client
            .get(&url)
            .headers(self.headers(token)?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Add properties to a database definition. A no-op for an empty set.
    ///
    /// PATCH /v1/databases/{database_id}
    pub async fn update_database_properties(
        &self,
        token: &str,
        database_id: &str,
        properties: &BTreeMap<String, PropertySpec>,
    ) -> Result<()> {
        if properties.is_empty() {
            return Ok(());
        }

        let url = format!("{}/v1/databases/{}", self.base_url, database_id);
        let body = json!({
            "properties": properties
                .iter()
                .map(|(name, spec)| (name.clone(), spec_payload(spec)))
                .collect::<Map<String, Value>>(),
        });

        let response = self
            .client
            .patch(&url)
            .headers(self.headers(token)?)
            .json(&body)
            .send()
            .await?;

        let _: Value = Self::parse_response(response).await?;
        Ok(())
    }

    /// Query one page of records in a date window.
    ///
    /// POST /v1/databases/{database_id}/query
    pub async fn query_database(
        &self,
        token: &str,
        database_id: &str,
        filter: &DateRangeFilter,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage> {
        let url = format!("{}/v1/databases/{}/query", self.base_url, database_id);
        let mut body = json!({
            "filter": filter_payload(filter),
            "page_size": page_size,
        });
        if let Some(cursor) = cursor {
            body["start_cursor"] = Value::String(cursor.to_string());
        }

        let response = self
            .client
            .post(&url)
            .headers(self.headers(token)?)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Create a record in a database.
    ///
    /// POST /v1/pages
    pub async fn create_page(
        &self,
        token: &str,
        database_id: &str,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> Result<()> {
        let url = format!("{}/v1/pages", self.base_url);
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": properties
                .iter()
                .map(|(name, value)| (name.clone(), value_payload(value)))
                .collect::<Map<String, Value>>(),
        });

        let response = self
            .client
            .post(&url)
            .headers(self.headers(token)?)
            .json(&body)
            .send()
            .await?;

        let _: Value = Self::parse_response(response).await?;
        Ok(())
    }

    /// List databases shared with the integration.
    ///
    /// POST /v1/search
    pub async fn search_databases(&self, token: &str) -> Result<Vec<RawDatabase>> {
        let url = format!("{}/v1/search", self.base_url);
        let body = json!({
            "filter": { "property": "object", "value": "database" },
        });

        let response = self
            .client
            .post(&url)
            .headers(self.headers(token)?)
            .json(&body)
            .send()
            .await?;

        let parsed: SearchResponse = Self::parse_response(response).await?;
        Ok(parsed.results)
    }
}

impl Default for NotionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for NotionClient {
    async fn retrieve_database(
        &self,
        token: &str,
        database_id: &str,
    ) -> std::result::Result<RawDatabase, StoreError> {
        NotionClient::retrieve_database(self, token, database_id)
            .await
            .map_err(StoreError::from)
    }

    async fn update_database_properties(
        &self,
        token: &str,
        database_id: &str,
        properties: BTreeMap<String, PropertySpec>,
    ) -> std::result::Result<(), StoreError> {
        NotionClient::update_database_properties(self, token, database_id, &properties)
            .await
            .map_err(StoreError::from)
    }

    async fn query_database(
        &self,
        token: &str,
        database_id: &str,
        filter: &DateRangeFilter,
        page_size: u32,
        cursor: Option<&str>,
    ) -> std::result::Result<RecordPage, StoreError> {
        NotionClient::query_database(self, token, database_id, filter, page_size, cursor)
            .await
            .map_err(StoreError::from)
    }

    async fn create_record(
        &self,
        token: &str,
        database_id: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> std::result::Result<(), StoreError> {
        NotionClient::create_page(self, token, database_id, &properties)
            .await
            .map_err(StoreError::from)
    }

    async fn search_databases(&self, token: &str) -> std::result::Result<Vec<RawDatabase>, StoreError> {
        NotionClient::search_databases(self, token)
            .await
            .map_err(StoreError::from)
    }
}

/// Creation payload for a property definition.
fn spec_payload(spec: &PropertySpec) -> Value {
    match spec {
        PropertySpec::Number { format } => json!({ "number": { "format": format } }),
        PropertySpec::Date => json!({ "date": {} }),
        PropertySpec::RichText => json!({ "rich_text": {} }),
    }
}

/// Write payload for a record property value.
fn value_payload(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Title(content) => text_payload("title", content),
        PropertyValue::RichText(content) => text_payload("rich_text", content),
        PropertyValue::Number(number) => json!({ "type": "number", "number": number }),
        PropertyValue::Date(start) => json!({ "type": "date", "date": { "start": start } }),
    }
}

fn text_payload(kind: &str, content: &str) -> Value {
    let mut object = Map::new();
    object.insert("type".to_string(), Value::String(kind.to_string()));
    object.insert(
        kind.to_string(),
        json!([ { "type": "text", "text": { "content": content } } ]),
    );
    Value::Object(object)
}

/// Conjunctive on-or-after/on-or-before filter on one date property.
fn filter_payload(filter: &DateRangeFilter) -> Value {
    json!({
        "and": [
            { "property": filter.property, "date": { "on_or_after": filter.start } },
            { "property": filter.property, "date": { "on_or_before": filter.end } },
        ]
    })
}
