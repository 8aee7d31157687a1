use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{ContentSource, IndexClient, IndexResponse, PermissionList};
use crate::error::{ConnectorError, Result};
use crate::ingest::Document;

/// Workplace Search custom source API client
///
/// Requests that fail with 429 or a 5xx status are retried with exponential
/// backoff; every other failure is returned immediately.
pub struct WorkplaceSearchClient {
    client: Client,
    host_url: String,
    api_key: String,
    max_retries: u32,
    base_delay: Duration,
}

impl WorkplaceSearchClient {
    /// Create a client for `host_url` (e.g. `https://search.example.com:3002`)
    ///
    /// # Arguments
    ///
    /// * `host_url` - Enterprise Search base URL, without the `/api` suffix
    /// * `api_key` - Bearer token for the content source
    /// * `max_retries` - Retries for rate-limited or server errors
    pub fn new(host_url: &str, api_key: String, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConnectorError::Index(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host_url: host_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries,
            base_delay: Duration::from_secs(1),
        })
    }

    /// Override the initial backoff delay
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn sources_url(&self) -> String {
        format!("{}/api/ws/v1/sources", self.host_url)
    }

    fn source_url(&self, source_id: &str, suffix: &str) -> String {
        format!("{}/{}/{}", self.sources_url(), source_id, suffix)
    }

    /// Send a request built by `build`, retrying rate limits and server errors
    async fn send<T, F>(&self, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        let mut delay = self.base_delay;

        loop {
            let response = build()
                .header("Authorization", format!("Bearer {}", self.api_key))
                .send()
                .await
                .map_err(|e| ConnectorError::Index(format!("Network error: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json()
                    .await
                    .map_err(|e| ConnectorError::Index(format!("Failed to parse response: {}", e)));
            }

            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < self.max_retries {
                log::warn!(
                    "Retry {}/{} after Workplace Search error {}",
                    attempt + 1,
                    self.max_retries,
                    status
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
                continue;
            }

            return Err(ConnectorError::Index(format!(
                "Workplace Search API error {}: {}",
                status, body
            )));
        }
    }
}

#[async_trait]
impl IndexClient for WorkplaceSearchClient {
    async fn index_documents(
        &self,
        source_id: &str,
        documents: &[Document],
    ) -> Result<IndexResponse> {
        let url = self.source_url(source_id, "documents/bulk_create");
        let start = std::time::Instant::now();
        let response: IndexResponse = self
            .send(|| self.client.post(&url).json(documents))
            .await?;
        log::debug!(
            "Indexed batch of {} documents in {:?}",
            documents.len(),
            start.elapsed()
        );
        Ok(response)
    }

    async fn delete_documents(&self, source_id: &str, ids: &[String]) -> Result<()> {
        let url = self.source_url(source_id, "documents/bulk_destroy");
        let _: serde_json::Value = self.send(|| self.client.post(&url).json(ids)).await?;
        Ok(())
    }

    async fn list_permissions(&self, source_id: &str) -> Result<PermissionList> {
        let url = self.source_url(source_id, "permissions");
        self.send(|| self.client.get(&url)).await
    }

    async fn add_user_permissions(
        &self,
        source_id: &str,
        user: &str,
        permissions: &[String],
    ) -> Result<()> {
        let url = self.source_url(source_id, &format!("permissions/{}/add", user));
        let body = json!({ "permissions": permissions });
        let _: serde_json::Value = self.send(|| self.client.post(&url).json(&body)).await?;
        Ok(())
    }

    async fn remove_user_permissions(
        &self,
        source_id: &str,
        user: &str,
        permissions: &[String],
    ) -> Result<()> {
        let url = self.source_url(source_id, &format!("permissions/{}/remove", user));
        let body = json!({ "permissions": permissions });
        let _: serde_json::Value = self.send(|| self.client.post(&url).json(&body)).await?;
        Ok(())
    }

    async fn create_content_source(&self, name: &str) -> Result<ContentSource> {
        let url = self.sources_url();
        let body = json!({
            "name": name,
            "schema": {
                "title": "text",
                "body": "text",
                "url": "text",
                "path": "text",
                "created_at": "date",
                "last_updated": "date",
                "type": "text",
                "size": "number",
            },
            "display": {
                "title_field": "title",
                "description_field": "body",
                "url_field": "url",
                "detail_fields": [
                    {"field_name": "path", "label": "Path"},
                    {"field_name": "created_at", "label": "Created At"},
                    {"field_name": "last_updated", "label": "Last Updated"},
                    {"field_name": "type", "label": "Type"},
                    {"field_name": "size", "label": "Size"},
                ],
                "color": "#000000",
            },
            "is_searchable": true,
        });
        self.send(|| self.client.post(&url).json(&body)).await
    }
}
