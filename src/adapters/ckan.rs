//! Client for the CKAN datastore API behind data.boston.gov.
//!
//! Two actions are used: `datastore_search` (paged row fetch of one
//! resource) and `datastore_search_sql` (read-only SQL, used for the
//! jobs-policy aggregates).

use crate::config::toml_config::SourceConfig;
use crate::domain::model::Record;
use crate::utils::error::{EtlError, Result};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct CkanEnvelope {
    #[serde(default)]
    success: bool,
    result: Option<CkanResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CkanResult {
    #[serde(default)]
    records: Vec<serde_json::Map<String, serde_json::Value>>,
}

pub struct CkanClient {
    client: Client,
    config: SourceConfig,
}

impl CkanClient {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    fn action_url(&self, action: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), action)
    }

    /// One `datastore_search` page.
    pub async fn search_page(
        &self,
        resource_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Record>> {
        let url = self.action_url("datastore_search");
        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let query = [
            ("resource_id", resource_id.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];

        tracing::debug!(
            "📡 datastore_search {} (limit={}, offset={})",
            resource_id,
            limit,
            offset
        );
        self.send(resource_id, || {
            self.client.get(&url).query(&query).timeout(timeout)
        })
        .await
    }

    /// Page through a resource until a short page or `max_records`.
    pub async fn fetch_all(&self, resource_id: &str) -> Result<Vec<Record>> {
        let limit = self.config.page_size;
        let mut all_records = Vec::new();
        let mut offset = 0;

        while offset < self.config.max_records {
            let page = self.search_page(resource_id, limit, offset).await?;
            let page_len = page.len();
            all_records.extend(page);
            if page_len < limit {
                break;
            }
            offset += limit;
        }

        tracing::debug!("📡 {}: {} records in total", resource_id, all_records.len());
        Ok(all_records)
    }

    /// Run a `datastore_search_sql` query.
    pub async fn fetch_sql(&self, sql: &str) -> Result<Vec<Record>> {
        let url = self.action_url("datastore_search_sql");
        let timeout = Duration::from_secs(self.config.sql_timeout_seconds);
        tracing::debug!("📡 datastore_search_sql: {}", sql);
        self.send("datastore_search_sql", || {
            self.client.get(&url).query(&[("sql", sql)]).timeout(timeout)
        })
        .await
    }

    async fn send<F>(&self, resource: &str, build: F) -> Result<Vec<Record>>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = self.config.retry_attempts + 1;
        let mut attempt = 1;

        loop {
            match self.send_once(resource, build()).await {
                Ok(records) => return Ok(records),
                Err(e) if attempt < attempts && is_retryable(&e) => {
                    tracing::warn!(
                        "⚠️ Request for {} failed (attempt {}/{}): {}",
                        resource,
                        attempt,
                        attempts,
                        e
                    );
                    tokio::time::sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, resource: &str, request: RequestBuilder) -> Result<Vec<Record>> {
        let response = request.send().await?;
        tracing::debug!("API response status: {}", response.status());
        let response = response.error_for_status()?;
        let envelope: CkanEnvelope = response.json().await?;

        if !envelope.success {
            let message = envelope
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "success flag not set".to_string());
            return Err(EtlError::ApiResponseError {
                resource: resource.to_string(),
                message,
            });
        }

        let result = envelope.result.ok_or_else(|| EtlError::ApiResponseError {
            resource: resource.to_string(),
            message: "response has no result".to_string(),
        })?;

        Ok(result.records.into_iter().map(Record::from).collect())
    }
}

fn is_retryable(error: &EtlError) -> bool {
    match error {
        EtlError::ApiError(e) => match e.status() {
            Some(status) => status.is_server_error(),
            None => !e.is_decode(),
        },
        _ => false,
    }
}
