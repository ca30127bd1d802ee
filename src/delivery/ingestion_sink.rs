//! HTTP ingestion sink
//!
//! POSTs a JSON array of records to the import endpoint with the shared
//! secret in `X-API-KEY`. Only 200 and 201 count as accepted.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::{IngestionSink, NormalizedRecord, SinkError};

pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Longest response body kept in reports
const MAX_BODY_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub user_agent: String,
}

pub struct HttpIngestionSink {
    client: Client,
    url: String,
}

impl HttpIngestionSink {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(&config.api_key).context("Invalid API key header value")?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create ingestion HTTP client")?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IngestionSink for HttpIngestionSink {
    async fn deliver(&self, records: &[NormalizedRecord]) -> Result<(), SinkError> {
        debug!("POST {} records to {}", records.len(), self.url);

        let response = self
            .client
            .post(&self.url)
            .json(records)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if matches!(status, StatusCode::OK | StatusCode::CREATED) {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(MAX_BODY_CHARS).collect(),
        })
    }
}

/// Sink that accepts everything without sending it anywhere
#[derive(Debug, Default)]
pub struct DryRunSink;

#[async_trait]
impl IngestionSink for DryRunSink {
    async fn deliver(&self, records: &[NormalizedRecord]) -> Result<(), SinkError> {
        info!("[dry-run] would deliver {} records", records.len());
        Ok(())
    }
}
