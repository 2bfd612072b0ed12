//! Insert access to the submissions table

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::normalize::Submission;
use crate::config::BackendConfig;
use crate::error::{Error, Result};

/// Table that accepts submission rows
#[async_trait]
pub trait SubmissionTable: Send + Sync {
    /// Insert `rows`, returning how many the backend reports as stored
    async fn insert(&self, rows: &[Submission]) -> Result<usize>;
}

/// Submissions table behind the backend's REST interface
pub struct RestSubmissionTable {
    http_client: reqwest::Client,
    url: Url,
    api_key: String,
}

impl RestSubmissionTable {
    /// Create a client for the configured submissions table
    pub fn new(backend: &BackendConfig) -> Result<Self> {
        backend.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(backend.request_timeout)
            .user_agent(concat!("temptrack-export/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: backend.table_url()?,
            api_key: backend.api_key.clone(),
        })
    }

    /// URL rows are posted to
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SubmissionTable for RestSubmissionTable {
    async fn insert(&self, rows: &[Submission]) -> Result<usize> {
        debug!(url = %self.url, rows = rows.len(), "inserting submissions");

        let response = self
            .http_client
            .post(self.url.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let stored: Vec<serde_json::Value> = response.json().await?;
        Ok(stored.len())
    }
}
