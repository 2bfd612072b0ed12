//! Client for the backend's paginated query function
//!
//! The function replies with loosely shaped JSON; it is decoded here into
//! [`QueryOutcome`] so the rest of the crate only sees a typed page or a
//! typed failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::types::{DateSelector, ExportRequest, Page, TemperatureRecord};

/// Paginated source of temperature records
///
/// The exporter only talks to this trait, so tests and alternative
/// transports can stand in for the HTTP client.
#[async_trait]
pub trait QueryEndpoint: Send + Sync {
    /// Fetch the records in `[offset, offset + limit)` matching `request`
    ///
    /// # Errors
    ///
    /// Transport failures, non-2xx statuses and endpoint-reported failures
    /// are all returned as errors; none are retried.
    async fn fetch_page(&self, request: &ExportRequest, offset: u64, limit: usize)
    -> Result<Page>;

    /// Human-readable name for logging
    fn name(&self) -> &str;
}

/// Typed view of a query function reply
#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutcome {
    /// The function returned a page
    Success(Page),
    /// The function reported a logical failure
    Failure {
        /// Message reported by the function
        message: String,
    },
}

impl QueryOutcome {
    /// Convert into a page, turning a reported failure into [`Error::Endpoint`]
    pub fn into_page(self) -> Result<Page> {
        match self {
            QueryOutcome::Success(page) => Ok(page),
            QueryOutcome::Failure { message } => Err(Error::Endpoint(message)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQueryResponse {
    success: bool,
    #[serde(default)]
    data: Option<Vec<TemperatureRecord>>,
    #[serde(default)]
    fetched_count: Option<usize>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

impl From<RawQueryResponse> for QueryOutcome {
    fn from(raw: RawQueryResponse) -> Self {
        if !raw.success {
            return QueryOutcome::Failure {
                message: raw
                    .error
                    .unwrap_or_else(|| "query function reported failure".to_string()),
            };
        }

        let records = raw.data.unwrap_or_default();
        let fetched_count = raw.fetched_count.unwrap_or(records.len());
        QueryOutcome::Success(Page {
            records,
            fetched_count,
            has_more: raw.has_more,
            total: raw.total,
        })
    }
}

/// Decode a reply body into a [`QueryOutcome`]
pub fn parse_query_response(body: &[u8]) -> Result<QueryOutcome> {
    let raw: RawQueryResponse = serde_json::from_slice(body)?;
    Ok(raw.into())
}

#[derive(Debug, Serialize, PartialEq)]
struct DateRangeBody {
    start: String,
    end: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_range: Option<DateRangeBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transport: Option<&'a str>,
    offset: u64,
    limit: usize,
}

impl<'a> QueryBody<'a> {
    fn new(request: &'a ExportRequest, offset: u64, limit: usize) -> Self {
        let (date_range, month) = match request.date() {
            DateSelector::Range(range) => (
                Some(DateRangeBody {
                    start: range.start.format("%Y-%m-%d").to_string(),
                    end: range.end.format("%Y-%m-%d").to_string(),
                }),
                None,
            ),
            DateSelector::Month(month) => (None, Some(month.number_from_month())),
        };
        let time = request.time();

        Self {
            date_range,
            month,
            start_time: time.start.map(|t| t.format("%H:%M").to_string()),
            end_time: time.end.map(|t| t.format("%H:%M").to_string()),
            transport: request.transport(),
            offset,
            limit,
        }
    }
}

/// HTTP implementation of [`QueryEndpoint`]
pub struct HttpQueryEndpoint {
    http_client: reqwest::Client,
    url: Url,
    api_key: String,
}

impl HttpQueryEndpoint {
    /// Create a client for the configured query function
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the backend settings are incomplete, so
    /// misconfiguration surfaces before any page is requested.
    pub fn new(backend: &BackendConfig) -> Result<Self> {
        backend.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(backend.request_timeout)
            .user_agent(concat!("temptrack-export/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            url: backend.function_url()?,
            api_key: backend.api_key.clone(),
        })
    }

    /// URL requests are sent to
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl QueryEndpoint for HttpQueryEndpoint {
    async fn fetch_page(
        &self,
        request: &ExportRequest,
        offset: u64,
        limit: usize,
    ) -> Result<Page> {
        debug!(url = %self.url, offset, limit, "requesting page");

        let response = self
            .http_client
            .post(self.url.clone())
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&QueryBody::new(request, offset, limit))
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

        let body = response.bytes().await?;
        parse_query_response(&body)?.into_page()
    }

    fn name(&self) -> &str {
        "http"
    }
}
