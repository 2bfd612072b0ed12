//! Configuration types for temptrack-export

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Environment variable holding the backend base URL
pub const ENV_BACKEND_URL: &str = "TEMPTRACK_BACKEND_URL";
/// Environment variable holding the backend API key
pub const ENV_API_KEY: &str = "TEMPTRACK_API_KEY";
/// Environment variable overriding the query function name
pub const ENV_QUERY_FUNCTION: &str = "TEMPTRACK_QUERY_FUNCTION";

/// Connection settings for the managed backend
///
/// The backend exposes serverless functions under `/functions/v1/` and
/// tables under `/rest/v1/`. Both are authenticated with the same key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend project (e.g. "https://project.example.co")
    pub base_url: String,

    /// API key sent as `apikey` and as a bearer token
    pub api_key: String,

    /// Name of the paginated query function (default: "get-temperature-data")
    #[serde(default = "default_query_function")]
    pub query_function: String,

    /// Table that receives ingested submissions (default: "csv_submissions")
    #[serde(default = "default_submissions_table")]
    pub submissions_table: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl BackendConfig {
    /// Create a backend config with default function/table names
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            query_function: default_query_function(),
            submissions_table: default_submissions_table(),
            request_timeout: default_request_timeout(),
        }
    }

    /// Load backend credentials from the environment
    ///
    /// Reads [`ENV_BACKEND_URL`] and [`ENV_API_KEY`] (both required) and
    /// [`ENV_QUERY_FUNCTION`] (optional).
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(ENV_BACKEND_URL)
            .map_err(|_| Error::config("backend.base_url", format!("{ENV_BACKEND_URL} not set")))?;
        let api_key = std::env::var(ENV_API_KEY)
            .map_err(|_| Error::config("backend.api_key", format!("{ENV_API_KEY} not set")))?;

        let mut config = Self::new(base_url, api_key);
        if let Ok(function) = std::env::var(ENV_QUERY_FUNCTION)
            && !function.trim().is_empty()
        {
            config.query_function = function;
        }
        Ok(config)
    }

    /// Check that every setting needed to reach the backend is present
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::config("backend.base_url", "backend URL is empty"));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::config("backend.api_key", "API key is empty"));
        }
        if self.query_function.trim().is_empty() {
            return Err(Error::config(
                "backend.query_function",
                "query function name is empty",
            ));
        }
        let base = self.base()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::config(
                "backend.base_url",
                format!("unsupported URL scheme '{}'", base.scheme()),
            ));
        }
        Ok(())
    }

    /// URL of the paginated query function
    pub fn function_url(&self) -> Result<Url> {
        self.join(&format!("functions/v1/{}", self.query_function))
    }

    /// URL of the submissions table endpoint
    pub fn table_url(&self) -> Result<Url> {
        self.join(&format!("rest/v1/{}", self.submissions_table))
    }

    fn base(&self) -> Result<Url> {
        // Trailing slash keeps any path prefix when joining
        let normalized = format!("{}/", self.base_url.trim().trim_end_matches('/'));
        Url::parse(&normalized)
            .map_err(|e| Error::config("backend.base_url", format!("invalid URL: {e}")))
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base()?
            .join(path)
            .map_err(|e| Error::config("backend.base_url", format!("invalid URL: {e}")))
    }
}

/// How fetched pages are held until the artifact is finalized
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportBuffering {
    /// Keep every page fragment in memory and write the file at the end (default)
    #[default]
    Memory,
    /// Stream each fragment to a partial file that is renamed on completion
    Streaming,
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Refuse to write, keep existing
    Skip,
}

/// Export behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Records requested per page (default: 5000)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Directory that receives finished artifacts (default: "./exports")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Page buffering strategy
    #[serde(default)]
    pub buffering: ExportBuffering,

    /// File collision handling for the final artifact
    #[serde(default)]
    pub file_collision: FileCollisionAction,

    /// Pause between pages (default: none, the task still yields)
    #[serde(default, with = "duration_millis_serde")]
    pub page_pause: Duration,

    /// Capacity of the event broadcast channel (default: 256)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            output_dir: default_output_dir(),
            buffering: ExportBuffering::default(),
            file_collision: FileCollisionAction::default(),
            page_pause: Duration::ZERO,
            event_capacity: default_event_capacity(),
        }
    }
}

/// Submission ingestion configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Rows per insert request (default: 100)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Main configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection settings
    pub backend: BackendConfig,

    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Ingestion settings
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl Config {
    /// Create a config with default export and ingest settings
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            export: ExportConfig::default(),
            ingest: IngestConfig::default(),
        }
    }

    /// Validate the whole configuration
    ///
    /// Called before any session starts so that a misconfigured backend is
    /// reported before a single page is requested.
    pub fn validate(&self) -> Result<()> {
        self.backend.validate()?;
        if self.export.page_size == 0 {
            return Err(Error::config("export.page_size", "page size must be > 0"));
        }
        if self.export.event_capacity == 0 {
            return Err(Error::config(
                "export.event_capacity",
                "event capacity must be > 0",
            ));
        }
        if self.ingest.batch_size == 0 {
            return Err(Error::config("ingest.batch_size", "batch size must be > 0"));
        }
        Ok(())
    }
}

fn default_query_function() -> String {
    "get-temperature-data".to_string()
}

fn default_submissions_table() -> String {
    "csv_submissions".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_page_size() -> usize {
    5000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./exports")
}

fn default_event_capacity() -> usize {
    256
}

fn default_batch_size() -> usize {
    100
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
