//! # temptrack-export
//!
//! Chunked CSV export of sensor readings for the temperature dashboard.
//!
//! The dashboard's query function returns at most one page of readings per
//! call. An export first asks for a single record to learn how many rows
//! match, then pages through the result strictly in order, encoding each
//! page into a CSV fragment and handing it to a sink. The finished file is
//! only delivered once every page has arrived; any failure discards it.
//!
//! The crate also carries the one-off loader for historic submission
//! sheets ([`ingest`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use temptrack_export::{BackendConfig, Config, ExportFilters, Exporter};
//! use chrono::Month;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new(BackendConfig::from_env()?);
//!     let exporter = Exporter::new(&config)?;
//!
//!     // Subscribe to progress events
//!     let mut events = exporter.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let mut filters = ExportFilters::new();
//!     filters.set_month(Month::June).set_transport(Some("bike"));
//!     let artifact = exporter.export(filters.to_request()?).await?;
//!     println!("wrote {} records to {}", artifact.records, artifact.path.display());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// CSV fragment encoding
pub mod encoder;
/// Paginated query endpoint
pub mod endpoint;
/// Error types
pub mod error;
/// Export sessions
pub mod export;
/// Submission sheet ingestion
pub mod ingest;
/// Output sinks
pub mod sink;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{BackendConfig, Config, ExportBuffering, ExportConfig, FileCollisionAction};
pub use endpoint::{HttpQueryEndpoint, QueryEndpoint, QueryOutcome};
pub use error::{Error, Result};
pub use export::{ExportSession, Exporter};
pub use ingest::{IngestStats, SubmissionIngester};
pub use sink::{ExportSink, MemorySink, StreamingFileSink};
pub use types::{
    DateRange, Event, ExportArtifact, ExportFilters, ExportRequest, Page, Preview, SessionState,
    TemperatureRecord,
};

/// Run one export, cancelling it when a termination signal arrives.
///
/// The signal cancels the session's token; the export stops before its next
/// page request and returns [`Error::Cancelled`] without writing a file.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use temptrack_export::{BackendConfig, Config, ExportFilters, Exporter, run_with_shutdown};
/// use chrono::Month;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let exporter = Exporter::new(&Config::new(BackendConfig::from_env()?))?;
///     let mut filters = ExportFilters::new();
///     filters.set_month(Month::March);
///
///     let session = exporter.session(filters.to_request()?);
///     run_with_shutdown(session).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(mut session: ExportSession) -> Result<ExportArtifact> {
    let token = session.cancellation_token();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        token.cancel();
    });

    let result = async {
        if session.preview().await?.is_empty() {
            session.accept_empty_preview()?;
        }
        session.download().await
    }
    .await;

    watcher.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; fall back to ctrl_c
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, cancelling export"),
                _ = sigint.recv() => tracing::info!("received SIGINT, cancelling export"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "could not register every signal handler");
            only.recv().await;
            tracing::info!("received termination signal, cancelling export");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "no signal handlers available, using ctrl_c");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        // Never resolve, so the export is not cancelled spuriously
        std::future::pending::<()>().await;
    }
    tracing::info!("received Ctrl+C, cancelling export");
}
