//! Chunked export of filtered temperature records.
//!
//! An [`Exporter`] owns the query endpoint and the event channel; each
//! export runs in its own [`ExportSession`], which walks the state machine
//!
//! ```text
//! Idle -> Previewing -> Ready -> Downloading{page 0..N} -> Complete
//!                                Downloading            -> Failed
//! ```
//!
//! Pages are requested strictly one after another. Each page is encoded
//! into one fragment and handed to the session's sink before the next page
//! is requested, so at most one page of decoded records is alive at a time.
//! Any failure aborts the sink and no artifact is produced.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ExportConfig};
use crate::encoder::{encode_fragment, header_fragment};
use crate::endpoint::{HttpQueryEndpoint, QueryEndpoint};
use crate::error::{Error, Result};
use crate::sink::{ExportSink, sink_for};
use crate::types::{
    Event, ExportArtifact, ExportRequest, Preview, SessionState, progress_percent,
};

/// Entry point for running exports against one backend
#[derive(Clone)]
pub struct Exporter {
    config: Arc<ExportConfig>,
    endpoint: Arc<dyn QueryEndpoint>,
    event_tx: broadcast::Sender<Event>,
}

impl Exporter {
    /// Create an exporter talking to the configured backend over HTTP
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configuration is incomplete; no
    /// request is made in that case.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let endpoint = HttpQueryEndpoint::new(&config.backend)?;
        Self::with_endpoint(config.export.clone(), Arc::new(endpoint))
    }

    /// Create an exporter over any [`QueryEndpoint`]
    pub fn with_endpoint(config: ExportConfig, endpoint: Arc<dyn QueryEndpoint>) -> Result<Self> {
        if config.page_size == 0 {
            return Err(Error::config("export.page_size", "page size must be > 0"));
        }
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            config: Arc::new(config),
            endpoint,
            event_tx,
        })
    }

    /// Subscribe to export events from every session of this exporter
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Export settings in use
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Start a new session for `request`
    ///
    /// Sessions share nothing mutable, so several may run at once.
    pub fn session(&self, request: ExportRequest) -> ExportSession {
        ExportSession {
            file_name: request.file_name(),
            request,
            config: Arc::clone(&self.config),
            endpoint: Arc::clone(&self.endpoint),
            event_tx: self.event_tx.clone(),
            cancel: CancellationToken::new(),
            state: SessionState::Idle,
        }
    }

    /// Preview, accept the count (even zero) and download in one call
    pub async fn export(&self, request: ExportRequest) -> Result<ExportArtifact> {
        let mut session = self.session(request);
        let preview = session.preview().await?;
        if preview.is_empty() {
            session.accept_empty_preview()?;
        }
        session.download().await
    }
}

/// One export: preview, then page through the endpoint into a single file
pub struct ExportSession {
    request: ExportRequest,
    file_name: String,
    config: Arc<ExportConfig>,
    endpoint: Arc<dyn QueryEndpoint>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
    state: SessionState,
}

impl ExportSession {
    /// Current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The filters this session exports
    pub fn request(&self) -> &ExportRequest {
        &self.request
    }

    /// Token that cancels the session before its next page request
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fetch a one-record page to estimate the number of matching records
    ///
    /// Allowed from `Idle`, `Ready` and `Failed`. A failed preview returns
    /// the session to `Idle`. A zero count is not an error: the session
    /// becomes `Ready` but waits for [`accept_empty_preview`].
    ///
    /// [`accept_empty_preview`]: ExportSession::accept_empty_preview
    pub async fn preview(&mut self) -> Result<Preview> {
        match self.state {
            SessionState::Idle | SessionState::Ready { .. } | SessionState::Failed => {}
            _ => return Err(self.invalid_state("preview")),
        }
        self.state = SessionState::Previewing;

        let page = match self.endpoint.fetch_page(&self.request, 0, 1).await {
            Ok(page) => page,
            Err(e) => {
                warn!(file = %self.file_name, error = %e, "export preview failed");
                self.state = SessionState::Idle;
                return Err(e);
            }
        };

        let estimated_total = match page.total {
            Some(total) => total,
            None => {
                warn!(
                    file = %self.file_name,
                    "preview reply carried no total, progress will be approximate"
                );
                page.fetched_count as u64
            }
        };

        self.state = SessionState::Ready {
            estimated_total,
            needs_confirmation: estimated_total == 0,
        };
        info!(file = %self.file_name, estimated_total, "export preview ready");
        self.event_tx
            .send(Event::PreviewReady {
                file_name: self.file_name.clone(),
                estimated_total,
            })
            .ok();

        Ok(Preview { estimated_total })
    }

    /// Confirm that a zero-count preview should still be downloaded
    pub fn accept_empty_preview(&mut self) -> Result<()> {
        if let SessionState::Ready {
            needs_confirmation, ..
        } = &mut self.state
        {
            *needs_confirmation = false;
            return Ok(());
        }
        Err(self.invalid_state("accept preview"))
    }

    /// Page through every matching record and deliver the artifact
    ///
    /// Requires a `Ready` session whose preview is non-empty or accepted.
    ///
    /// # Errors
    ///
    /// The first failing page, a sink error or cancellation aborts the
    /// session; buffered fragments are discarded and nothing is written to
    /// the output directory.
    pub async fn download(&mut self) -> Result<ExportArtifact> {
        let estimated_total = match self.state {
            SessionState::Ready {
                estimated_total,
                needs_confirmation: false,
            } => estimated_total,
            _ => return Err(self.invalid_state("download")),
        };

        info!(
            file = %self.file_name,
            estimated_total,
            page_size = self.config.page_size,
            endpoint = self.endpoint.name(),
            "starting export"
        );

        let mut sink = sink_for(&self.config, &self.file_name);
        let result = match self.fetch_pages(estimated_total, sink.as_mut()).await {
            Ok(()) => sink.finish().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(artifact) => {
                self.state = SessionState::Complete;
                info!(
                    path = %artifact.path.display(),
                    records = artifact.records,
                    bytes = artifact.bytes,
                    "export complete"
                );
                self.event_tx
                    .send(Event::Completed {
                        file_name: artifact.file_name.clone(),
                        path: artifact.path.clone(),
                        records: artifact.records,
                        bytes: artifact.bytes,
                    })
                    .ok();
                Ok(artifact)
            }
            Err(e) => {
                sink.abort().await;
                self.state = SessionState::Failed;
                error!(file = %self.file_name, error = %e, "export failed");
                self.event_tx
                    .send(Event::Failed {
                        file_name: self.file_name.clone(),
                        error: e.to_string(),
                    })
                    .ok();
                Err(e)
            }
        }
    }

    async fn fetch_pages(&mut self, estimated_total: u64, sink: &mut dyn ExportSink) -> Result<()> {
        let page_size = self.config.page_size;
        sink.write_fragment(header_fragment(), 0).await?;

        let mut offset: u64 = 0;
        let mut running_total: u64 = 0;
        let mut page_index: usize = 0;
        let mut has_more = true;

        while has_more {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.state = SessionState::Downloading { page: page_index };

            let page = self
                .endpoint
                .fetch_page(&self.request, offset, page_size)
                .await?;

            if page.has_more && page.fetched_count == 0 {
                return Err(Error::Endpoint(format!(
                    "page at offset {offset} was empty but reported more pages"
                )));
            }

            let fragment = encode_fragment(&page.records)?;
            sink.write_fragment(fragment, page.records.len()).await?;

            running_total += page.fetched_count as u64;
            let percent = progress_percent(running_total, estimated_total);
            debug!(
                file = %self.file_name,
                offset,
                fetched = page.fetched_count,
                running_total,
                percent,
                "page buffered"
            );
            self.event_tx
                .send(Event::PageFetched {
                    file_name: self.file_name.clone(),
                    offset,
                    fetched_count: page.fetched_count,
                    running_total,
                    percent,
                })
                .ok();

            offset += page_size as u64;
            has_more = page.has_more;
            page_index += 1;

            if has_more {
                self.pause().await;
            }
        }

        Ok(())
    }

    async fn pause(&self) {
        if self.config.page_pause.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.config.page_pause).await;
        }
    }

    fn invalid_state(&self, operation: &str) -> Error {
        Error::InvalidState {
            operation: operation.to_string(),
            current_state: self.state.to_string(),
        }
    }
}
