//! Output sinks for export fragments
//!
//! A sink receives the header fragment and one fragment per page, in order,
//! and either finishes into an [`ExportArtifact`] or is aborted. An aborted
//! or failed sink leaves nothing behind in the output directory.
//!
//! - [`MemorySink`] holds every fragment until [`ExportSink::finish`] and
//!   only then touches the filesystem.
//! - [`StreamingFileSink`] appends each fragment to a partial file as it
//!   arrives, keeping memory bounded by one page.
//!
//! Both write into a partial file private to the sink and move it into
//! place only once it is complete (see [`persist_partial`]).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::config::{ExportBuffering, ExportConfig, FileCollisionAction};
use crate::error::{Error, Result};
use crate::types::ExportArtifact;
use crate::utils::{create_partial, persist_partial};

/// Destination for encoded export fragments
#[async_trait]
pub trait ExportSink: Send {
    /// Append one fragment holding `records` data rows
    async fn write_fragment(&mut self, fragment: String, records: usize) -> Result<()>;

    /// Deliver the artifact
    async fn finish(&mut self) -> Result<ExportArtifact>;

    /// Discard everything written so far
    async fn abort(&mut self);

    /// Bytes accepted so far
    fn bytes_written(&self) -> u64;
}

/// Create the sink selected by `config.buffering`
pub fn sink_for(config: &ExportConfig, file_name: &str) -> Box<dyn ExportSink> {
    let target = SinkTarget {
        output_dir: config.output_dir.clone(),
        file_name: file_name.to_string(),
        collision: config.file_collision,
    };
    match config.buffering {
        ExportBuffering::Memory => Box::new(MemorySink::new(target)),
        ExportBuffering::Streaming => Box::new(StreamingFileSink::new(target)),
    }
}

/// Where a sink delivers its artifact
#[derive(Clone, Debug)]
pub struct SinkTarget {
    /// Output directory (created on demand)
    pub output_dir: PathBuf,
    /// Desired file name
    pub file_name: String,
    /// Collision handling for the final path
    pub collision: FileCollisionAction,
}

impl SinkTarget {
    fn desired_path(&self) -> PathBuf {
        self.output_dir.join(&self.file_name)
    }

    async fn open_partial(&self) -> Result<(BufWriter<tokio::fs::File>, TempPath)> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let (file, partial) = create_partial(&self.output_dir, &self.file_name)?;
        Ok((BufWriter::new(tokio::fs::File::from_std(file)), partial))
    }

    /// Flush `writer` to disk and move `partial` to its final path
    async fn settle(
        &self,
        mut writer: BufWriter<tokio::fs::File>,
        partial: TempPath,
    ) -> Result<PathBuf> {
        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        let desired = self.desired_path();
        let collision = self.collision;
        tokio::task::spawn_blocking(move || persist_partial(partial, &desired, collision))
            .await
            .map_err(|e| Error::Other(format!("persist task failed: {e}")))?
    }

    fn artifact(&self, path: PathBuf, records: u64, bytes: u64) -> ExportArtifact {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.file_name.clone());
        ExportArtifact {
            file_name,
            path,
            records,
            bytes,
        }
    }
}

fn discard_partial(partial: TempPath) {
    let path = partial.to_path_buf();
    if let Err(e) = partial.close()
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove partial export");
    }
}

/// Sink that keeps all fragments in memory until finish
pub struct MemorySink {
    target: SinkTarget,
    fragments: Vec<String>,
    records: u64,
    bytes: u64,
}

impl MemorySink {
    /// Create an empty in-memory sink
    pub fn new(target: SinkTarget) -> Self {
        Self {
            target,
            fragments: Vec::new(),
            records: 0,
            bytes: 0,
        }
    }

    /// Fragments buffered so far, in arrival order
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }
}

#[async_trait]
impl ExportSink for MemorySink {
    async fn write_fragment(&mut self, fragment: String, records: usize) -> Result<()> {
        self.bytes += fragment.len() as u64;
        self.records += records as u64;
        self.fragments.push(fragment);
        Ok(())
    }

    async fn finish(&mut self) -> Result<ExportArtifact> {
        // The partial file is removed if anything below fails
        let (mut writer, partial) = self.target.open_partial().await?;
        for fragment in &self.fragments {
            writer.write_all(fragment.as_bytes()).await?;
        }
        let path = self.target.settle(writer, partial).await?;
        self.fragments.clear();

        debug!(path = %path.display(), bytes = self.bytes, "export written from memory");
        Ok(self.target.artifact(path, self.records, self.bytes))
    }

    async fn abort(&mut self) {
        self.fragments.clear();
        self.records = 0;
        self.bytes = 0;
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

/// Sink that streams fragments to a partial file
///
/// The partial file is deleted on abort, on a failed finish, and when the
/// sink is dropped before finishing.
pub struct StreamingFileSink {
    target: SinkTarget,
    open: Option<(BufWriter<tokio::fs::File>, TempPath)>,
    records: u64,
    bytes: u64,
}

impl StreamingFileSink {
    /// Create a streaming sink; the partial file is created on first write
    pub fn new(target: SinkTarget) -> Self {
        Self {
            target,
            open: None,
            records: 0,
            bytes: 0,
        }
    }

    /// Path of the in-progress file, once one exists
    pub fn partial_path(&self) -> Option<&Path> {
        self.open.as_ref().map(|(_, partial)| &**partial)
    }

    async fn ensure_open(&mut self) -> Result<()> {
        if self.open.is_none() {
            self.open = Some(self.target.open_partial().await?);
        }
        Ok(())
    }
}

#[async_trait]
impl ExportSink for StreamingFileSink {
    async fn write_fragment(&mut self, fragment: String, records: usize) -> Result<()> {
        self.ensure_open().await?;
        if let Some((writer, _)) = self.open.as_mut() {
            writer.write_all(fragment.as_bytes()).await?;
        }
        self.bytes += fragment.len() as u64;
        self.records += records as u64;
        Ok(())
    }

    async fn finish(&mut self) -> Result<ExportArtifact> {
        // An export with no fragments still produces an (empty) file
        self.ensure_open().await?;
        let (writer, partial) = self
            .open
            .take()
            .ok_or_else(|| Error::Other("partial file not open".to_string()))?;
        let path = self.target.settle(writer, partial).await?;

        debug!(path = %path.display(), bytes = self.bytes, "streamed export finalized");
        Ok(self.target.artifact(path, self.records, self.bytes))
    }

    async fn abort(&mut self) {
        if let Some((writer, partial)) = self.open.take() {
            drop(writer);
            discard_partial(partial);
        }
        self.records = 0;
        self.bytes = 0;
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}
