//! Bulk ingestion of historic submission sheets.
//!
//! A sheet is read with the `csv` crate, its headers are mapped onto the
//! submissions table (see [`normalize`]), and valid rows are inserted in
//! batches through a [`SubmissionTable`]. When a batch insert fails, its
//! rows are retried one at a time so a single bad row does not cost the
//! whole batch.

pub mod normalize;
pub mod table;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, IngestConfig};
use crate::error::{Error, Result};

pub use normalize::{HeaderMap, Submission};
pub use table::{RestSubmissionTable, SubmissionTable};

/// Counters for one ingestion run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Non-blank data rows read
    pub total_rows: u64,
    /// Rows the table reports as stored
    pub successful_inserts: u64,
    /// Valid rows the table did not store
    pub failed_inserts: u64,
    /// Rows rejected before insertion
    pub validation_errors: u64,
    /// Blank rows
    pub skipped_rows: u64,
}

/// Loads submission sheets into a [`SubmissionTable`]
pub struct SubmissionIngester {
    table: Arc<dyn SubmissionTable>,
    batch_size: usize,
}

impl SubmissionIngester {
    /// Create an ingester writing to the configured backend table
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let table = RestSubmissionTable::new(&config.backend)?;
        Self::with_table(&config.ingest, Arc::new(table))
    }

    /// Create an ingester over any [`SubmissionTable`]
    pub fn with_table(config: &IngestConfig, table: Arc<dyn SubmissionTable>) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::config("ingest.batch_size", "batch size must be > 0"));
        }
        Ok(Self {
            table,
            batch_size: config.batch_size,
        })
    }

    /// Ingest the sheet at `path`
    pub async fn ingest_csv(&self, path: &Path) -> Result<IngestStats> {
        info!(path = %path.display(), "ingesting submissions");
        let contents = tokio::fs::read(path).await?;
        self.ingest_reader(contents.as_slice()).await
    }

    /// Ingest a sheet from any reader; the first record is the header
    ///
    /// Each batch is inserted as soon as it fills, so a malformed record
    /// late in the sheet fails the run without losing the batches before it.
    pub async fn ingest_reader<R: std::io::Read + Send>(&self, reader: R) -> Result<IngestStats> {
        let mut stats = IngestStats::default();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let header_map = HeaderMap::from_headers(reader.headers()?.iter());
        if header_map.is_empty() {
            return Err(Error::InvalidRequest(
                "sheet has no recognised submission columns".to_string(),
            ));
        }

        let mut batch = Vec::with_capacity(self.batch_size);
        let mut record = csv::StringRecord::new();
        let mut line = 0usize;
        loop {
            match reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    error!(row = line + 1, error = %e, ?stats, "unreadable row, stopping ingestion");
                    return Err(e.into());
                }
            }
            line += 1;

            if let Some(submission) = accept_row(&header_map, &record, line, &mut stats) {
                batch.push(submission);
            }
            if batch.len() >= self.batch_size {
                self.flush(&mut batch, &mut stats).await;
            }
        }
        if !batch.is_empty() {
            self.flush(&mut batch, &mut stats).await;
        }

        info!(
            total_rows = stats.total_rows,
            successful_inserts = stats.successful_inserts,
            failed_inserts = stats.failed_inserts,
            validation_errors = stats.validation_errors,
            skipped_rows = stats.skipped_rows,
            "ingestion finished"
        );
        Ok(stats)
    }

    async fn flush(&self, batch: &mut Vec<Submission>, stats: &mut IngestStats) {
        let stored = self.insert_batch(batch).await;
        stats.successful_inserts += stored as u64;
        stats.failed_inserts += batch.len().saturating_sub(stored) as u64;
        batch.clear();
    }

    async fn insert_batch(&self, batch: &[Submission]) -> usize {
        match self.table.insert(batch).await {
            Ok(stored) => {
                debug!(rows = batch.len(), stored, "batch inserted");
                stored.min(batch.len())
            }
            Err(e) => {
                error!(rows = batch.len(), error = %e, "batch insert failed, retrying row by row");
                self.insert_one_by_one(batch).await
            }
        }
    }

    async fn insert_one_by_one(&self, batch: &[Submission]) -> usize {
        let mut stored = 0;
        for row in batch {
            match self.table.insert(std::slice::from_ref(row)).await {
                Ok(n) if n > 0 => stored += 1,
                Ok(_) => warn!(email = ?row.email, "insert returned no rows"),
                Err(e) => error!(email = ?row.email, error = %e, "insert failed"),
            }
        }
        stored
    }
}

fn accept_row(
    header_map: &HeaderMap,
    record: &csv::StringRecord,
    line: usize,
    stats: &mut IngestStats,
) -> Option<Submission> {
    if record.iter().all(|field| field.trim().is_empty()) {
        stats.skipped_rows += 1;
        return None;
    }
    stats.total_rows += 1;

    let submission = header_map.submission(record);
    if !submission.is_valid() {
        warn!(row = line, email = ?submission.email, "row failed validation");
        stats.validation_errors += 1;
        return None;
    }
    Some(submission)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
