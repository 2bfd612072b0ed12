//! Core types for temptrack-export

use chrono::{Month, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// One probe reading as returned by the query function
///
/// Every field is optional on the wire; missing values encode as empty
/// CSV fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRecord {
    /// Reading date as stored by the backend (e.g. "2024-06-01")
    #[serde(default)]
    pub date: Option<String>,
    /// Reading time of day (e.g. "13:45:00")
    #[serde(default)]
    pub time: Option<String>,
    /// Latitude in decimal degrees
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Probe temperature in degrees Fahrenheit
    #[serde(default)]
    pub probe_temperature_f: Option<f64>,
    /// Transport mode label (walk, bike, bus, ...)
    #[serde(default)]
    pub transit: Option<String>,
}

/// Inclusive calendar date range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day included
    pub start: NaiveDate,
    /// Last day included
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a date range, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRequest(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }
}

/// Which days an export covers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateSelector {
    /// An explicit date range
    Range(DateRange),
    /// The same calendar month in every year
    Month(Month),
}

/// Optional time-of-day bounds applied on every selected day
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeWindow {
    /// Lower bound (inclusive)
    pub start: Option<NaiveTime>,
    /// Upper bound (inclusive)
    pub end: Option<NaiveTime>,
}

/// Immutable, validated set of export filters
///
/// Built from [`ExportFilters::to_request`]; the date selector is an enum
/// so a request can never carry both a range and a month.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportRequest {
    date: DateSelector,
    time: TimeWindow,
    transport: Option<String>,
}

impl ExportRequest {
    /// Request covering an explicit date range
    pub fn for_range(range: DateRange) -> Self {
        Self {
            date: DateSelector::Range(range),
            time: TimeWindow::default(),
            transport: None,
        }
    }

    /// Request covering a recurring month
    pub fn for_month(month: Month) -> Self {
        Self {
            date: DateSelector::Month(month),
            time: TimeWindow::default(),
            transport: None,
        }
    }

    /// Date selector
    pub fn date(&self) -> DateSelector {
        self.date
    }

    /// Time-of-day window
    pub fn time(&self) -> TimeWindow {
        self.time
    }

    /// Transport-mode filter, if any
    pub fn transport(&self) -> Option<&str> {
        self.transport.as_deref()
    }

    /// Name of the file produced for this request
    ///
    /// `temperature_data_2024-06-01_to_2024-06-30.csv` for a range,
    /// `temperature_data_june.csv` for a month.
    pub fn file_name(&self) -> String {
        match self.date {
            DateSelector::Range(range) => {
                format!("temperature_data_{}_to_{}.csv", range.start, range.end)
            }
            DateSelector::Month(month) => {
                format!("temperature_data_{}.csv", month.name().to_lowercase())
            }
        }
    }
}

/// Editable filter state
///
/// Mirrors the dashboard's filter controls: choosing a date range clears the
/// month selector and vice versa.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportFilters {
    date_range: Option<DateRange>,
    month: Option<Month>,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    transport: Option<String>,
}

impl ExportFilters {
    /// Empty filter state
    pub fn new() -> Self {
        Self::default()
    }

    /// Select an explicit date range (clears the month)
    pub fn set_date_range(&mut self, range: DateRange) -> &mut Self {
        self.date_range = Some(range);
        self.month = None;
        self
    }

    /// Select a recurring month (clears the date range)
    pub fn set_month(&mut self, month: Month) -> &mut Self {
        self.month = Some(month);
        self.date_range = None;
        self
    }

    /// Set or clear the time-of-day lower bound
    pub fn set_start_time(&mut self, time: Option<NaiveTime>) -> &mut Self {
        self.start_time = time;
        self
    }

    /// Set or clear the time-of-day upper bound
    pub fn set_end_time(&mut self, time: Option<NaiveTime>) -> &mut Self {
        self.end_time = time;
        self
    }

    /// Set or clear the transport filter; blank values clear it
    pub fn set_transport(&mut self, transport: Option<&str>) -> &mut Self {
        self.transport = transport
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self
    }

    /// Currently selected date range
    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }

    /// Currently selected month
    pub fn month(&self) -> Option<Month> {
        self.month
    }

    /// Whether a date range or month has been chosen
    pub fn has_date_selection(&self) -> bool {
        self.date_range.is_some() || self.month.is_some()
    }

    /// Freeze the filters into an [`ExportRequest`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if neither a date range nor a month
    /// is selected, or if the time bounds are reversed.
    pub fn to_request(&self) -> Result<ExportRequest> {
        let date = match (self.date_range, self.month) {
            (Some(range), _) => DateSelector::Range(range),
            (None, Some(month)) => DateSelector::Month(month),
            (None, None) => {
                return Err(Error::InvalidRequest(
                    "select a date range or a month".to_string(),
                ));
            }
        };

        if let (Some(start), Some(end)) = (self.start_time, self.end_time)
            && start > end
        {
            return Err(Error::InvalidRequest(format!(
                "start time {start} is after end time {end}"
            )));
        }

        Ok(ExportRequest {
            date,
            time: TimeWindow {
                start: self.start_time,
                end: self.end_time,
            },
            transport: self.transport.clone(),
        })
    }
}

/// One page returned by the query function
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    /// Records in server order
    pub records: Vec<TemperatureRecord>,
    /// Number of records the server reports for this page
    pub fetched_count: usize,
    /// Whether another page follows
    pub has_more: bool,
    /// Total matching records, when the server reports it
    pub total: Option<u64>,
}

/// Result of a preview call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    /// Estimated number of matching records
    pub estimated_total: u64,
}

impl Preview {
    /// Zero-count previews need explicit confirmation before downloading
    pub fn is_empty(&self) -> bool {
        self.estimated_total == 0
    }
}

/// A finished export file
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    /// File name derived from the filters
    pub file_name: String,
    /// Where the file was written
    pub path: PathBuf,
    /// Number of data rows (header excluded)
    pub records: u64,
    /// File size in bytes
    pub bytes: u64,
}

/// Export progress as an integer percentage
///
/// `min(100, round(running_total / estimated_total * 100))`. An estimate of
/// zero reports 0 until a record arrives and 100 afterwards.
pub fn progress_percent(running_total: u64, estimated_total: u64) -> u8 {
    if estimated_total == 0 {
        return if running_total == 0 { 0 } else { 100 };
    }
    let percent = (running_total as f64 / estimated_total as f64 * 100.0).round();
    percent.min(100.0) as u8
}

/// Lifecycle state of an export session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing previewed yet
    Idle,
    /// Preview request in flight
    Previewing,
    /// Preview done; download may start
    Ready {
        /// Total reported by the preview
        estimated_total: u64,
        /// A zero-count preview still waiting for confirmation
        needs_confirmation: bool,
    },
    /// Fetching pages
    Downloading {
        /// Zero-based index of the page being fetched
        page: usize,
    },
    /// Artifact delivered
    Complete,
    /// Aborted; no artifact produced
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Previewing => write!(f, "previewing"),
            SessionState::Ready {
                needs_confirmation: true,
                ..
            } => write!(f, "awaiting confirmation"),
            SessionState::Ready { .. } => write!(f, "ready"),
            SessionState::Downloading { page } => write!(f, "downloading page {page}"),
            SessionState::Complete => write!(f, "complete"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Event emitted during an export
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Preview finished
    PreviewReady {
        /// Target file name
        file_name: String,
        /// Estimated number of records
        estimated_total: u64,
    },

    /// One page was fetched and buffered
    PageFetched {
        /// Target file name
        file_name: String,
        /// Offset of the page
        offset: u64,
        /// Records in this page
        fetched_count: usize,
        /// Records retrieved so far
        running_total: u64,
        /// Progress percentage (0 to 100)
        percent: u8,
    },

    /// Artifact written
    Completed {
        /// Final file name
        file_name: String,
        /// Final path
        path: PathBuf,
        /// Data rows written
        records: u64,
        /// Size in bytes
        bytes: u64,
    },

    /// Session aborted
    Failed {
        /// Target file name
        file_name: String,
        /// Error message
        error: String,
    },
}
