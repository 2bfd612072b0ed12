//! Header mapping and value parsing for historic submission sheets

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

/// Target columns and the sheet headers accepted for each, in priority order
const HEADER_ALIASES: &[(Column, &[&str])] = &[
    (Column::Name, &["name"]),
    (Column::Email, &["email"]),
    (Column::Neighborhood, &["neighborhood"]),
    (Column::Transport, &["transport"]),
    (
        Column::CreatedAt,
        &["submission datetime", "submission_datetime"],
    ),
    (Column::CsvUrl, &["csv url", "csv_url"]),
    (Column::HasCsv, &["**has csv", "has csv", "has_csv"]),
    (Column::Notes, &["notes"]),
    (Column::Complete, &["complete", "is_complete"]),
    (Column::HasProbeTemp, &["**has temp", "has temp", "has_temp"]),
    (Column::HasLatLng, &["has location", "has_location"]),
    (Column::NumRecords, &["numrecords", "num_records", "records"]),
];

/// Accepted datetime layouts; `%.f` also matches a missing fraction
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

/// Columns of the submissions table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    /// Submitter name
    Name,
    /// Submitter email
    Email,
    /// Neighborhood
    Neighborhood,
    /// Transport mode
    Transport,
    /// Submission timestamp
    CreatedAt,
    /// Link to the uploaded readings file
    CsvUrl,
    /// Whether a readings file was attached
    HasCsv,
    /// Free-form notes
    Notes,
    /// Whether the submission is complete
    Complete,
    /// Whether the file has probe temperatures
    HasProbeTemp,
    /// Whether the file has coordinates
    HasLatLng,
    /// Number of readings in the file
    NumRecords,
}

/// One row ready for insertion; absent values are omitted from the payload
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Submission {
    /// Submitter name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Submitter email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Neighborhood
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    /// Transport mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Submission time, ISO 8601
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Link to the uploaded readings file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_url: Option<String>,
    /// Free-form notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Whether the submission is complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
    /// Whether a readings file was attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_csv: Option<bool>,
    /// Whether the file has probe temperatures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_probe_temp: Option<bool>,
    /// Whether the file has coordinates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_lat_lng: Option<bool>,
    /// Number of readings in the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_records: Option<i64>,
}

impl Submission {
    /// Rows need a plausible email and a submission time
    ///
    /// The historic loader built this check but never applied it, so it
    /// inserted every row. Rows failing it are now skipped and counted.
    pub fn is_valid(&self) -> bool {
        self.email.as_deref().is_some_and(is_valid_email) && self.created_at.is_some()
    }
}

/// Normalize a sheet header: trim, lowercase, spaces to `_`, drop `*` and `?`
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .replace(['*', '?'], "")
}

/// Resolved column positions for one sheet
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderMap {
    positions: HashMap<Column, usize>,
}

impl HeaderMap {
    /// Map sheet headers to table columns; unknown headers are ignored
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let normalized: Vec<String> = headers.into_iter().map(normalize_header).collect();
        let mut positions = HashMap::new();

        for (column, aliases) in HEADER_ALIASES {
            let found = aliases.iter().find_map(|alias| {
                let alias = normalize_header(alias);
                normalized.iter().position(|h| *h == alias)
            });
            if let Some(index) = found {
                positions.insert(*column, index);
            }
        }

        Self { positions }
    }

    /// Position of `column`, if the sheet has it
    pub fn position(&self, column: Column) -> Option<usize> {
        self.positions.get(&column).copied()
    }

    /// Number of mapped columns
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no column could be mapped
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Build a [`Submission`] from one data row
    pub fn submission(&self, row: &csv::StringRecord) -> Submission {
        let raw = |column| {
            self.position(column)
                .and_then(|index| row.get(index))
                .unwrap_or("")
        };

        Submission {
            name: clean_string(raw(Column::Name)),
            email: clean_string(raw(Column::Email)),
            neighborhood: clean_string(raw(Column::Neighborhood)),
            transport: clean_string(raw(Column::Transport)),
            created_at: parse_datetime(raw(Column::CreatedAt)),
            csv_url: clean_string(raw(Column::CsvUrl)),
            notes: clean_string(raw(Column::Notes)),
            complete: parse_boolean(raw(Column::Complete)),
            has_csv: parse_boolean(raw(Column::HasCsv)),
            has_probe_temp: parse_boolean(raw(Column::HasProbeTemp)),
            has_lat_lng: parse_boolean(raw(Column::HasLatLng)),
            num_records: parse_integer(raw(Column::NumRecords)),
        }
    }
}

/// Trimmed value, or `None` when blank
pub fn clean_string(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse a sheet timestamp into ISO 8601 (`2024-05-01T14:30:00`)
pub fn parse_datetime(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        });

    match parsed {
        Some(datetime) if datetime.nanosecond() == 0 => {
            Some(datetime.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        Some(datetime) => Some(datetime.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
        None => {
            warn!(value, "unparsable datetime");
            None
        }
    }
}

/// Parse yes/no style flags; `**` markers from the sheet are ignored
pub fn parse_boolean(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().replace("**", "").as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a whole number, or `None`
pub fn parse_integer(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

/// `local@domain.tld` shape check
///
/// The historic pattern escaped its dot twice and so demanded a literal
/// backslash; this is the shape it was meant to match.
pub fn is_valid_email(email: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(email))
}
