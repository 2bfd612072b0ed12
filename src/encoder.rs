//! CSV line encoding for export fragments
//!
//! Fields are written in a fixed order with comma separators and no quoting
//! or escaping, so a value that itself contains a comma shifts the columns
//! of its line. Output is byte-compatible with the dashboard's existing
//! export files.

use crate::error::{Error, Result};
use crate::types::TemperatureRecord;

/// Column names, in output order
pub const FIELDS: [&str; 6] = [
    "date",
    "time",
    "latitude",
    "longitude",
    "probe_temperature_f",
    "transit",
];

/// Header fragment: the field names followed by a newline
pub fn header_fragment() -> String {
    let mut header = FIELDS.join(",");
    header.push('\n');
    header
}

/// Encode one page of records as a single fragment, one line per record
pub fn encode_fragment(records: &[TemperatureRecord]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(records.len() * 64));

    for record in records {
        writer.write_record(fields(record))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Other(format!("failed to flush CSV fragment: {}", e.error())))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::Other(format!("CSV fragment is not valid UTF-8: {e}")))
}

fn fields(record: &TemperatureRecord) -> [String; 6] {
    [
        record.date.clone().unwrap_or_default(),
        record.time.clone().unwrap_or_default(),
        number(record.latitude),
        number(record.longitude),
        number(record.probe_temperature_f),
        record.transit.clone().unwrap_or_default(),
    ]
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
