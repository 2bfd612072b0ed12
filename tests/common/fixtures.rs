//! Mock query function and sample sheets

use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use super::config::TEST_API_KEY;

/// Path of the default query function
pub const QUERY_PATH: &str = "/functions/v1/get-temperature-data";

/// Reading number `i` in wire format
pub fn reading(i: usize) -> Value {
    json!({
        "date": format!("2024-06-{:02}", i % 30 + 1),
        "time": format!("{:02}:{:02}:00", i / 60 % 24, i % 60),
        "latitude": 40.7,
        "longitude": -73.9,
        "probe_temperature_f": 70 + (i % 20) as i64,
        "transit": if i % 2 == 0 { "bike" } else { "walk" },
    })
}

/// CSV line expected for [`reading`] `i`
pub fn expected_line(i: usize) -> String {
    format!(
        "2024-06-{:02},{:02}:{:02}:00,40.7,-73.9,{},{}",
        i % 30 + 1,
        i / 60 % 24,
        i % 60,
        70 + (i % 20),
        if i % 2 == 0 { "bike" } else { "walk" }
    )
}

/// Query function serving `total` readings, paged by the request's
/// `offset` and `limit`
#[derive(Clone)]
pub struct PagedDataset {
    total: usize,
    report_total: bool,
    fail_offsets: HashSet<u64>,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl PagedDataset {
    /// Dataset of `total` readings
    pub fn new(total: usize) -> Self {
        Self {
            total,
            report_total: true,
            fail_offsets: HashSet::new(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply with HTTP 500 for the page at `offset`
    pub fn failing_at(mut self, offset: u64) -> Self {
        self.fail_offsets.insert(offset);
        self
    }

    /// Omit the `total` field from replies
    pub fn without_total(mut self) -> Self {
        self.report_total = false;
        self
    }

    /// Request bodies received so far
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// `(offset, limit)` of every request received
    pub fn pages_requested(&self) -> Vec<(u64, u64)> {
        self.requests()
            .iter()
            .map(|body| {
                (
                    body["offset"].as_u64().unwrap(),
                    body["limit"].as_u64().unwrap(),
                )
            })
            .collect()
    }

    /// Mount this dataset on `server` at [`QUERY_PATH`]
    pub async fn mount(&self, server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(QUERY_PATH))
            .and(header("apikey", TEST_API_KEY))
            .respond_with(self.clone())
            .mount(server)
            .await;
    }
}

impl Respond for PagedDataset {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        self.requests.lock().unwrap().push(body.clone());

        let offset = body["offset"].as_u64().unwrap_or(0);
        let limit = body["limit"].as_u64().unwrap_or(0);
        if self.fail_offsets.contains(&offset) {
            return ResponseTemplate::new(500).set_body_string("internal error");
        }

        let start = (offset as usize).min(self.total);
        let end = (start + limit as usize).min(self.total);
        let data: Vec<Value> = (start..end).map(reading).collect();

        let mut reply = json!({
            "success": true,
            "fetchedCount": data.len(),
            "hasMore": end < self.total,
            "data": data,
        });
        if self.report_total {
            reply["total"] = json!(self.total);
        }
        ResponseTemplate::new(200).set_body_json(reply)
    }
}

/// Submissions sheet with two valid rows, one invalid row and one blank row
pub const SUBMISSIONS_SHEET: &str = "\
Name,Email,Neighborhood,Transport,Submission Datetime,CSV URL,**Has CSV,**Has Temp,Has Location,NumRecords,Notes
Ana,ana@example.org,Astoria,bike,2024-07-04 08:00:00,https://files.example.org/a.csv,yes,yes,yes,120,
Ben,ben-at-example,Harlem,bus,2024-07-05 09:00:00,,no,no,no,,
,,,,,,,,,,
Cy,cy@example.org,Inwood,walk,2024-07-06T10:30:00.5,,TRUE,0,1,7,late upload
";
