use super::*;
use async_trait::async_trait;
use std::sync::Mutex;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::BackendConfig;

const SHEET: &str = "\
Name,Email,Neighborhood,Transport,Submission Datetime,**Has CSV,Complete?,NumRecords
Ana,ana@example.org,Astoria,bike,2024-07-04 08:00:00,yes,TRUE,120
Ben,not-an-email,Harlem,bus,2024-07-05 09:00:00,no,false,
,,,,,,,
Cy,cy@example.org,,walk,07/06/2024 10:30:00,,,7
Dee,dee@example.org,Queens,car,,yes,yes,3
";

/// Records every insert call; fails batches larger than `fail_batches_over`
/// and any row whose email is listed in `reject`
#[derive(Default)]
struct FakeTable {
    fail_batches_over: Option<usize>,
    reject: Vec<String>,
    calls: Mutex<Vec<Vec<Submission>>>,
}

impl FakeTable {
    fn calls(&self) -> Vec<Vec<Submission>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionTable for FakeTable {
    async fn insert(&self, rows: &[Submission]) -> Result<usize> {
        self.calls.lock().unwrap().push(rows.to_vec());

        if let Some(limit) = self.fail_batches_over
            && rows.len() > limit
        {
            return Err(Error::HttpStatus {
                status: 400,
                body: "batch rejected".to_string(),
            });
        }
        let rejected = rows
            .iter()
            .any(|r| r.email.as_ref().is_some_and(|e| self.reject.contains(e)));
        if rejected {
            return Err(Error::HttpStatus {
                status: 409,
                body: "duplicate".to_string(),
            });
        }
        Ok(rows.len())
    }
}

fn ingester(table: Arc<FakeTable>, batch_size: usize) -> SubmissionIngester {
    SubmissionIngester::with_table(&IngestConfig { batch_size }, table).unwrap()
}

#[tokio::test]
async fn test_valid_rows_inserted_and_invalid_counted() {
    let table = Arc::new(FakeTable::default());
    let stats = ingester(table.clone(), 100)
        .ingest_reader(SHEET.as_bytes())
        .await
        .unwrap();

    assert_eq!(
        stats,
        IngestStats {
            total_rows: 4,
            successful_inserts: 2,
            failed_inserts: 0,
            validation_errors: 2,
            skipped_rows: 1,
        }
    );

    let calls = table.calls();
    assert_eq!(calls.len(), 1);
    let emails: Vec<_> = calls[0].iter().map(|r| r.email.clone().unwrap()).collect();
    assert_eq!(emails, vec!["ana@example.org", "cy@example.org"]);
    assert_eq!(calls[0][1].created_at.as_deref(), Some("2024-07-06T10:30:00"));
    assert_eq!(calls[0][0].complete, Some(true));
}

#[tokio::test]
async fn test_rows_are_batched() {
    let mut sheet = String::from("email,submission datetime\n");
    for i in 0..5 {
        sheet.push_str(&format!("user{i}@example.org,2024-01-0{} 12:00:00\n", i + 1));
    }

    let table = Arc::new(FakeTable::default());
    let stats = ingester(table.clone(), 2)
        .ingest_reader(sheet.as_bytes())
        .await
        .unwrap();

    let sizes: Vec<_> = table.calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(stats.successful_inserts, 5);
}

#[tokio::test]
async fn test_failed_batch_retried_row_by_row() {
    let sheet = "email,submission datetime\n\
                 a@example.org,2024-01-01\n\
                 b@example.org,2024-01-02\n\
                 c@example.org,2024-01-03\n";
    let table = Arc::new(FakeTable {
        fail_batches_over: Some(1),
        reject: vec!["b@example.org".to_string()],
        ..Default::default()
    });

    let stats = ingester(table.clone(), 10)
        .ingest_reader(sheet.as_bytes())
        .await
        .unwrap();

    assert_eq!(stats.successful_inserts, 2);
    assert_eq!(stats.failed_inserts, 1);
    let sizes: Vec<_> = table.calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 1, 1, 1]);
}

#[tokio::test]
async fn test_unreadable_row_keeps_earlier_batches() {
    let mut sheet = b"email,submission datetime\n\
                      a@example.org,2024-01-01\n\
                      b@example.org,2024-01-02\n\
                      c@example.org,2024-01-03\n"
        .to_vec();
    // Not UTF-8
    sheet.extend_from_slice(b"\xff\xfe@example.org,2024-01-04\n");

    let table = Arc::new(FakeTable::default());
    let result = ingester(table.clone(), 2)
        .ingest_reader(sheet.as_slice())
        .await;

    assert!(matches!(result, Err(Error::Csv(_))));
    let calls = table.calls();
    assert_eq!(calls.len(), 1, "the full first batch was already stored");
    let emails: Vec<_> = calls[0].iter().map(|r| r.email.clone().unwrap()).collect();
    assert_eq!(emails, vec!["a@example.org", "b@example.org"]);
}

#[tokio::test]
async fn test_unrecognised_headers_rejected() {
    let table = Arc::new(FakeTable::default());
    let result = ingester(table.clone(), 10)
        .ingest_reader("foo,bar\n1,2\n".as_bytes())
        .await;

    assert!(matches!(result, Err(Error::InvalidRequest(_))));
    assert!(table.calls().is_empty());
}

#[test]
fn test_zero_batch_size_rejected() {
    let result =
        SubmissionIngester::with_table(&IngestConfig { batch_size: 0 }, Arc::new(FakeTable::default()));
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[tokio::test]
async fn test_ingest_csv_reads_file() {
    let dir = TempDir::new().unwrap();
    let sheet = dir.path().join("submissions.csv");
    std::fs::write(&sheet, SHEET).unwrap();

    let table = Arc::new(FakeTable::default());
    let stats = ingester(table, 100).ingest_csv(&sheet).await.unwrap();
    assert_eq!(stats.successful_inserts, 2);
}

#[tokio::test]
async fn test_ingest_csv_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let table = Arc::new(FakeTable::default());
    let result = ingester(table, 100)
        .ingest_csv(&dir.path().join("absent.csv"))
        .await;
    assert!(matches!(result, Err(Error::Io(_))));
}

#[tokio::test]
async fn test_rest_table_posts_rows_and_counts_representation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/csv_submissions"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer anon-key"))
        .and(header("prefer", "return=representation"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(serde_json::json!([{"id": 1}, {"id": 2}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::new(BackendConfig::new(server.uri(), "anon-key"));
    config.ingest.batch_size = 50;
    let stats = SubmissionIngester::new(&config)
        .unwrap()
        .ingest_reader(SHEET.as_bytes())
        .await
        .unwrap();

    assert_eq!(stats.successful_inserts, 2);
    assert_eq!(stats.failed_inserts, 0);
}

#[tokio::test]
async fn test_rest_table_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/csv_submissions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let table = RestSubmissionTable::new(&BackendConfig::new(server.uri(), "anon-key")).unwrap();
    let row = Submission {
        email: Some("a@example.org".to_string()),
        created_at: Some("2024-01-01T00:00:00".to_string()),
        ..Default::default()
    };

    match table.insert(&[row]).await {
        Err(Error::HttpStatus { status, body }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad key");
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}
