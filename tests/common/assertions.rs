//! Custom assertions for export integration tests

use std::path::{Path, PathBuf};
use std::time::Duration;
use temptrack_export::Event;
use tokio::sync::broadcast;

/// Terminal outcome observed on the event channel
#[derive(Debug)]
pub enum WaitResult {
    /// Export completed with the artifact at this path
    Completed(PathBuf),
    /// Export failed with error
    Failed(String),
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Collect events until `Completed` or `Failed`, returning both
pub async fn wait_for_terminal(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
) -> (WaitResult, Vec<Event>) {
    let mut seen = Vec::new();
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Completed { path, .. }) => return WaitResult::Completed(path),
                Ok(Event::Failed { error, .. }) => return WaitResult::Failed(error),
                Ok(event) => seen.push(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await
    .unwrap_or(WaitResult::Timeout);
    (result, seen)
}

/// Progress percentages from `PageFetched` events, in order
pub fn progress_of(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::PageFetched { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

/// Assert that `dir` holds no files (missing counts as empty)
pub fn assert_no_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let names: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|e| e.file_name())
        .collect();
    assert!(names.is_empty(), "expected no files in {}, found {names:?}", dir.display());
}
