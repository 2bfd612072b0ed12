//! Test configuration helpers pointing the crate at a mock backend

use std::path::Path;
use temptrack_export::config::{ExportBuffering, FileCollisionAction};
use temptrack_export::{BackendConfig, Config};

/// API key the mock backend expects
pub const TEST_API_KEY: &str = "test-anon-key";

/// Configuration for a mock backend at `base_url`, exporting into `output_dir`
pub fn test_config(base_url: &str, output_dir: &Path, page_size: usize) -> Config {
    let mut config = Config::new(BackendConfig::new(base_url, TEST_API_KEY));
    config.export.page_size = page_size;
    config.export.output_dir = output_dir.to_path_buf();
    config.export.file_collision = FileCollisionAction::Rename;
    config
}

/// Same as [`test_config`] but streaming pages to a partial file
pub fn streaming_config(base_url: &str, output_dir: &Path, page_size: usize) -> Config {
    let mut config = test_config(base_url, output_dir, page_size);
    config.export.buffering = ExportBuffering::Streaming;
    config
}
