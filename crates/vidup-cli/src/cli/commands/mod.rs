//! CLI command handlers. Each command is in its own file.

mod check;
mod config;
mod upload;

pub use check::run_check;
pub use config::run_config;
pub use upload::{run_upload, UploadOptions};

use std::sync::Arc;
use vidup_core::config::VidupConfig;
use vidup_core::transport::libcurl::{CurlOptions, CurlTransport};
use vidup_core::HttpTransport;

fn curl_transport(cfg: &VidupConfig) -> Arc<dyn HttpTransport> {
    Arc::new(CurlTransport::new(CurlOptions::from(cfg)))
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}
