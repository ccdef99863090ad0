//! `vidup config` – show where the config lives and what is in effect.

use anyhow::Result;
use vidup_core::config::{self, VidupConfig};
use vidup_core::logging;

pub fn run_config(cfg: &VidupConfig) -> Result<()> {
    let retry = cfg.retry_or_default();
    println!("config file:  {}", config::config_path()?.display());
    if let Ok(log) = logging::log_file_path() {
        println!("log file:     {}", log.display());
    }
    println!(
        "server_url:   {}",
        cfg.server_url.as_deref().unwrap_or("(not set)")
    );
    println!("chunk size:   {} bytes", cfg.chunk_size_bytes);
    println!(
        "timeouts:     connect {}s, request {}s",
        cfg.connect_timeout_secs, cfg.request_timeout_secs
    );
    println!(
        "retry:        {} attempts ({} on 503/timeout), backoff {}s..{}s",
        retry.max_attempts, retry.max_attempts_unavailable, retry.base_delay_secs, retry.max_delay_secs
    );
    println!(
        "oauth client: {}",
        cfg.oauth
            .as_ref()
            .map(|o| o.client_id.as_str())
            .unwrap_or("(not set)")
    );
    Ok(())
}
