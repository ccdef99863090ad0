use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempt ceiling for the generic retryable band (network errors, 4xx other than 403/415).
    pub max_attempts: u32,
    /// Attempt ceiling for 503 / timeouts. Deliberately higher than `max_attempts`.
    pub max_attempts_unavailable: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            max_attempts_unavailable: 30,
            base_delay_secs: 0.5,
            max_delay_secs: 120,
        }
    }
}

/// OAuth client credentials used to refresh access tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

// The config is logged at debug level; keep the secret out of it.
impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Global configuration loaded from `~/.config/vidup/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VidupConfig {
    /// Base URL of the video server (e.g. `https://videos.example.org`).
    #[serde(default)]
    pub server_url: Option<String>,
    /// Bytes sent per chunk request.
    pub chunk_size_bytes: u64,
    /// Connect timeout for each HTTP exchange.
    pub connect_timeout_secs: u64,
    /// Hard timeout for each HTTP exchange (one chunk).
    pub request_timeout_secs: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional OAuth client; without it, token refresh is unavailable.
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
}

pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

impl Default for VidupConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            connect_timeout_secs: 30,
            request_timeout_secs: 600,
            retry: None,
            oauth: None,
        }
    }
}

impl VidupConfig {
    /// Retry section or built-in defaults.
    pub fn retry_or_default(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("vidup")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<VidupConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = VidupConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: VidupConfig = toml::from_str(&data)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}
