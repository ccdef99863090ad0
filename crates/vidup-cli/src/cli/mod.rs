//! CLI for the vidup resumable upload client.

mod commands;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vidup_core::config::{self, VidupConfig};

use commands::{run_check, run_config, run_upload};

/// Top-level CLI for vidup.
#[derive(Debug, Parser)]
#[command(name = "vidup")]
#[command(about = "vidup: resumable video uploads with quota checks and retry", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Server and credentials shared by the commands that talk to the server.
#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Server base URL; falls back to `server_url` in config.toml.
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// OAuth access token.
    #[arg(long)]
    pub token: Option<String>,
}

impl ServerArgs {
    pub fn server_url(&self, cfg: &VidupConfig) -> Result<String> {
        match self.server.as_ref().or(cfg.server_url.as_ref()) {
            Some(url) => Ok(url.trim_end_matches('/').to_string()),
            None => bail!("no server URL: pass --server or set server_url in config.toml"),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Upload a video file with the resumable protocol.
    Upload {
        /// Path of the video file.
        path: PathBuf,

        #[command(flatten)]
        server: ServerArgs,

        /// Refresh token; enables one token refresh when the server answers 401.
        #[arg(long)]
        refresh_token: Option<String>,

        /// OAuth client id (overrides [oauth] in config.toml).
        #[arg(long)]
        client_id: Option<String>,

        /// OAuth client secret (overrides [oauth] in config.toml).
        #[arg(long)]
        client_secret: Option<String>,

        /// Video title (default: file name without extension).
        #[arg(long)]
        name: Option<String>,

        /// Target channel id.
        #[arg(long)]
        channel_id: Option<u64>,

        /// Privacy level id (1 public, 2 unlisted, 3 private, 4 internal).
        #[arg(long)]
        privacy: Option<u8>,

        /// Bytes per chunk, with optional K/M/G suffix (e.g. 8M).
        #[arg(long, value_name = "SIZE", value_parser = parse_size)]
        chunk_size: Option<u64>,

        /// MIME type to declare (default: guessed from the extension).
        #[arg(long)]
        mime_type: Option<String>,

        /// Replace the source file of an existing video instead of creating one.
        #[arg(
            long,
            value_name = "VIDEO_ID",
            conflicts_with_all = ["name", "channel_id", "privacy"]
        )]
        replace: Option<u64>,
    },

    /// Check whether a file fits the account's quota without uploading it.
    Check {
        /// Path of the video file.
        path: PathBuf,

        #[command(flatten)]
        server: ServerArgs,
    },

    /// Show the config file location and effective settings.
    Config,
}

/// `123`, `64K`, `8M`, `1G` (binary multiples).
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, mult) = match s.char_indices().last() {
        Some((i, c)) if c.eq_ignore_ascii_case(&'k') => (&s[..i], 1u64 << 10),
        Some((i, c)) if c.eq_ignore_ascii_case(&'m') => (&s[..i], 1u64 << 20),
        Some((i, c)) if c.eq_ignore_ascii_case(&'g') => (&s[..i], 1u64 << 30),
        _ => (s, 1),
    };
    let n: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size {:?}", s))?;
    match n.checked_mul(mult) {
        Some(0) => Err("size must be positive".to_string()),
        Some(v) => Ok(v),
        None => Err(format!("size {:?} is too large", s)),
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Upload {
                path,
                server,
                refresh_token,
                client_id,
                client_secret,
                name,
                channel_id,
                privacy,
                chunk_size,
                mime_type,
                replace,
            } => {
                let opts = commands::UploadOptions {
                    refresh_token,
                    client_id,
                    client_secret,
                    name,
                    channel_id,
                    privacy,
                    chunk_size,
                    mime_type,
                    replace,
                };
                run_upload(&cfg, &path, &server, opts).await?
            }
            CliCommand::Check { path, server } => run_check(&cfg, &path, &server).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
