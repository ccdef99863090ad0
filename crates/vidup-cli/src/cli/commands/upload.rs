//! `vidup upload <path>` – upload one video, printing progress; Ctrl-C cancels.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use vidup_core::config::VidupConfig;
use vidup_core::quota::server::ServerQuota;
use vidup_core::{
    AuthProvider, HttpTransport, OAuthRefresher, QuotaLimits, StaticToken, UploadController,
    UploadError, UploadEvent, UploadFile, UploadMetadata, UploadState,
};

use super::{curl_transport, mib};
use crate::cli::ServerArgs;

#[derive(Debug, Default)]
pub struct UploadOptions {
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub name: Option<String>,
    pub channel_id: Option<u64>,
    pub privacy: Option<u8>,
    pub chunk_size: Option<u64>,
    pub mime_type: Option<String>,
    /// Existing video whose source file is replaced.
    pub replace: Option<u64>,
}

const PROGRESS_INTERVAL_MS: u128 = 500;

pub async fn run_upload(
    cfg: &VidupConfig,
    path: &Path,
    server: &ServerArgs,
    opts: UploadOptions,
) -> Result<()> {
    let server_url = server.server_url(cfg)?;
    let transport = curl_transport(cfg);
    let auth = build_auth(cfg, &server_url, server.token.clone(), &opts, transport.clone()).await?;

    let quota = ServerQuota::new(transport.clone(), auth.clone(), &server_url)?;
    let limits = match quota.fetch_limits().await {
        Ok(limits) => limits,
        Err(e) => {
            tracing::warn!("could not read account limits, assuming unlimited: {:#}", e);
            QuotaLimits::unlimited()
        }
    };

    let builder = UploadController::builder(transport, auth, Arc::new(quota)).config(cfg);
    let mut builder = match opts.replace {
        Some(video_id) => builder.replace_source(&server_url, video_id)?,
        None => builder.server_url(&server_url)?,
    }
    .quota_limits(limits);
    if let Some(bytes) = opts.chunk_size {
        builder = builder.chunk_size(bytes);
    }
    let ctl = Arc::new(builder.build()?);

    let file = UploadFile::open(path, opts.mime_type.as_deref())
        .await
        .with_context(|| format!("open {}", path.display()))?;
    let metadata = build_metadata(&file, &opts);
    match opts.replace {
        Some(video_id) => println!(
            "Replacing the source of video {} with {} ({:.1} MiB, {}) on {}",
            video_id,
            file.name(),
            mib(file.size()),
            file.mime_type(),
            server_url
        ),
        None => println!(
            "Uploading {} ({:.1} MiB, {}) to {}",
            file.name(),
            mib(file.size()),
            file.mime_type(),
            server_url
        ),
    }

    let printer = tokio::spawn(print_progress(ctl.subscribe()));
    let interrupt = {
        let ctl = Arc::clone(&ctl);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling after the current chunk...");
                ctl.cancel().await;
            }
        })
    };

    let started = ctl.start(file, metadata).await;
    interrupt.abort();
    let state = match started {
        Ok(state) => state,
        Err(e) => {
            printer.abort();
            return Err(e).context("upload not started");
        }
    };
    let _ = printer.await;

    match state {
        UploadState::Complete => {
            let result = ctl.result().unwrap_or_default();
            match result.short_uuid.as_deref().or(result.uuid.as_deref()) {
                Some(id) => println!("Uploaded: {}/w/{}", server_url, id),
                None => println!("Upload complete."),
            }
            Ok(())
        }
        UploadState::Cancelled => match ctl.last_error() {
            None | Some(UploadError::Cancelled) => {
                println!("Upload cancelled.");
                Ok(())
            }
            Some(e) => bail!("upload cancelled: {}", e),
        },
        other => match ctl.last_error() {
            Some(e) => bail!("upload failed: {}", e),
            None => bail!("upload stopped in state {}", other),
        },
    }
}

async fn build_auth(
    cfg: &VidupConfig,
    server_url: &str,
    token: Option<String>,
    opts: &UploadOptions,
    transport: Arc<dyn HttpTransport>,
) -> Result<Arc<dyn AuthProvider>> {
    let Some(refresh) = opts.refresh_token.clone() else {
        let fixed = match token {
            Some(t) => StaticToken::new(t),
            None => StaticToken::anonymous(),
        };
        return Ok(Arc::new(fixed));
    };

    let client_id = opts
        .client_id
        .clone()
        .or_else(|| cfg.oauth.as_ref().map(|o| o.client_id.clone()));
    let client_secret = opts
        .client_secret
        .clone()
        .or_else(|| cfg.oauth.as_ref().map(|o| o.client_secret.clone()));
    let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
        bail!("--refresh-token needs --client-id and --client-secret (or an [oauth] section in config.toml)");
    };

    let had_token = token.is_some();
    let auth = OAuthRefresher::new(
        transport,
        server_url,
        client_id,
        client_secret,
        token.unwrap_or_default(),
        refresh,
    )?;
    if !had_token {
        auth.refresh_access_token()
            .await
            .context("obtain access token from refresh token")?;
    }
    Ok(Arc::new(auth))
}

fn build_metadata(file: &UploadFile, opts: &UploadOptions) -> UploadMetadata {
    // A replacement only names the new file; the video keeps its own attributes.
    if opts.replace.is_some() {
        return UploadMetadata::new(file.name());
    }
    let title = opts.name.clone().unwrap_or_else(|| {
        Path::new(file.name())
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.name().to_string())
    });
    let mut metadata = UploadMetadata::new(file.name()).with("name", title);
    if let Some(id) = opts.channel_id {
        metadata = metadata.with("channelId", id.to_string());
    }
    if let Some(p) = opts.privacy {
        metadata = metadata.with("privacy", p.to_string());
    }
    metadata
}

/// Print progress until the upload settles (error or terminal state).
async fn print_progress(mut rx: mpsc::UnboundedReceiver<UploadEvent>) {
    let started = Instant::now();
    let mut last_print: Option<Instant> = None;
    while let Some(ev) = rx.recv().await {
        let settled = ev.state.is_terminal() || ev.state == UploadState::Error;
        let due = last_print.map_or(true, |t| t.elapsed().as_millis() >= PROGRESS_INTERVAL_MS);
        if due || settled {
            let secs = started.elapsed().as_secs_f64();
            let rate = if secs > 0.0 {
                mib(ev.acknowledged_offset) / secs
            } else {
                0.0
            };
            println!(
                "\r  [{}] {:.1} / {:.1} MiB ({}%)  {:.2} MiB/s  ",
                ev.state,
                mib(ev.acknowledged_offset),
                mib(ev.total_size),
                ev.percent(),
                rate
            );
            last_print = Some(Instant::now());
        }
        if settled {
            break;
        }
    }
}
