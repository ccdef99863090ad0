//! Upload session controller.
//!
//! Drives one upload through admission, session open and the sequential
//! chunk loop, consulting the retry policy on every failure and publishing
//! every transition on the event bus. Share it behind an `Arc`: `start()`,
//! `resume()` and `retry()` run the loop on the caller's task while `pause()`
//! and `cancel()` may be called from any other task.
//!
//! At most one exchange is in flight per controller. Independent uploads use
//! independent controllers; nothing mutable is shared between them.

mod control;

use anyhow::{bail, Context, Result};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::auth::AuthProvider;
use crate::chunk::Chunk;
use crate::config::{VidupConfig, DEFAULT_CHUNK_SIZE};
use crate::error::UploadError;
use crate::events::{EventBus, UploadEvent};
use crate::quota::{admit, Admission, QuotaLimits, QuotaSnapshot, QuotaSource};
use crate::retry::{AbortReason, RetryAttempt, RetryPolicy, RetryVerdict};
use crate::session::{UploadMetadata, UploadResult, UploadSession, UploadState};
use crate::source::UploadFile;
use crate::transmitter::{ChunkOutcome, ChunkTransmitter, TransmitFailure, RESUME_INCOMPLETE};
use crate::transport::HttpTransport;

use control::UploadControl;

/// Server path of the resumable upload endpoint.
pub const UPLOAD_PATH: &str = "/api/v1/videos/upload-resumable";

/// Server path of the resumable endpoint that replaces an existing video's source file.
fn replace_source_path(video_id: u64) -> String {
    format!("/api/v1/videos/{}/source/replace-resumable", video_id)
}

/// Why the loop stopped before the next exchange.
enum Interrupt {
    Abort(UploadError),
    Paused,
    Cancelled,
}

enum Step {
    Continue,
    Settled(UploadState),
}

struct ActiveUpload {
    session: UploadSession,
    file: UploadFile,
    /// Set once a 401 triggered a refresh; never reset for this session.
    refreshed_auth: bool,
    retry: RetryAttempt,
    /// Consecutive chunk responses that did not advance the offset.
    stalled: u32,
    last_error: Option<UploadError>,
    result: Option<UploadResult>,
}

pub struct UploadControllerBuilder {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthProvider>,
    quota: Arc<dyn QuotaSource>,
    endpoint: Option<String>,
    chunk_size: u64,
    policy: RetryPolicy,
    limits: QuotaLimits,
}

impl UploadControllerBuilder {
    /// Full URL of the resumable upload endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Server base URL; the endpoint becomes `<server>/api/v1/videos/upload-resumable`.
    pub fn server_url(self, server_url: &str) -> Result<Self> {
        self.server_path(server_url, UPLOAD_PATH)
    }

    /// Upload a new source file for existing video `video_id` instead of
    /// creating a video. The protocol is the same; only the endpoint differs.
    pub fn replace_source(self, server_url: &str, video_id: u64) -> Result<Self> {
        self.server_path(server_url, &replace_source_path(video_id))
    }

    fn server_path(mut self, server_url: &str, path: &str) -> Result<Self> {
        let url = url::Url::parse(server_url)
            .and_then(|u| u.join(path))
            .with_context(|| format!("invalid server URL {}", server_url))?;
        self.endpoint = Some(url.to_string());
        Ok(self)
    }

    pub fn chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn quota_limits(mut self, limits: QuotaLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Chunk size and retry policy from the config file.
    pub fn config(self, cfg: &VidupConfig) -> Self {
        let policy = RetryPolicy::from(&cfg.retry_or_default());
        self.chunk_size(cfg.chunk_size_bytes).retry_policy(policy)
    }

    pub fn build(self) -> Result<UploadController> {
        let Some(endpoint) = self.endpoint else {
            bail!("upload endpoint not set");
        };
        url::Url::parse(&endpoint).with_context(|| format!("invalid endpoint {}", endpoint))?;
        if self.chunk_size == 0 {
            bail!("chunk size must be positive");
        }
        Ok(UploadController {
            transmitter: ChunkTransmitter::new(self.transport),
            auth: self.auth,
            quota: self.quota,
            limits: self.limits,
            policy: self.policy,
            endpoint,
            chunk_size: self.chunk_size,
            bus: EventBus::new(),
            control: UploadControl::default(),
            active: Mutex::new(None),
        })
    }
}

pub struct UploadController {
    transmitter: ChunkTransmitter,
    auth: Arc<dyn AuthProvider>,
    quota: Arc<dyn QuotaSource>,
    limits: QuotaLimits,
    policy: RetryPolicy,
    endpoint: String,
    chunk_size: u64,
    bus: EventBus,
    control: UploadControl,
    active: Mutex<Option<ActiveUpload>>,
}

impl UploadController {
    pub fn builder(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthProvider>,
        quota: Arc<dyn QuotaSource>,
    ) -> UploadControllerBuilder {
        UploadControllerBuilder {
            transport,
            auth,
            quota,
            endpoint: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            policy: RetryPolicy::default(),
            limits: QuotaLimits::unlimited(),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<UploadEvent> {
        self.bus.subscribe()
    }

    pub fn state(&self) -> Option<UploadState> {
        self.with_active(|a| a.session.state)
    }

    /// Current state as an event (what a late subscriber would want to render first).
    pub fn snapshot(&self) -> Option<UploadEvent> {
        self.with_active(|a| {
            UploadEvent::from_session(&a.session, a.last_error.clone(), a.result.clone())
        })
    }

    pub fn last_error(&self) -> Option<UploadError> {
        self.with_active(|a| a.last_error.clone()).flatten()
    }

    pub fn result(&self) -> Option<UploadResult> {
        self.with_active(|a| a.result.clone()).flatten()
    }

    fn with_active<R>(&self, f: impl FnOnce(&mut ActiveUpload) -> R) -> Option<R> {
        let mut guard = self.active.lock().expect("upload state lock poisoned");
        guard.as_mut().map(f)
    }

    /// Change state and publish, under one lock so events follow transition order.
    fn transition(&self, state: UploadState, error: Option<UploadError>, result: Option<UploadResult>) {
        self.with_active(|a| {
            a.session.state = state;
            a.last_error = error.clone();
            if result.is_some() {
                a.result = result.clone();
            }
            self.bus
                .publish(UploadEvent::from_session(&a.session, error, result));
        });
    }

    /// Admit `file`, open a session and upload until the upload settles.
    ///
    /// Returns `Err` only when no session could be created (quota rejection,
    /// quota lookup failure, or another upload still active). Failures after
    /// that are reported as `Ok(UploadState::Error)` plus an event; see
    /// [`UploadController::last_error`].
    pub async fn start(&self, file: UploadFile, metadata: UploadMetadata) -> Result<UploadState, UploadError> {
        if self.state().is_some_and(|s| !s.is_terminal()) {
            return Err(UploadError::Busy);
        }

        let usage = self
            .quota
            .current_usage()
            .await
            .map_err(|e| UploadError::QuotaLookup(format!("{:#}", e)))?;
        let snapshot = QuotaSnapshot::new(usage, self.limits);
        if let Admission::Rejected(reason) = admit(file.size(), &snapshot) {
            tracing::warn!(file = file.name(), size = file.size(), %reason, "upload refused by quota");
            return Err(UploadError::QuotaExceeded(reason));
        }

        {
            let mut guard = self.active.lock().expect("upload state lock poisoned");
            if guard.as_ref().is_some_and(|a| !a.session.state.is_terminal()) {
                return Err(UploadError::Busy);
            }
            let session = UploadSession::new(file.size(), metadata);
            tracing::info!(
                session = %session.session_id,
                file = file.name(),
                size = file.size(),
                "upload queued"
            );
            self.bus
                .publish(UploadEvent::from_session(&session, None, None));
            *guard = Some(ActiveUpload {
                session,
                file,
                refreshed_auth: false,
                retry: RetryAttempt::default(),
                stalled: 0,
                last_error: None,
                result: None,
            });
            self.control.clear();
        }

        Ok(self.drive().await)
    }

    /// Request a pause. Honored once the chunk in flight settles. No-op unless `Uploading`.
    pub fn pause(&self) {
        if self.state() == Some(UploadState::Uploading) {
            tracing::info!("pause requested");
            self.control.request_pause();
        }
    }

    /// Continue a paused upload from the acknowledged offset. No-op unless `Paused`.
    pub async fn resume(&self) -> Option<UploadState> {
        if self.control.is_driving() {
            return self.state();
        }
        let resumed = self.with_active(|a| {
            if a.session.state != UploadState::Paused {
                return false;
            }
            a.session.state = UploadState::Uploading;
            a.retry.reset();
            self.bus
                .publish(UploadEvent::from_session(&a.session, None, None));
            true
        });
        if resumed != Some(true) {
            return self.state();
        }
        self.control.clear_pause();
        tracing::info!("upload resumed");
        Some(self.drive().await)
    }

    /// Retry after an error, from the acknowledged offset. No-op unless `Error`.
    pub async fn retry(&self) -> Option<UploadState> {
        if self.control.is_driving() {
            return self.state();
        }
        let retried = self.with_active(|a| {
            if a.session.state != UploadState::Error {
                return false;
            }
            a.session.state = if a.session.is_opened() {
                UploadState::Uploading
            } else {
                UploadState::Queued
            };
            a.retry.reset();
            a.stalled = 0;
            a.last_error = None;
            self.bus
                .publish(UploadEvent::from_session(&a.session, None, None));
            true
        });
        if retried != Some(true) {
            return self.state();
        }
        // A pending cancel survives: the loop honors it before the first exchange.
        self.control.clear_pause();
        tracing::info!("upload retried");
        Some(self.drive().await)
    }

    /// Cancel the upload and delete the server-side session if one was opened.
    ///
    /// While the loop is running this only records the request; the loop
    /// finishes the cancellation at its next decision point. Idempotent.
    pub async fn cancel(&self) -> Option<UploadState> {
        let state = self.state()?;
        if state.is_terminal() {
            return Some(state);
        }
        // Flag first: a driver that is just letting go re-checks it after dropping the guard.
        self.control.request_cancel();
        match self.control.begin_drive() {
            Some(_guard) => Some(self.finish_cancel(UploadError::Cancelled).await),
            None => {
                tracing::info!("cancel requested while transfer in flight");
                Some(state)
            }
        }
    }

    async fn drive(&self) -> UploadState {
        let settled = {
            let Some(_guard) = self.control.begin_drive() else {
                return self.state().unwrap_or(UploadState::Queued);
            };
            self.run_chunks().await
        };
        // A cancel that landed after the loop settled but before the guard dropped.
        if self.control.cancel_requested() && !settled.is_terminal() {
            if let Some(_guard) = self.control.begin_drive() {
                return self.finish_cancel(UploadError::Cancelled).await;
            }
            return self.state().unwrap_or(settled);
        }
        settled
    }

    async fn run_chunks(&self) -> UploadState {
        loop {
            if self.control.cancel_requested() {
                return self.finish_cancel(UploadError::Cancelled).await;
            }
            if self.control.pause_requested() {
                return self.settle(Interrupt::Paused).await;
            }
            match self.step().await {
                Step::Continue => continue,
                Step::Settled(state) => return state,
            }
        }
    }

    /// One decision: open the session or send the next chunk.
    async fn step(&self) -> Step {
        let Some((session, file)) = self.with_active(|a| (a.session.clone(), a.file.clone())) else {
            return Step::Settled(UploadState::Cancelled);
        };

        if !session.is_opened() {
            return self.open(&session, &file).await;
        }

        let offset = session.acknowledged_offset();
        let Some(chunk) = Chunk::next(offset, session.total_size, self.chunk_size) else {
            tracing::warn!(
                session = %session.session_id,
                "server holds every byte but never finalized; treating as complete"
            );
            self.transition(UploadState::Complete, None, Some(UploadResult::default()));
            return Step::Settled(UploadState::Complete);
        };

        let bytes = match file.read_range(chunk.start, chunk.end).await {
            Ok(b) => b,
            Err(e) => {
                let err = UploadError::Source(format!("{}: {}", file.name(), e));
                return Step::Settled(self.settle(Interrupt::Abort(err)).await);
            }
        };

        let transmitter = &self.transmitter;
        let session_ref = &session;
        let chunk_ref = &chunk;
        let outcome = self
            .exchange(move |token| {
                let body = bytes.clone();
                async move {
                    transmitter
                        .send(session_ref, chunk_ref, body, token.as_deref())
                        .await
                }
            })
            .await;

        match outcome {
            Ok(ChunkOutcome::Complete(result)) => {
                tracing::info!(
                    session = %session.session_id,
                    id = ?result.id,
                    uuid = ?result.uuid,
                    "upload complete"
                );
                self.with_active(|a| {
                    let total = a.session.total_size;
                    a.session.acknowledge(total)
                });
                self.transition(UploadState::Complete, None, Some(result));
                Step::Settled(UploadState::Complete)
            }
            Ok(ChunkOutcome::Accepted { offset }) => self.advance(None, offset).await,
            Ok(ChunkOutcome::Redirect { location, offset }) => {
                tracing::info!(session = %session.session_id, %location, "session redirected");
                self.advance(Some(location), offset).await
            }
            Err(interrupt) => Step::Settled(self.settle(interrupt).await),
        }
    }

    async fn open(&self, session: &UploadSession, file: &UploadFile) -> Step {
        let transmitter = &self.transmitter;
        let endpoint = self.endpoint.as_str();
        let mime = file.mime_type();
        let metadata = &session.metadata;
        let total = session.total_size;
        let opened = self
            .exchange(move |token| async move {
                transmitter
                    .open_session(endpoint, total, mime, metadata, token.as_deref())
                    .await
            })
            .await;
        match opened {
            Ok(location) => {
                self.with_active(|a| a.session.remote_location = Some(location));
                self.transition(UploadState::Uploading, None, None);
                Step::Continue
            }
            Err(interrupt) => Step::Settled(self.settle(interrupt).await),
        }
    }

    /// Apply a server-reported offset (and maybe a new location); back off if nothing moved.
    async fn advance(&self, location: Option<String>, offset: u64) -> Step {
        let moved = self.with_active(|a| {
            let redirected = location.is_some();
            if let Some(loc) = location {
                a.session.remote_location = Some(loc);
            }
            let progressed = a.session.acknowledge(offset);
            if progressed || redirected {
                self.bus
                    .publish(UploadEvent::from_session(&a.session, None, None));
            }
            if progressed {
                a.stalled = 0;
                None
            } else {
                a.stalled += 1;
                Some((a.stalled, a.refreshed_auth))
            }
        });
        let Some(Some((stalled, refreshed))) = moved else {
            return Step::Continue;
        };

        tracing::warn!(offset, stalled, "chunk response did not advance the offset");
        match self.policy.decide(RESUME_INCOMPLETE, stalled, refreshed) {
            RetryVerdict::Retry(delay) => match self.backoff(delay).await {
                Ok(()) => Step::Continue,
                Err(interrupt) => Step::Settled(self.settle(interrupt).await),
            },
            RetryVerdict::RefreshAuthAndRetry => Step::Continue,
            RetryVerdict::Abort(_) => {
                let err = UploadError::TransferFailed {
                    status: Some(RESUME_INCOMPLETE),
                    message: "server stopped accepting bytes".into(),
                };
                Step::Settled(self.settle(Interrupt::Abort(err)).await)
            }
        }
    }

    /// Run one exchange until it succeeds or the retry policy gives up.
    async fn exchange<T, F, Fut>(&self, mut op: F) -> Result<T, Interrupt>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<T, TransmitFailure>>,
    {
        self.with_active(|a| a.retry.reset());
        loop {
            let failure = match op(self.auth.access_token()).await {
                Ok(value) => {
                    self.with_active(|a| a.retry.reset());
                    return Ok(value);
                }
                Err(f) => f,
            };

            let Some(kind) = failure.kind() else {
                tracing::error!("{}", failure.message());
                return Err(Interrupt::Abort(UploadError::InvalidSessionResponse(
                    failure.message(),
                )));
            };
            let (attempt, refreshed) = self
                .with_active(|a| (a.retry.record_failure(failure.status()), a.refreshed_auth))
                .unwrap_or((1, false));

            match self.policy.decide_kind(kind, attempt, refreshed) {
                RetryVerdict::RefreshAuthAndRetry => {
                    self.with_active(|a| a.refreshed_auth = true);
                    tracing::info!("upload endpoint answered 401; refreshing access token");
                    if let Err(e) = self.auth.refresh_access_token().await {
                        tracing::warn!("token refresh failed: {:#}", e);
                        return Err(Interrupt::Abort(UploadError::AuthenticationFailed(format!(
                            "token refresh failed: {:#}",
                            e
                        ))));
                    }
                    self.with_active(|a| a.retry.reset());
                }
                RetryVerdict::Retry(delay) => {
                    self.with_active(|a| a.retry.next_delay = Some(delay));
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{}; retrying",
                        failure.message()
                    );
                    self.backoff(delay).await?;
                }
                RetryVerdict::Abort(reason) => {
                    tracing::warn!(attempt, ?reason, "{}; giving up", failure.message());
                    return Err(Interrupt::Abort(abort_error(reason, &failure)));
                }
            }
        }
    }

    /// Sleep before the next attempt; pause/cancel cut the sleep short.
    async fn backoff(&self, delay: Duration) -> Result<(), Interrupt> {
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.control.interrupted() => {}
            }
        }
        if self.control.cancel_requested() {
            return Err(Interrupt::Cancelled);
        }
        if self.control.pause_requested() {
            return Err(Interrupt::Paused);
        }
        Ok(())
    }

    async fn settle(&self, interrupt: Interrupt) -> UploadState {
        match interrupt {
            Interrupt::Cancelled => self.finish_cancel(UploadError::Cancelled).await,
            Interrupt::Paused => {
                self.control.clear_pause();
                // Pausing before the session exists leaves nothing to resume from.
                if self.with_active(|a| a.session.is_opened()) != Some(true) {
                    return self.state().unwrap_or(UploadState::Queued);
                }
                tracing::info!("upload paused");
                self.transition(UploadState::Paused, None, None);
                UploadState::Paused
            }
            Interrupt::Abort(UploadError::UnsupportedMediaType) => {
                self.finish_cancel(UploadError::UnsupportedMediaType).await
            }
            Interrupt::Abort(err) => {
                tracing::warn!("upload failed: {}", err);
                self.transition(UploadState::Error, Some(err), None);
                UploadState::Error
            }
        }
    }

    /// Delete the remote session (if any) and enter `Cancelled`. Caller holds the drive guard.
    async fn finish_cancel(&self, reason: UploadError) -> UploadState {
        let location = self
            .with_active(|a| a.session.remote_location.clone())
            .flatten();
        if let Some(location) = location {
            let token = self.auth.access_token();
            match self
                .transmitter
                .delete_session(&location, token.as_deref())
                .await
            {
                Ok(()) => tracing::info!(%location, "remote upload session deleted"),
                Err(e) => tracing::warn!(%location, "could not delete remote session: {}", e.message()),
            }
        }
        self.control.clear();
        tracing::info!(%reason, "upload cancelled");
        self.transition(UploadState::Cancelled, Some(reason), None);
        UploadState::Cancelled
    }
}

fn abort_error(reason: AbortReason, failure: &TransmitFailure) -> UploadError {
    match reason {
        AbortReason::UnsupportedMediaType => UploadError::UnsupportedMediaType,
        AbortReason::Forbidden => UploadError::Forbidden,
        AbortReason::AuthenticationFailed => {
            UploadError::AuthenticationFailed("server rejected the refreshed token".into())
        }
        AbortReason::TransferFailed => UploadError::TransferFailed {
            status: failure.status(),
            message: failure.message(),
        },
    }
}
