//! Event surface observed by the UI collaborator.
//!
//! Every state transition and every offset change is delivered to every
//! subscriber, in order. Channels are unbounded so nothing is dropped; a UI
//! that only wants to redraw occasionally can skip events on its side.

use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::UploadError;
use crate::session::{SessionId, UploadResult, UploadSession, UploadState};

#[derive(Debug, Clone, PartialEq)]
pub struct UploadEvent {
    pub session_id: SessionId,
    pub state: UploadState,
    pub acknowledged_offset: u64,
    pub total_size: u64,
    pub error: Option<UploadError>,
    /// Set on the `Complete` event.
    pub result: Option<UploadResult>,
}

impl UploadEvent {
    pub(crate) fn from_session(
        session: &UploadSession,
        error: Option<UploadError>,
        result: Option<UploadResult>,
    ) -> Self {
        Self {
            session_id: session.session_id.clone(),
            state: session.state,
            acknowledged_offset: session.acknowledged_offset(),
            total_size: session.total_size,
            error,
            result,
        }
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_size == 0 {
            return if self.state == UploadState::Complete { 1.0 } else { 0.0 };
        }
        (self.acknowledged_offset as f64 / self.total_size as f64).min(1.0)
    }

    /// Percent complete, rounded down.
    pub fn percent(&self) -> u8 {
        (self.fraction() * 100.0).floor() as u8
    }
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<UploadEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<UploadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .push(tx);
        rx
    }

    /// Deliver to every live subscriber; closed receivers are pruned.
    pub fn publish(&self, event: UploadEvent) {
        tracing::debug!(
            session = %event.session_id,
            state = %event.state,
            offset = event.acknowledged_offset,
            total = event.total_size,
            "upload event"
        );
        let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .len()
    }
}
