//! Pause/cancel requests and the single-driver guard.
//!
//! `pause()` and `cancel()` never interrupt an exchange in flight: they set a
//! flag that the chunk loop checks at its next decision point. A backoff sleep
//! is not an exchange, so it is woken early.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Default)]
pub(crate) struct UploadControl {
    pause: AtomicBool,
    cancel: AtomicBool,
    driving: AtomicBool,
    wake: Notify,
}

impl UploadControl {
    pub(crate) fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub(crate) fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub(crate) fn clear_pause(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    /// Forget pending requests (new upload, or a request already honored).
    pub(crate) fn clear(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_driving(&self) -> bool {
        self.driving.load(Ordering::SeqCst)
    }

    /// Claim the right to run exchanges. `None` if someone else holds it.
    pub(crate) fn begin_drive(&self) -> Option<DriveGuard<'_>> {
        self.driving
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| DriveGuard(&self.driving))
    }

    /// Resolves once pause or cancel has been requested.
    pub(crate) async fn interrupted(&self) {
        loop {
            let notified = self.wake.notified();
            if self.pause_requested() || self.cancel_requested() {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) struct DriveGuard<'a>(&'a AtomicBool);

impl Drop for DriveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
