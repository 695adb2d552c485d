//! Pause/resume/cancel flags shared by every worker of one downloader.
//!
//! The flags live in a `tokio::sync::watch` channel: reads are a cheap borrow of the
//! current value, writes go through `send_if_modified` so repeated calls are no-ops,
//! and paused workers wait on the channel instead of polling.

use std::sync::Arc;
use tokio::sync::watch;

/// Snapshot of the control flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlState {
    pub paused: bool,
    pub cancelled: bool,
}

/// What a transfer should do after a progress tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Proceed,
    Abort,
}

/// Cloneable handle to one downloader's control flags.
///
/// Cancellation is permanent for the handle: once cancelled, `resume()` is rejected
/// and `pause()` does nothing. Build a new downloader to start over.
#[derive(Debug, Clone)]
pub struct DownloadControl {
    tx: Arc<watch::Sender<ControlState>>,
}

impl Default for DownloadControl {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Pauses all transfers at their next progress tick.
    ///
    /// Returns `true` if the state changed.
    pub fn pause(&self) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if state.paused || state.cancelled {
                return false;
            }
            state.paused = true;
            true
        });
        if changed {
            log::info!("Downloads paused");
        }
        changed
    }

    /// Resumes paused transfers. No-op when not paused; rejected after cancel.
    ///
    /// Returns `true` if the state changed.
    pub fn resume(&self) -> bool {
        if self.is_cancelled() {
            log::warn!("Resume ignored: downloader was cancelled");
            return false;
        }
        let changed = self.tx.send_if_modified(|state| {
            if !state.paused || state.cancelled {
                return false;
            }
            state.paused = false;
            true
        });
        if changed {
            log::info!("Downloads resumed");
        }
        changed
    }

    /// Cancels everything: paused waiters wake up, no new transfer starts.
    ///
    /// Returns `true` if the state changed.
    pub fn cancel(&self) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if state.cancelled {
                return false;
            }
            state.cancelled = true;
            state.paused = false;
            true
        });
        if changed {
            log::info!("Downloads cancelled");
        }
        changed
    }

    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn is_cancelled(&self) -> bool {
        self.state().cancelled
    }

    /// Waits while paused. Returns `Abort` if cancelled (before or during the wait).
    ///
    /// Does not touch the underlying transfer; the caller simply stops driving it.
    pub async fn wait_while_paused(&self) -> Checkpoint {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(|s| s.cancelled || !s.paused).await {
            Ok(state) => *state,
            // The sender lives in `self`, so the channel cannot close while we wait.
            Err(_) => self.state(),
        };
        if state.cancelled {
            Checkpoint::Abort
        } else {
            Checkpoint::Proceed
        }
    }

    /// Resolves once the handle is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|s| s.cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pause_is_idempotent() {
        let control = DownloadControl::new();
        assert!(control.pause());
        assert!(!control.pause());
        assert!(control.is_paused());
    }

    #[test]
    fn test_resume_when_not_paused_is_noop() {
        let control = DownloadControl::new();
        assert!(!control.resume());
        assert_eq!(control.state(), ControlState::default());
    }

    #[test]
    fn test_cancel_is_idempotent_and_permanent() {
        let control = DownloadControl::new();
        control.pause();
        assert!(control.cancel());
        assert!(!control.cancel());
        assert!(control.is_cancelled());
        assert!(!control.is_paused());

        assert!(!control.resume());
        assert!(!control.pause());
        assert!(control.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let control = DownloadControl::new();
        let worker_view = control.clone();
        control.pause();
        assert!(worker_view.is_paused());
    }

    #[tokio::test]
    async fn test_wait_while_paused_returns_immediately_when_running() {
        let control = DownloadControl::new();
        assert_eq!(control.wait_while_paused().await, Checkpoint::Proceed);
    }

    #[tokio::test]
    async fn test_wait_while_paused_wakes_on_resume() {
        let control = DownloadControl::new();
        control.pause();

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_while_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        control.resume();
        let checkpoint = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(checkpoint, Checkpoint::Proceed);
    }

    #[tokio::test]
    async fn test_wait_while_paused_aborts_on_cancel() {
        let control = DownloadControl::new();
        control.pause();

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_while_paused().await })
        };
        control.cancel();
        let checkpoint = tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(checkpoint, Checkpoint::Abort);
    }
}
