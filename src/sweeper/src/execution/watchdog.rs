//! Shared stall watchdog of the armed execution engine.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Inactivity timeout after which stalled partitions are skipped.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A single shared inactivity timer. Any partition completion re-arms it to
/// the full timeout; once it elapses without progress it fires one final
/// expiry that every subsequent wait observes.
#[derive(Clone)]
pub struct Watchdog {
    progress: mpsc::Sender<()>,
    expired: watch::Receiver<bool>,
}

impl Watchdog {
    pub fn start(timeout: Duration) -> Self {
        let (progress, mut progress_receiver) = mpsc::channel(16);
        let (expired_sender, expired) = watch::channel(false);

        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(timeout, progress_receiver.recv()).await {
                    // progress re-arms the timer to the full timeout
                    Ok(Some(())) => {}
                    // every handle dropped: the run is over
                    Ok(None) => return,
                    Err(_) => {
                        warn!("stall watchdog expired, pending partitions will be skipped");
                        let _ = expired_sender.send(true);
                        return;
                    }
                }
            }
        });

        Self { progress, expired }
    }

    /// Report one partition completion.
    pub fn notify(&self) {
        let _ = self.progress.try_send(());
    }

    /// A receiver resolving once the watchdog has fired.
    pub fn expired(&self) -> watch::Receiver<bool> {
        self.expired.clone()
    }
}
