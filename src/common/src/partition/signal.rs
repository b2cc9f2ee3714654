//! Completion signaling between dependent partitions.
//!
//! A partition's [`CompletionSignal`] counts how many operations still have to
//! act on it. Dependent partitions hold [`Obligation`] subscriptions; the
//! broadcast fires once, when the last pending completion lands.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;

/// Pending-completion counter plus a one-shot broadcast.
///
/// Arming and subscribing happen strictly before any completion is reported,
/// so the counter never races its own broadcast.
#[derive(Debug)]
pub struct CompletionSignal {
    pending: AtomicUsize,
    sender: watch::Sender<bool>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            pending: AtomicUsize::new(0),
            sender,
        }
    }

    /// Tell this partition to expect one more completion before it may
    /// unblock its dependents.
    pub fn arm(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Subscribe a dependent partition to this partition's completion.
    pub fn subscribe(&self) -> Obligation {
        Obligation {
            receiver: self.sender.subscribe(),
        }
    }

    /// Report one completion. Fires the broadcast when the counter reaches
    /// zero; completing an unarmed signal broadcasts immediately.
    pub fn complete(&self) {
        let previous = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                Some(pending.saturating_sub(1))
            })
            .unwrap_or(0);

        if previous <= 1 {
            let _ = self.sender.send(true);
        }
    }

    pub fn is_complete(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// One wait obligation of a dependent partition.
#[derive(Debug)]
pub struct Obligation {
    receiver: watch::Receiver<bool>,
}

impl Obligation {
    /// Block until the depended-on partition signals completion.
    ///
    /// Returns immediately if the broadcast already fired.
    pub async fn wait(&mut self) {
        let _ = self.receiver.wait_for(|complete| *complete).await;
    }
}
