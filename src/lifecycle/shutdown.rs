//! Shutdown coordination.

use tokio::sync::broadcast;

use crate::lifecycle::signals;

/// Fan-out of a single shutdown event.
///
/// The HTTP server and the health monitor each hold a receiver and stop
/// when the event fires.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Wait for SIGINT/SIGTERM, then fire.
    pub async fn trigger_on_signal(&self) {
        signals::shutdown_signal().await;
        self.trigger();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
