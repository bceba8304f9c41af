//! Shutdown coordination for the proxy.
//!
//! The HTTP server holds a receiver and stops accepting connections once the
//! coordinator fires; in-flight transactions finish, which runs their
//! logging phase and flushes pending rule-match notifications.

use tokio::sync::broadcast;

/// Broadcast-based shutdown coordinator.
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

    /// Fire the signal. A no-op when nobody is listening.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of receivers still alive.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Trigger on Ctrl+C from a background task.
    ///
    /// If the handler cannot be installed the coordinator is kept alive,
    /// so the server runs until killed instead of stopping at once.
    pub fn trigger_on_ctrl_c(self) {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Ctrl+C received, shutting down");
                    self.trigger();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                    let _keep = self;
                    std::future::pending::<()>().await;
                }
            }
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
