//! Cancellation monitor.
//!
//! Polls a running task's status and signals the supervisor once when the
//! user cancels it or asks for a revision.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::task::DraftStatus;
use crate::retry::RetryPolicy;
use crate::storage::StoreGateway;

/// Watches one task for cancellation.
pub struct CancellationMonitor {
    store: Arc<dyn StoreGateway>,
    interval: Duration,
    retry: RetryPolicy,
}

impl CancellationMonitor {
    pub fn new(store: Arc<dyn StoreGateway>, interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            store,
            interval,
            retry,
        }
    }

    /// Checks the status every `interval` until it requests termination,
    /// then sends that status and returns. Each check is retried; a check
    /// that still fails is logged and skipped. Returns early when the receiver is dropped.
    pub async fn watch(self, task_id: Uuid, signal: oneshot::Sender<DraftStatus>) {
        loop {
            tokio::time::sleep(self.interval).await;
            if signal.is_closed() {
                return;
            }

            let status = self
                .retry
                .run("get_status", || self.store.get_status(task_id))
                .await;
            match status {
                Ok(Some(status)) if status.requests_termination() => {
                    tracing::info!(task_id = %task_id, status = %status, "Termination requested");
                    let _ = signal.send(status);
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(task_id = %task_id, error = %err, "Status check failed");
                }
            }
        }
    }

    /// Runs [`watch`](Self::watch) on a background task.
    pub fn spawn(self, task_id: Uuid, signal: oneshot::Sender<DraftStatus>) -> JoinHandle<()> {
        tokio::spawn(self.watch(task_id, signal))
    }
}
