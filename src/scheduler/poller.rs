//! Task poller: the top-level lease loop.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::supervisor::{Supervisor, SupervisorError};
use super::task::TerminalStatus;
use crate::retry::RetryPolicy;
use crate::storage::{DatabaseError, StoreGateway};

/// Errors from one poll iteration. Logged by [`TaskPoller::run`], never fatal.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Lease failed: {0}")]
    Lease(#[from] DatabaseError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Leases one task at a time and hands it to the supervisor.
pub struct TaskPoller {
    store: Arc<dyn StoreGateway>,
    supervisor: Supervisor,
    consumer_id: String,
    interval: Duration,
    retry: RetryPolicy,
}

impl TaskPoller {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        supervisor: Supervisor,
        consumer_id: impl Into<String>,
        interval: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            supervisor,
            consumer_id: consumer_id.into(),
            interval,
            retry,
        }
    }

    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    /// Leases at most one task and supervises it to completion.
    ///
    /// Returns `None` when no task was waiting.
    pub async fn poll_once(&mut self) -> Result<Option<TerminalStatus>, PollError> {
        let store = Arc::clone(&self.store);
        let consumer = self.consumer_id.as_str();
        let leased = self
            .retry
            .run("lease_task", || store.lease_one_task(consumer, 1))
            .await?;

        let Some(task) = leased else {
            return Ok(None);
        };

        tracing::info!(
            task_id = %task.id,
            topic = %task.activity_name,
            task_type = %task.task_type,
            consumer = %self.consumer_id,
            "Task leased"
        );
        let status = self.supervisor.run(&task).await?;
        tracing::info!(task_id = %task.id, status = %status, "Task finished");
        Ok(Some(status))
    }

    /// Polls forever, sleeping `interval` after every iteration.
    pub async fn run(&mut self) {
        tracing::info!(
            consumer = %self.consumer_id,
            interval_secs = self.interval.as_secs_f64(),
            "Task poller started"
        );

        loop {
            match self.poll_once().await {
                Ok(Some(_)) => {}
                Ok(None) => tracing::debug!("No task waiting"),
                Err(err) => tracing::error!(error = %err, "Poll iteration failed"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
