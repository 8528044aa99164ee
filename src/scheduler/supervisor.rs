//! Worker supervisor.
//!
//! Runs one leased task to a terminal state: prepares inputs, spawns the
//! worker process, watches for cancellation while it runs and records the
//! outcome. Every path leaves the task without a consumer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::inputs::JobInputPreparer;
use super::monitor::CancellationMonitor;
use super::process::{WorkerLauncher, WorkerProcess, NO_EXIT_CODE};
use super::task::{DraftStatus, Task, TerminalStatus};
use crate::events::{CrewType, EventLogger, EventSink, EventType};
use crate::retry::RetryPolicy;
use crate::storage::{DatabaseError, StoreGateway};

/// Job id of the event emitted when a worker finishes successfully.
pub const CREW_FINISHED_JOB_ID: &str = "CREW_FINISHED";

/// Errors that end supervision of a task before a worker ran.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Job inputs could not be prepared.
    #[error("Input preparation failed: {0}")]
    Preparation(#[from] DatabaseError),

    /// The worker process could not be started.
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// What the supervisor knows about the job in flight.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SupervisorState {
    pub task_id: Option<Uuid>,
    pub worker_pid: Option<u32>,
    pub termination_requested: bool,
}

/// Supervises one task at a time.
pub struct Supervisor {
    store: Arc<dyn StoreGateway>,
    preparer: JobInputPreparer,
    launcher: Arc<dyn WorkerLauncher>,
    event_sink: Arc<dyn EventSink>,
    retry: RetryPolicy,
    cancel_check_interval: Duration,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        preparer: JobInputPreparer,
        launcher: Arc<dyn WorkerLauncher>,
        event_sink: Arc<dyn EventSink>,
        retry: RetryPolicy,
        cancel_check_interval: Duration,
    ) -> Self {
        Self {
            store,
            preparer,
            launcher,
            event_sink,
            retry,
            cancel_check_interval,
            state: SupervisorState::default(),
        }
    }

    /// State of the job in flight; default when idle.
    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    /// Runs `task` to a terminal status.
    ///
    /// Preparation and spawn failures mark the task FAILED and are returned
    /// as errors. A worker failure is a normal [`TerminalStatus::Failed`].
    pub async fn run(&mut self, task: &Task) -> Result<TerminalStatus, SupervisorError> {
        self.state.task_id = Some(task.id);
        let result = self.supervise(task).await;
        self.state = SupervisorState::default();
        result
    }

    async fn supervise(&mut self, task: &Task) -> Result<TerminalStatus, SupervisorError> {
        let mut process = match self.start(task).await {
            Ok(process) => process,
            Err(err) => {
                tracing::error!(task_id = %task.id, error = %err, "Worker could not start");
                self.mark_failed(task.id).await;
                return Err(err);
            }
        };
        self.state.worker_pid = process.id();

        let (signal_tx, signal_rx) = oneshot::channel();
        let monitor = CancellationMonitor::new(
            Arc::clone(&self.store),
            self.cancel_check_interval,
            self.retry,
        )
        .spawn(task.id, signal_tx);

        let exit_code = self.wait_for_exit(task.id, process.as_mut(), signal_rx).await;
        monitor.abort();

        if self.state.termination_requested {
            tracing::info!(task_id = %task.id, "Worker stopped on user request");
            self.release_lease(task.id).await;
            return Ok(TerminalStatus::UserCancelled);
        }

        if exit_code != 0 {
            tracing::warn!(task_id = %task.id, exit_code, "Worker failed");
            self.mark_failed(task.id).await;
            return Ok(TerminalStatus::Failed);
        }

        EventLogger::new(Arc::clone(&self.event_sink), task.id.to_string(), task.proc_inst_id.clone())
            .emit(EventType::CrewCompleted, CrewType::Crew, CREW_FINISHED_JOB_ID, json!({}))
            .await;
        self.mark_completed(task.id).await;
        tracing::info!(task_id = %task.id, "Worker completed");
        Ok(TerminalStatus::Completed)
    }

    async fn start(&self, task: &Task) -> Result<Box<dyn WorkerProcess>, SupervisorError> {
        let payload = self.preparer.prepare(task).await?;
        Ok(self.launcher.launch(&payload).await?)
    }

    /// Waits for the worker, terminating it at most once on a cancel signal.
    async fn wait_for_exit(
        &mut self,
        task_id: Uuid,
        process: &mut dyn WorkerProcess,
        mut signal: oneshot::Receiver<DraftStatus>,
    ) -> i32 {
        let mut watching = true;
        loop {
            tokio::select! {
                exit = process.wait() => {
                    return match exit {
                        Ok(code) => code,
                        Err(err) => {
                            tracing::error!(task_id = %task_id, error = %err, "Waiting for worker failed");
                            NO_EXIT_CODE
                        }
                    };
                }
                received = &mut signal, if watching => {
                    watching = false;
                    if received.is_ok() && !self.state.termination_requested {
                        self.state.termination_requested = true;
                        tracing::info!(task_id = %task_id, pid = ?self.state.worker_pid, "Terminating worker");
                        if let Err(err) = process.terminate() {
                            tracing::warn!(task_id = %task_id, error = %err, "Failed to signal worker");
                        }
                    }
                }
            }
        }
    }

    async fn mark_failed(&self, task_id: Uuid) {
        if let Err(err) = self
            .retry
            .run("mark_failed", || self.store.mark_failed(task_id))
            .await
        {
            tracing::error!(task_id = %task_id, error = %err, "Could not mark task failed");
        }
    }

    async fn mark_completed(&self, task_id: Uuid) {
        if let Err(err) = self
            .retry
            .run("mark_completed", || self.store.mark_completed(task_id))
            .await
        {
            tracing::error!(task_id = %task_id, error = %err, "Could not mark task completed");
        }
    }

    async fn release_lease(&self, task_id: Uuid) {
        if let Err(err) = self
            .retry
            .run("release_lease", || self.store.release_lease(task_id))
            .await
        {
            tracing::error!(task_id = %task_id, error = %err, "Could not release lease");
        }
    }
}
