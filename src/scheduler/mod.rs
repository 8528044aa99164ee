//! Task polling and worker supervision.
//!
//! This module runs in the long-lived poller process:
//!
//! - **TaskPoller**: leases one task at a time from the shared task table
//! - **Supervisor**: prepares inputs, spawns an isolated worker process and
//!   records the terminal status
//! - **CancellationMonitor**: polls the task status while the worker runs and
//!   signals termination once
//!
//! # Architecture
//!
//! ```text
//!    ┌────────────┐  lease   ┌──────────────┐
//!    │ TaskPoller │─────────▶│  todolist    │
//!    └─────┬──────┘          └──────▲───────┘
//!          │ run(task)              │ status / result
//!    ┌─────▼──────┐  spawn   ┌──────┴───────┐
//!    │ Supervisor │─────────▶│ worker proc  │
//!    └─────┬──────┘          └──────────────┘
//!          │ kill once
//!    ┌─────▼──────────────┐
//!    │ CancellationMonitor│
//!    └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use draft_forge::scheduler::{ProcessLauncher, Supervisor, TaskPoller};
//!
//! let supervisor = Supervisor::new(store.clone(), preparer, launcher, sink, retry, interval);
//! let mut poller = TaskPoller::new(store, supervisor, "host-1", poll_interval, retry);
//! poller.run().await;
//! ```
//!
//! # Reliability Features
//!
//! - **Exclusive lease**: `FOR UPDATE SKIP LOCKED` hands each task to one poller
//! - **Lease release**: completed, failed and cancelled tasks all end without a consumer
//! - **Isolation**: killing a worker never touches the poller's state

pub mod inputs;
pub mod monitor;
pub mod poller;
pub mod process;
pub mod supervisor;
pub mod task;

// Re-export main types for convenience
pub use inputs::{value_text, ContextSummarizer, ContextSummary, JobInputPreparer, LlmSummarizer};
pub use monitor::CancellationMonitor;
pub use poller::{PollError, TaskPoller};
pub use process::{ChildProcess, ProcessLauncher, WorkerLauncher, WorkerProcess, NO_EXIT_CODE};
pub use supervisor::{Supervisor, SupervisorError, SupervisorState, CREW_FINISHED_JOB_ID};
pub use task::{DraftStatus, Task, TerminalStatus};
