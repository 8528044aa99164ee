//! Task definitions for the scheduler.
//!
//! - `Task`: one leased row of the shared task table
//! - `DraftStatus`: the row's lifecycle status
//! - `TerminalStatus`: how the supervisor resolved a task

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle status stored in `todolist.draft_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftStatus {
    /// Waiting for a consumer.
    Pending,
    /// Leased and being worked on.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled by the user.
    Cancelled,
    /// The user asked for a revision; the task runs again with feedback.
    FbRequested,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Pending => "PENDING",
            DraftStatus::InProgress => "IN_PROGRESS",
            DraftStatus::Completed => "COMPLETED",
            DraftStatus::Failed => "FAILED",
            DraftStatus::Cancelled => "CANCELLED",
            DraftStatus::FbRequested => "FB_REQUESTED",
        }
    }

    /// Whether a running worker must be stopped when the row reaches this status.
    pub fn requests_termination(&self) -> bool {
        matches!(self, DraftStatus::Cancelled | DraftStatus::FbRequested)
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DraftStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(DraftStatus::Pending),
            "IN_PROGRESS" => Ok(DraftStatus::InProgress),
            "COMPLETED" => Ok(DraftStatus::Completed),
            "FAILED" => Ok(DraftStatus::Failed),
            "CANCELLED" => Ok(DraftStatus::Cancelled),
            "FB_REQUESTED" => Ok(DraftStatus::FbRequested),
            other => Err(format!("unknown draft status '{}'", other)),
        }
    }
}

/// One unit of work leased from the task table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Groups related tasks of one process instance.
    pub proc_inst_id: Option<String>,
    /// Topic of the job.
    pub activity_name: String,
    /// Form reference, optionally prefixed with `formHandler:`.
    pub tool: String,
    /// Comma-separated participant ids or e-mails.
    pub user_id: String,
    pub tenant_id: String,
    pub draft_status: DraftStatus,
    /// Lease holder.
    pub consumer: Option<String>,
    /// Status the row had when it was leased.
    pub task_type: DraftStatus,
    pub feedback: Option<Value>,
    pub draft: Option<Value>,
    pub output: Option<Value>,
}

impl Task {
    /// Creates a pending task with empty optional fields.
    pub fn new(id: Uuid, activity_name: impl Into<String>) -> Self {
        Self {
            id,
            proc_inst_id: None,
            activity_name: activity_name.into(),
            tool: String::new(),
            user_id: String::new(),
            tenant_id: String::new(),
            draft_status: DraftStatus::Pending,
            consumer: None,
            task_type: DraftStatus::Pending,
            feedback: None,
            draft: None,
            output: None,
        }
    }

    /// Whether this run answers a revision request.
    pub fn is_feedback_run(&self) -> bool {
        self.task_type == DraftStatus::FbRequested
    }

    /// The content the feedback refers to: the draft, else the output.
    pub fn current_content(&self) -> Option<&Value> {
        self.draft
            .as_ref()
            .filter(|v| !v.is_null())
            .or(self.output.as_ref().filter(|v| !v.is_null()))
    }
}

/// How the supervisor resolved a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    /// Worker exited 0; task marked COMPLETED.
    Completed,
    /// Worker exited non-zero; task marked FAILED.
    Failed,
    /// Worker stopped because the user cancelled or requested feedback.
    UserCancelled,
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::Completed => write!(f, "completed"),
            TerminalStatus::Failed => write!(f, "failed"),
            TerminalStatus::UserCancelled => write!(f, "user_cancelled"),
        }
    }
}
