//! Lifecycle events for the job timeline.
//!
//! Events are append-only records that a front-end renders as the job's
//! progress feed. Delivery is best-effort: [`EventLogger::emit`] logs a
//! failed write and carries on, so a broken event sink never fails a job.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Error returned by an [`EventSink`].
#[derive(Debug, Error)]
#[error("Event delivery failed: {0}")]
pub struct SinkError(pub String);

/// Kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskStarted,
    TaskCompleted,
    ToolUsageStarted,
    ToolUsageFinished,
    CrewCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TaskStarted => "task_started",
            EventType::TaskCompleted => "task_completed",
            EventType::ToolUsageStarted => "tool_usage_started",
            EventType::ToolUsageFinished => "tool_usage_finished",
            EventType::CrewCompleted => "crew_completed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline area an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewType {
    Planning,
    Report,
    Slide,
    Text,
    Crew,
}

impl CrewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrewType::Planning => "planning",
            CrewType::Report => "report",
            CrewType::Slide => "slide",
            CrewType::Text => "text",
            CrewType::Crew => "crew",
        }
    }
}

impl fmt::Display for CrewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub job_id: String,
    pub todo_id: Option<String>,
    pub proc_inst_id: Option<String>,
    pub event_type: EventType,
    pub crew_type: CrewType,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates an event stamped now, with `data` stripped of NUL characters.
    pub fn new(
        event_type: EventType,
        crew_type: CrewType,
        job_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job_id.into(),
            todo_id: None,
            proc_inst_id: None,
            event_type,
            crew_type,
            data: sanitize(data),
            timestamp: Utc::now(),
        }
    }

    /// Attaches the task identifiers.
    pub fn for_task(mut self, todo_id: impl Into<String>, proc_inst_id: Option<String>) -> Self {
        self.todo_id = Some(todo_id.into());
        self.proc_inst_id = proc_inst_id;
        self
    }
}

/// Removes NUL characters from every string nested in `value`.
///
/// PostgreSQL rejects `\u0000` in text and JSONB columns.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) if s.contains('\0') => Value::String(s.replace('\0', "")),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, sanitize(v))).collect()),
        other => other,
    }
}

/// Destination for lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Appends one event.
    async fn record(&self, event: &Event) -> Result<(), SinkError>;
}

/// Best-effort event emitter bound to one task.
#[derive(Clone)]
pub struct EventLogger {
    sink: Arc<dyn EventSink>,
    todo_id: String,
    proc_inst_id: Option<String>,
}

impl EventLogger {
    pub fn new(
        sink: Arc<dyn EventSink>,
        todo_id: impl Into<String>,
        proc_inst_id: Option<String>,
    ) -> Self {
        Self {
            sink,
            todo_id: todo_id.into(),
            proc_inst_id,
        }
    }

    /// Emits one event. Failures are logged, never returned.
    pub async fn emit(&self, event_type: EventType, crew_type: CrewType, job_id: &str, data: Value) {
        let event = Event::new(event_type, crew_type, job_id, data)
            .for_task(self.todo_id.clone(), self.proc_inst_id.clone());

        match self.sink.record(&event).await {
            Ok(()) => tracing::debug!(
                event_type = %event_type,
                crew_type = %crew_type,
                job_id,
                "Event recorded"
            ),
            Err(err) => tracing::warn!(
                event_type = %event_type,
                crew_type = %crew_type,
                job_id,
                error = %err,
                "Failed to record event"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        events: Mutex<Vec<Event>>,
        fail: bool,
    }

    #[async_trait]
    impl EventSink for MemorySink {
        async fn record(&self, event: &Event) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError("sink offline".to_string()));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn test_sanitize_strips_nul_recursively() {
        let dirty = json!({
            "title": "a\u{0000}b",
            "nested": {"list": ["x\u{0000}", 3, null, {"deep": "\u{0000}\u{0000}z"}]}
        });
        let clean = sanitize(dirty);
        assert_eq!(
            clean,
            json!({"title": "ab", "nested": {"list": ["x", 3, null, {"deep": "z"}]}})
        );
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EventType::ToolUsageFinished.to_string(), "tool_usage_finished");
        assert_eq!(CrewType::Planning.to_string(), "planning");
        let value = serde_json::to_value(EventType::CrewCompleted).unwrap();
        assert_eq!(value, json!("crew_completed"));
    }

    #[tokio::test]
    async fn test_logger_attaches_task_ids() {
        let sink = Arc::new(MemorySink::default());
        let logger = EventLogger::new(sink.clone(), "todo-1", Some("proc-1".to_string()));

        logger
            .emit(
                EventType::TaskStarted,
                CrewType::Report,
                "api_x_r1",
                json!({"goal": "g\u{0000}"}),
            )
            .await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].todo_id.as_deref(), Some("todo-1"));
        assert_eq!(events[0].proc_inst_id.as_deref(), Some("proc-1"));
        assert_eq!(events[0].data, json!({"goal": "g"}));
    }

    #[tokio::test]
    async fn test_logger_swallows_sink_failure() {
        let sink = Arc::new(MemorySink {
            fail: true,
            ..Default::default()
        });
        let logger = EventLogger::new(sink, "todo-1", None);
        logger
            .emit(EventType::TaskCompleted, CrewType::Text, "job", json!({}))
            .await;
    }
}
