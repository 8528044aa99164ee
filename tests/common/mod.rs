//! Shared in-memory fakes for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use draft_forge::events::{Event, EventSink, EventType, SinkError};
use draft_forge::llm::{GenerationGateway, ResearchEvent, ResearchStream};
use draft_forge::pipeline::{FormType, WorkerPayload};
use draft_forge::scheduler::{
    ContextSummarizer, ContextSummary, DraftStatus, Task, WorkerLauncher, WorkerProcess,
    NO_EXIT_CODE,
};
use draft_forge::storage::{DatabaseError, FormMetadata, Participant, StoreGateway};
use draft_forge::LlmError;

pub const SEPARATOR: &str = "\n\n---\n\n";
pub const FORM_ID: &str = "form-1";

// ============================================================================
// Store
// ============================================================================

/// In-memory task table, result log and event log.
#[derive(Default)]
pub struct MockStore {
    pub tasks: Mutex<Vec<Task>>,
    /// Statuses returned by `get_status`, front first; `IN_PROGRESS` once empty.
    pub statuses: Mutex<VecDeque<DraftStatus>>,
    pub saves: Mutex<Vec<(Uuid, Value, bool)>>,
    pub completed: Mutex<Vec<Uuid>>,
    pub failed: Mutex<Vec<Uuid>>,
    pub released: Mutex<Vec<Uuid>>,
    pub events: Mutex<Vec<Event>>,
    /// Number of upcoming `get_status` calls that fail.
    pub status_failures: AtomicUsize,
    pub get_status_calls: AtomicUsize,
    pub form_types: Vec<FormType>,
    pub fail_form_metadata: bool,
}

impl MockStore {
    pub fn with_task(task: Task) -> Self {
        let store = Self::default();
        store.tasks.lock().unwrap().push(task);
        store
    }

    pub fn fail_status_checks(&self, count: usize) {
        self.status_failures.store(count, Ordering::SeqCst);
    }

    pub fn script_statuses(&self, statuses: &[DraftStatus]) {
        self.statuses.lock().unwrap().extend(statuses.iter().copied());
    }

    pub fn saves(&self) -> Vec<(Uuid, Value, bool)> {
        self.saves.lock().unwrap().clone()
    }

    pub fn events_of(&self, event_type: EventType) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn consumer_of(&self, task_id: Uuid) -> Option<String> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == task_id)
            .and_then(|t| t.consumer.clone())
    }

    fn finish(&self, task_id: Uuid, status: Option<DraftStatus>) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) {
            task.consumer = None;
            if let Some(status) = status {
                task.draft_status = status;
            }
        }
    }
}

#[async_trait]
impl StoreGateway for MockStore {
    async fn lease_one_task(&self, consumer: &str, _limit: i64) -> Result<Option<Task>, DatabaseError> {
        let mut tasks = self.tasks.lock().unwrap();
        let waiting = tasks.iter_mut().find(|t| {
            t.consumer.is_none()
                && matches!(t.draft_status, DraftStatus::Pending | DraftStatus::FbRequested)
        });
        Ok(waiting.map(|task| {
            task.task_type = task.draft_status;
            task.draft_status = DraftStatus::InProgress;
            task.consumer = Some(consumer.to_string());
            task.clone()
        }))
    }

    async fn get_status(&self, _task_id: Uuid) -> Result<Option<DraftStatus>, DatabaseError> {
        self.get_status_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .status_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DatabaseError::ConnectionFailed("connection reset".to_string()));
        }
        let next = self.statuses.lock().unwrap().pop_front();
        Ok(Some(next.unwrap_or(DraftStatus::InProgress)))
    }

    async fn mark_completed(&self, task_id: Uuid) -> Result<(), DatabaseError> {
        self.completed.lock().unwrap().push(task_id);
        self.finish(task_id, Some(DraftStatus::Completed));
        Ok(())
    }

    async fn mark_failed(&self, task_id: Uuid) -> Result<(), DatabaseError> {
        self.failed.lock().unwrap().push(task_id);
        self.finish(task_id, Some(DraftStatus::Failed));
        Ok(())
    }

    async fn release_lease(&self, task_id: Uuid) -> Result<(), DatabaseError> {
        self.released.lock().unwrap().push(task_id);
        self.finish(task_id, None);
        Ok(())
    }

    async fn fetch_completed_outputs(&self, _proc_inst_id: &str) -> Result<Vec<Value>, DatabaseError> {
        Ok(vec![serde_json::json!({"earlier": "approved outline"})])
    }

    async fn fetch_participants(&self, user_ids: &str) -> Result<Vec<Participant>, DatabaseError> {
        Ok(draft_forge::storage::split_participant_ids(user_ids)
            .into_iter()
            .map(|email| Participant {
                email: Some(email.to_string()),
                ..Default::default()
            })
            .collect())
    }

    async fn fetch_form_metadata(&self, _tool: &str, _tenant_id: &str) -> Result<FormMetadata, DatabaseError> {
        if self.fail_form_metadata {
            return Err(DatabaseError::NotFound("form_def".to_string()));
        }
        Ok(FormMetadata::new(FORM_ID, self.form_types.clone(), "<form></form>"))
    }

    async fn save_result(&self, task_id: Uuid, payload: &Value, final_result: bool) -> Result<(), DatabaseError> {
        self.saves.lock().unwrap().push((task_id, payload.clone(), final_result));
        Ok(())
    }
}

#[async_trait]
impl EventSink for MockStore {
    async fn record(&self, event: &Event) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Scripted research for one section title.
pub struct SectionScript {
    pub title: String,
    pub delay: Duration,
    pub events: Vec<Result<ResearchEvent, String>>,
}

/// Gateway answering completions by prompt substring and research by section title.
#[derive(Default)]
pub struct ScriptedGateway {
    completions: Vec<(String, Result<String, String>)>,
    rejections: Vec<(String, u16)>,
    sections: Vec<SectionScript>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers any completion whose prompt contains `needle`.
    pub fn on_complete(mut self, needle: &str, response: Result<&str, &str>) -> Self {
        self.completions.push((
            needle.to_string(),
            response.map(str::to_string).map_err(str::to_string),
        ));
        self
    }

    /// Rejects any completion whose prompt contains `needle` with an API
    /// error carrying `code`.
    pub fn on_complete_rejected(mut self, needle: &str, code: u16) -> Self {
        self.rejections.push((needle.to_string(), code));
        self
    }

    /// Streams `text` for the section titled `title` after `delay_ms`.
    pub fn on_section(self, title: &str, delay_ms: u64, text: &str) -> Self {
        self.on_section_events(
            title,
            delay_ms,
            vec![
                Ok(ResearchEvent::ToolStarted {
                    tool_name: "web_search_call".to_string(),
                }),
                Ok(ResearchEvent::ToolFinished {
                    tool_name: "web_search_call".to_string(),
                    info: format!("search: {}", title),
                }),
                Ok(ResearchEvent::TextDelta(text.to_string())),
            ],
        )
    }

    pub fn on_section_events(
        mut self,
        title: &str,
        delay_ms: u64,
        events: Vec<Result<ResearchEvent, String>>,
    ) -> Self {
        self.sections.push(SectionScript {
            title: title.to_string(),
            delay: Duration::from_millis(delay_ms),
            events,
        });
        self
    }

    pub fn prompts_containing(&self, needle: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GenerationGateway for ScriptedGateway {
    async fn complete(&self, prompt: &str, _system_prompt: Option<&str>) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some((_, code)) = self.rejections.iter().find(|(needle, _)| prompt.contains(needle.as_str())) {
            return Err(LlmError::ApiError {
                code: *code,
                message: "rejected".to_string(),
            });
        }
        match self.completions.iter().find(|(needle, _)| prompt.contains(needle.as_str())) {
            Some((_, Ok(text))) => Ok(text.clone()),
            Some((_, Err(message))) => Err(LlmError::RequestFailed(message.clone())),
            None => Err(LlmError::RequestFailed("no scripted completion".to_string())),
        }
    }

    async fn stream_research(&self, prompt: &str) -> Result<ResearchStream, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let script = self
            .sections
            .iter()
            .find(|s| prompt.contains(&format!("Section title: {}\n", s.title)))
            .ok_or_else(|| LlmError::Stream("no scripted section".to_string()))?;

        tokio::time::sleep(script.delay).await;
        let events: Vec<Result<ResearchEvent, LlmError>> = script
            .events
            .iter()
            .map(|e| e.clone().map_err(LlmError::Stream))
            .collect();
        Ok(futures::stream::iter(events).boxed())
    }
}

/// Summarizer that echoes its inputs' sizes.
pub struct StubSummarizer;

#[async_trait]
impl ContextSummarizer for StubSummarizer {
    async fn summarize(&self, outputs: &str, feedback: &str, _content: &str) -> ContextSummary {
        ContextSummary {
            previous_outputs: if outputs.is_empty() { String::new() } else { "prior work summary".to_string() },
            previous_feedback: if feedback.is_empty() { String::new() } else { "feedback summary".to_string() },
        }
    }
}

// ============================================================================
// Worker processes
// ============================================================================

/// Fake worker that exits with `exit_code` after `run_for`, or with
/// [`NO_EXIT_CODE`] once terminated.
pub struct MockProcess {
    exit_code: i32,
    deadline: Instant,
    terminated: Arc<AtomicBool>,
    wake: Arc<Notify>,
    terminations: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerProcess for MockProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    async fn wait(&mut self) -> io::Result<i32> {
        loop {
            if self.terminated.load(Ordering::SeqCst) {
                return Ok(NO_EXIT_CODE);
            }
            tokio::select! {
                _ = tokio::time::sleep_until(self.deadline) => return Ok(self.exit_code),
                _ = self.wake.notified() => {}
            }
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.terminated.store(true, Ordering::SeqCst);
        self.wake.notify_one();
        Ok(())
    }
}

/// Launcher producing [`MockProcess`]es and recording payloads.
pub struct MockLauncher {
    pub exit_code: i32,
    pub run_for: Duration,
    pub fail_spawn: bool,
    pub terminations: Arc<AtomicUsize>,
    pub payloads: Mutex<Vec<WorkerPayload>>,
}

impl MockLauncher {
    pub fn exiting(exit_code: i32, run_for: Duration) -> Self {
        Self {
            exit_code,
            run_for,
            fail_spawn: false,
            terminations: Arc::new(AtomicUsize::new(0)),
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn termination_count(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerLauncher for MockLauncher {
    async fn launch(&self, payload: &WorkerPayload) -> io::Result<Box<dyn WorkerProcess>> {
        if self.fail_spawn {
            return Err(io::Error::new(io::ErrorKind::NotFound, "worker binary missing"));
        }
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(Box::new(MockProcess {
            exit_code: self.exit_code,
            deadline: Instant::now() + self.run_for,
            terminated: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            terminations: Arc::clone(&self.terminations),
        }))
    }
}

/// A pending task with the fields input preparation reads.
pub fn sample_task() -> Task {
    let mut task = Task::new(Uuid::new_v4(), "EV charging market entry");
    task.proc_inst_id = Some("proc-1".to_string());
    task.tool = format!("formHandler:{}", FORM_ID);
    task.user_id = "ann@example.com, bo@example.com".to_string();
    task.tenant_id = "tenant-1".to_string();
    task
}
