//! Job input preparation.
//!
//! Gathers everything a worker needs before it is spawned: prior outputs of
//! the same process instance, participants, the target form and two context
//! summaries.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::task::Task;
use crate::error::LlmError;
use crate::llm::GenerationGateway;
use crate::pipeline::WorkerPayload;
use crate::prompts::{
    build_feedback_summary_prompt, build_output_summary_prompt, FEEDBACK_SUMMARY_SYSTEM_PROMPT,
    OUTPUT_SUMMARY_SYSTEM_PROMPT,
};
use crate::retry::RetryPolicy;
use crate::storage::{DatabaseError, StoreGateway};

/// Context summaries handed to a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSummary {
    pub previous_outputs: String,
    pub previous_feedback: String,
}

/// Turns raw prior outputs and feedback into compact summaries.
#[async_trait]
pub trait ContextSummarizer: Send + Sync {
    /// `feedback` and `content` are empty for first runs.
    async fn summarize(&self, outputs: &str, feedback: &str, content: &str) -> ContextSummary;
}

/// [`ContextSummarizer`] backed by a generation gateway.
///
/// Both summaries are requested concurrently. An empty input yields an empty
/// summary without a model call; a failed call yields an empty summary.
pub struct LlmSummarizer {
    gateway: Arc<dyn GenerationGateway>,
    retry: RetryPolicy,
}

impl LlmSummarizer {
    pub fn new(gateway: Arc<dyn GenerationGateway>, retry: RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    async fn summarize_one(&self, operation: &str, prompt: Option<String>, system: &str) -> String {
        let Some(prompt) = prompt else {
            return String::new();
        };
        self.retry
            .run_if(operation, LlmError::is_transient, || {
                self.gateway.complete(&prompt, Some(system))
            })
            .await
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContextSummarizer for LlmSummarizer {
    async fn summarize(&self, outputs: &str, feedback: &str, content: &str) -> ContextSummary {
        let output_prompt = (!outputs.trim().is_empty()).then(|| build_output_summary_prompt(outputs));
        let feedback_prompt =
            (!feedback.trim().is_empty()).then(|| build_feedback_summary_prompt(feedback, content));

        let (previous_outputs, previous_feedback) = tokio::join!(
            self.summarize_one("summarize_outputs", output_prompt, OUTPUT_SUMMARY_SYSTEM_PROMPT),
            self.summarize_one("summarize_feedback", feedback_prompt, FEEDBACK_SUMMARY_SYSTEM_PROMPT),
        );

        ContextSummary {
            previous_outputs,
            previous_feedback,
        }
    }
}

/// Renders a stored JSON value as prompt text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Builds [`WorkerPayload`]s for leased tasks.
pub struct JobInputPreparer {
    store: Arc<dyn StoreGateway>,
    summarizer: Arc<dyn ContextSummarizer>,
    retry: RetryPolicy,
}

impl JobInputPreparer {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        summarizer: Arc<dyn ContextSummarizer>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            summarizer,
            retry,
        }
    }

    /// Prepares the worker payload for `task`.
    ///
    /// Prior outputs and participants fall back to empty after retries; the
    /// form metadata is required.
    pub async fn prepare(&self, task: &Task) -> Result<WorkerPayload, DatabaseError> {
        let outputs = match task.proc_inst_id.as_deref() {
            Some(proc_inst_id) => {
                self.retry
                    .run_or_default("fetch_completed_outputs", || {
                        self.store.fetch_completed_outputs(proc_inst_id)
                    })
                    .await
            }
            None => Vec::new(),
        };

        let user_info = self
            .retry
            .run_or_default("fetch_participants", || self.store.fetch_participants(&task.user_id))
            .await;

        let form = self
            .retry
            .run("fetch_form_metadata", || {
                self.store.fetch_form_metadata(&task.tool, &task.tenant_id)
            })
            .await?;

        let outputs_text = if outputs.is_empty() {
            String::new()
        } else {
            value_text(&Value::Array(outputs))
        };
        let (feedback_text, content_text) = if task.is_feedback_run() {
            (
                task.feedback.as_ref().map(value_text).unwrap_or_default(),
                task.current_content().map(value_text).unwrap_or_default(),
            )
        } else {
            (String::new(), String::new())
        };

        let summary = self
            .summarizer
            .summarize(&outputs_text, &feedback_text, &content_text)
            .await;

        tracing::info!(
            task_id = %task.id,
            participants = user_info.len(),
            form_id = %form.form_id,
            feedback_run = task.is_feedback_run(),
            "Job inputs prepared"
        );

        Ok(WorkerPayload {
            todo_id: task.id,
            proc_inst_id: task.proc_inst_id.clone(),
            topic: task.activity_name.clone(),
            previous_outputs: summary.previous_outputs,
            previous_feedback: summary.previous_feedback,
            user_info,
            form_types: form.form_types,
            proc_form_id: form.form_id,
            form_html: form.form_html,
        })
    }
}
