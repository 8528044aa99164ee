//! Section executor: concurrent research of one report's sections.
//!
//! Every section of a report is researched concurrently. Results are taken
//! in completion order; after each one the executor re-merges all finished
//! sections in TOC order and checkpoints the partial report as a draft.
//! A failing section is replaced by a placeholder and never fails the report.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Map, Value};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::state::{merge_sections, PipelineState, Section};
use crate::error::LlmError;
use crate::events::{CrewType, EventLogger, EventType};
use crate::llm::{GenerationGateway, ResearchEvent};
use crate::prompts::build_section_prompt;
use crate::retry::RetryPolicy;
use crate::storage::StoreGateway;

/// Prefix of the text stored for a section whose generation failed.
pub const SECTION_FAILURE_PREFIX: &str = "Section generation failed";

/// Wraps a report map as `{form_id: {report_key: text, ...}}`.
pub(crate) fn form_payload(form_id: &str, value: Value) -> Value {
    let mut payload = Map::new();
    payload.insert(form_id.to_string(), value);
    Value::Object(payload)
}

/// Placeholder text for a failed section.
pub fn failure_placeholder(reason: impl std::fmt::Display) -> String {
    format!("{}: {}", SECTION_FAILURE_PREFIX, reason)
}

/// Fans out section research for one report and fans the results back in.
pub struct SectionExecutor {
    gateway: Arc<dyn GenerationGateway>,
    store: Arc<dyn StoreGateway>,
    events: EventLogger,
    retry: RetryPolicy,
    separator: String,
}

impl SectionExecutor {
    pub fn new(
        gateway: Arc<dyn GenerationGateway>,
        store: Arc<dyn StoreGateway>,
        events: EventLogger,
        retry: RetryPolicy,
        separator: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            store,
            events,
            retry,
            separator: separator.into(),
        }
    }

    /// Researches every section planned for `report_key` and returns the
    /// report merged in TOC order.
    ///
    /// Section texts land in `state.section_contents[report_key]`; each
    /// completion also refreshes `state.report_contents[report_key]` and
    /// saves a draft checkpoint.
    pub async fn execute(&self, state: &mut PipelineState, report_key: &str) -> String {
        let sections = state
            .report_sections
            .get(report_key)
            .cloned()
            .unwrap_or_default();

        let mut jobs = JoinSet::new();
        let mut job_ids = Vec::with_capacity(sections.len());

        for (index, section) in sections.iter().enumerate() {
            let job_id = format!("api_{}_{}", Uuid::new_v4(), report_key);
            self.events
                .emit(
                    EventType::TaskStarted,
                    CrewType::Report,
                    &job_id,
                    json!({
                        "role": "Research specialist",
                        "name": section.title,
                        "goal": format!("Write section {} \"{}\" of report '{}'", section.number, section.title, report_key),
                    }),
                )
                .await;

            let research = SectionResearch {
                gateway: Arc::clone(&self.gateway),
                events: self.events.clone(),
                retry: self.retry,
                job_id: job_id.clone(),
                prompt: build_section_prompt(
                    section,
                    &state.topic,
                    &state.previous_outputs,
                    &state.previous_feedback,
                ),
            };
            jobs.spawn(async move { (index, research.run().await) });
            job_ids.push(job_id);
        }

        tracing::info!(report_key, sections = sections.len(), "Section research started");

        let mut finished = vec![false; sections.len()];
        while let Some(joined) = jobs.join_next().await {
            let (index, result) = match joined {
                Ok(output) => output,
                Err(err) => {
                    // Index unknown; the section is filled in after the loop.
                    tracing::error!(report_key, error = %err, "Section task aborted");
                    continue;
                }
            };
            finished[index] = true;

            let section = &sections[index];
            let content = match result {
                Ok(text) => {
                    tracing::info!(report_key, section = %section.title, chars = text.len(), "Section completed");
                    text
                }
                Err(err) => {
                    tracing::warn!(report_key, section = %section.title, error = %err, "Section failed");
                    failure_placeholder(&err)
                }
            };

            self.complete_section(state, report_key, &sections, section, &job_ids[index], content)
                .await;
        }

        for (index, section) in sections.iter().enumerate() {
            if !finished[index] {
                let content = failure_placeholder("task aborted");
                self.complete_section(state, report_key, &sections, section, &job_ids[index], content)
                    .await;
            }
        }

        let contents = state.section_contents.get(report_key).cloned().unwrap_or_default();
        merge_sections(&sections, &contents, &self.separator)
    }

    async fn complete_section(
        &self,
        state: &mut PipelineState,
        report_key: &str,
        sections: &[Section],
        section: &Section,
        job_id: &str,
        content: String,
    ) {
        self.events
            .emit(
                EventType::TaskCompleted,
                CrewType::Report,
                job_id,
                json!({ report_key: content }),
            )
            .await;

        state
            .section_contents
            .entry(report_key.to_string())
            .or_default()
            .insert(section.title.clone(), content);

        self.checkpoint(state, report_key, sections).await;
    }

    /// Saves the partial report (all reports so far) as the task's draft.
    async fn checkpoint(&self, state: &mut PipelineState, report_key: &str, sections: &[Section]) {
        let empty = HashMap::new();
        let contents = state.section_contents.get(report_key).unwrap_or(&empty);
        let merged = merge_sections(sections, contents, &self.separator);
        if merged.trim().is_empty() {
            return;
        }
        state.report_contents.insert(report_key.to_string(), merged);

        let reports: Map<String, Value> = state
            .report_contents
            .iter()
            .map(|(key, text)| (key.clone(), Value::String(text.clone())))
            .collect();
        let payload = form_payload(&state.proc_form_id, Value::Object(reports));
        let todo_id = state.todo_id;

        let saved = self
            .retry
            .run("save_checkpoint", || self.store.save_result(todo_id, &payload, false))
            .await;
        if let Err(err) = saved {
            tracing::warn!(report_key, error = %err, "Checkpoint save failed, continuing");
        }
    }
}

/// Research of one section, owned by its spawned task.
struct SectionResearch {
    gateway: Arc<dyn GenerationGateway>,
    events: EventLogger,
    retry: RetryPolicy,
    job_id: String,
    prompt: String,
}

impl SectionResearch {
    /// Consumes the research stream, forwarding tool events and returning
    /// the concatenated text.
    async fn run(self) -> Result<String, LlmError> {
        let mut stream = self
            .retry
            .run_if("stream_research", LlmError::is_transient, || {
                self.gateway.stream_research(&self.prompt)
            })
            .await?;

        let mut content = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                ResearchEvent::TextDelta(delta) => content.push_str(&delta),
                ResearchEvent::ToolStarted { tool_name } => {
                    self.events
                        .emit(
                            EventType::ToolUsageStarted,
                            CrewType::Report,
                            &self.job_id,
                            json!({ "tool_name": tool_name }),
                        )
                        .await;
                }
                ResearchEvent::ToolFinished { tool_name, info } => {
                    if info.contains('\0') {
                        continue;
                    }
                    self.events
                        .emit(
                            EventType::ToolUsageFinished,
                            CrewType::Report,
                            &self.job_id,
                            json!({ "tool_name": tool_name, "info": info }),
                        )
                        .await;
                }
            }
        }

        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content)
    }
}
