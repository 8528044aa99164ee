//! Pipeline orchestrator for one content-generation job.
//!
//! The job runs a fixed phase table, `PLAN -> REPORT -> SLIDE -> TEXT -> SAVE`.
//! A phase whose plan section is empty is skipped. Any phase error aborts the
//! job; the worker then exits non-zero and the supervisor marks the task
//! FAILED.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::plan::ExecutionPlan;
use super::sections::{form_payload, SectionExecutor};
use super::state::{PipelineState, TableOfContents};
use crate::error::LlmError;
use crate::events::{CrewType, EventLogger, EventType};
use crate::llm::GenerationGateway;
use crate::prompts::{
    build_execution_plan_prompt, build_slide_prompt, build_text_form_prompt, build_toc_prompt,
    TOC_SYSTEM_PROMPT,
};
use crate::retry::RetryPolicy;
use crate::storage::{DatabaseError, StoreGateway};
use crate::utils::{clean_json_response, parse_json_response};

/// Key under which a text response that is not a JSON object is stored.
pub const TEXT_FALLBACK_KEY: &str = "text";

const PLAN_JOB_ID: &str = "deep-research_planning_form";
const TEXT_JOB_ID: &str = "deep-research_generate_texts";

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The execution plan could not be generated or parsed.
    #[error("Planning failed: {0}")]
    Plan(String),

    /// The table of contents for a report could not be produced.
    #[error("Table of contents for '{report_key}' failed: {message}")]
    Toc { report_key: String, message: String },

    /// Slide generation failed after retries.
    #[error("Slide generation for '{key}' failed: {source}")]
    Slide {
        key: String,
        #[source]
        source: LlmError,
    },

    /// The batched text generation failed after retries.
    #[error("Text generation failed: {0}")]
    Text(#[source] LlmError),

    /// The final result could not be persisted.
    #[error("Saving final result failed: {0}")]
    Save(#[from] DatabaseError),
}

/// One step of the phase table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Plan,
    Report,
    Slide,
    Text,
    Save,
}

/// Phases in execution order.
pub const PHASES: [PhaseKind; 5] = [
    PhaseKind::Plan,
    PhaseKind::Report,
    PhaseKind::Slide,
    PhaseKind::Text,
    PhaseKind::Save,
];

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Plan => "plan",
            PhaseKind::Report => "report",
            PhaseKind::Slide => "slide",
            PhaseKind::Text => "text",
            PhaseKind::Save => "save",
        }
    }

    /// Whether the phase has nothing to do for `state`.
    pub fn should_skip(&self, state: &PipelineState) -> bool {
        let plan = state.execution_plan.as_ref();
        match self {
            PhaseKind::Plan | PhaseKind::Save => false,
            PhaseKind::Report => plan.map_or(true, |p| p.report_phase.is_empty()),
            PhaseKind::Slide => plan.map_or(true, |p| p.slide_phase.is_empty()),
            PhaseKind::Text => plan.map_or(true, |p| p.text_phase.is_empty()),
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives one job through the phase table.
pub struct PipelineOrchestrator {
    gateway: Arc<dyn GenerationGateway>,
    store: Arc<dyn StoreGateway>,
    events: EventLogger,
    retry: RetryPolicy,
    separator: String,
    sections: SectionExecutor,
}

impl PipelineOrchestrator {
    pub fn new(
        gateway: Arc<dyn GenerationGateway>,
        store: Arc<dyn StoreGateway>,
        events: EventLogger,
        retry: RetryPolicy,
        separator: impl Into<String>,
    ) -> Self {
        let separator = separator.into();
        let sections = SectionExecutor::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            events.clone(),
            retry,
            separator.clone(),
        );
        Self {
            gateway,
            store,
            events,
            retry,
            separator,
            sections,
        }
    }

    /// Runs every phase in order and returns the final state.
    pub async fn run(&self, mut state: PipelineState) -> Result<PipelineState, PipelineError> {
        tracing::info!(todo_id = %state.todo_id, form_id = %state.proc_form_id, "Pipeline started");

        for phase in PHASES {
            if phase.should_skip(&state) {
                tracing::info!(phase = %phase, "Phase skipped");
                continue;
            }

            tracing::info!(phase = %phase, "Phase started");
            match phase {
                PhaseKind::Plan => self.plan_phase(&mut state).await?,
                PhaseKind::Report => self.report_phase(&mut state).await?,
                PhaseKind::Slide => self.slide_phase(&mut state).await?,
                PhaseKind::Text => self.text_phase(&mut state).await?,
                PhaseKind::Save => self.save_phase(&state).await?,
            }
        }

        tracing::info!(
            todo_id = %state.todo_id,
            reports = state.report_contents.len(),
            slides = state.slide_contents.len(),
            texts = state.text_contents.len(),
            "Pipeline finished"
        );
        Ok(state)
    }

    async fn complete(
        &self,
        operation: &str,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        self.retry
            .run_if(operation, LlmError::is_transient, || {
                self.gateway.complete(prompt, system_prompt)
            })
            .await
    }

    async fn plan_phase(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        self.events
            .emit(
                EventType::TaskStarted,
                CrewType::Planning,
                PLAN_JOB_ID,
                json!({
                    "role": "Planner",
                    "name": "execution_plan",
                    "goal": "Assign every form field to the report, slide or text phase",
                }),
            )
            .await;

        let prompt = build_execution_plan_prompt(&state.form_types, &state.user_info);
        let raw = self
            .complete("execution_plan", &prompt, None)
            .await
            .map_err(|e| PipelineError::Plan(e.to_string()))?;
        let plan = ExecutionPlan::parse(&raw).map_err(|e| PipelineError::Plan(e.to_string()))?;

        tracing::info!(
            reports = plan.report_phase.forms.len(),
            slides = plan.slide_phase.forms.len(),
            texts = plan.text_phase.forms.len(),
            "Execution plan ready"
        );

        self.events
            .emit(
                EventType::TaskCompleted,
                CrewType::Planning,
                PLAN_JOB_ID,
                json!({ "execution_plan": plan }),
            )
            .await;

        state.execution_plan = Some(plan);
        Ok(())
    }

    async fn report_phase(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let forms = state
            .execution_plan
            .as_ref()
            .map(|p| p.report_phase.forms.clone())
            .unwrap_or_default();

        for form in forms {
            let key = form.key.as_str();
            self.plan_sections(state, key).await?;

            let merged = self.sections.execute(state, key).await;

            let merge_job = format!("deep-research_final_report_merge_{}", key);
            self.events
                .emit(
                    EventType::TaskStarted,
                    CrewType::Report,
                    &merge_job,
                    json!({ "role": "Editor", "name": key, "goal": "Merge sections in order" }),
                )
                .await;
            self.events
                .emit(EventType::TaskCompleted, CrewType::Report, &merge_job, json!({ key: merged }))
                .await;

            state.report_contents.insert(key.to_string(), merged);
        }

        Ok(())
    }

    /// Produces the table of contents for `report_key`. Failures are fatal.
    async fn plan_sections(&self, state: &mut PipelineState, report_key: &str) -> Result<(), PipelineError> {
        let job_id = format!("deep-research_planning_sections_{}", report_key);
        self.events
            .emit(
                EventType::TaskStarted,
                CrewType::Planning,
                &job_id,
                json!({
                    "role": "Report architect",
                    "name": report_key,
                    "goal": "Design the table of contents",
                }),
            )
            .await;

        let toc_error = |message: String| PipelineError::Toc {
            report_key: report_key.to_string(),
            message,
        };

        let prompt = build_toc_prompt(&state.previous_outputs, &state.previous_feedback, &state.user_info);
        let raw = self
            .complete("table_of_contents", &prompt, Some(TOC_SYSTEM_PROMPT))
            .await
            .map_err(|e| toc_error(e.to_string()))?;
        let toc = TableOfContents::parse(&raw).map_err(|e| toc_error(e.to_string()))?;
        if toc.toc.is_empty() {
            return Err(toc_error("no sections planned".to_string()));
        }

        tracing::info!(report_key, title = %toc.title, sections = toc.toc.len(), "Table of contents ready");
        self.events
            .emit(
                EventType::TaskCompleted,
                CrewType::Planning,
                &job_id,
                json!({ "title": toc.title, "toc": toc.toc }),
            )
            .await;

        state.report_sections.insert(report_key.to_string(), toc.toc);
        Ok(())
    }

    async fn slide_phase(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let forms = state
            .execution_plan
            .as_ref()
            .map(|p| p.slide_phase.forms.clone())
            .unwrap_or_default();

        for form in forms {
            let source = form
                .dependencies
                .iter()
                .find_map(|dep| state.report_contents.get(dep).filter(|text| !text.trim().is_empty()));
            if source.is_none() {
                tracing::debug!(key = %form.key, "No report for slide, using prior context");
            }
            let content = source.unwrap_or(&state.previous_outputs).clone();

            let job_id = format!("deep-research_generate_slides_{}", form.key);
            self.events
                .emit(
                    EventType::TaskStarted,
                    CrewType::Slide,
                    &job_id,
                    json!({ "role": "Presentation designer", "name": form.key, "goal": "Build slides" }),
                )
                .await;

            let prompt = build_slide_prompt(
                &content,
                &state.user_info,
                &state.previous_outputs,
                &state.previous_feedback,
            );
            let slides = self
                .complete("slides", &prompt, None)
                .await
                .map_err(|source| PipelineError::Slide {
                    key: form.key.clone(),
                    source,
                })?;

            self.events
                .emit(
                    EventType::TaskCompleted,
                    CrewType::Slide,
                    &job_id,
                    json!({ form.key.as_str(): slides }),
                )
                .await;
            state.slide_contents.insert(form.key, slides);
        }

        Ok(())
    }

    async fn text_phase(&self, state: &mut PipelineState) -> Result<(), PipelineError> {
        let keys: Vec<String> = state
            .execution_plan
            .as_ref()
            .map(|p| p.text_phase.forms.iter().map(|f| f.key.clone()).collect())
            .unwrap_or_default();
        let forms = state.matching_form_types(keys.iter().map(String::as_str));

        self.events
            .emit(
                EventType::TaskStarted,
                CrewType::Text,
                TEXT_JOB_ID,
                json!({ "role": "Form writer", "name": keys, "goal": "Fill in the text fields" }),
            )
            .await;

        if forms.is_empty() {
            tracing::info!("No text forms match the form definition");
            self.events
                .emit(EventType::TaskCompleted, CrewType::Text, TEXT_JOB_ID, json!({}))
                .await;
            return Ok(());
        }

        let content = if state.report_contents.is_empty() {
            state.previous_outputs.clone()
        } else {
            state
                .report_contents
                .values()
                .cloned()
                .collect::<Vec<_>>()
                .join(&self.separator)
        };

        let prompt = build_text_form_prompt(
            &content,
            &state.topic,
            &forms,
            &state.user_info,
            &state.previous_outputs,
            &state.previous_feedback,
            &state.form_html,
        );
        let raw = self
            .complete("text_forms", &prompt, None)
            .await
            .map_err(PipelineError::Text)?;

        let texts = parse_text_response(&raw);
        self.events
            .emit(
                EventType::TaskCompleted,
                CrewType::Text,
                TEXT_JOB_ID,
                Value::Object(texts.clone()),
            )
            .await;

        state.text_contents.extend(texts);
        Ok(())
    }

    async fn save_phase(&self, state: &PipelineState) -> Result<(), PipelineError> {
        let merged = state.merged_results();
        if merged.is_empty() {
            tracing::info!("Nothing to save");
            return Ok(());
        }

        let payload = form_payload(&state.proc_form_id, Value::Object(merged));
        let todo_id = state.todo_id;
        self.retry
            .run("save_final", || self.store.save_result(todo_id, &payload, true))
            .await?;

        tracing::info!(todo_id = %todo_id, "Final result saved");
        Ok(())
    }
}

/// Interprets the batched text response.
///
/// A JSON object becomes the key/value map. Anything else is stored whole
/// under [`TEXT_FALLBACK_KEY`].
pub fn parse_text_response(raw: &str) -> Map<String, Value> {
    let fallback = match parse_json_response::<Value>(raw) {
        Ok(Value::Object(map)) => return map,
        Ok(_) => clean_json_response(raw),
        Err(_) => raw.to_string(),
    };

    let mut map = Map::new();
    map.insert(TEXT_FALLBACK_KEY.to_string(), Value::String(fallback));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FormSpec, Phase};

    #[test]
    fn test_phase_order() {
        let names: Vec<&str> = PHASES.iter().map(PhaseKind::as_str).collect();
        assert_eq!(names, vec!["plan", "report", "slide", "text", "save"]);
    }

    #[test]
    fn test_skip_predicates() {
        let mut state = PipelineState::default();
        assert!(!PhaseKind::Plan.should_skip(&state));
        assert!(PhaseKind::Report.should_skip(&state));
        assert!(!PhaseKind::Save.should_skip(&state));

        state.execution_plan = Some(ExecutionPlan {
            report_phase: Phase::new(vec![FormSpec::new("r1")]),
            slide_phase: Phase::default(),
            text_phase: Phase::new(vec![FormSpec::new("title")]),
        });
        assert!(!PhaseKind::Report.should_skip(&state));
        assert!(PhaseKind::Slide.should_skip(&state));
        assert!(!PhaseKind::Text.should_skip(&state));
    }

    #[test]
    fn test_parse_text_response_object() {
        let map = parse_text_response("```json\n{\"title\": \"Q3 plan\", \"owner\": \"ops\"}\n```");
        assert_eq!(map.get("title"), Some(&Value::String("Q3 plan".to_string())));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_parse_text_response_non_json() {
        let map = parse_text_response("Just a sentence.");
        assert_eq!(map.len(), 1);
        assert_eq!(
            map.get(TEXT_FALLBACK_KEY),
            Some(&Value::String("Just a sentence.".to_string()))
        );
    }

    #[test]
    fn test_parse_text_response_non_object_json() {
        let map = parse_text_response("```json\n[1, 2]\n```");
        assert_eq!(
            map.get(TEXT_FALLBACK_KEY),
            Some(&Value::String("[1, 2]".to_string()))
        );
    }
}
