//! Per-job pipeline state and the worker payload that seeds it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::plan::{ExecutionPlan, FormType};
use crate::storage::Participant;
use crate::utils::{parse_json_response, JsonExtractionError};

/// One planned section of a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Display number, e.g. `"2"` or `"2.1"`. Planners emit numbers or strings.
    #[serde(default, deserialize_with = "number_or_string")]
    pub number: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subsections: Vec<Section>,
}

impl Section {
    pub fn new(number: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            title: title.into(),
            subsections: Vec::new(),
        }
    }
}

/// Table of contents returned by the TOC step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOfContents {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub toc: Vec<Section>,
}

impl TableOfContents {
    /// Parses a TOC response of the form `{"title": ..., "toc": [...]}`.
    pub fn parse(raw: &str) -> Result<Self, JsonExtractionError> {
        parse_json_response(raw)
    }
}

/// Serialized inputs handed from the supervisor to a worker process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerPayload {
    pub todo_id: Uuid,
    #[serde(default)]
    pub proc_inst_id: Option<String>,
    #[serde(default)]
    pub topic: String,
    /// Summary of prior completed outputs in the same process instance.
    #[serde(default)]
    pub previous_outputs: String,
    /// Summary of feedback on the current draft.
    #[serde(default)]
    pub previous_feedback: String,
    #[serde(default)]
    pub user_info: Vec<Participant>,
    #[serde(default)]
    pub form_types: Vec<FormType>,
    /// Target form id; results are stored under this key.
    #[serde(default)]
    pub proc_form_id: String,
    #[serde(default)]
    pub form_html: String,
}

/// Mutable state owned by the orchestrator for one job.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub todo_id: Uuid,
    pub proc_inst_id: Option<String>,
    pub proc_form_id: String,
    pub topic: String,
    pub previous_outputs: String,
    pub previous_feedback: String,
    pub user_info: Vec<Participant>,
    pub form_types: Vec<FormType>,
    pub form_html: String,

    pub execution_plan: Option<ExecutionPlan>,
    /// Report key -> sections in TOC order.
    pub report_sections: HashMap<String, Vec<Section>>,
    /// Report key -> section title -> generated text.
    pub section_contents: HashMap<String, HashMap<String, String>>,
    pub report_contents: BTreeMap<String, String>,
    pub slide_contents: BTreeMap<String, String>,
    pub text_contents: Map<String, Value>,
}

impl From<WorkerPayload> for PipelineState {
    fn from(payload: WorkerPayload) -> Self {
        Self {
            todo_id: payload.todo_id,
            proc_inst_id: payload.proc_inst_id,
            proc_form_id: payload.proc_form_id,
            topic: payload.topic,
            previous_outputs: payload.previous_outputs,
            previous_feedback: payload.previous_feedback,
            user_info: payload.user_info,
            form_types: payload.form_types,
            form_html: payload.form_html,
            ..Default::default()
        }
    }
}

impl PipelineState {
    /// Union of report, slide and text results. Later maps win on key clashes.
    pub fn merged_results(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for (key, content) in self.report_contents.iter().chain(self.slide_contents.iter()) {
            merged.insert(key.clone(), Value::String(content.clone()));
        }
        for (key, value) in &self.text_contents {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Form types whose key appears in `keys`, in form-definition order per key.
    pub fn matching_form_types<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<FormType> {
        keys.into_iter()
            .flat_map(|key| self.form_types.iter().filter(move |ft| ft.key == key))
            .cloned()
            .collect()
    }
}

/// Joins section texts in TOC order, skipping sections without content.
pub fn merge_sections(
    sections: &[Section],
    contents: &HashMap<String, String>,
    separator: &str,
) -> String {
    sections
        .iter()
        .filter_map(|section| contents.get(&section.title).map(String::as_str))
        .collect::<Vec<_>>()
        .join(separator)
}

fn number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sections(titles: &[&str]) -> Vec<Section> {
        titles
            .iter()
            .enumerate()
            .map(|(i, title)| Section::new((i + 1).to_string(), *title))
            .collect()
    }

    #[test]
    fn test_merge_follows_toc_order() {
        let toc = sections(&["A", "B", "C"]);
        let contents: HashMap<String, String> = [("C", "c"), ("A", "a"), ("B", "b")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        assert_eq!(merge_sections(&toc, &contents, " | "), "a | b | c");
    }

    #[test]
    fn test_merge_skips_incomplete_sections() {
        let toc = sections(&["A", "B", "C"]);
        let contents: HashMap<String, String> =
            [("C".to_string(), "c".to_string())].into_iter().collect();

        assert_eq!(merge_sections(&toc, &contents, "\n\n---\n\n"), "c");
        assert_eq!(merge_sections(&toc, &HashMap::new(), "-"), "");
    }

    #[test]
    fn test_toc_accepts_numeric_section_numbers() {
        let toc = TableOfContents::parse(
            r#"{"title": "Report", "toc": [
                {"number": 1, "title": "Intro", "subsections": [{"number": "1.1", "title": "Scope"}]},
                {"number": "2", "title": "Body"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(toc.toc.len(), 2);
        assert_eq!(toc.toc[0].number, "1");
        assert_eq!(toc.toc[0].subsections[0].title, "Scope");
        assert_eq!(toc.toc[1].number, "2");
    }

    #[test]
    fn test_payload_round_trips_through_state() {
        let payload: WorkerPayload = serde_json::from_value(json!({
            "todo_id": "5f0c1d3e-8f1a-4c2b-9a57-0c3c2d1e4f5a",
            "topic": "Quarterly review",
            "proc_form_id": "form-1",
            "form_types": [{"key": "summary", "type": "textarea", "text": ""}]
        }))
        .unwrap();

        let state = PipelineState::from(payload);
        assert_eq!(state.topic, "Quarterly review");
        assert_eq!(state.proc_form_id, "form-1");
        assert!(state.execution_plan.is_none());
        assert_eq!(state.matching_form_types(["summary", "missing"]).len(), 1);
    }

    #[test]
    fn test_merged_results_text_wins() {
        let mut state = PipelineState::default();
        state.report_contents.insert("r1".into(), "report".into());
        state.slide_contents.insert("s1".into(), "slides".into());
        state.text_contents.insert("r1".into(), json!("override"));
        state.text_contents.insert("t1".into(), json!(42));

        let merged = state.merged_results();
        assert_eq!(merged["r1"], "override");
        assert_eq!(merged["s1"], "slides");
        assert_eq!(merged["t1"], 42);
    }
}
