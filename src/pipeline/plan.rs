//! Execution plan produced by the planning step.
//!
//! The plan lists, per phase, the form fields to produce. Report forms are
//! researched section by section; slide and text forms may depend on a
//! report key and then consume that report's text.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::utils::{parse_json_response, JsonExtractionError};

/// One output target within a phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSpec {
    /// Form field key the output is stored under.
    pub key: String,
    /// Report keys this form reads from.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dependencies: Vec<String>,
    /// Any other attributes the planner attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FormSpec {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// Ordered forms of one phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub forms: Vec<FormSpec>,
}

impl Phase {
    pub fn new(forms: Vec<FormSpec>) -> Self {
        Self { forms }
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

/// Report, slide and text phases, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub report_phase: Phase,
    #[serde(default)]
    pub slide_phase: Phase,
    #[serde(default)]
    pub text_phase: Phase,
}

#[derive(Deserialize)]
struct PlanEnvelope {
    #[serde(default)]
    execution_plan: Option<ExecutionPlan>,
}

impl ExecutionPlan {
    /// Parses a planner response of the form `{"execution_plan": {...}}`.
    ///
    /// A response without the `execution_plan` key yields an empty plan.
    pub fn parse(raw: &str) -> Result<Self, JsonExtractionError> {
        let envelope: PlanEnvelope = parse_json_response(raw)?;
        Ok(envelope.execution_plan.unwrap_or_default())
    }

    /// Total number of forms across all phases.
    pub fn form_count(&self) -> usize {
        self.report_phase.forms.len() + self.slide_phase.forms.len() + self.text_phase.forms.len()
    }
}

/// A field definition of the target form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormType {
    #[serde(default)]
    pub key: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FormType {
    /// Fallback definition used when a form has no field metadata.
    pub fn default_for(form_id: &str) -> Self {
        Self {
            key: form_id.to_string(),
            field_type: "default".to_string(),
            text: String::new(),
            extra: Map::new(),
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_plan() {
        let raw = r#"```json
{"execution_plan": {
  "report_phase": {"forms": [{"key": "r1", "dependencies": null}]},
  "slide_phase": {"forms": [{"key": "s1", "dependencies": ["r1"], "note": "deck"}]},
  "text_phase": {"forms": [{"key": "t1"}]}
}}
```"#;
        let plan = ExecutionPlan::parse(raw).unwrap();

        assert_eq!(plan.report_phase.forms, vec![FormSpec::new("r1")]);
        assert_eq!(plan.slide_phase.forms[0].dependencies, vec!["r1".to_string()]);
        assert_eq!(plan.slide_phase.forms[0].extra["note"], "deck");
        assert_eq!(plan.text_phase.forms[0].key, "t1");
        assert_eq!(plan.form_count(), 3);
    }

    #[test]
    fn test_missing_phases_default_to_empty() {
        let plan = ExecutionPlan::parse(r#"{"execution_plan": {"text_phase": {"forms": []}}}"#)
            .unwrap();
        assert!(plan.report_phase.is_empty());
        assert!(plan.slide_phase.is_empty());
        assert_eq!(plan.form_count(), 0);
    }

    #[test]
    fn test_missing_envelope_is_empty_plan() {
        let plan = ExecutionPlan::parse("{}").unwrap();
        assert_eq!(plan, ExecutionPlan::default());
    }

    #[test]
    fn test_non_json_plan_is_error() {
        assert!(ExecutionPlan::parse("I could not build a plan").is_err());
    }

    #[test]
    fn test_form_type_keeps_extra_fields() {
        let form: FormType = serde_json::from_str(
            r#"{"key": "summary", "type": "textarea", "text": "Summary", "required": true}"#,
        )
        .unwrap();
        assert_eq!(form.field_type, "textarea");
        assert_eq!(form.extra["required"], true);

        let fallback = FormType::default_for("form-1");
        let value = serde_json::to_value(&fallback).unwrap();
        assert_eq!(value["type"], "default");
        assert_eq!(value["key"], "form-1");
    }
}
