//! Prompt templates for each pipeline step.
//!
//! Templates use `{placeholder}` markers filled with [`str::replace`]. Every
//! builder takes the already-summarized context; none of them call a model.

use serde::Serialize;

use crate::pipeline::{FormType, Section};
use crate::storage::Participant;

/// Planner prompt: decide which form fields become reports, slides or text.
const EXECUTION_PLAN_PROMPT: &str = r#"
You are planning how to fill in a business form with generated content.

Form fields:
{form_types}

Participants:
{user_info}

Assign every form field to exactly one phase:
- report_phase: long, researched documents (field type "report" or long free-form text)
- slide_phase: presentation decks (field type "slide"); list the report keys they build on in "dependencies"
- text_phase: short values (titles, summaries, dates, selections); list report keys they build on in "dependencies"

Use the field "key" values exactly as given. Leave a phase's "forms" empty when nothing belongs to it.

Respond with JSON only:
{
  "execution_plan": {
    "report_phase": {"forms": [{"key": "<field key>"}]},
    "slide_phase": {"forms": [{"key": "<field key>", "dependencies": ["<report key>"]}]},
    "text_phase": {"forms": [{"key": "<field key>", "dependencies": ["<report key>"]}]}
  }
}
"#;

/// System prompt for table-of-contents design.
pub const TOC_SYSTEM_PROMPT: &str = "You are an expert in designing report structures. \
Build logical, reader-friendly tables of contents with a clear introduction, body and \
conclusion, tailored to the context you are given.";

/// TOC prompt: plan the sections of one report.
const TOC_PROMPT: &str = r#"
Design the table of contents for a report.

Summary of previous outputs:
{previous_outputs}

Summary of feedback (highest priority when present):
{previous_feedback}

Participants:
{user_info}

Produce 4 to 8 top-level sections. Subsections are optional. Section titles must be unique.

Respond with JSON only:
{
  "title": "<report title>",
  "toc": [
    {"number": 1, "title": "<section title>", "subsections": [{"number": "1.1", "title": "<subsection title>"}]}
  ]
}
"#;

/// Section prompt: research and write one section.
const SECTION_PROMPT: &str = r#"
As a domain expert, write the report section "{title}".

Section number: {number}
Section title: {title}{subsections}

Topic: {topic}

Summary of previous outputs:
{previous_outputs}

Summary of feedback:
{previous_feedback}

Guidelines:
1. Work out the role of this section in the whole report (introduction, analysis, application, conclusion) and write for that role.
2. Apply the feedback first when it is present; keep continuity with the previous outputs.
3. Go deep: concrete examples, data and sources. Do not repeat what other sections cover.
4. Use web search only for recent facts (trends, statistics, regulations), at most 5 times.
5. Format as markdown with ##/###/#### headings, lists and tables where useful, and cite sources.
"#;

/// Slide prompt: turn report text (or prior context) into a slide deck.
const SLIDE_PROMPT: &str = r###"
Create a presentation deck from the content below.

Content:
{content}

Participants:
{user_info}

Summary of previous outputs:
{previous_outputs}

Summary of feedback:
{previous_feedback}

Write markdown slides separated by lines containing only "---". Start each slide with a "## " title,
keep bullets short, and finish with a summary slide.
"###;

/// Text prompt: fill every short text field in one call.
const TEXT_FORM_PROMPT: &str = r#"
Fill in the form fields below.

Topic: {topic}

Source content:
{content}

Fields to fill:
{forms}

Form layout (HTML):
{form_html}

Participants:
{user_info}

Summary of previous outputs:
{previous_outputs}

Summary of feedback:
{previous_feedback}

Respond with a single JSON object mapping each field "key" to its value and nothing else.
"#;

/// System prompt for summarizing prior outputs.
pub const OUTPUT_SUMMARY_SYSTEM_PROMPT: &str = "You organize previous work results accurately. \
Keep short content verbatim, summarize only long passages, never change meaning, and always \
keep objective facts such as numbers, dates, names and headings.";

/// Output summary prompt.
const OUTPUT_SUMMARY_PROMPT: &str = r#"
Summarize the previous work results below so the next worker can continue from them.

Previous results:
{outputs}
"#;

/// System prompt for consolidating feedback.
pub const FEEDBACK_SUMMARY_SYSTEM_PROMPT: &str = "You analyze and consolidate feedback. \
Prioritize the most recent feedback, identify the real intent behind it, and turn it into \
concrete, actionable instructions for the next worker.";

/// Feedback summary prompt.
const FEEDBACK_SUMMARY_PROMPT: &str = r#"
Consolidate the feedback below into one set of instructions for revising the current draft.

Feedback:
{feedback}

Current draft:
{content}
"#;

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_string())
}

/// Builds the planner prompt.
pub fn build_execution_plan_prompt(form_types: &[FormType], user_info: &[Participant]) -> String {
    EXECUTION_PLAN_PROMPT
        .replace("{form_types}", &to_pretty_json(form_types))
        .replace("{user_info}", &to_pretty_json(user_info))
}

/// Builds the TOC prompt.
pub fn build_toc_prompt(
    previous_outputs: &str,
    previous_feedback: &str,
    user_info: &[Participant],
) -> String {
    TOC_PROMPT
        .replace("{previous_outputs}", previous_outputs)
        .replace("{previous_feedback}", previous_feedback)
        .replace("{user_info}", &to_pretty_json(user_info))
}

/// Builds the research prompt for one section.
pub fn build_section_prompt(
    section: &Section,
    topic: &str,
    previous_outputs: &str,
    previous_feedback: &str,
) -> String {
    let subsections = if section.subsections.is_empty() {
        String::new()
    } else {
        let lines: Vec<String> = section
            .subsections
            .iter()
            .map(|sub| format!("- {}. {}", sub.number, sub.title))
            .collect();
        format!("\n\nSubsections:\n{}", lines.join("\n"))
    };

    SECTION_PROMPT
        .replace("{subsections}", &subsections)
        .replace("{number}", &section.number)
        .replace("{title}", &section.title)
        .replace("{topic}", topic)
        .replace("{previous_outputs}", previous_outputs)
        .replace("{previous_feedback}", previous_feedback)
        .trim()
        .to_string()
}

/// Builds the slide prompt.
pub fn build_slide_prompt(
    content: &str,
    user_info: &[Participant],
    previous_outputs: &str,
    previous_feedback: &str,
) -> String {
    SLIDE_PROMPT
        .replace("{user_info}", &to_pretty_json(user_info))
        .replace("{previous_outputs}", previous_outputs)
        .replace("{previous_feedback}", previous_feedback)
        .replace("{content}", content)
}

/// Builds the batched text-form prompt.
#[allow(clippy::too_many_arguments)]
pub fn build_text_form_prompt(
    content: &str,
    topic: &str,
    forms: &[FormType],
    user_info: &[Participant],
    previous_outputs: &str,
    previous_feedback: &str,
    form_html: &str,
) -> String {
    TEXT_FORM_PROMPT
        .replace("{topic}", topic)
        .replace("{forms}", &to_pretty_json(forms))
        .replace("{form_html}", form_html)
        .replace("{user_info}", &to_pretty_json(user_info))
        .replace("{previous_outputs}", previous_outputs)
        .replace("{previous_feedback}", previous_feedback)
        .replace("{content}", content)
}

/// Builds the prior-output summary prompt.
pub fn build_output_summary_prompt(outputs: &str) -> String {
    OUTPUT_SUMMARY_PROMPT.replace("{outputs}", outputs)
}

/// Builds the feedback summary prompt.
pub fn build_feedback_summary_prompt(feedback: &str, content: &str) -> String {
    FEEDBACK_SUMMARY_PROMPT
        .replace("{feedback}", feedback)
        .replace("{content}", content)
}
