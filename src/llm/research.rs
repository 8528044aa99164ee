//! Streamed research over the OpenAI-compatible Responses API.
//!
//! The research model streams server-sent events. Only three kinds matter to
//! the pipeline: a tool call starting, a tool call finishing, and a chunk of
//! report text. Everything else is dropped at decode time.

use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::LlmError;

/// Stream of research events produced by one section request.
pub type ResearchStream = BoxStream<'static, Result<ResearchEvent, LlmError>>;

/// One event of interest from a research stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResearchEvent {
    /// The model started a tool call (e.g. a web search).
    ToolStarted { tool_name: String },
    /// A tool call finished; `info` describes what it did.
    ToolFinished { tool_name: String, info: String },
    /// A chunk of the report body.
    TextDelta(String),
}

/// Request body for a streamed research call.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchRequest {
    pub model: String,
    pub input: Vec<ResearchInput>,
    pub tools: Vec<Value>,
    pub stream: bool,
    pub reasoning: Value,
}

/// One input message for the Responses API.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchInput {
    pub role: String,
    pub content: Vec<Value>,
}

impl ResearchInput {
    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: vec![json!({ "type": "input_text", "text": text.into() })],
        }
    }
}

impl ResearchRequest {
    /// Builds a streaming request with web search enabled.
    pub fn new(model: impl Into<String>, system_prompt: &str, prompt: &str) -> Self {
        Self {
            model: model.into(),
            input: vec![
                ResearchInput::text("system", system_prompt),
                ResearchInput::text("user", prompt),
            ],
            tools: vec![json!({ "type": "web_search_preview" })],
            stream: true,
            reasoning: json!({ "summary": "auto" }),
        }
    }
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Bytes may be split anywhere, including inside a UTF-8 sequence, so the
/// decoder buffers raw bytes and only decodes complete lines.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the data payloads of every completed event.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("data:") {
                self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
        }

        events
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest: Vec<u8> = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest);
            if let Some(data) = rest.trim_end().strip_prefix("data:") {
                self.data.push(data.trim_start().to_string());
            }
        }

        if self.data.is_empty() {
            None
        } else {
            let event = self.data.join("\n");
            self.data.clear();
            Some(event)
        }
    }
}

/// Maps one decoded Responses API event onto a [`ResearchEvent`].
///
/// Returns `Ok(None)` for events the pipeline does not consume and an error
/// for `error` / `response.failed` events.
pub fn decode_event(payload: &str) -> Result<Option<ResearchEvent>, LlmError> {
    if payload == "[DONE]" {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(payload)
        .map_err(|e| LlmError::ParseError(format!("invalid stream event: {}", e)))?;
    let event_type = value.get("type").and_then(Value::as_str).unwrap_or_default();

    match event_type {
        "response.output_text.delta" => {
            let delta = value.get("delta").and_then(Value::as_str).unwrap_or_default();
            Ok(Some(ResearchEvent::TextDelta(delta.to_string())))
        }
        "response.output_item.added" => Ok(tool_item_type(&value).map(|tool_name| {
            ResearchEvent::ToolStarted { tool_name }
        })),
        "response.output_item.done" => Ok(tool_item_type(&value).map(|tool_name| {
            let action = value.pointer("/item/action").cloned().unwrap_or(Value::Null);
            ResearchEvent::ToolFinished {
                tool_name,
                info: describe_action(&action),
            }
        })),
        "error" | "response.failed" => {
            let message = value
                .pointer("/error/message")
                .or_else(|| value.pointer("/response/error/message"))
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown stream error");
            Err(LlmError::Stream(message.to_string()))
        }
        _ => Ok(None),
    }
}

fn tool_item_type(value: &Value) -> Option<String> {
    value
        .pointer("/item/type")
        .and_then(Value::as_str)
        .filter(|kind| kind.ends_with("_call"))
        .map(str::to_string)
}

/// Human-readable summary of a tool call action.
fn describe_action(action: &Value) -> String {
    let action_type = action.get("type").and_then(Value::as_str).unwrap_or_default();
    let field = |name: &str| {
        action
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match action_type {
        "search" | "search:web_search_preview" => format!("search: {}", field("query")),
        "open_page" => format!("open: {}", field("url")),
        "find_in_page" => format!("find: {}", field("url")),
        _ => action.to_string(),
    }
}
