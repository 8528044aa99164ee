//! Narrow generation interface consumed by the pipeline and the supervisor.
//!
//! The pipeline never builds chat requests itself; it hands a prompt to a
//! [`GenerationGateway`] and gets text (or a research event stream) back.
//! Tests substitute scripted gateways.

use std::sync::Arc;

use async_trait::async_trait;

use super::litellm::{GenerationRequest, LlmProvider, Message};
use super::research::{ResearchRequest, ResearchStream};
use crate::error::LlmError;

/// Temperature used for every completion.
pub const DEFAULT_TEMPERATURE: f64 = 0.1;

/// System prompt for streamed section research.
const RESEARCH_SYSTEM_PROMPT: &str = "You are a professional research expert who creates \
high-quality, comprehensive reports. Thoroughly analyze the previous context (requirements, \
feedback, prior content) and keep its logical flow. When feedback is present, prioritize it. \
Use web search sparingly, only for recent trends, statistics or regulations. Produce a complete \
section even when tool results are thin, and give each section value of its own while keeping \
the report coherent.";

/// Stateless text generation.
#[async_trait]
pub trait GenerationGateway: Send + Sync {
    /// Single completion for `prompt`, optionally under a system prompt.
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>)
        -> Result<String, LlmError>;

    /// Streamed research for one section. The stream is finite and cannot
    /// be restarted.
    async fn stream_research(&self, prompt: &str) -> Result<ResearchStream, LlmError>;
}

/// [`GenerationGateway`] backed by an [`LlmProvider`].
#[derive(Clone)]
pub struct LlmGateway {
    provider: Arc<dyn LlmProvider>,
    model: String,
    research_model: String,
    temperature: f64,
}

impl LlmGateway {
    /// Creates a gateway that completes with `model` and researches with `research_model`.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        research_model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            research_model: research_model.into(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

#[async_trait]
impl GenerationGateway for LlmGateway {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));

        let request =
            GenerationRequest::new(self.model.clone(), messages).with_temperature(self.temperature);
        let response = self.provider.generate(request).await?;

        let content = response
            .first_content()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        tracing::debug!(
            model = %self.model,
            chars = content.len(),
            "Completion received"
        );
        Ok(content)
    }

    async fn stream_research(&self, prompt: &str) -> Result<ResearchStream, LlmError> {
        let request = ResearchRequest::new(self.research_model.clone(), RESEARCH_SYSTEM_PROMPT, prompt);
        self.provider.stream_research(request).await
    }
}
