//! LLM integration for draft-forge.
//!
//! - [`LiteLlmClient`]: OpenAI-compatible HTTP client (completions and
//!   streamed research)
//! - [`GenerationGateway`]: the narrow interface the pipeline consumes
//! - [`ResearchEvent`]: typed events decoded from a research stream
//!
//! ```ignore
//! use draft_forge::llm::{GenerationGateway, LiteLlmClient, LlmGateway};
//! use std::sync::Arc;
//!
//! let client = Arc::new(LiteLlmClient::from_config(&config)?);
//! let gateway = LlmGateway::new(client, "gpt-4o-mini", "o3-deep-research");
//! let plan = gateway.complete(&prompt, None).await?;
//! ```

pub mod gateway;
pub mod litellm;
pub mod research;

pub use gateway::{GenerationGateway, LlmGateway, DEFAULT_TEMPERATURE};
pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message, Usage,
};
pub use research::{ResearchEvent, ResearchRequest, ResearchStream, SseDecoder};
