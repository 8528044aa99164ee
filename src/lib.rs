//! draft_forge: job poller, worker supervisor and content pipeline.
//!
//! A poller leases content-generation tasks from a shared PostgreSQL table,
//! runs each in an isolated worker process, and the worker drives a phased
//! pipeline (plan, reports, slides, texts, save) against an LLM.

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod scheduler;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError};
pub use error::LlmError;
pub use retry::RetryPolicy;
