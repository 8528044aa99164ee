//! Worker process entrypoint.
//!
//! A worker consumes one [`WorkerPayload`], runs the pipeline against the
//! production gateways and reports success only through its exit code.

use std::io::Read;
use std::sync::Arc;

use thiserror::Error;

use super::orchestrator::{PipelineError, PipelineOrchestrator};
use super::state::{PipelineState, WorkerPayload};
use crate::config::AppConfig;
use crate::error::LlmError;
use crate::events::EventLogger;
use crate::llm::{LiteLlmClient, LlmGateway};
use crate::storage::{Database, DatabaseError};

/// Errors that make a worker exit non-zero.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid worker payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Failed to read worker payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Parses a payload from `--inputs`, or from stdin when absent.
pub fn read_payload(inputs: Option<&str>) -> Result<WorkerPayload, WorkerError> {
    match inputs {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            Ok(serde_json::from_str(&raw)?)
        }
    }
}

/// Runs the full pipeline for one payload.
pub async fn run_worker(config: &AppConfig, payload: WorkerPayload) -> Result<PipelineState, WorkerError> {
    tracing::info!(todo_id = %payload.todo_id, topic = %payload.topic, "Worker started");

    let db = Arc::new(Database::connect(&config.database_url).await?);
    let client = Arc::new(LiteLlmClient::from_config(config)?);
    let gateway = Arc::new(LlmGateway::new(
        client,
        config.default_model.clone(),
        config.research_model.clone(),
    ));
    let events = EventLogger::new(
        db.clone(),
        payload.todo_id.to_string(),
        payload.proc_inst_id.clone(),
    );

    let orchestrator = PipelineOrchestrator::new(
        gateway,
        db,
        events,
        config.retry_policy(),
        config.section_separator.clone(),
    );

    Ok(orchestrator.run(PipelineState::from(payload)).await?)
}
