//! Content-generation pipeline run inside a worker process.
//!
//! # Architecture
//!
//! - **Plan**: `ExecutionPlan` assigns form fields to report, slide and text phases
//! - **State**: `PipelineState` accumulates every phase's output for one job
//! - **Sections**: `SectionExecutor` researches a report's sections concurrently
//!   and checkpoints partial reports in TOC order
//! - **Orchestrator**: `PipelineOrchestrator` drives the fixed phase table
//! - **Worker**: process entrypoint wiring the production gateways
//!
//! # Pipeline Flow
//!
//! 1. **PLAN**: one completion produces the execution plan
//! 2. **REPORT**: per report key, a table of contents, then concurrent sections
//! 3. **SLIDE**: slides from a dependent report or the prior-context summary
//! 4. **TEXT**: one batched completion fills every text field
//! 5. **SAVE**: the merged results are persisted as the final output
//!
//! # Example
//!
//! ```rust,ignore
//! use draft_forge::pipeline::{PipelineOrchestrator, PipelineState, WorkerPayload};
//!
//! let orchestrator = PipelineOrchestrator::new(gateway, store, events, retry, "\n\n---\n\n");
//! let state = orchestrator.run(PipelineState::from(payload)).await?;
//! println!("{} reports", state.report_contents.len());
//! ```

pub mod orchestrator;
pub mod plan;
pub mod sections;
pub mod state;
pub mod worker;

// Re-export main types for convenience
pub use orchestrator::{
    parse_text_response, PhaseKind, PipelineError, PipelineOrchestrator, PHASES, TEXT_FALLBACK_KEY,
};
pub use plan::{ExecutionPlan, FormSpec, FormType, Phase};
pub use sections::{failure_placeholder, SectionExecutor, SECTION_FAILURE_PREFIX};
pub use state::{merge_sections, PipelineState, Section, TableOfContents, WorkerPayload};
pub use worker::{read_payload, run_worker, WorkerError};
