//! Clinical decision support for uncomplicated urinary tract infections.
//!
//! The deterministic rule engine in [`triage`] decides whether antibiotics
//! are indicated and picks a first-line regimen from a fixed table. The
//! [`pipeline`] then layers generated clinical reasoning, an independent
//! safety screen, evidence research, and a regimen cross-check on top,
//! stopping at hard gates that escalate to a human. Generated content never
//! overrides a deterministic exclusion.
//!
//! Generation calls go through the [`generation::GenerationTransport`] seam;
//! production uses the SSE transport, tests use scripted transports.
//!
//! ```no_run
//! use uticare::config::PipelineConfig;
//! use uticare::generation::{GenerationExecutor, SseTransport};
//! use uticare::pipeline::AssessmentPipeline;
//!
//! # async fn run(patient: uticare::models::PatientState) -> Result<(), Box<dyn std::error::Error>> {
//! let transport = SseTransport::new("http://localhost:8080", 300)?;
//! let executor = GenerationExecutor::new(transport, "gpt-4.1");
//! let pipeline = AssessmentPipeline::new(executor, PipelineConfig::default());
//! let result = pipeline.run_complete_assessment(patient).await?;
//! println!("{}", result.consensus_recommendation);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod generation;
pub mod models;
pub mod pipeline;
pub mod triage;

pub use config::PipelineConfig;
pub use models::{AssessmentOutput, ConsolidatedResult, PatientState};
pub use pipeline::{run_triage_only, AssessmentPipeline, PipelineError};
