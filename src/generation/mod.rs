//! Generation-call layer: the transport seam, the streaming event union,
//! and the executor that turns a role + prompt into collected text,
//! deduplicated citations, and optional structured output.
//!
//! Nothing above this module touches raw wire frames. The executor consumes
//! only `StreamEvent` values; the pipeline consumes only typed results.

pub mod event;
pub mod executor;
pub mod prompts;
pub mod roles;
pub mod transport;

use thiserror::Error;

pub use event::{decode_frame, SearchHit, StreamEvent};
pub use executor::{GenerationExecutor, GenerationResult};
pub use roles::RoleSpec;
pub use transport::{EventStream, GenerationRequest, GenerationTransport, SseTransport};

/// Failures from the generation service or the streaming decode.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Cannot connect to generation service at {0}")]
    Connect(String),

    #[error("Generation service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Stream error: {0}")]
    Stream(String),

    /// The model rejected the sampling temperature parameter. Handled by
    /// the executor with a single no-temperature retry.
    #[error("Model does not support the temperature parameter")]
    UnsupportedTemperature,

    /// A role that declares a schema finished without a structured frame.
    #[error("Stream completed without structured output for role '{0}'")]
    MissingStructuredOutput(&'static str),

    #[error("Structured output for role '{role}' failed to parse: {source}")]
    SchemaParse {
        role: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
