//! Generation-call executor: opens a stream for a role, collects text and
//! citations, and applies the retry policy.
//!
//! Retry policy:
//! - Up to 3 attempts with exponential backoff (0.5s base, doubling,
//!   capped at 4s).
//! - Each attempt owns fresh buffers; a failed attempt contributes nothing
//!   to the returned result.
//! - On `UnsupportedTemperature`, one immediate retry without the
//!   temperature parameter. If that retry fails, its error propagates
//!   without further attempts.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::StreamExt;
use serde::de::DeserializeOwned;

use crate::models::Citation;

use super::event::StreamEvent;
use super::roles::RoleSpec;
use super::transport::{GenerationRequest, GenerationTransport};
use super::GenerationError;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 4_000;

fn backoff_delay(attempt: u32) -> Duration {
    let ms = BACKOFF_BASE_MS.saturating_mul(1 << attempt);
    Duration::from_millis(ms.min(BACKOFF_CAP_MS))
}

/// Collected result of one successful generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// Concatenated text deltas, trimmed.
    pub text: String,
    /// URL-deduplicated citations in first-seen order.
    pub citations: Vec<Citation>,
    /// Structured output, when the role's schema produced one.
    pub structured: Option<serde_json::Value>,
    pub model: String,
}

/// Executes generation calls against a transport with the retry policy.
pub struct GenerationExecutor<T> {
    transport: T,
    model: String,
}

impl<T: GenerationTransport> GenerationExecutor<T> {
    pub fn new(transport: T, model: impl Into<String>) -> Self {
        Self {
            transport,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one generation call for `role`, retrying per the policy above.
    pub async fn execute(
        &self,
        role: &RoleSpec,
        prompt: &str,
    ) -> Result<GenerationResult, GenerationError> {
        let mut attempt: u32 = 0;
        loop {
            let request = role.request(self.model.clone(), prompt.to_string());
            match self.run_once(request).await {
                Ok(result) => return Ok(result),
                Err(GenerationError::UnsupportedTemperature) => {
                    tracing::info!(
                        role = role.name,
                        model = %self.model,
                        "model rejects temperature parameter, retrying without it"
                    );
                    let mut request = role.request(self.model.clone(), prompt.to_string());
                    request.temperature = None;
                    return self.run_once(request).await;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(e);
                    }
                    tracing::warn!(
                        role = role.name,
                        attempt,
                        error = %e,
                        "generation attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff_delay(attempt - 1)).await;
                }
            }
        }
    }

    /// Run one call for a schema-bearing role and parse its structured
    /// output into `S`.
    pub async fn execute_structured<S: DeserializeOwned>(
        &self,
        role: &RoleSpec,
        prompt: &str,
    ) -> Result<(S, GenerationResult), GenerationError> {
        let result = self.execute(role, prompt).await?;
        let Some(value) = result.structured.clone() else {
            return Err(GenerationError::MissingStructuredOutput(role.name));
        };
        let parsed = serde_json::from_value(value).map_err(|source| {
            GenerationError::SchemaParse {
                role: role.name,
                source,
            }
        })?;
        Ok((parsed, result))
    }

    /// One attempt: open the stream and consume it into fresh buffers.
    async fn run_once(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let model = request.model.clone();
        let mut stream = self.transport.open(request).await?;

        let mut text = String::new();
        let mut citations: Vec<Citation> = Vec::new();
        let mut seen_urls: HashSet<String> = HashSet::new();
        let mut structured = None;

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta(delta) => text.push_str(&delta),
                StreamEvent::SearchResults(hits) => {
                    for hit in hits {
                        push_citation(
                            &mut citations,
                            &mut seen_urls,
                            Citation {
                                title: hit.title,
                                url: hit.url,
                                relevance: hit.snippet,
                            },
                        );
                    }
                }
                StreamEvent::Citation(citation) => {
                    push_citation(&mut citations, &mut seen_urls, citation);
                }
                StreamEvent::Structured(value) => structured = Some(value),
                StreamEvent::Completed => break,
            }
        }

        Ok(GenerationResult {
            text: text.trim().to_string(),
            citations,
            structured,
            model,
        })
    }
}

/// First-seen-wins URL dedup; entries lacking a title or url are dropped.
fn push_citation(citations: &mut Vec<Citation>, seen: &mut HashSet<String>, citation: Citation) {
    if citation.title.is_empty() || citation.url.is_empty() {
        return;
    }
    if seen.insert(citation.url.clone()) {
        citations.push(citation);
    }
}
