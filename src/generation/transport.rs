//! Transport seam for the generation service. The pipeline depends only on
//! `GenerationTransport`; `SseTransport` is the production implementation
//! speaking server-sent events over HTTP.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use serde::Serialize;

use super::event::{decode_frame, StreamEvent};
use super::GenerationError;

/// One generation call: role identity plus everything the server needs.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Role tag, used for logging and error attribution.
    pub role: &'static str,
    pub model: String,
    /// System instructions for the role.
    pub instructions: String,
    /// User prompt.
    pub prompt: String,
    /// Sampling temperature; `None` omits the parameter entirely.
    pub temperature: Option<f64>,
    /// Structured-output schema name, for schema-bearing roles.
    pub schema: Option<&'static str>,
    /// Whether the role may issue web-search tool calls.
    pub web_search: bool,
}

/// A stream of decoded generation events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, GenerationError>> + Send>>;

/// Opens a generation stream for a request. Implementations map their
/// protocol errors onto `GenerationError`; in particular an HTTP 400 whose
/// body rejects the temperature parameter must surface as
/// `GenerationError::UnsupportedTemperature` so the executor can fall back.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn open(&self, request: GenerationRequest) -> Result<EventStream, GenerationError>;
}

/// Request body for the streaming responses endpoint.
#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Serialize)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
}

/// HTTP SSE transport for an OpenAI-responses-style generation service.
pub struct SseTransport {
    base_url: String,
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GenerationError::Stream(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

/// Line-buffered SSE decode state threaded through the unfold below.
struct SseState {
    inner: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    buf: String,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

impl SseState {
    /// Split complete lines out of the buffer and decode `data:` payloads.
    fn drain_lines(&mut self) -> Result<(), GenerationError> {
        while let Some(pos) = self.buf.find('\n') {
            let line = self.buf[..pos].trim().to_string();
            self.buf.drain(..=pos);
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.pending.push_back(StreamEvent::Completed);
                self.done = true;
                continue;
            }
            let frame: serde_json::Value = serde_json::from_str(data)
                .map_err(|e| GenerationError::Stream(format!("bad SSE frame: {e}")))?;
            if let Some(event) = decode_frame(&frame) {
                self.pending.push_back(event);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationTransport for SseTransport {
    async fn open(&self, request: GenerationRequest) -> Result<EventStream, GenerationError> {
        let url = format!("{}/v1/responses", self.base_url);
        let body = ResponsesRequest {
            model: &request.model,
            instructions: &request.instructions,
            input: &request.prompt,
            stream: true,
            temperature: request.temperature,
            tools: if request.web_search {
                vec![ToolSpec { kind: "web_search" }]
            } else {
                Vec::new()
            },
            response_format: request.schema.map(|name| ResponseFormat {
                kind: "json_schema",
                name,
            }),
        };

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_connect() {
                GenerationError::Connect(self.base_url.clone())
            } else {
                GenerationError::Stream(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 400
                && body.contains("temperature")
                && body.contains("not supported")
            {
                return Err(GenerationError::UnsupportedTemperature);
            }
            return Err(GenerationError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(sse_event_stream(bytes))
    }
}

/// Turn a raw byte stream of SSE lines into decoded generation events.
fn sse_event_stream(bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> EventStream {
    let state = SseState {
        inner: bytes,
        buf: String::new(),
        pending: VecDeque::new(),
        done: false,
    };

    let stream = futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    state.buf.push_str(&String::from_utf8_lossy(&chunk));
                    if let Err(e) = state.drain_lines() {
                        state.done = true;
                        return Some((Err(e), state));
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(GenerationError::Stream(e.to_string())), state));
                }
                None => state.done = true,
            }
        }
    });

    Box::pin(stream)
}
