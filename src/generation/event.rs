//! Closed streaming-event union and the single place where wire frames are
//! decoded. Upstream servers emit loosely-typed JSON frames with dotted
//! `type` tags; everything past this module sees only `StreamEvent`.

use serde::{Deserialize, Serialize};

use crate::models::Citation;

/// One result row from a completed web-search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Every event the executor can observe on a generation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental assistant text.
    TextDelta(String),
    /// A web-search call finished; carries its result rows.
    SearchResults(Vec<SearchHit>),
    /// A URL citation annotation attached to the output text.
    Citation(Citation),
    /// The parsed structured output for schema-bearing roles.
    Structured(serde_json::Value),
    /// End of stream.
    Completed,
}

/// Decode one wire frame into a `StreamEvent`. Frames we do not recognize
/// return `None` and are skipped; the tag vocabulary below is the complete
/// set the executor reacts to.
///
/// Substring matching on the `type` tag is deliberate: servers emit dotted
/// variants of the same tag ("response.output_text.delta",
/// "output_text.delta") and this is the only place that tolerance lives.
pub fn decode_frame(frame: &serde_json::Value) -> Option<StreamEvent> {
    let tag = frame.get("type").and_then(|t| t.as_str()).unwrap_or("");

    // Web-search completion first; its tag also contains "completed".
    if tag.contains("web_search_call") && tag.contains("completed") {
        let hits = frame
            .get("results")
            .and_then(|r| serde_json::from_value::<Vec<SearchHit>>(r.clone()).ok())
            .unwrap_or_default();
        return Some(StreamEvent::SearchResults(hits));
    }

    if tag.contains("annotation.added") {
        let ann = frame.get("annotation")?;
        if ann.get("type").and_then(|t| t.as_str()) != Some("url_citation") {
            return None;
        }
        return Some(StreamEvent::Citation(Citation {
            title: ann
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
            url: ann
                .get("url")
                .and_then(|u| u.as_str())
                .unwrap_or_default()
                .to_string(),
            relevance: ann
                .get("relevance")
                .and_then(|r| r.as_str())
                .map(str::to_string),
        }));
    }

    if tag.contains("output_json") || tag.contains("parsed") {
        let value = frame.get("parsed").or_else(|| frame.get("json"))?;
        return Some(StreamEvent::Structured(value.clone()));
    }

    // Completed message items carry their text as a content-part array
    // rather than a delta field.
    if tag.contains("message_output_item") || tag.contains("output_item") {
        let item = frame.get("item").or_else(|| frame.get("raw_item"))?;
        let parts = item.get("content").and_then(|c| c.as_array())?;
        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();
        if text.is_empty() {
            return None;
        }
        return Some(StreamEvent::TextDelta(text));
    }

    if tag.contains("delta") {
        let delta = frame.get("delta").and_then(|d| d.as_str())?;
        return Some(StreamEvent::TextDelta(delta.to_string()));
    }

    if tag.contains("response.completed") {
        return Some(StreamEvent::Completed);
    }

    None
}
