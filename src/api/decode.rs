// Record decoding and normalization into canonical stream events

use serde::Deserialize;
use tracing::{trace, warn};

use crate::events::StreamEvent;
use crate::models::Reference;

/// A payload frame as the server sends it. Every field is optional because the
/// record shape varies per event; `normalize` decides what it means.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub citations: Option<Vec<u32>>,
    #[serde(default)]
    pub is_complete: Option<bool>,
    #[serde(default)]
    pub references: Option<Vec<Reference>>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub follow_up_questions: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireRecord {
    fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|text| !text.is_empty())
    }

    fn completed(&self) -> bool {
        self.is_complete.unwrap_or(false)
    }
}

/// Parse one marker-stripped payload. Malformed payloads are logged and dropped.
pub fn decode_frame(payload: &str) -> Option<WireRecord> {
    let payload = payload.trim();
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str::<WireRecord>(payload) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, frame = %payload, "Dropping malformed frame");
            None
        }
    }
}

/// Map a decoded record onto the canonical vocabulary. First match wins:
///
/// 1. `thinking_progress` tag
/// 2. `thinking_complete` tag
/// 3. `references_loaded` tag
/// 4. `content_start` tag
/// 5. `cited_content` tag with non-empty text
/// 6. non-empty text on a record not marked complete
/// 7. record marked complete
/// 8. record carrying an error
/// 9. anything else yields no event
pub fn normalize(record: WireRecord) -> Option<StreamEvent> {
    match record.kind.as_deref() {
        Some("thinking_progress") => {
            return Some(StreamEvent::ThinkingProgress {
                label: record.step.unwrap_or_default(),
            });
        }
        Some("thinking_complete") => return Some(StreamEvent::ThinkingComplete),
        Some("references_loaded") => {
            let references = record.references.unwrap_or_default();
            let count = record.count.unwrap_or(references.len());
            return Some(StreamEvent::ReferencesLoaded { references, count });
        }
        Some("content_start") => return Some(StreamEvent::ContentStart),
        Some("cited_content") if record.text().is_some() => {
            return Some(StreamEvent::CitedContent {
                text: record.content.unwrap_or_default(),
                citations: citation_set(record.citations.unwrap_or_default()),
            });
        }
        _ => {}
    }

    if record.text().is_some() && !record.completed() {
        let citations = record
            .citations
            .map(citation_set)
            .filter(|ids| !ids.is_empty());
        return Some(StreamEvent::PlainContent {
            text: record.content.unwrap_or_default(),
            citations,
        });
    }

    if record.completed() {
        return Some(StreamEvent::Complete {
            references: record.references.unwrap_or_default(),
            follow_up_questions: record.follow_up_questions.unwrap_or_default(),
        });
    }

    if let Some(message) = record.error {
        return Some(StreamEvent::ErrorEvent { message });
    }

    trace!(kind = ?record.kind, "Record matched no rule");
    None
}

/// Ordered set of distinct positive ids, first occurrence kept.
pub fn citation_set(ids: Vec<u32>) -> Vec<u32> {
    let mut set = Vec::with_capacity(ids.len());
    for id in ids {
        if id > 0 && !set.contains(&id) {
            set.push(id);
        }
    }
    set
}
