//! Citation-annotated answer assembly.
//!
//! An [`Assembler`] owns one session's [`AnswerState`] and is the only thing that
//! mutates it. A segment is a run of prose terminated by a citation-bearing event,
//! or the uncited remainder flushed at completion.

mod completion;

use std::collections::BTreeSet;

use tracing::{debug, trace};

use crate::events::{SessionId, StreamEvent};
use crate::models::Reference;

/// A span of answer text and the citation ids supporting it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub citations: Vec<u32>,
}

impl Segment {
    pub fn new(text: impl Into<String>, citations: Vec<u32>) -> Self {
        Self {
            text: text.into(),
            citations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.citations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnswerStatus {
    #[default]
    Connecting,
    Streaming,
    Complete,
    Errored,
}

impl AnswerStatus {
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting",
            Self::Streaming => "Streaming",
            Self::Complete => "Complete",
            Self::Errored => "Error",
        }
    }
}

/// Everything a renderer needs, at any point of the stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerState {
    segments: Vec<Segment>,
    open: Segment,
    references: Vec<Reference>,
    follow_ups: Vec<String>,
    status: AnswerStatus,
    error_message: Option<String>,
    progress: Option<String>,
    announced_references: Option<usize>,
}

impl AnswerState {
    /// Closed segments, in arrival order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The segment still accumulating text
    pub const fn open_segment(&self) -> &Segment {
        &self.open
    }

    /// Closed segments followed by the open one when it has content.
    pub fn visible_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .chain(Some(&self.open).filter(|open| !open.is_empty()))
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn reference(&self, id: u32) -> Option<&Reference> {
        self.references.iter().find(|r| r.id == id)
    }

    pub fn follow_ups(&self) -> &[String] {
        &self.follow_ups
    }

    pub const fn status(&self) -> AnswerStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Latest progress label while the service is still preparing the answer
    pub fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    /// Reference count the service announced, or the number actually held
    pub fn reference_count(&self) -> usize {
        self.announced_references
            .unwrap_or(0)
            .max(self.references.len())
    }

    /// The whole answer as plain text, including the open segment.
    pub fn full_text(&self) -> String {
        self.visible_segments().map(|s| s.text.as_str()).collect()
    }

    /// Cited ids whose reference metadata has not arrived (yet).
    pub fn unresolved_citations(&self) -> Vec<u32> {
        let cited: BTreeSet<u32> = self
            .visible_segments()
            .flat_map(|s| s.citations.iter().copied())
            .collect();
        cited
            .into_iter()
            .filter(|id| self.reference(*id).is_none())
            .collect()
    }
}

/// Outcome of offering an event to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    /// Tagged with a superseded session
    Stale,
    /// The answer already reached a final status
    Frozen,
}

#[derive(Debug)]
pub struct Assembler {
    session: SessionId,
    state: AnswerState,
}

impl Assembler {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            state: AnswerState::default(),
        }
    }

    pub const fn session(&self) -> SessionId {
        self.session
    }

    pub const fn state(&self) -> &AnswerState {
        &self.state
    }

    pub fn apply(&mut self, session: SessionId, event: StreamEvent) -> Applied {
        if let Some(rejected) = self.admit(session) {
            trace!(session = %session, kind = event.kind(), ?rejected, "Event not applied");
            return rejected;
        }

        match event {
            StreamEvent::ThinkingProgress { label } => self.state.progress = Some(label),
            StreamEvent::ThinkingComplete => self.state.progress = None,
            StreamEvent::ReferencesLoaded { references, count } => {
                merge_references(&mut self.state.references, references);
                self.state.announced_references = Some(count);
            }
            StreamEvent::ContentStart => self.state.open = Segment::default(),
            StreamEvent::CitedContent { text, citations }
            | StreamEvent::PlainContent {
                text,
                citations: Some(citations),
            } => self.close_segment(&text, citations),
            StreamEvent::PlainContent {
                text,
                citations: None,
            } => self.state.open.text.push_str(&text),
            StreamEvent::Complete {
                references,
                follow_up_questions,
            } => self.complete(references, follow_up_questions),
            StreamEvent::ErrorEvent { message } => self.fail(message),
        }

        Applied::Accepted
    }

    /// The connection ended without a terminal event.
    pub fn close_stream(&mut self, session: SessionId) -> Applied {
        if let Some(rejected) = self.admit(session) {
            return rejected;
        }
        self.close_without_summary();
        Applied::Accepted
    }

    /// Session and freeze checks; moves Connecting to Streaming on the first
    /// accepted event.
    fn admit(&mut self, session: SessionId) -> Option<Applied> {
        if session != self.session {
            debug!(current = %self.session, stale = %session, "Discarding stale event");
            return Some(Applied::Stale);
        }
        if self.state.status.is_final() {
            return Some(Applied::Frozen);
        }
        if self.state.status == AnswerStatus::Connecting {
            self.state.status = AnswerStatus::Streaming;
        }
        None
    }

    fn close_segment(&mut self, text: &str, citations: Vec<u32>) {
        let mut accumulated = std::mem::take(&mut self.state.open).text;
        accumulated.push_str(text);
        let closed = Segment::new(accumulated, citations);
        trace!(index = self.state.segments.len(), citations = ?closed.citations, "Segment closed");
        self.state.segments.push(closed);
    }
}

/// Union by id. A later entry for a known id replaces it in place.
fn merge_references(existing: &mut Vec<Reference>, incoming: Vec<Reference>) {
    for reference in incoming {
        match existing.iter_mut().find(|r| r.id == reference.id) {
            Some(slot) => *slot = reference,
            None => existing.push(reference),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: SessionId = SessionId(1);

    fn plain(text: &str) -> StreamEvent {
        StreamEvent::PlainContent {
            text: text.to_string(),
            citations: None,
        }
    }

    fn cited(text: &str, citations: &[u32]) -> StreamEvent {
        StreamEvent::CitedContent {
            text: text.to_string(),
            citations: citations.to_vec(),
        }
    }

    fn complete(references: Vec<Reference>, follow_ups: &[&str]) -> StreamEvent {
        StreamEvent::Complete {
            references,
            follow_up_questions: follow_ups.iter().map(ToString::to_string).collect(),
        }
    }

    fn run(events: Vec<StreamEvent>) -> Assembler {
        let mut assembler = Assembler::new(S);
        for event in events {
            assembler.apply(S, event);
        }
        assembler
    }

    #[test]
    fn test_scenario_plain_cited_plain_complete() {
        let assembler = run(vec![
            StreamEvent::ContentStart,
            plain("A"),
            cited("B", &[1]),
            plain("C"),
            complete(vec![Reference::new(1, "Ref", "https://example.org/1")], &["Q1"]),
        ]);
        let state = assembler.state();

        assert_eq!(
            state.segments(),
            &[Segment::new("AB", vec![1]), Segment::new("C", vec![])]
        );
        assert_eq!(state.references().len(), 1);
        assert_eq!(state.references()[0].id, 1);
        assert_eq!(state.follow_ups(), &["Q1".to_string()]);
        assert_eq!(state.status(), AnswerStatus::Complete);
    }

    #[test]
    fn test_new_assembler_is_connecting() {
        let assembler = Assembler::new(S);
        assert_eq!(assembler.state().status(), AnswerStatus::Connecting);
        assert!(assembler.state().segments().is_empty());
    }

    #[test]
    fn test_first_event_moves_to_streaming() {
        let mut assembler = Assembler::new(S);
        assembler.apply(
            S,
            StreamEvent::ThinkingProgress {
                label: "Analyzing query".to_string(),
            },
        );
        assert_eq!(assembler.state().status(), AnswerStatus::Streaming);
        assert_eq!(assembler.state().progress(), Some("Analyzing query"));

        assembler.apply(S, StreamEvent::ThinkingComplete);
        assert_eq!(assembler.state().progress(), None);
    }

    #[test]
    fn test_text_is_conserved_across_segments() {
        let events = vec![
            StreamEvent::ContentStart,
            plain("Based on "),
            plain("current evidence, "),
            cited("antibiotics are debated.", &[1, 2]),
            plain(" Reviews show"),
            StreamEvent::PlainContent {
                text: " no benefit.".to_string(),
                citations: Some(vec![3]),
            },
            plain(" Guidelines differ."),
        ];
        let emitted: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::CitedContent { text, .. } | StreamEvent::PlainContent { text, .. } => {
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect();

        let mut assembler = run(events);
        assert_eq!(assembler.state().full_text(), emitted);

        assembler.apply(S, complete(Vec::new(), &[]));
        let joined: String = assembler
            .state()
            .segments()
            .iter()
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(joined, emitted);
        assert_eq!(assembler.state().segments().len(), 3);
    }

    #[test]
    fn test_each_citation_closes_exactly_one_segment() {
        let mut assembler = run(vec![StreamEvent::ContentStart, plain("x")]);
        assert_eq!(assembler.state().segments().len(), 0);

        assembler.apply(S, cited("y", &[4]));
        assert_eq!(assembler.state().segments().len(), 1);
        assert!(assembler.state().open_segment().is_empty());

        assembler.apply(S, cited("z", &[5]));
        assert_eq!(assembler.state().segments().len(), 2);
        assert_eq!(assembler.state().segments()[1], Segment::new("z", vec![5]));
        assert!(assembler.state().open_segment().is_empty());
    }

    #[test]
    fn test_cited_content_with_empty_citations_still_closes() {
        let assembler = run(vec![plain("a"), cited("b", &[])]);
        assert_eq!(assembler.state().segments(), &[Segment::new("ab", vec![])]);
    }

    #[test]
    fn test_content_start_resets_accumulator() {
        let assembler = run(vec![plain("warming up"), StreamEvent::ContentStart, plain("real")]);
        assert_eq!(assembler.state().open_segment().text, "real");
        assert_eq!(assembler.state().full_text(), "real");
    }

    #[test]
    fn test_stale_session_events_are_discarded() {
        let mut assembler = Assembler::new(SessionId(2));
        assert_eq!(assembler.apply(SessionId(1), plain("old")), Applied::Stale);
        assert_eq!(
            assembler.apply(SessionId(1), complete(Vec::new(), &["stale"])),
            Applied::Stale
        );
        assert_eq!(assembler.close_stream(SessionId(1)), Applied::Stale);
        assert_eq!(assembler.state(), &AnswerState::default());

        assert_eq!(assembler.apply(SessionId(2), plain("new")), Applied::Accepted);
        assert_eq!(assembler.state().full_text(), "new");
    }

    #[test]
    fn test_references_loaded_merges_by_id() {
        let mut assembler = run(vec![StreamEvent::ReferencesLoaded {
            references: vec![
                Reference::new(1, "Draft title", "u1"),
                Reference::new(2, "Two", "u2"),
            ],
            count: 2,
        }]);

        let mut updated = Reference::new(1, "Final title", "u1");
        updated.journal = Some("Lancet".to_string());
        assembler.apply(
            S,
            StreamEvent::ReferencesLoaded {
                references: vec![updated, Reference::new(3, "Three", "u3")],
                count: 2,
            },
        );

        let ids: Vec<u32> = assembler.state().references().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(assembler.state().references()[0].title, "Final title");
        assert_eq!(assembler.state().reference_count(), 3);
        assert_eq!(assembler.state().status(), AnswerStatus::Streaming);
    }

    #[test]
    fn test_unresolved_citations() {
        let mut assembler = run(vec![cited("a", &[2, 1]), cited("b", &[3])]);
        assert_eq!(assembler.state().unresolved_citations(), vec![1, 2, 3]);

        assembler.apply(
            S,
            StreamEvent::ReferencesLoaded {
                references: vec![Reference::new(2, "Two", "u2")],
                count: 1,
            },
        );
        assert_eq!(assembler.state().unresolved_citations(), vec![1, 3]);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let events = vec![
            StreamEvent::ThinkingProgress {
                label: "step".to_string(),
            },
            StreamEvent::ReferencesLoaded {
                references: vec![Reference::new(7, "Seven", "u7")],
                count: 1,
            },
            StreamEvent::ContentStart,
            plain("p"),
            cited("q", &[7]),
            plain("r"),
            complete(vec![Reference::new(7, "Seven", "u7")], &["next?"]),
        ];
        let a = run(events.clone());
        let b = run(events);
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn test_visible_segments_include_open_text() {
        let assembler = run(vec![cited("a", &[1]), plain("b")]);
        let visible: Vec<&str> = assembler
            .state()
            .visible_segments()
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(visible, vec!["a", "b"]);
    }

    #[test]
    fn test_status_labels() {
        assert!(AnswerStatus::Complete.is_final());
        assert!(AnswerStatus::Errored.is_final());
        assert!(!AnswerStatus::Streaming.is_final());
        assert_eq!(AnswerStatus::Errored.label(), "Error");
    }
}
