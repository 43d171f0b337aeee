// Terminal transitions for an answer

use tracing::{info, warn};

use super::{merge_references, AnswerStatus, Applied, Assembler};
use crate::events::SessionId;
use crate::models::Reference;

impl Assembler {
    /// Flush trailing text, install the final references and follow-ups, freeze.
    pub(super) fn complete(&mut self, references: Vec<Reference>, follow_ups: Vec<String>) {
        self.flush_open_segment();

        // An empty final list keeps whatever arrived earlier
        if !references.is_empty() {
            let mut installed = Vec::with_capacity(references.len());
            merge_references(&mut installed, references);
            self.state.references = installed;
        }
        self.state.follow_ups = follow_ups;
        self.state.progress = None;
        self.state.status = AnswerStatus::Complete;

        info!(
            session = %self.session,
            segments = self.state.segments.len(),
            chars = self.state.full_text().chars().count(),
            references = self.state.references.len(),
            "Answer complete"
        );
    }

    /// Freeze as errored. Closed segments and the open text stay visible.
    pub(super) fn fail(&mut self, message: String) {
        warn!(session = %self.session, error = %message, "Answer failed");
        self.state.progress = None;
        self.state.error_message = Some(message);
        self.state.status = AnswerStatus::Errored;
    }

    /// The stream ended cleanly but never said so. Keep what arrived and complete.
    pub(super) fn close_without_summary(&mut self) {
        self.flush_open_segment();
        self.state.progress = None;
        self.state.status = AnswerStatus::Complete;
        info!(session = %self.session, "Stream closed without a completion record");
    }

    /// The user abandoned the session.
    pub fn cancel(&mut self, session: SessionId) -> Applied {
        if let Some(rejected) = self.admit(session) {
            return rejected;
        }
        self.fail("Cancelled".to_string());
        Applied::Accepted
    }

    fn flush_open_segment(&mut self) {
        let open = std::mem::take(&mut self.state.open);
        if !open.text.is_empty() {
            self.state.segments.push(open);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::answer::{Applied, AnswerStatus, Assembler, Segment};
    use crate::events::{SessionId, StreamEvent};
    use crate::models::Reference;

    const S: SessionId = SessionId(3);

    fn plain(text: &str) -> StreamEvent {
        StreamEvent::PlainContent {
            text: text.to_string(),
            citations: None,
        }
    }

    #[test]
    fn test_complete_flushes_trailing_text() {
        let mut assembler = Assembler::new(S);
        assembler.apply(S, plain("uncited tail"));
        assembler.apply(
            S,
            StreamEvent::Complete {
                references: Vec::new(),
                follow_up_questions: Vec::new(),
            },
        );
        assert_eq!(
            assembler.state().segments(),
            &[Segment::new("uncited tail", vec![])]
        );
        assert!(assembler.state().open_segment().is_empty());
    }

    #[test]
    fn test_complete_with_empty_open_segment_adds_nothing() {
        let mut assembler = Assembler::new(S);
        assembler.apply(
            S,
            StreamEvent::CitedContent {
                text: "done.".to_string(),
                citations: vec![1],
            },
        );
        assembler.apply(
            S,
            StreamEvent::Complete {
                references: Vec::new(),
                follow_up_questions: Vec::new(),
            },
        );
        assert_eq!(assembler.state().segments().len(), 1);
    }

    #[test]
    fn test_complete_replaces_loaded_references() {
        let mut assembler = Assembler::new(S);
        assembler.apply(
            S,
            StreamEvent::ReferencesLoaded {
                references: vec![Reference::new(1, "Early", "u1"), Reference::new(2, "Two", "u2")],
                count: 2,
            },
        );
        assembler.apply(
            S,
            StreamEvent::Complete {
                references: vec![Reference::new(1, "Final", "u1")],
                follow_up_questions: vec!["Q".to_string()],
            },
        );
        let state = assembler.state();
        assert_eq!(state.references().len(), 1);
        assert_eq!(state.references()[0].title, "Final");
    }

    #[test]
    fn test_complete_with_empty_references_keeps_loaded() {
        let mut assembler = Assembler::new(S);
        assembler.apply(
            S,
            StreamEvent::ReferencesLoaded {
                references: vec![Reference::new(5, "Five", "u5")],
                count: 1,
            },
        );
        assembler.apply(
            S,
            StreamEvent::Complete {
                references: Vec::new(),
                follow_up_questions: Vec::new(),
            },
        );
        assert_eq!(assembler.state().references()[0].id, 5);
    }

    #[test]
    fn test_complete_deduplicates_references() {
        let mut assembler = Assembler::new(S);
        assembler.apply(
            S,
            StreamEvent::Complete {
                references: vec![
                    Reference::new(2, "Two", "u2"),
                    Reference::new(1, "One", "u1"),
                    Reference::new(2, "Two again", "u2"),
                ],
                follow_up_questions: Vec::new(),
            },
        );
        let ids: Vec<u32> = assembler.state().references().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(assembler.state().references()[0].title, "Two again");
    }

    #[test]
    fn test_complete_as_first_event_passes_through_streaming() {
        let mut assembler = Assembler::new(S);
        assert_eq!(
            assembler.apply(
                S,
                StreamEvent::Complete {
                    references: Vec::new(),
                    follow_up_questions: Vec::new(),
                },
            ),
            Applied::Accepted
        );
        assert_eq!(assembler.state().status(), AnswerStatus::Complete);
    }

    #[test]
    fn test_error_keeps_partial_answer_and_freezes() {
        let mut assembler = Assembler::new(S);
        assembler.apply(
            S,
            StreamEvent::CitedContent {
                text: "first.".to_string(),
                citations: vec![1],
            },
        );
        assembler.apply(S, plain("half a sen"));
        assembler.apply(
            S,
            StreamEvent::ErrorEvent {
                message: "Stream interrupted".to_string(),
            },
        );

        let state = assembler.state();
        assert_eq!(state.status(), AnswerStatus::Errored);
        assert_eq!(state.error_message(), Some("Stream interrupted"));
        assert_eq!(state.segments().len(), 1);
        assert_eq!(state.full_text(), "first.half a sen");

        let before = state.clone();
        assert_eq!(assembler.apply(S, plain("more")), Applied::Frozen);
        assert_eq!(
            assembler.apply(
                S,
                StreamEvent::Complete {
                    references: Vec::new(),
                    follow_up_questions: Vec::new(),
                },
            ),
            Applied::Frozen
        );
        assert_eq!(assembler.state(), &before);
    }

    #[test]
    fn test_complete_freezes_state() {
        let mut assembler = Assembler::new(S);
        assembler.apply(
            S,
            StreamEvent::Complete {
                references: Vec::new(),
                follow_up_questions: vec!["Q1".to_string()],
            },
        );
        assert_eq!(
            assembler.apply(
                S,
                StreamEvent::ErrorEvent {
                    message: "late".to_string()
                }
            ),
            Applied::Frozen
        );
        assert_eq!(assembler.state().status(), AnswerStatus::Complete);
        assert!(assembler.state().error_message().is_none());
    }

    #[test]
    fn test_cancel() {
        let mut assembler = Assembler::new(S);
        assembler.apply(S, plain("so far"));
        assert_eq!(assembler.cancel(SessionId(99)), Applied::Stale);
        assert_eq!(assembler.cancel(S), Applied::Accepted);
        assert_eq!(assembler.state().status(), AnswerStatus::Errored);
        assert_eq!(assembler.state().error_message(), Some("Cancelled"));
        assert_eq!(assembler.cancel(S), Applied::Frozen);
    }

    #[test]
    fn test_close_without_summary() {
        let mut assembler = Assembler::new(S);
        assembler.apply(
            S,
            StreamEvent::ReferencesLoaded {
                references: vec![Reference::new(1, "One", "u1")],
                count: 1,
            },
        );
        assembler.apply(S, plain("tail"));
        assert_eq!(assembler.close_stream(S), Applied::Accepted);

        let state = assembler.state();
        assert_eq!(state.status(), AnswerStatus::Complete);
        assert_eq!(state.segments(), &[Segment::new("tail", vec![])]);
        assert_eq!(state.references().len(), 1);
        assert_eq!(assembler.close_stream(S), Applied::Frozen);
    }
}
