// Offline answer source used when the answer service cannot be reached

use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};

use crate::events::StreamEvent;
use crate::models::{Reference, ReferenceKind};

const THINKING_STEPS: [&str; 3] = [
    "Analyzing query",
    "Searching published medical literature, guidelines, FDA, CDC, and more",
    "Synthesizing relevant information",
];

const SCRIPTED_SEGMENTS: [(&str, &[u32]); 6] = [
    (
        "Based on current evidence, for a healthy 25-year-old undergoing dental implant surgery, ",
        &[],
    ),
    (
        "the use of prophylactic antibiotics remains debated.",
        &[1, 2],
    ),
    (
        " Several systematic reviews indicate that for systemically healthy patients receiving routine implant placement, ",
        &[1],
    ),
    ("prophylactic antibiotics may not be necessary.", &[2, 3]),
    (
        " However, some clinical guidelines still recommend prophylaxis in specific situations, ",
        &[3, 4],
    ),
    ("particularly for patients with risk factors for infection.", &[4]),
];

const FOLLOW_UPS: [&str; 3] = [
    "What are the key points of aftercare following dental implant surgery?",
    "What is the success rate of dental implants and which factors affect it?",
    "Which complications can occur after dental implant surgery?",
];

/// Pacing of a replay.
#[derive(Debug, Clone, Copy)]
pub struct Replay {
    pub char_by_char: bool,
    pub delay: Duration,
}

impl Replay {
    #[cfg(test)]
    pub const fn instant() -> Self {
        Self {
            char_by_char: false,
            delay: Duration::ZERO,
        }
    }
}

pub fn references() -> Vec<Reference> {
    let mut first = Reference::new(
        1,
        "Antibiotics or No Antibiotics, That Is the Question: An Update on Efficient and Effective Use of Antibiotics in Dental Practice",
        "https://pubmed.ncbi.nlm.nih.gov/34065113/",
    );
    first.journal = Some("Antibiotics (Basel)".to_string());
    first.authors = Some("Buonavoglia A, Leone P, Solimando AG, et al.".to_string());
    first.published_date = Some("2021-05-09".to_string());
    first.kind = Some(ReferenceKind::Review);

    let mut second = Reference::new(
        2,
        "The role of antibiotics in preventing surgical complications in periodontology and implant dentistry",
        "https://pubmed.ncbi.nlm.nih.gov/40665923/",
    );
    second.journal = Some("Periodontol 2000".to_string());
    second.authors = Some("Chen Z, Chiou LL, Calatrava J, Wang HL".to_string());
    second.published_date = Some("2025-07-16".to_string());
    second.kind = Some(ReferenceKind::MetaAnalysis);
    second.is_leading = true;
    second.is_new = true;

    let mut third = Reference::new(
        3,
        "Antibiotic prophylaxis for dental implant placement: A systematic review",
        "https://pubmed.ncbi.nlm.nih.gov/31954466/",
    );
    third.journal = Some("Clinical Oral Implants Research".to_string());
    third.authors = Some("Schweitzer C, Brezin A, Cochener B, et al.".to_string());
    third.published_date = Some("2020-01-18".to_string());
    third.kind = Some(ReferenceKind::Research);
    third.is_leading = true;

    let mut fourth = Reference::new(
        4,
        "Clinical guidelines for antibiotic prophylaxis in dental implant surgery",
        "https://pubmed.ncbi.nlm.nih.gov/35570159/",
    );
    fourth.journal = Some("Journal of Clinical Periodontology".to_string());
    fourth.authors = Some("Lin CC, Rose-Nussbaumer JR, Al-Mohtaseb ZN, et al.".to_string());
    fourth.published_date = Some("2022-08-01".to_string());
    fourth.kind = Some(ReferenceKind::Guideline);
    fourth.is_new = true;

    vec![first, second, third, fourth]
}

/// The full scripted event sequence. Deterministic for a given `char_by_char`.
pub fn script(char_by_char: bool) -> Vec<StreamEvent> {
    let mut events: Vec<StreamEvent> = THINKING_STEPS
        .iter()
        .map(|step| StreamEvent::ThinkingProgress {
            label: (*step).to_string(),
        })
        .collect();
    events.push(StreamEvent::ThinkingComplete);
    events.push(StreamEvent::ContentStart);

    for (text, citations) in SCRIPTED_SEGMENTS {
        if char_by_char {
            let chars: Vec<char> = text.chars().collect();
            if let Some((last, head)) = chars.split_last() {
                events.extend(head.iter().map(|c| StreamEvent::PlainContent {
                    text: c.to_string(),
                    citations: None,
                }));
                events.push(content_event(last.to_string(), citations));
            }
        } else {
            events.push(content_event(text.to_string(), citations));
        }
    }

    events.push(StreamEvent::Complete {
        references: references(),
        follow_up_questions: FOLLOW_UPS.iter().map(ToString::to_string).collect(),
    });
    events
}

fn content_event(text: String, citations: &[u32]) -> StreamEvent {
    if citations.is_empty() {
        StreamEvent::PlainContent {
            text,
            citations: None,
        }
    } else {
        StreamEvent::CitedContent {
            text,
            citations: citations.to_vec(),
        }
    }
}

/// The script as a paced stream, one `delay` before each event.
pub fn replay(pacing: Replay) -> impl Stream<Item = StreamEvent> + Send {
    let delay = pacing.delay;
    stream::iter(script(pacing.char_by_char)).then(move |event| async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        event
    })
}
