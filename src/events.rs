// Event types for async communication

use std::fmt;

use crate::models::Reference;

/// Identifies one question's streaming exchange. Strictly increasing per consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionId(pub u64);

impl SessionId {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Canonical answer-stream vocabulary. Built by the normalizer, the fallback
/// simulator, and the pump when the transport fails.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ThinkingProgress {
        label: String,
    },
    ThinkingComplete,
    ReferencesLoaded {
        references: Vec<Reference>,
        count: usize,
    },
    ContentStart,
    /// Closes the open segment with `citations`.
    CitedContent {
        text: String,
        citations: Vec<u32>,
    },
    /// Closes the open segment only when `citations` is present.
    PlainContent {
        text: String,
        citations: Option<Vec<u32>>,
    },
    Complete {
        references: Vec<Reference>,
        follow_up_questions: Vec<String>,
    },
    ErrorEvent {
        message: String,
    },
}

impl StreamEvent {
    /// Returns true for `Complete` and `ErrorEvent`; nothing follows these.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::ErrorEvent { .. })
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ThinkingProgress { .. } => "thinking_progress",
            Self::ThinkingComplete => "thinking_complete",
            Self::ReferencesLoaded { .. } => "references_loaded",
            Self::ContentStart => "content_start",
            Self::CitedContent { .. } => "cited_content",
            Self::PlainContent { .. } => "plain_content",
            Self::Complete { .. } => "complete",
            Self::ErrorEvent { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A canonical event tagged with the session that produced it
    Stream {
        session: SessionId,
        event: StreamEvent,
    },
    /// The connection closed cleanly without a terminal event
    StreamClosed { session: SessionId },
    /// The fallback simulator took over for this session
    FallbackActivated { session: SessionId },
}

impl AppEvent {
    pub const fn session(&self) -> SessionId {
        match self {
            Self::Stream { session, .. }
            | Self::StreamClosed { session }
            | Self::FallbackActivated { session } => *session,
        }
    }
}
