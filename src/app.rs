use chrono::{DateTime, Utc};
use tracing::debug;

use crate::answer::{AnswerState, AnswerStatus, Applied, Assembler};
use crate::events::{AppEvent, SessionId};

#[derive(Debug)]
pub struct App {
    pub should_quit: bool,
    pub input_buffer: String,
    pub scroll_offset: usize,
    pub show_help: bool,
    pub show_info: bool,
    pub exit_pending: bool,

    // Current session
    pub question: Option<String>,
    pub session_started_at: Option<DateTime<Utc>>,
    pub offline: bool,
    assembler: Assembler,
    follow_up_cursor: Option<usize>,
}

impl App {
    pub fn new() -> Self {
        Self {
            should_quit: false,
            input_buffer: String::new(),
            scroll_offset: 0,
            show_help: false,
            show_info: false,
            exit_pending: false,
            question: None,
            session_started_at: None,
            offline: false,
            assembler: Assembler::new(SessionId::default()),
            follow_up_cursor: None,
        }
    }

    pub const fn quit(&mut self) {
        self.should_quit = true;
    }

    pub const fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    pub const fn toggle_info(&mut self) {
        self.show_info = !self.show_info;
    }

    pub const fn scroll_up(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    pub fn scroll_down(&mut self, amount: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(amount);
    }

    pub const fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
    }

    pub const fn scroll_to_bottom(&mut self) {
        // Clamped to the real maximum while rendering
        self.scroll_offset = usize::MAX;
    }

    pub const fn session(&self) -> SessionId {
        self.assembler.session()
    }

    pub const fn answer(&self) -> &AnswerState {
        self.assembler.state()
    }

    /// True while a session exists and has not reached a final status
    pub fn is_loading(&self) -> bool {
        self.question.is_some() && !self.answer().status().is_final()
    }

    /// Start a new session for `question`, discarding the previous answer entirely.
    pub fn begin_session(&mut self, question: String) -> SessionId {
        let session = self.session().next();
        debug!(session = %session, "Starting session");

        self.assembler = Assembler::new(session);
        self.question = Some(question);
        self.session_started_at = Some(Utc::now());
        self.offline = false;
        self.follow_up_cursor = None;
        self.scroll_to_top();
        session
    }

    /// Take the input buffer as the next question, if there is one.
    pub fn take_question(&mut self) -> Option<String> {
        let question = self.input_buffer.trim().to_string();
        if question.is_empty() {
            return None;
        }
        self.input_buffer.clear();
        Some(question)
    }

    pub fn handle_app_event(&mut self, event: AppEvent) -> Applied {
        let session = event.session();
        if session != self.session() {
            debug!(session = %session, current = %self.session(), "Dropping event of superseded session");
            return Applied::Stale;
        }

        let applied = match event {
            AppEvent::Stream { event, .. } => self.assembler.apply(session, event),
            AppEvent::StreamClosed { .. } => self.assembler.close_stream(session),
            AppEvent::FallbackActivated { .. } => {
                self.offline = true;
                Applied::Accepted
            }
        };

        if applied == Applied::Accepted && self.answer().status() == AnswerStatus::Streaming {
            self.scroll_to_bottom();
        }
        applied
    }

    /// Stop the running session locally. The caller aborts the pump task.
    pub fn abort_session(&mut self) {
        if self.is_loading() {
            let session = self.session();
            self.assembler.cancel(session);
        }
    }

    /// Put the next follow-up question of the finished answer into the input box.
    pub fn cycle_follow_up(&mut self) -> bool {
        let follow_ups = self.assembler.state().follow_ups();
        if follow_ups.is_empty() {
            return false;
        }
        let next = self
            .follow_up_cursor
            .map_or(0, |cursor| (cursor + 1) % follow_ups.len());
        self.input_buffer.clone_from(&follow_ups[next]);
        self.follow_up_cursor = Some(next);
        true
    }

    pub const fn follow_up_cursor(&self) -> Option<usize> {
        self.follow_up_cursor
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
