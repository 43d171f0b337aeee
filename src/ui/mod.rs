pub mod widgets;

use std::str::FromStr;

use crate::app::App;
use crate::models::ThemeConfig;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::Color,
    Frame,
};

/// Theme colors resolved once at startup.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub answer: Color,
    pub citation: Color,
    pub border: Color,
}

impl Palette {
    pub fn from_theme(theme: &ThemeConfig) -> Self {
        Self {
            answer: parse_color(&theme.answer_color, Color::White),
            citation: parse_color(&theme.citation_color, Color::Blue),
            border: parse_color(&theme.border_color, Color::Cyan),
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_theme(&ThemeConfig::default())
    }
}

fn parse_color(name: &str, fallback: Color) -> Color {
    Color::from_str(name).unwrap_or(fallback)
}

pub fn render(frame: &mut Frame, app: &mut App, palette: Palette) {
    // Width available for text is total width - 2 (for borders)
    let available_width = frame.area().width.saturating_sub(2).max(1) as usize;

    let input_lines = if app.input_buffer.is_empty() {
        1
    } else {
        app.input_buffer.chars().count().div_ceil(available_width)
    };

    // Clamp lines: Min 1, Max 50% of screen height (approx)
    let max_lines = (frame.area().height as usize / 2).saturating_sub(2).max(1);
    let actual_lines = input_lines.clamp(1, max_lines);

    #[allow(clippy::cast_possible_truncation)]
    let input_height = (actual_lines + 2) as u16;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),                // Answer, references, follow-ups
            Constraint::Length(1),             // Empty gap
            Constraint::Length(1),             // Status line
            Constraint::Length(input_height),  // Question input
            Constraint::Length(1),             // Bottom keymap bar
        ])
        .split(frame.area());

    widgets::render_answer(frame, app, palette, chunks[0]);
    widgets::render_status_bar(frame, app, chunks[2]);
    widgets::render_input_field(frame, app, palette, chunks[3]);
    widgets::render_bottom_bar(frame, app, chunks[4]);

    if app.show_help {
        widgets::render_help_window(frame, palette, frame.area());
    }

    if app.show_info {
        widgets::render_info_window(frame, app, palette, frame.area());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AppEvent, StreamEvent};
    use ratatui::{backend::TestBackend, Terminal};

    #[test]
    fn test_palette_from_theme() {
        let theme = ThemeConfig {
            answer_color: "yellow".to_string(),
            citation_color: "not-a-color".to_string(),
            border_color: "#ff0000".to_string(),
        };
        let palette = Palette::from_theme(&theme);
        assert_eq!(palette.answer, Color::Yellow);
        assert_eq!(palette.citation, Color::Blue);
        assert_eq!(palette.border, Color::Rgb(255, 0, 0));
    }

    #[test]
    fn test_render_streaming_answer() {
        let mut app = App::new();
        let session = app.begin_session("Are antibiotics needed?".to_string());
        app.handle_app_event(AppEvent::Stream {
            session,
            event: StreamEvent::CitedContent {
                text: "They are debated.".to_string(),
                citations: vec![1, 2],
            },
        });
        app.show_help = true;
        app.show_info = true;

        let mut terminal = Terminal::new(TestBackend::new(80, 30)).unwrap();
        terminal
            .draw(|f| render(f, &mut app, Palette::default()))
            .unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = buffer.content().iter().map(|cell| cell.symbol()).collect();
        assert!(text.contains("Help"));
    }

    #[test]
    fn test_render_tiny_terminal_does_not_panic() {
        let mut app = App::new();
        app.input_buffer = "a long question ".repeat(20);
        let mut terminal = Terminal::new(TestBackend::new(10, 4)).unwrap();
        terminal
            .draw(|f| render(f, &mut app, Palette::default()))
            .unwrap();
    }
}
