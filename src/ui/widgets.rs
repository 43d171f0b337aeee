use chrono::Utc;
use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::Palette;
use crate::answer::{AnswerState, AnswerStatus, Segment};
use crate::app::App;
use crate::models::Reference;

/// Citation marker shown after a cited span, e.g. `[1,2]`
pub fn citation_marker(citations: &[u32]) -> String {
    let ids: Vec<String> = citations.iter().map(ToString::to_string).collect();
    format!("[{}]", ids.join(","))
}

/// Lay segment text out as lines, appending a citation marker after each cited span.
pub fn answer_lines<'a>(
    segments: impl Iterator<Item = &'a Segment>,
    palette: Palette,
) -> Vec<Line<'static>> {
    let text_style = Style::default().fg(palette.answer);
    let marker_style = Style::default()
        .fg(palette.citation)
        .add_modifier(Modifier::BOLD);

    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();

    for segment in segments {
        let mut parts = segment.text.split('\n');
        if let Some(first) = parts.next() {
            if !first.is_empty() {
                current.push(Span::styled(first.to_string(), text_style));
            }
        }
        for part in parts {
            lines.push(Line::from(std::mem::take(&mut current)));
            if !part.is_empty() {
                current.push(Span::styled(part.to_string(), text_style));
            }
        }
        if !segment.citations.is_empty() {
            current.push(Span::styled(citation_marker(&segment.citations), marker_style));
        }
    }
    if !current.is_empty() {
        lines.push(Line::from(current));
    }

    lines
}

fn reference_detail(reference: &Reference) -> String {
    let mut details: Vec<String> = Vec::new();
    if let Some(journal) = &reference.journal {
        details.push(journal.clone());
    }
    if let Some(authors) = &reference.authors {
        details.push(authors.clone());
    }
    if let Some(year) = reference.published_year() {
        details.push(year.to_string());
    }
    if let Some(kind) = reference.kind {
        details.push(kind.label().to_string());
    }
    details.join(" · ")
}

fn reference_lines(state: &AnswerState, palette: Palette) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if state.references().is_empty() {
        return lines;
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("## References ({})", state.reference_count()),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )));

    for reference in state.references() {
        let mut title = vec![
            Span::styled(
                format!("[{}] ", reference.id),
                Style::default().fg(palette.citation).add_modifier(Modifier::BOLD),
            ),
            Span::raw(reference.title.clone()),
        ];
        if reference.is_leading {
            title.push(Span::styled(" Leading", Style::default().fg(Color::Yellow)));
        }
        if reference.is_new {
            title.push(Span::styled(" New", Style::default().fg(Color::Green)));
        }
        lines.push(Line::from(title));

        let detail = reference_detail(reference);
        if !detail.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("    {detail}"),
                Style::default().fg(Color::Gray),
            )));
        }
        if !reference.url.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("    {}", reference.url),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }

    lines
}

fn follow_up_lines(app: &App) -> Vec<Line<'static>> {
    let follow_ups = app.answer().follow_ups();
    let mut lines = Vec::new();
    if follow_ups.is_empty() {
        return lines;
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "## Related questions (Ctrl+N)",
        Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
    )));
    for (index, question) in follow_ups.iter().enumerate() {
        let style = if app.follow_up_cursor() == Some(index) {
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(format!("  → {question}"), style)));
    }

    lines
}

fn render_welcome(frame: &mut Frame, area: Rect) {
    let welcome_text = vec![
        Line::from(Span::styled(
            "Welcome to CiteChat",
            Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            "Evidence-backed answers with citations",
            Style::default().fg(Color::Cyan),
        )),
    ];

    let welcome_paragraph = Paragraph::new(welcome_text).alignment(Alignment::Center);

    // Position it at the bottom of the answer area
    let welcome_height = 2;
    let welcome_area = Rect {
        x: area.x,
        y: area.y + area.height.saturating_sub(welcome_height),
        width: area.width,
        height: welcome_height.min(area.height),
    };

    frame.render_widget(welcome_paragraph, welcome_area);
}

pub fn render_answer(frame: &mut Frame, app: &mut App, palette: Palette, area: Rect) {
    let Some(question) = app.question.clone() else {
        render_welcome(frame, area);
        return;
    };
    let state = app.answer();

    let mut lines = vec![
        Line::from(Span::styled(
            "## Question",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(question),
        Line::from(""),
        Line::from(Span::styled(
            "## Answer",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
    ];

    let mut body = answer_lines(state.visible_segments(), palette);
    if state.status() == AnswerStatus::Streaming && !state.open_segment().text.is_empty() {
        if let Some(last) = body.last_mut() {
            last.spans
                .push(Span::styled("▌", Style::default().fg(palette.border)));
        }
    }
    if body.is_empty() {
        let placeholder = state.progress().unwrap_or("...").to_string();
        lines.push(Line::from(Span::styled(
            placeholder,
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    } else {
        lines.extend(body);
    }

    if let Some(message) = state.error_message() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Error: {message}"),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )));
    }

    lines.extend(reference_lines(state, palette));
    lines.extend(follow_up_lines(app));

    // Account for wrapping to find the true visual height
    let available_width = (area.width as usize).max(1);
    let total_visual_lines: usize = lines
        .iter()
        .map(|line| line.width().div_ceil(available_width).max(1))
        .sum();

    let visible_height = area.height as usize;
    let max_scroll = total_visual_lines.saturating_sub(visible_height);
    let actual_scroll = app.scroll_offset.min(max_scroll);

    // Sync the actual scroll back to the app state
    if app.scroll_offset != actual_scroll {
        app.scroll_offset = actual_scroll;
    }

    let answer = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((u16::try_from(actual_scroll).unwrap_or(u16::MAX), 0));

    frame.render_widget(answer, area);
}

pub fn status_text(app: &App) -> String {
    if app.question.is_none() {
        return "Ready".to_string();
    }

    let state = app.answer();
    let mut parts = vec![state.status().label().to_string()];
    if let Some(progress) = state.progress() {
        parts.push(progress.to_string());
    }
    if state.reference_count() > 0 {
        parts.push(format!("{} references", state.reference_count()));
    }
    if app.offline {
        parts.push("offline sample".to_string());
    }
    parts.join(" | ")
}

pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let color = match app.answer().status() {
        _ if app.question.is_none() => Color::DarkGray,
        AnswerStatus::Connecting => Color::Yellow,
        AnswerStatus::Streaming => Color::Cyan,
        AnswerStatus::Complete => Color::Green,
        AnswerStatus::Errored => Color::Red,
    };

    let status = Paragraph::new(status_text(app))
        .alignment(Alignment::Right)
        .style(Style::default().fg(color).add_modifier(Modifier::BOLD));

    frame.render_widget(status, area);
}

pub fn render_input_field(frame: &mut Frame, app: &App, palette: Palette, area: Rect) {
    let input_text = if app.input_buffer.is_empty() {
        "Ask a medical question..."
    } else {
        &app.input_buffer
    };

    let input_style = if app.input_buffer.is_empty() {
        Style::default().fg(Color::Gray)
    } else {
        Style::default().fg(palette.border).add_modifier(Modifier::BOLD)
    };

    let input = Paragraph::new(input_text)
        .style(input_style)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.border)),
        )
        .wrap(Wrap { trim: false });

    frame.render_widget(input, area);
}

pub fn render_bottom_bar(frame: &mut Frame, app: &App, area: Rect) {
    let (text, style) = if app.exit_pending {
        (
            "Press Ctrl+C again to exit, Esc to cancel",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )
    } else if app.is_loading() {
        (
            "Esc: Stop | Ctrl+I: Info | Ctrl+H: Help",
            Style::default().fg(Color::DarkGray),
        )
    } else {
        (
            "Enter: Ask | Ctrl+N: Follow-up | Ctrl+I: Info | Ctrl+H: Help | Ctrl+C: Quit",
            Style::default().fg(Color::DarkGray),
        )
    };

    let bar = Paragraph::new(text)
        .alignment(Alignment::Center)
        .style(style);

    frame.render_widget(bar, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let x = area.width.saturating_sub(width) / 2;
    let y = area.height.saturating_sub(height) / 2;
    Rect {
        x: area.x + x,
        y: area.y + y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

pub fn render_help_window(frame: &mut Frame, palette: Palette, area: Rect) {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let help_text = vec![
        Line::from(Span::styled(
            "CiteChat - Keyboard Shortcuts",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled("General:", bold)),
        Line::from("  Ctrl+H        - Show/hide this help"),
        Line::from("  Ctrl+I        - Show/hide session info"),
        Line::from("  Ctrl+Q        - Quit application"),
        Line::from("  Ctrl+C        - Quit (press twice)"),
        Line::from(""),
        Line::from(Span::styled("Questions:", bold)),
        Line::from("  Enter         - Ask the typed question"),
        Line::from("  Esc           - Stop the running answer"),
        Line::from("  Ctrl+N        - Next related question"),
        Line::from(""),
        Line::from(Span::styled("Navigation:", bold)),
        Line::from("  Up/Down       - Scroll answer"),
        Line::from("  PgUp/PgDn     - Scroll answer"),
        Line::from("  Home/End      - Jump to start/end"),
        Line::from(""),
        Line::from(Span::styled(
            "Press Ctrl+H or Esc to close",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let help_paragraph = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help ")
                .border_style(Style::default().fg(palette.border)),
        )
        .wrap(Wrap { trim: false });

    let popup_area = centered(area, 60, 22);
    frame.render_widget(Clear, popup_area);
    frame.render_widget(help_paragraph, popup_area);
}

pub fn render_info_window(frame: &mut Frame, app: &App, palette: Palette, area: Rect) {
    let state = app.answer();
    let elapsed = app
        .session_started_at
        .map_or_else(|| "-".to_string(), |start| {
            format!("{}s", (Utc::now() - start).num_seconds())
        });
    let unresolved = state.unresolved_citations();
    let unresolved_text = if unresolved.is_empty() {
        "none".to_string()
    } else {
        citation_marker(&unresolved)
    };

    let info_text = vec![
        Line::from(Span::styled(
            "Session Information",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::raw("Session: "),
            Span::styled(app.session().to_string(), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(vec![
            Span::raw("Status: "),
            Span::styled(state.status().label(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::raw("Elapsed: "),
            Span::styled(elapsed, Style::default().fg(Color::Magenta)),
        ]),
        Line::from(vec![
            Span::raw("Segments: "),
            Span::styled(
                state.segments().len().to_string(),
                Style::default().fg(Color::Blue),
            ),
        ]),
        Line::from(vec![
            Span::raw("References: "),
            Span::styled(
                state.references().len().to_string(),
                Style::default().fg(Color::Blue),
            ),
        ]),
        Line::from(vec![
            Span::raw("Awaiting metadata: "),
            Span::styled(unresolved_text, Style::default().fg(Color::Yellow)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "Press Ctrl+I to close",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let info_paragraph = Paragraph::new(info_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Info ")
                .border_style(Style::default().fg(palette.border)),
        )
        .wrap(Wrap { trim: false });

    let popup_area = centered(area, 44, 13);
    frame.render_widget(Clear, popup_area);
    frame.render_widget(info_paragraph, popup_area);
}
