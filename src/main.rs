mod answer;
mod api;
mod app;
mod config;
mod events;
mod models;
mod session;
mod simulator;
mod ui;

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::Backend, prelude::*};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use api::{AskClient, AskRequest};
use app::App;
use events::AppEvent;
use models::AppConfig;
use session::{PumpOutcome, SessionSettings};
use ui::Palette;

/// The running session task and everything needed to start the next one.
struct Sessions {
    client: AskClient,
    settings: SessionSettings,
    user_id: Option<String>,
    tx: mpsc::UnboundedSender<AppEvent>,
    task: Option<JoinHandle<PumpOutcome>>,
}

impl Sessions {
    /// Ask the question in the input box, superseding any running session.
    fn submit(&mut self, app: &mut App) {
        let Some(question) = app.take_question() else {
            return;
        };

        self.stop(app);
        let session = app.begin_session(question.clone());
        let request = AskRequest::new(question)
            .with_user(self.user_id.clone())
            .with_session(Uuid::new_v4().to_string());

        self.task = Some(tokio::spawn(session::run(
            self.client.clone(),
            request,
            session,
            self.tx.clone(),
            self.settings,
        )));
    }

    /// Abandon the running session, if any.
    fn stop(&mut self, app: &mut App) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(session = %app.session(), "Session task aborted");
        }
        app.abort_session();
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let log_path = config::get_log_path()?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    // The terminal belongs to the UI, so logs go to the file only
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_target(false)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;
    init_logging(&config)?;
    info!(base_url = %config.base_url, "Starting citechat");

    let client = AskClient::new(config.base_url.clone(), config.request_timeout)?;
    let palette = Palette::from_theme(&config.theme);

    // Create channel for session events
    let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();
    let mut sessions = Sessions {
        client,
        settings: SessionSettings::from_config(&config),
        user_id: config.user_id.clone(),
        tx,
        task: None,
    };

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();
    let res = run_app(&mut terminal, &mut app, &mut sessions, &mut rx, palette);

    if let Some(task) = sessions.task.take() {
        task.abort();
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("Error: {err:?}");
    }

    info!("Exiting citechat");
    Ok(())
}

/// Keys while a popup is open. Returns true when the key was consumed.
const fn handle_popup_keys(app: &mut App, key: KeyCode, modifiers: KeyModifiers) -> bool {
    if app.show_help {
        match key {
            KeyCode::Char('h') if modifiers.contains(KeyModifiers::CONTROL) => app.toggle_help(),
            KeyCode::Esc => app.show_help = false,
            _ => {}
        }
        return true;
    }

    if app.show_info {
        match key {
            KeyCode::Char('i') if modifiers.contains(KeyModifiers::CONTROL) => app.toggle_info(),
            KeyCode::Esc => app.show_info = false,
            _ => {}
        }
        return true;
    }

    false
}

fn handle_keyboard_input(
    app: &mut App,
    sessions: &mut Sessions,
    key: KeyCode,
    modifiers: KeyModifiers,
) {
    let ctrl = modifiers.contains(KeyModifiers::CONTROL);

    match key {
        KeyCode::Char('c') if ctrl => {
            if app.exit_pending {
                app.quit();
            } else {
                app.exit_pending = true;
            }
            return;
        }
        KeyCode::Esc => {
            if app.exit_pending {
                app.exit_pending = false;
            } else if app.is_loading() {
                sessions.stop(app);
            }
            return;
        }
        _ if app.exit_pending => {
            // Any other key cancels pending exit
            app.exit_pending = false;
            return;
        }
        _ => {}
    }

    match key {
        KeyCode::Char('q') if ctrl => app.quit(),
        KeyCode::Char('h') if ctrl => app.toggle_help(),
        KeyCode::Char('i') if ctrl => app.toggle_info(),
        KeyCode::Char('n') if ctrl => {
            app.cycle_follow_up();
        }

        // Navigation keys always scroll the answer
        KeyCode::Up => app.scroll_up(1),
        KeyCode::Down => app.scroll_down(1),
        KeyCode::PageUp => app.scroll_up(10),
        KeyCode::PageDown => app.scroll_down(10),
        KeyCode::Home => app.scroll_to_top(),
        KeyCode::End => app.scroll_to_bottom(),

        KeyCode::Backspace => {
            app.input_buffer.pop();
        }
        KeyCode::Enter => sessions.submit(app),
        KeyCode::Char(c) if !ctrl => app.input_buffer.push(c),

        _ => {}
    }
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    sessions: &mut Sessions,
    event_rx: &mut mpsc::UnboundedReceiver<AppEvent>,
    palette: Palette,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::render(f, app, palette))?;

        // Drain everything the session task produced since the last frame
        while let Ok(app_event) = event_rx.try_recv() {
            app.handle_app_event(app_event);
        }

        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && !handle_popup_keys(app, key.code, key.modifiers)
                {
                    handle_keyboard_input(app, sessions, key.code, key.modifiers);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}
