use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::app::{App, InputMode, Panel};
use crate::net::{ApiReply, ApiRequest};
use crate::presets::PresetKey;
use crate::ui;

pub fn init_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

pub fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Directory lookups and measurement queries run on separate workers so a
/// slow export never delays the location cascade.
pub struct ApiChannels {
    pub directory_tx: Sender<ApiRequest>,
    pub measurement_tx: Sender<ApiRequest>,
    pub rx: Receiver<ApiReply>,
}

impl ApiChannels {
    fn send(&self, request: ApiRequest) {
        let tx = match request {
            ApiRequest::Measurements(_) => &self.measurement_tx,
            _ => &self.directory_tx,
        };
        if let Err(err) = tx.send(request) {
            warn!("worker gone, request dropped: {:?}", err.0);
        }
    }
}

pub fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut app: App,
    channels: ApiChannels,
) -> Result<()> {
    let tick_rate = Duration::from_millis(50);
    app.start(Instant::now());
    loop {
        while let Ok(reply) = channels.rx.try_recv() {
            app.apply_reply(reply, Instant::now());
        }

        app.tick(Instant::now());
        for request in app.drain_requests() {
            channels.send(request);
        }

        terminal.draw(|f| ui::ui(f, &app))?;

        if event::poll(tick_rate)? {
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => {
                    if !handle_key(&mut app, key) {
                        return Ok(());
                    }
                }
                Event::Mouse(mouse) => handle_mouse(&mut app, mouse),
                _ => {}
            }
        }
    }
}

/// Returns false when the user asked to quit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    let now = Instant::now();
    match app.input_mode {
        InputMode::Normal => match key.code {
            KeyCode::Char('q') => return false,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return false,
            KeyCode::Tab => app.next_panel(),
            KeyCode::BackTab => app.prev_panel(),
            KeyCode::Down => app.move_cursor(1),
            KeyCode::Up => app.move_cursor(-1),
            KeyCode::PageDown => app.move_cursor(10),
            KeyCode::PageUp => app.move_cursor(-10),
            KeyCode::Char(' ') => app.toggle_current(now),
            KeyCode::Char('a') => app.toggle_all_current(now),
            KeyCode::Char('e') => app.start_edit(),
            KeyCode::Char('u') => app.toggle_unit(),
            KeyCode::Char('n') => app.add_time_slot(),
            KeyCode::Char('d') if app.panel == Panel::TimeSlots => app.remove_time_slot(),
            KeyCode::Enter => app.submit_search(),
            KeyCode::Char('x') => app.export(),
            KeyCode::Char('f') => app.cycle_format(),
            KeyCode::Char('m') => app.request_hexbins(),
            KeyCode::Char('+') | KeyCode::Char('=') => app.zoom_in(),
            KeyCode::Char('-') => app.zoom_out(),
            KeyCode::Char('/') => app.open_presets(now),
            KeyCode::Char('r') => app.reset_filters(now),
            KeyCode::Char('R') => app.retry_loads(now),
            KeyCode::Char('t') => app.toggle_theme(),
            KeyCode::Char('?') | KeyCode::Char('h') => app.open_help(),
            _ => {}
        },
        InputMode::Edit(_) => match key.code {
            KeyCode::Enter => app.apply_edit(),
            KeyCode::Esc => app.cancel_edit(),
            KeyCode::Backspace => app.backspace_edit(),
            KeyCode::Char(ch) if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if ch == 'u' {
                    app.edit_buffer.clear();
                }
            }
            KeyCode::Char(ch) => app.push_edit_char(ch),
            _ => {}
        },
        InputMode::Presets => match key.code {
            KeyCode::Esc => app.preset_key(PresetKey::Escape, now),
            KeyCode::Enter => app.preset_key(PresetKey::Enter, now),
            KeyCode::Up => app.preset_key(PresetKey::Up, now),
            KeyCode::Down => app.preset_key(PresetKey::Down, now),
            KeyCode::Tab | KeyCode::BackTab => app.leave_presets(now),
            KeyCode::Backspace => app.presets.backspace(),
            KeyCode::Char(ch) if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if ch == 'u' {
                    app.presets.set_query("");
                }
            }
            KeyCode::Char(ch) => app.presets.push_char(ch),
            _ => {}
        },
        InputMode::Help => match key.code {
            KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::Char('q') => {
                app.close_help()
            }
            _ => {}
        },
    }
    true
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.input_mode != InputMode::Normal {
        return;
    }
    match mouse.kind {
        MouseEventKind::ScrollUp => app.move_cursor(-1),
        MouseEventKind::ScrollDown => app.move_cursor(1),
        _ => debug!("mouse event ignored: {:?}", mouse.kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppOptions, ThemeMode};
    use crate::filters::FilterState;
    use crate::query::ExportFormat;
    use std::path::PathBuf;
    use std::sync::mpsc;

    fn app() -> App {
        App::new(AppOptions {
            filters: FilterState::default(),
            format: ExportFormat::Csv,
            export_dir: PathBuf::from("exports"),
            theme_mode: ThemeMode::Default,
            map_zoom: 6,
            max_zoom: 18,
            debounce: Duration::from_millis(150),
            settle: Duration::from_millis(50),
            blur_grace: Duration::from_millis(200),
        })
    }

    fn press(app: &mut App, code: KeyCode) -> bool {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn q_quits_only_in_normal_mode() {
        let mut app = app();
        app.open_presets(Instant::now());
        assert!(press(&mut app, KeyCode::Char('q')));
        assert_eq!(app.presets.query(), "q");
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert!(!press(&mut app, KeyCode::Char('q')));
    }

    #[test]
    fn edit_mode_captures_text() {
        let mut app = app();
        app.panel = Panel::Temperature;
        press(&mut app, KeyCode::Char('e'));
        press(&mut app, KeyCode::Char('4'));
        press(&mut app, KeyCode::Char('.'));
        press(&mut app, KeyCode::Char('5'));
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.filters.temperature.from, Some(4.5));
    }

    #[test]
    fn requests_are_routed_by_kind() {
        let (directory_tx, directory_rx) = mpsc::channel();
        let (measurement_tx, measurement_rx) = mpsc::channel();
        let (_reply_tx, rx) = mpsc::channel();
        let channels = ApiChannels {
            directory_tx,
            measurement_tx,
            rx,
        };
        let mut app = app();
        app.start(Instant::now());
        app.submit_search();
        for request in app.drain_requests() {
            channels.send(request);
        }
        assert!(matches!(directory_rx.try_recv(), Ok(ApiRequest::Session)));
        assert!(matches!(directory_rx.try_recv(), Ok(ApiRequest::Locations(_))));
        assert!(matches!(measurement_rx.try_recv(), Ok(ApiRequest::Measurements(_))));
    }
}
