//! Interactive Kraken database picker.

use std::io;
use std::time::Duration;

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::{Frame, Terminal};
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::domain::KrakenDatabase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerAction {
    Continue,
    Confirm(Vec<KrakenDatabase>),
    Cancel,
}

/// Selection state, kept apart from drawing so key handling can be tested.
#[derive(Debug, Clone)]
pub struct DatabasePicker {
    selected: [bool; 4],
    cursor: usize,
    message: Option<String>,
}

impl DatabasePicker {
    pub fn new(initial: &[KrakenDatabase]) -> Self {
        let mut selected = [false; 4];
        for (idx, db) in KrakenDatabase::ALL.iter().enumerate() {
            selected[idx] = initial.contains(db);
        }
        Self {
            selected,
            cursor: 0,
            message: None,
        }
    }

    pub fn selection(&self) -> Vec<KrakenDatabase> {
        KrakenDatabase::ALL
            .iter()
            .zip(self.selected)
            .filter(|(_, on)| *on)
            .map(|(db, _)| *db)
            .collect()
    }

    pub fn handle_key(&mut self, code: KeyCode) -> PickerAction {
        self.message = None;
        match code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.cursor = self.cursor.checked_sub(1).unwrap_or(3);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.cursor = (self.cursor + 1) % 4;
            }
            KeyCode::Char(' ') => self.selected[self.cursor] = !self.selected[self.cursor],
            KeyCode::Char(ch) => match KrakenDatabase::from_code(ch) {
                Some(db) => {
                    if let Some(idx) = KrakenDatabase::ALL.iter().position(|item| *item == db) {
                        self.selected[idx] = !self.selected[idx];
                        self.cursor = idx;
                    }
                }
                None if ch == 'q' => return PickerAction::Cancel,
                None => self.message = Some("Invalid input. Use only V, B, P, or A.".to_string()),
            },
            KeyCode::Enter => {
                let selection = self.selection();
                if selection.is_empty() {
                    self.message = Some("Select at least one database.".to_string());
                } else {
                    return PickerAction::Confirm(selection);
                }
            }
            KeyCode::Esc => return PickerAction::Cancel,
            _ => {}
        }
        PickerAction::Continue
    }

    fn lines(&self) -> Vec<Line<'static>> {
        let mut lines = vec![Line::from("Select Kraken databases to use:"), Line::from("")];
        for (idx, db) in KrakenDatabase::ALL.iter().enumerate() {
            let mark = if self.selected[idx] { "[x]" } else { "[ ]" };
            let mut style = Style::default();
            if idx == self.cursor {
                style = style.fg(Color::Cyan).add_modifier(Modifier::BOLD);
            }
            lines.push(Line::from(Span::styled(
                format!("{mark} {} = {}", db.code(), db.as_str()),
                style,
            )));
        }
        lines.push(Line::from(""));
        if let Some(message) = &self.message {
            lines.push(Line::from(Span::styled(
                message.clone(),
                Style::default().fg(Color::Yellow),
            )));
        }
        lines
    }
}

/// Raw mode and the alternate screen, undone on drop so every exit path
/// leaves the terminal usable.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> miette::Result<Self> {
        enable_raw_mode().into_diagnostic()?;
        let guard = Self;
        io::stdout().execute(EnterAlternateScreen).into_diagnostic()?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
    }
}

/// Shows the picker until the user confirms (Enter) or cancels (Esc / q).
pub fn select_databases(
    initial: &[KrakenDatabase],
) -> miette::Result<Option<Vec<KrakenDatabase>>> {
    let mut picker = DatabasePicker::new(initial);
    let _guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout())).into_diagnostic()?;

    run_picker(&mut terminal, &mut picker, || {
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press,
                ..
            }) = event::read()?
            {
                return Ok(Some(code));
            }
        }
        Ok(None)
    })
}

fn run_picker<B, F>(
    terminal: &mut Terminal<B>,
    picker: &mut DatabasePicker,
    mut next_key: F,
) -> miette::Result<Option<Vec<KrakenDatabase>>>
where
    B: Backend,
    F: FnMut() -> io::Result<Option<KeyCode>>,
{
    loop {
        let view = &*picker;
        terminal
            .draw(|frame| draw(frame, view))
            .map_err(|err| miette::miette!("failed to draw picker: {err}"))?;

        if let Some(code) = next_key().into_diagnostic()? {
            match picker.handle_key(code) {
                PickerAction::Continue => {}
                PickerAction::Confirm(selection) => return Ok(Some(selection)),
                PickerAction::Cancel => return Ok(None),
            }
        }
    }
}

fn draw(frame: &mut Frame, picker: &DatabasePicker) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(3)])
        .split(frame.area());
    let body = Paragraph::new(picker.lines())
        .block(Block::default().borders(Borders::ALL).title("Kraken"));
    let help = Paragraph::new("V/B/P/A or space: toggle  ↑/↓: move  Enter: confirm  Esc: cancel")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(body, chunks[0]);
    frame.render_widget(help, chunks[1]);
}
