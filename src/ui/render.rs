use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use super::app::App;
use crate::config::InputMode;
use crate::lifecycle::LifecycleState;
use crate::types::note::note_name;

/// Render the TUI
pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Length(3), // Instrument / tuning / octave
            Constraint::Min(6),    // Notes and status
            Constraint::Length(4), // Help text
        ])
        .split(frame.size());

    render_title(frame, chunks[0]);
    render_selection(frame, chunks[1], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[2]);
    render_notes(frame, body[0], app);
    render_status(frame, body[1], app);

    render_help(frame, chunks[3], app);
}

/// Render title bar
fn render_title(frame: &mut Frame, area: Rect) {
    let title = Paragraph::new("Serpentone - Polyphonic Keyboard")
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));

    frame.render_widget(title, area);
}

fn render_selection(frame: &mut Frame, area: Rect, app: &App) {
    let label = Style::default().fg(Color::Gray);
    let value = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);

    let mut spans = vec![
        Span::styled("Instrument: ", label),
        Span::styled(app.instrument.clone(), value),
        Span::raw("   "),
        Span::styled("Tuning: ", label),
        Span::styled(app.tuning.clone(), value),
    ];
    if let Some(octave) = app.octave {
        spans.push(Span::raw("   "));
        spans.push(Span::styled("Octave: ", label));
        spans.push(Span::styled(octave.to_string(), value));
    }
    spans.push(Span::raw("   "));
    spans.push(Span::styled("Engine: ", label));
    spans.push(Span::styled(app.lifecycle.to_string(), lifecycle_style(app.lifecycle)));

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

fn lifecycle_style(state: LifecycleState) -> Style {
    let color = match state {
        LifecycleState::Ready => Color::Green,
        LifecycleState::EngineBooting | LifecycleState::ShuttingDown => Color::Yellow,
        LifecycleState::Idle | LifecycleState::Stopped => Color::Red,
    };
    Style::default().fg(color)
}

/// Render sounding notes with frequency and a velocity bar
fn render_notes(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .notes
        .iter()
        .map(|(pitch, note)| {
            let bar = "█".repeat((note.velocity / 16) as usize);
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<4} {:>3}  {:>8.2} Hz  ", note_name(*pitch), pitch, note.frequency),
                    Style::default().fg(Color::White),
                ),
                Span::styled(bar, Style::default().fg(Color::Green)),
            ]))
        })
        .collect();

    let title = format!("Notes ({})", app.notes.len());
    let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(list, area);
}

/// Render the most recent status lines, newest at the bottom
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let visible = area.height.saturating_sub(2) as usize;
    let skip = app.status_log.len().saturating_sub(visible);

    let items: Vec<ListItem> = app
        .status_log
        .iter()
        .skip(skip)
        .map(|(elapsed, text)| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("[{:>7.2}s] ", elapsed.as_secs_f64()),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(text.clone()),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().title("Status").borders(Borders::ALL));
    frame.render_widget(list, area);
}

/// Render help text
fn render_help(frame: &mut Frame, area: Rect, app: &App) {
    let help_text = match app.input_mode {
        InputMode::Qwerty => vec![
            Line::from("Notes: A W S E D F T G Y H U J K O L P ; '  |  Z/X: Octave -/+"),
            Line::from("C: Next instrument  |  V: Next tuning  |  Esc/Ctrl-C: Quit"),
        ],
        InputMode::Midi => vec![
            Line::from("Play notes on the connected MIDI keyboard"),
            Line::from("Q/Esc/Ctrl-C: Quit"),
        ],
    };

    let help = Paragraph::new(help_text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default().fg(Color::Gray));
    frame.render_widget(help, area);
}
