use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use std::time::Duration;

use super::app::App;
use crate::input::keyboard::is_quit_key;

/// Handle terminal events when no keyboard listener owns the terminal
pub fn handle_events(app: &mut App, timeout: Duration) -> anyhow::Result<()> {
    if event::poll(timeout)? {
        if let Event::Key(key) = event::read()? {
            handle_key_event(app, key);
        }
    }
    Ok(())
}

/// Process individual key press
fn handle_key_event(app: &mut App, key: KeyEvent) {
    if key.kind != KeyEventKind::Press {
        return;
    }
    if is_quit_key(&key) || matches!(key.code, KeyCode::Char('q')) {
        app.quit();
    }
}
