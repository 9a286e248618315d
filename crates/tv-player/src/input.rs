//! Terminal keyboard and mouse input, mapped onto navigation keys.

use std::time::Duration;

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
    MouseEventKind,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::core::PlayerEvent;
use crate::navigation::Key;
use crate::view::{ListWindow, SharedListWindow};

pub fn map_key(event: &KeyEvent) -> Option<Key> {
    if event.kind != KeyEventKind::Press {
        return None;
    }
    let key = match event.code {
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => Key::Quit,
        KeyCode::Char(c) if c.is_ascii_digit() => Key::Digit(c as u8 - b'0'),
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Escape,
        KeyCode::Char('r') => Key::Refresh,
        KeyCode::Char('f') => Key::ToggleFullscreen,
        KeyCode::Char('q') => Key::Quit,
        _ => return None,
    };
    Some(key)
}

pub fn map_mouse(event: &MouseEvent, window: Option<ListWindow>) -> Option<Key> {
    match event.kind {
        MouseEventKind::Down(MouseButton::Left) => window?.index_at(event.row).map(Key::Click),
        MouseEventKind::ScrollUp => Some(Key::Up),
        MouseEventKind::ScrollDown => Some(Key::Down),
        _ => None,
    }
}

/// Read terminal events on a blocking thread until the core goes away.
pub fn spawn_input(
    tx: mpsc::Sender<PlayerEvent>,
    window: SharedListWindow,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || loop {
        match event::poll(Duration::from_millis(250)) {
            Ok(false) => {
                if tx.is_closed() {
                    break;
                }
                continue;
            }
            Ok(true) => {}
            Err(e) => {
                warn!("input: poll failed: {}", e);
                break;
            }
        }

        let key = match event::read() {
            Ok(Event::Key(k)) => map_key(&k),
            Ok(Event::Mouse(m)) => {
                let current = window.lock().ok().and_then(|w| *w);
                map_mouse(&m, current)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("input: read failed: {}", e);
                break;
            }
        };

        if let Some(key) = key {
            debug!("input: {:?}", key);
            if tx.blocking_send(PlayerEvent::Input(key)).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_remote_keys() {
        assert_eq!(map_key(&press(KeyCode::Char('7'))), Some(Key::Digit(7)));
        assert_eq!(map_key(&press(KeyCode::PageDown)), Some(Key::PageDown));
        assert_eq!(map_key(&press(KeyCode::Esc)), Some(Key::Escape));
        assert_eq!(map_key(&press(KeyCode::Char('x'))), None);

        let mut release = press(KeyCode::Enter);
        release.kind = KeyEventKind::Release;
        assert_eq!(map_key(&release), None);
    }

    #[test]
    fn test_click_maps_through_list_window() {
        let window = ListWindow {
            top_row: 3,
            first: 10,
            rows: 5,
        };
        let click = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 4,
            row: 5,
            modifiers: KeyModifiers::NONE,
        };
        assert_eq!(map_mouse(&click, Some(window)), Some(Key::Click(12)));
        assert_eq!(map_mouse(&click, None), None);
    }
}
