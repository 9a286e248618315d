//! Minimal terminal renderer.  Redraws from the published snapshot whenever
//! the core broadcasts a change.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{self, Clear, ClearType},
};
use tokio::sync::broadcast;
use tracing::debug;
use tv_proto::protocol::{AvailabilityStatus, PlayerSnapshot, SessionPhase};

use crate::state::StateManager;
use crate::BroadcastMessage;

const LIST_TOP: u16 = 3;

/// Which channels the on-screen list currently shows, for mapping clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListWindow {
    pub top_row: u16,
    pub first: usize,
    pub rows: usize,
}

impl ListWindow {
    pub fn index_at(&self, row: u16) -> Option<usize> {
        let offset = row.checked_sub(self.top_row)? as usize;
        (offset < self.rows).then_some(self.first + offset)
    }
}

pub type SharedListWindow = Arc<Mutex<Option<ListWindow>>>;

pub fn spawn_view(
    state_manager: Arc<StateManager>,
    mut rx: broadcast::Receiver<BroadcastMessage>,
    window: SharedListWindow,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_log: Option<String> = None;
        loop {
            match rx.recv().await {
                Ok(BroadcastMessage::StateUpdated) => {}
                Ok(BroadcastMessage::Log(line)) => last_log = Some(line),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("view lagged {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }

            let snapshot = state_manager.get_state().await;
            let (_, height) = terminal::size().unwrap_or((80, 24));
            let mut out = io::stdout();
            match render(&mut out, &snapshot, last_log.as_deref(), height) {
                Ok(shown) => {
                    if let Ok(mut w) = window.lock() {
                        *w = shown;
                    }
                }
                Err(e) => debug!("view: render failed: {}", e),
            }
        }
    })
}

fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle => "idle",
        SessionPhase::Loading => "loading",
        SessionPhase::Playing => "playing",
        SessionPhase::Recovering => "recovering",
        SessionPhase::Failed => "failed",
        SessionPhase::Disposed => "stopped",
    }
}

fn status_glyph(status: AvailabilityStatus) -> &'static str {
    match status {
        AvailabilityStatus::Checking => "…",
        AvailabilityStatus::Online => "●",
        AvailabilityStatus::Offline => "✕",
    }
}

/// First list row so that `focus` stays on screen.
fn first_visible(focus: usize, rows: usize) -> usize {
    if rows == 0 {
        0
    } else {
        focus.saturating_sub(rows - 1)
    }
}

fn render(
    out: &mut impl Write,
    snapshot: &PlayerSnapshot,
    last_log: Option<&str>,
    height: u16,
) -> io::Result<Option<ListWindow>> {
    queue!(out, MoveTo(0, 0), Clear(ClearType::All))?;

    let header = match snapshot.active_channel() {
        Some(channel) => format!(
            "{}. {}  [{}]",
            snapshot.active_index.map_or(0, |i| i + 1),
            channel.name,
            phase_label(snapshot.phase)
        ),
        None => "No channel".to_string(),
    };
    queue!(out, SetAttribute(Attribute::Bold), Print(header), SetAttribute(Attribute::Reset))?;

    let status = if snapshot.channel_error {
        Some("Channel unavailable".to_string())
    } else if snapshot.loading {
        Some("Loading…".to_string())
    } else {
        None
    };
    queue!(out, MoveTo(0, 1))?;
    if let Some(status) = status {
        queue!(out, Print(status))?;
    }
    if let Some(osd) = &snapshot.osd {
        queue!(out, MoveTo(40, 1), SetAttribute(Attribute::Reverse), Print(format!(" {} ", osd)), SetAttribute(Attribute::Reset))?;
    }

    let mut shown = None;
    if snapshot.list_visible {
        let rows = height.saturating_sub(LIST_TOP + 1) as usize;
        let focus = snapshot.highlight.or(snapshot.active_index).unwrap_or(0);
        let first = first_visible(focus, rows);
        let entries = snapshot.channels.iter().skip(first).take(rows);
        for (offset, entry) in entries.enumerate() {
            let index = first + offset;
            let marker = if Some(index) == snapshot.highlight {
                ">"
            } else if Some(index) == snapshot.active_index {
                "*"
            } else {
                " "
            };
            queue!(
                out,
                MoveTo(0, LIST_TOP + offset as u16),
                Print(format!(
                    "{} {} {:>3}. {}",
                    marker,
                    status_glyph(entry.status),
                    entry.number,
                    entry.channel.name
                ))
            )?;
        }
        shown = Some(ListWindow {
            top_row: LIST_TOP,
            first,
            rows: rows.min(snapshot.channels.len().saturating_sub(first)),
        });
    }

    if let Some(line) = last_log {
        queue!(out, MoveTo(0, height.saturating_sub(1)), Print(line))?;
    }
    out.flush()?;
    Ok(shown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_at() {
        let window = ListWindow {
            top_row: 3,
            first: 0,
            rows: 2,
        };
        assert_eq!(window.index_at(2), None);
        assert_eq!(window.index_at(3), Some(0));
        assert_eq!(window.index_at(4), Some(1));
        assert_eq!(window.index_at(5), None);
    }

    #[test]
    fn test_focus_kept_visible() {
        assert_eq!(first_visible(3, 10), 0);
        assert_eq!(first_visible(25, 10), 16);
        assert_eq!(first_visible(5, 0), 0);
    }
}
