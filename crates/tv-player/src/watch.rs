//! Background refresh triggers: a fixed-interval ticker and a watcher on the
//! roster change marker that admin tooling bumps after every edit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::{PlayerEvent, RefreshReason};

pub fn spawn_refresh_ticker(interval: Duration, tx: mpsc::Sender<PlayerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately; the initial load is separate
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if tx
                .send(PlayerEvent::Refresh(RefreshReason::Timed))
                .await
                .is_err()
            {
                break;
            }
        }
    })
}

/// Poll `marker` every `poll` and request a refresh whenever its contents
/// change, including when it first appears or disappears.
pub fn spawn_change_watcher(
    marker: PathBuf,
    poll: Duration,
    tx: mpsc::Sender<PlayerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("watching {} for roster changes", marker.display());
        let mut last = read_marker(&marker).await;
        loop {
            tokio::time::sleep(poll).await;
            let current = read_marker(&marker).await;
            if current != last {
                debug!("change marker moved: {:?} -> {:?}", last, current);
                last = current;
                if tx
                    .send(PlayerEvent::Refresh(RefreshReason::External))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    })
}

async fn read_marker(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
}
