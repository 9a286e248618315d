//! Latest-wins timers.
//!
//! Each `TimerKind` has at most one pending timer.  Scheduling a kind again
//! aborts the previous task and issues a new token; a firing whose token is
//! not the latest one for its kind is ignored by `accept`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::core::PlayerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    NumericCommit,
    ArrowRepeat,
    LoadingSettle,
    OsdExpiry,
    Watchdog,
}

pub type TimerToken = u64;

pub struct Scheduler {
    tx: mpsc::Sender<PlayerEvent>,
    next_token: TimerToken,
    pending: HashMap<TimerKind, (TimerToken, AbortHandle)>,
}

impl Scheduler {
    pub fn new(tx: mpsc::Sender<PlayerEvent>) -> Self {
        Self {
            tx,
            next_token: 1,
            pending: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) -> TimerToken {
        self.cancel(kind);

        let token = self.next_token;
        self.next_token += 1;

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(PlayerEvent::Timer { kind, token }).await;
        });
        self.pending.insert(kind, (token, handle.abort_handle()));
        token
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some((token, handle)) = self.pending.remove(&kind) {
            debug!("timer {:?}#{} cancelled", kind, token);
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.pending.drain() {
            handle.abort();
        }
    }

    /// Claim a fired timer.  True only for the latest token of `kind`.
    pub fn accept(&mut self, kind: TimerKind, token: TimerToken) -> bool {
        match self.pending.get(&kind) {
            Some((latest, _)) if *latest == token => {
                self.pending.remove(&kind);
                true
            }
            _ => {
                debug!("timer {:?}#{} is stale", kind, token);
                false
            }
        }
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending.contains_key(&kind)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
