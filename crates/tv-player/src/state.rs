use std::sync::Arc;

use tokio::sync::RwLock;
use tv_proto::protocol::PlayerSnapshot;

/// Shared read side of the player state.  Only `PlayerCore` publishes; the
/// HTTP API and the view read.
#[derive(Debug, Default)]
pub struct StateManager {
    state: Arc<RwLock<PlayerSnapshot>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_state(&self) -> PlayerSnapshot {
        self.state.read().await.clone()
    }

    /// Replace the snapshot if anything besides `rev` changed.  Returns
    /// whether it did; `rev` is bumped on every accepted change.
    pub async fn publish(&self, mut snapshot: PlayerSnapshot) -> bool {
        let mut state = self.state.write().await;
        snapshot.rev = state.rev;
        if *state == snapshot {
            return false;
        }
        snapshot.rev = state.rev + 1;
        *state = snapshot;
        true
    }
}
