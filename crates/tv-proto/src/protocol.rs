use serde::{Deserialize, Serialize};

use crate::channel::Channel;

/// Control commands accepted by the player core from outside the keyboard
/// path (local HTTP API, tests).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Select by 0-based index.  Same path as a click on a list entry.
    Select { index: usize },
    Next,
    Prev,
    Refresh,
    GetState,
}

/// Stream session lifecycle as exposed to observers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Loading,
    Playing,
    Recovering,
    Failed,
    Disposed,
}

impl SessionPhase {
    /// Phases during which the loading indicator must be visible.
    pub fn is_busy(self) -> bool {
        matches!(self, SessionPhase::Loading | SessionPhase::Recovering)
    }
}

/// Classification of a streaming-engine error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StreamErrorKind {
    Network,
    Media,
    Other,
}

impl StreamErrorKind {
    /// Network and media faults may be recovered in place.
    pub fn is_recoverable(self) -> bool {
        matches!(self, StreamErrorKind::Network | StreamErrorKind::Media)
    }
}

/// Why a session ended up `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StreamFault {
    /// Fatal network error that in-place recovery did not fix.
    FatalNetwork(String),
    /// Fatal media error that in-place recovery did not fix.
    FatalMedia(String),
    /// Unknown fatal error; never recovered.
    FatalOther(String),
    /// Playback refused even when muted.
    AutoplayRejected(String),
    /// Native path made no progress before the watchdog fired.
    NoProgress,
    /// The engine refused to accept the source at all.
    EngineRejected(String),
}

impl StreamFault {
    pub fn from_error(kind: StreamErrorKind, details: String) -> Self {
        match kind {
            StreamErrorKind::Network => StreamFault::FatalNetwork(details),
            StreamErrorKind::Media => StreamFault::FatalMedia(details),
            StreamErrorKind::Other => StreamFault::FatalOther(details),
        }
    }
}

/// Per-channel reachability as reported by the availability prober.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AvailabilityStatus {
    #[default]
    Checking,
    Online,
    Offline,
}

/// Diagnostic detail for an offline classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeFailure {
    pub target: String,
    pub status: Option<u16>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelEntry {
    /// 1-based number shown on screen and used for numeric entry.
    pub number: usize,
    #[serde(flatten)]
    pub channel: Channel,
    pub status: AvailabilityStatus,
}

/// Full observable state of the player.  `rev` increases on every change.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PlayerSnapshot {
    #[serde(default)]
    pub rev: u64,
    pub channels: Vec<ChannelEntry>,
    pub active_index: Option<usize>,
    pub session_id: Option<u64>,
    pub phase: SessionPhase,
    pub fault: Option<StreamFault>,
    pub loading: bool,
    pub channel_error: bool,
    pub list_visible: bool,
    pub highlight: Option<usize>,
    pub osd: Option<String>,
    pub fullscreen: bool,
}

impl PlayerSnapshot {
    pub fn active_channel(&self) -> Option<&Channel> {
        self.active_index
            .and_then(|i| self.channels.get(i))
            .map(|e| &e.channel)
    }
}
