//! The seam between the player and whatever actually decodes the stream.
//!
//! Commands go in synchronously through `StreamEngine`; everything the
//! engine observes comes back later as an `EngineEvent` tagged with the
//! session it was attached for, delivered on the core's event channel.

use tokio::sync::mpsc;
use tracing::debug;
use tv_proto::error::EngineError;
use tv_proto::protocol::StreamErrorKind;

use crate::core::PlayerEvent;

pub type SessionId = u64;

/// Where and how to fetch a stream.  Already routed through the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSource {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Everything an engine may report about an attached source.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Adaptive path: the variant manifest has been read.
    ManifestParsed,
    /// Adaptive path: media data is being appended.
    BufferAppending,
    PlayStarted { muted: bool },
    PlayRejected { muted: bool, reason: String },
    /// Native path: enough metadata is known to start playback.
    MetadataLoaded,
    Progress { position_secs: f64, paused: bool },
    Stalled,
    Error {
        fatal: bool,
        kind: StreamErrorKind,
        details: String,
    },
}

/// Event sink handed to the engine on `attach`.  Every event sent through
/// it carries the id of the session it belongs to.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    session: SessionId,
    tx: mpsc::Sender<PlayerEvent>,
}

impl EngineEvents {
    pub fn new(session: SessionId, tx: mpsc::Sender<PlayerEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub async fn send(&self, event: EngineEvent) {
        let msg = PlayerEvent::Engine {
            session: self.session,
            event,
        };
        if self.tx.send(msg).await.is_err() {
            debug!("engine event for session {} dropped: core gone", self.session);
        }
    }
}

/// A media engine able to play one source at a time.
///
/// `attach` is only ever called after `detach` released the previous
/// source, so an implementation never holds two sources at once.
pub trait StreamEngine: Send {
    /// True for the adaptive (manifest-driven) path, false for the native one.
    fn supports_adaptive(&self) -> bool;

    fn attach(&mut self, source: &StreamSource, events: EngineEvents) -> Result<(), EngineError>;

    /// Start playback.  The outcome arrives as `PlayStarted` or `PlayRejected`.
    fn play(&mut self, muted: bool);

    /// Restart loading the attached source in place after a fatal error.
    fn recover(&mut self);

    /// Release the attached source.  Events already in flight keep the
    /// released session's id; nothing is reported for it after that.
    fn detach(&mut self);
}
