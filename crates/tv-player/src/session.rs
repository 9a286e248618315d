//! One attempt to play one channel.
//!
//! `StreamSession` is a pure state machine: it consumes `EngineEvent`s and
//! returns the `SessionEffect`s the owner must carry out on the engine.
//! Once `Failed` or `Disposed` it ignores everything.

use tracing::{debug, info, warn};
use tv_proto::channel::Channel;
use tv_proto::protocol::{SessionPhase, StreamFault};

use crate::engine::{EngineEvent, SessionId, StreamSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPath {
    /// Manifest-driven engine with in-place recovery.
    Adaptive,
    /// Plain source assignment, guarded by the no-progress watchdog.
    Native,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    Play { muted: bool },
    Recover,
    /// Release the engine; the session has reached a terminal phase.
    Dispose,
}

#[derive(Debug, Clone)]
pub struct StreamSession {
    id: SessionId,
    index: usize,
    channel: Channel,
    source: StreamSource,
    path: PlaybackPath,
    phase: SessionPhase,
    fault: Option<StreamFault>,
    /// Set while the single in-place recovery of the current incident is used up.
    recovery_spent: bool,
    progressed: bool,
    last_position: Option<f64>,
}

impl StreamSession {
    pub fn new(
        id: SessionId,
        index: usize,
        channel: Channel,
        source: StreamSource,
        path: PlaybackPath,
    ) -> Self {
        Self {
            id,
            index,
            channel,
            source,
            path,
            phase: SessionPhase::Loading,
            fault: None,
            recovery_spent: false,
            progressed: false,
            last_position: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    pub fn path(&self) -> PlaybackPath {
        self.path
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn fault(&self) -> Option<&StreamFault> {
        self.fault.as_ref()
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.phase, SessionPhase::Failed | SessionPhase::Disposed)
    }

    /// The roster was replaced and this channel moved to `index`.
    pub fn retarget(&mut self, index: usize) {
        self.index = index;
    }

    pub fn handle(&mut self, event: &EngineEvent) -> Vec<SessionEffect> {
        if !self.is_live() {
            debug!("session {}: ignoring {:?} in {:?}", self.id, event, self.phase);
            return Vec::new();
        }

        match event {
            EngineEvent::ManifestParsed | EngineEvent::MetadataLoaded => {
                self.phase = SessionPhase::Playing;
                vec![SessionEffect::Play { muted: false }]
            }
            EngineEvent::BufferAppending => {
                self.mark_healthy();
                Vec::new()
            }
            EngineEvent::PlayStarted { muted } => {
                info!("session {}: playing (muted={})", self.id, muted);
                self.progressed = true;
                self.phase = SessionPhase::Playing;
                self.recovery_spent = false;
                Vec::new()
            }
            EngineEvent::PlayRejected { muted: false, reason } => {
                info!("session {}: autoplay refused ({}), retrying muted", self.id, reason);
                vec![SessionEffect::Play { muted: true }]
            }
            EngineEvent::PlayRejected { muted: true, reason } => {
                self.fail(StreamFault::AutoplayRejected(reason.clone()))
            }
            EngineEvent::Progress {
                position_secs,
                paused,
            } => {
                let advanced = self
                    .last_position
                    .map_or(*position_secs > 0.0, |prev| *position_secs > prev);
                if *position_secs > 0.0 || !*paused {
                    self.progressed = true;
                }
                self.last_position = Some(*position_secs);
                if advanced {
                    self.mark_healthy();
                }
                Vec::new()
            }
            EngineEvent::Stalled => match self.path {
                PlaybackPath::Native if !self.progressed => self.fail(StreamFault::NoProgress),
                _ => {
                    debug!("session {}: stalled", self.id);
                    Vec::new()
                }
            },
            EngineEvent::Error { fatal: false, details, .. } => {
                debug!("session {}: non-fatal engine error: {}", self.id, details);
                Vec::new()
            }
            EngineEvent::Error {
                fatal: true,
                kind,
                details,
            } => {
                let can_recover = self.path == PlaybackPath::Adaptive
                    && kind.is_recoverable()
                    && !self.recovery_spent
                    && self.phase != SessionPhase::Recovering;
                if can_recover {
                    warn!(
                        "session {}: fatal {:?} error ({}), recovering in place",
                        self.id, kind, details
                    );
                    self.recovery_spent = true;
                    self.phase = SessionPhase::Recovering;
                    vec![SessionEffect::Recover]
                } else {
                    self.fail(StreamFault::from_error(*kind, details.clone()))
                }
            }
        }
    }

    /// The native-path watchdog fired.
    pub fn on_watchdog(&mut self) -> Vec<SessionEffect> {
        if self.path == PlaybackPath::Native && self.is_live() && !self.progressed {
            return self.fail(StreamFault::NoProgress);
        }
        Vec::new()
    }

    /// The engine would not even accept the source.
    pub fn reject(&mut self, reason: String) {
        self.fail(StreamFault::EngineRejected(reason));
    }

    /// Terminal teardown when the user moves on.  Idempotent; a failed
    /// session keeps its fault.
    pub fn dispose(&mut self) {
        if self.is_live() {
            self.phase = SessionPhase::Disposed;
        }
    }

    fn mark_healthy(&mut self) {
        if self.phase == SessionPhase::Recovering {
            info!("session {}: recovered", self.id);
            self.phase = SessionPhase::Playing;
            self.recovery_spent = false;
        }
    }

    fn fail(&mut self, fault: StreamFault) -> Vec<SessionEffect> {
        warn!(
            "session {} ({}): failed: {:?}",
            self.id, self.channel.name, fault
        );
        self.phase = SessionPhase::Failed;
        self.fault = Some(fault);
        vec![SessionEffect::Dispose]
    }
}
