//! Owns the streaming engine and at most one live session.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tv_proto::channel::Channel;
use tv_proto::protocol::SessionPhase;

use crate::core::PlayerEvent;
use crate::engine::{EngineEvent, EngineEvents, SessionId, StreamEngine};
use crate::proxy::ProxyRoute;
use crate::session::{PlaybackPath, SessionEffect, StreamSession};

pub struct Playback {
    engine: Box<dyn StreamEngine>,
    route: ProxyRoute,
    event_tx: mpsc::Sender<PlayerEvent>,
    session: Option<StreamSession>,
    /// Session the engine currently holds a source for.
    attached: Option<SessionId>,
    next_id: SessionId,
}

impl Playback {
    pub fn new(
        engine: Box<dyn StreamEngine>,
        route: ProxyRoute,
        event_tx: mpsc::Sender<PlayerEvent>,
    ) -> Self {
        Self {
            engine,
            route,
            event_tx,
            session: None,
            attached: None,
            next_id: 1,
        }
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session
            .as_ref()
            .map_or(SessionPhase::Idle, StreamSession::phase)
    }

    pub fn has_live_session(&self) -> bool {
        self.session.as_ref().is_some_and(StreamSession::is_live)
    }

    /// Tear down whatever is playing and start a fresh session for `channel`.
    pub fn start(&mut self, index: usize, channel: &Channel) -> &StreamSession {
        self.dispose();

        let id = self.next_id;
        self.next_id += 1;

        let path = if self.engine.supports_adaptive() {
            PlaybackPath::Adaptive
        } else {
            PlaybackPath::Native
        };
        let source = self.route.source_for(channel);
        info!(
            "session {}: starting channel {} ({}) via {:?}",
            id, channel.name, source.url, path
        );

        let mut session = StreamSession::new(id, index, channel.clone(), source, path);
        let events = EngineEvents::new(id, self.event_tx.clone());
        match self.engine.attach(session.source(), events) {
            Ok(()) => self.attached = Some(id),
            Err(e) => {
                warn!("session {}: engine refused source: {}", id, e);
                session.reject(e.to_string());
            }
        }

        self.session.insert(session)
    }

    /// Dispose of the current session, releasing the engine.  Idempotent.
    pub fn dispose(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.dispose();
        }
        self.release_engine();
    }

    /// Route an engine event to the session it was tagged with.  Returns the
    /// new phase when the event changed it; stale events are dropped.
    pub fn handle_engine_event(
        &mut self,
        session_id: SessionId,
        event: &EngineEvent,
    ) -> Option<SessionPhase> {
        let session = match self.session.as_mut() {
            Some(s) if s.id() == session_id => s,
            _ => {
                debug!("dropping stale engine event for session {}: {:?}", session_id, event);
                return None;
            }
        };
        let before = session.phase();
        let effects = session.handle(event);
        let after = session.phase();
        self.apply(effects);
        (before != after).then_some(after)
    }

    /// Native-path watchdog expiry for the current session.
    pub fn on_watchdog(&mut self) -> Option<SessionPhase> {
        let session = self.session.as_mut()?;
        let before = session.phase();
        let effects = session.on_watchdog();
        let after = session.phase();
        self.apply(effects);
        (before != after).then_some(after)
    }

    pub fn retarget(&mut self, index: usize) {
        if let Some(session) = self.session.as_mut() {
            session.retarget(index);
        }
    }

    fn apply(&mut self, effects: Vec<SessionEffect>) {
        for effect in effects {
            match effect {
                SessionEffect::Play { muted } => self.engine.play(muted),
                SessionEffect::Recover => self.engine.recover(),
                SessionEffect::Dispose => self.release_engine(),
            }
        }
    }

    fn release_engine(&mut self) {
        if let Some(id) = self.attached.take() {
            debug!("session {}: detaching engine", id);
            self.engine.detach();
        }
    }
}
