/// PlayerCore: single-owner event loop for all mutable player state.
///
/// Keyboard input, the HTTP API, timers, list fetches, availability probes
/// and the streaming engine all feed `PlayerEvent`s into this loop.  Nothing
/// else touches the roster, the session or the indicators.  Long-running
/// work (fetches, probes) is spawned and reports back through the same
/// channel, so every state transition happens here, one event at a time.
///
/// After each event the snapshot is republished through `StateManager` and,
/// when it changed, `BroadcastMessage::StateUpdated` is sent.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tv_proto::channel::ChannelList;
use tv_proto::config::Config;
use tv_proto::error::FetchError;
use tv_proto::protocol::{
    AvailabilityStatus, ChannelEntry, Command, PlayerSnapshot, ProbeFailure, SessionPhase,
};

use crate::engine::{EngineEvent, SessionId, StreamEngine};
use crate::navigation::{Key, NavCommand, NavContext, Navigator};
use crate::playback::Playback;
use crate::prober::Prober;
use crate::proxy::ProxyRoute;
use crate::scheduler::{Scheduler, TimerKind, TimerToken};
use crate::session::PlaybackPath;
use crate::source::{self, ChannelSource, FetchedList};
use crate::state::StateManager;
use crate::ui_state::{self, UiDirective, UiSignal, UiState};
use crate::watch;
use crate::BroadcastMessage;

// ── PlayerEvent ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Initial,
    Manual,
    Timed,
    /// The roster change marker moved.
    External,
}

/// All inputs into the PlayerCore loop.
#[derive(Debug)]
pub enum PlayerEvent {
    Input(Key),
    /// A command from the HTTP API.
    Command(Command),
    Engine {
        session: SessionId,
        event: EngineEvent,
    },
    Timer {
        kind: TimerKind,
        token: TimerToken,
    },
    Refresh(RefreshReason),
    ChannelsFetched {
        reason: RefreshReason,
        result: Result<FetchedList, FetchError>,
    },
    ProbeFinished {
        round: u64,
        index: usize,
        status: AvailabilityStatus,
        failure: Option<ProbeFailure>,
    },
    Shutdown,
}

struct ProbeRound {
    round: u64,
    pending: usize,
    settled: bool,
}

// ── PlayerCore ────────────────────────────────────────────────────────────────

pub struct PlayerCore {
    config: Config,
    source: ChannelSource,
    client: reqwest::Client,
    /// `None` when probing is disabled.
    prober: Option<Prober>,
    state_manager: Arc<StateManager>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
    event_tx: mpsc::Sender<PlayerEvent>,
    scheduler: Scheduler,
    playback: Playback,
    navigator: Navigator,
    ui: UiState,
    channels: ChannelList,
    availability: Vec<AvailabilityStatus>,
    active: Option<usize>,
    fetch_in_flight: bool,
    /// A refresh requested while a fetch was in flight.  Later requests
    /// coalesce into this one.
    refresh_queued: Option<RefreshReason>,
    probe_round: ProbeRound,
    quit: bool,
}

impl PlayerCore {
    pub fn new(
        config: Config,
        engine: Box<dyn StreamEngine>,
        broadcast_tx: broadcast::Sender<BroadcastMessage>,
        event_tx: mpsc::Sender<PlayerEvent>,
    ) -> anyhow::Result<Self> {
        let route = ProxyRoute::from_config(&config.proxy);
        let client = source::build_client(Duration::from_secs(config.source.fetch_timeout_secs))?;
        let prober = if config.probe.enabled {
            Some(Prober::new(
                route.clone(),
                Duration::from_secs(config.probe.timeout_secs),
            )?)
        } else {
            None
        };

        Ok(Self {
            source: ChannelSource::from_config(&config.source),
            client,
            prober,
            state_manager: Arc::new(StateManager::new()),
            broadcast_tx,
            scheduler: Scheduler::new(event_tx.clone()),
            playback: Playback::new(engine, route, event_tx.clone()),
            event_tx,
            navigator: Navigator::new(),
            ui: UiState::default(),
            channels: ChannelList::default(),
            availability: Vec::new(),
            active: None,
            fetch_in_flight: false,
            refresh_queued: None,
            probe_round: ProbeRound {
                round: 0,
                pending: 0,
                settled: true,
            },
            quit: false,
            config,
        })
    }

    /// Borrow the state manager (for use by the HTTP server and the view).
    pub fn state_manager(&self) -> Arc<StateManager> {
        Arc::clone(&self.state_manager)
    }

    pub fn is_quitting(&self) -> bool {
        self.quit
    }

    /// Run the core event loop.  Returns on `Shutdown`, on a quit key, or
    /// when every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PlayerEvent>) -> anyhow::Result<()> {
        info!("PlayerCore: starting event loop");

        let mut background = Vec::new();
        if self.config.source.refresh_interval_secs > 0 {
            background.push(watch::spawn_refresh_ticker(
                Duration::from_secs(self.config.source.refresh_interval_secs),
                self.event_tx.clone(),
            ));
        }
        if let Some(marker) = self.config.source.change_marker.clone() {
            background.push(watch::spawn_change_watcher(
                marker,
                Duration::from_millis(self.config.source.change_poll_ms),
                self.event_tx.clone(),
            ));
        }

        self.publish().await;

        loop {
            match event_rx.recv().await {
                None => {
                    info!("PlayerCore: event channel closed, shutting down");
                    break;
                }
                Some(PlayerEvent::Shutdown) => {
                    info!("PlayerCore: shutdown requested");
                    break;
                }
                Some(evt) => {
                    self.handle_event(evt).await;
                    if self.quit {
                        info!("PlayerCore: quit requested");
                        break;
                    }
                }
            }
        }

        for task in background {
            task.abort();
        }
        self.cleanup();
        Ok(())
    }

    /// Apply one event and republish the snapshot.
    pub async fn handle_event(&mut self, evt: PlayerEvent) {
        match evt {
            PlayerEvent::Input(key) => {
                let cmds = self.navigator.handle_key(key, self.nav_context());
                self.run_nav(cmds);
            }
            PlayerEvent::Command(cmd) => self.handle_command(cmd),
            PlayerEvent::Engine { session, event } => {
                if let Some(phase) = self.playback.handle_engine_event(session, &event) {
                    self.signal(UiSignal::Phase(phase));
                }
            }
            PlayerEvent::Timer { kind, token } => self.handle_timer(kind, token),
            PlayerEvent::Refresh(reason) => self.request_refresh(reason),
            PlayerEvent::ChannelsFetched { reason, result } => {
                self.handle_fetched(reason, result);
            }
            PlayerEvent::ProbeFinished {
                round,
                index,
                status,
                failure,
            } => self.handle_probe(round, index, status, failure),
            PlayerEvent::Shutdown => {
                self.quit = true;
            }
        }
        self.publish().await;
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let session = self.playback.session();
        PlayerSnapshot {
            rev: 0,
            channels: self
                .channels
                .iter()
                .enumerate()
                .map(|(i, channel)| ChannelEntry {
                    number: i + 1,
                    channel: channel.clone(),
                    status: self.availability.get(i).copied().unwrap_or_default(),
                })
                .collect(),
            active_index: self.active,
            session_id: session.map(|s| s.id()),
            phase: self.playback.phase(),
            fault: session.and_then(|s| s.fault().cloned()),
            loading: self.ui.loading,
            channel_error: self.ui.channel_error,
            list_visible: self.ui.list_visible,
            highlight: self.navigator.highlight(),
            osd: self.ui.osd.clone(),
            fullscreen: self.navigator.fullscreen(),
        }
    }

    // ── commands / navigation ─────────────────────────────────────────────────

    fn handle_command(&mut self, cmd: Command) {
        info!("PlayerCore: command {:?}", cmd);
        match cmd {
            Command::Select { index } => {
                let cmds = self
                    .navigator
                    .handle_key(Key::Click(index), self.nav_context());
                self.run_nav(cmds);
            }
            Command::Next => self.step(true),
            Command::Prev => self.step(false),
            Command::Refresh => self.request_refresh(RefreshReason::Manual),
            Command::GetState => {}
        }
    }

    fn run_nav(&mut self, cmds: Vec<NavCommand>) {
        for cmd in cmds {
            match cmd {
                NavCommand::SelectIndex(index) => self.select(index, false),
                NavCommand::Next => self.step(true),
                NavCommand::Previous => self.step(false),
                NavCommand::SetListVisible(visible) => {
                    let open = self.navigator.set_list_visible(visible, self.active);
                    if !open {
                        self.scheduler.cancel(TimerKind::ArrowRepeat);
                    }
                    self.signal(UiSignal::ListVisibility(open));
                }
                NavCommand::Highlight(index) => debug!("highlight channel {}", index + 1),
                NavCommand::ScheduleNumericCommit => {
                    self.scheduler.schedule(
                        TimerKind::NumericCommit,
                        self.config.navigation.numeric_commit(),
                    );
                }
                NavCommand::CancelNumericCommit => self.scheduler.cancel(TimerKind::NumericCommit),
                NavCommand::ScheduleArrow => {
                    self.scheduler.schedule(
                        TimerKind::ArrowRepeat,
                        self.config.navigation.arrow_debounce(),
                    );
                }
                NavCommand::CancelArrow => self.scheduler.cancel(TimerKind::ArrowRepeat),
                NavCommand::ShowOsd(text) => self.signal(UiSignal::Osd(text)),
                NavCommand::InvalidSelection(text) => self.notice(text),
                NavCommand::SetFullscreen(on) => self.navigator.set_fullscreen(on),
                NavCommand::Refresh => self.request_refresh(RefreshReason::Manual),
                NavCommand::Quit => self.quit = true,
            }
        }
    }

    fn nav_context(&self) -> NavContext {
        NavContext {
            len: self.channels.len(),
            active: self.active,
        }
    }

    fn step(&mut self, forward: bool) {
        let target = match self.active {
            Some(active) if forward => self.channels.next_index(active),
            Some(active) => self.channels.prev_index(active),
            None => (!self.channels.is_empty()).then_some(0),
        };
        if let Some(index) = target {
            self.select(index, false);
        }
    }

    /// Make `index` the active channel and start a session for it.
    /// Re-selecting the channel that is already playing does nothing unless
    /// `force` is set; a failed session is always retried.
    fn select(&mut self, index: usize, force: bool) {
        let Some(channel) = self.channels.get(index).cloned() else {
            self.notice(format!("No channel {}", index + 1));
            return;
        };
        if !force && self.active == Some(index) && self.playback.has_live_session() {
            debug!("channel {} already active", index + 1);
            return;
        }

        self.active = Some(index);
        self.scheduler.cancel(TimerKind::Watchdog);
        let (phase, path) = {
            let session = self.playback.start(index, &channel);
            (session.phase(), session.path())
        };
        if path == PlaybackPath::Native && phase == SessionPhase::Loading {
            self.scheduler.schedule(
                TimerKind::Watchdog,
                Duration::from_secs(self.config.playback.native_watchdog_secs),
            );
        }
        self.signal(UiSignal::Phase(phase));
    }

    // ── timers ────────────────────────────────────────────────────────────────

    fn handle_timer(&mut self, kind: TimerKind, token: TimerToken) {
        if !self.scheduler.accept(kind, token) {
            return;
        }
        match kind {
            TimerKind::NumericCommit => {
                let cmds = self.navigator.commit_numeric(self.nav_context());
                self.run_nav(cmds);
            }
            TimerKind::ArrowRepeat => {
                let cmds = self.navigator.fire_arrow(self.nav_context());
                self.run_nav(cmds);
            }
            TimerKind::LoadingSettle => self.signal(UiSignal::SettleElapsed),
            TimerKind::OsdExpiry => self.signal(UiSignal::OsdExpired),
            TimerKind::Watchdog => {
                if let Some(phase) = self.playback.on_watchdog() {
                    self.signal(UiSignal::Phase(phase));
                }
            }
        }
    }

    // ── roster ────────────────────────────────────────────────────────────────

    fn request_refresh(&mut self, reason: RefreshReason) {
        if self.fetch_in_flight {
            debug!("refresh ({:?}) coalesced into the pending fetch", reason);
            self.refresh_queued = Some(reason);
            return;
        }
        self.fetch_in_flight = true;
        info!(
            "PlayerCore: fetching channel list ({:?}) from {}",
            reason,
            self.source.url()
        );
        self.signal(UiSignal::FetchStarted);

        let source = self.source.clone();
        let client = self.client.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch(&client).await;
            let _ = tx.send(PlayerEvent::ChannelsFetched { reason, result }).await;
        });
    }

    fn handle_fetched(&mut self, reason: RefreshReason, result: Result<FetchedList, FetchError>) {
        self.fetch_in_flight = false;
        match result {
            Err(e) => {
                error!("channel list fetch ({:?}) failed: {}", reason, e);
                self.signal(UiSignal::FetchFailed);
                self.notice(format!("Channel list unavailable: {}", e));
            }
            Ok(fetched) if fetched.list.is_empty() && !self.channels.is_empty() => {
                warn!(
                    "refresh returned no channels, keeping the current {}",
                    self.channels.len()
                );
                self.signal(UiSignal::ListLoaded { count: 0 });
            }
            Ok(fetched) => self.apply_list(fetched),
        }

        if let Some(queued) = self.refresh_queued.take() {
            self.request_refresh(queued);
        }
    }

    /// Replace the roster, keeping the active channel when it is still
    /// present and unchanged.
    fn apply_list(&mut self, fetched: FetchedList) {
        let previous = self.active.and_then(|i| self.channels.get(i)).cloned();

        self.channels = fetched.list;
        self.availability = vec![AvailabilityStatus::Checking; self.channels.len()];
        self.navigator.reset_for_list(self.channels.len());
        info!(
            "PlayerCore: {} channels loaded{}",
            self.channels.len(),
            if fetched.fallback { " (single-stream fallback)" } else { "" }
        );
        self.signal(UiSignal::ListLoaded {
            count: self.channels.len(),
        });

        if self.channels.is_empty() {
            self.active = None;
            self.scheduler.cancel(TimerKind::Watchdog);
            self.playback.dispose();
            return;
        }

        let located = previous
            .as_ref()
            .and_then(|prev| self.channels.locate(prev).map(|i| (prev, i)));
        match located {
            Some((prev, index))
                if self.playback.has_live_session()
                    && self
                        .channels
                        .get(index)
                        .is_some_and(|c| c.same_stream(prev)) =>
            {
                debug!("channel {} kept at position {}", prev.name, index + 1);
                self.active = Some(index);
                self.playback.retarget(index);
            }
            Some((_, index)) => self.select(index, true),
            None => self.select(0, true),
        }

        self.start_probe_round();
    }

    // ── availability ──────────────────────────────────────────────────────────

    fn start_probe_round(&mut self) {
        let round = self.probe_round.round + 1;
        let launched = match &self.prober {
            Some(prober) => prober.probe_all(round, &self.channels, self.active, &self.event_tx),
            None => 0,
        };
        self.probe_round = ProbeRound {
            round,
            pending: launched,
            settled: false,
        };
        if launched == 0 {
            self.settle_probes();
        }
    }

    fn handle_probe(
        &mut self,
        round: u64,
        index: usize,
        status: AvailabilityStatus,
        failure: Option<ProbeFailure>,
    ) {
        if round != self.probe_round.round {
            debug!("dropping probe result for stale round {}", round);
            return;
        }
        if let Some(slot) = self.availability.get_mut(index) {
            *slot = status;
        }
        if let Some(failure) = failure {
            debug!(
                "channel {} offline: {} ({:?})",
                index + 1,
                failure.reason,
                failure.status
            );
        }
        self.probe_round.pending = self.probe_round.pending.saturating_sub(1);
        if self.probe_round.pending == 0 {
            self.settle_probes();
        }
    }

    fn settle_probes(&mut self) {
        if self.probe_round.settled {
            return;
        }
        self.probe_round.settled = true;
        let round = self.probe_round.round;
        info!("PlayerCore: probe round {} complete", round);
        self.signal(UiSignal::ProbesSettled);
        let _ = self
            .broadcast_tx
            .send(BroadcastMessage::ProbesSettled { round });
    }

    // ── indicators ────────────────────────────────────────────────────────────

    fn signal(&mut self, signal: UiSignal) {
        let (next, directives) = ui_state::reduce(&self.ui, &signal);
        self.ui = next;
        for directive in directives {
            match directive {
                UiDirective::ScheduleSettle => {
                    self.scheduler
                        .schedule(TimerKind::LoadingSettle, self.config.ui.settle());
                }
                UiDirective::CancelSettle => self.scheduler.cancel(TimerKind::LoadingSettle),
                UiDirective::ScheduleOsdExpiry => {
                    self.scheduler
                        .schedule(TimerKind::OsdExpiry, self.config.ui.osd());
                }
            }
        }
    }

    fn notice(&mut self, text: String) {
        info!("notice: {}", text);
        self.signal(UiSignal::Osd(text.clone()));
        let _ = self.broadcast_tx.send(BroadcastMessage::Notice(text));
    }

    async fn publish(&self) {
        if self.state_manager.publish(self.snapshot()).await {
            let _ = self.broadcast_tx.send(BroadcastMessage::StateUpdated);
        }
    }

    fn cleanup(&mut self) {
        info!("PlayerCore: cleaning up");
        self.scheduler.cancel_all();
        self.playback.dispose();
    }
}
