//! A `StreamEngine` that records every call and plays nothing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tv_player::core::{PlayerCore, PlayerEvent, RefreshReason};
use tv_player::engine::{EngineEvents, StreamEngine, StreamSource};
use tv_player::source::FetchedList;
use tv_player::BroadcastMessage;
use tv_proto::channel::{Channel, ChannelList};
use tv_proto::config::Config;
use tv_proto::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Attach { session: u64, source: StreamSource },
    Play { muted: bool },
    Recover,
    Detach,
}

#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<Call>>>);

impl Calls {
    pub fn all(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn attaches(&self) -> Vec<(u64, String)> {
        self.all()
            .into_iter()
            .filter_map(|c| match c {
                Call::Attach { session, source } => Some((session, source.url)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.all().iter().filter(|c| *c == wanted).count()
    }

    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }
}

pub struct FakeEngine {
    calls: Calls,
    adaptive: bool,
}

impl FakeEngine {
    pub fn new(adaptive: bool) -> (Self, Calls) {
        let calls = Calls::default();
        (
            Self {
                calls: calls.clone(),
                adaptive,
            },
            calls,
        )
    }
}

impl StreamEngine for FakeEngine {
    fn supports_adaptive(&self) -> bool {
        self.adaptive
    }

    fn attach(&mut self, source: &StreamSource, events: EngineEvents) -> Result<(), EngineError> {
        self.calls.push(Call::Attach {
            session: events.session(),
            source: source.clone(),
        });
        Ok(())
    }

    fn play(&mut self, muted: bool) {
        self.calls.push(Call::Play { muted });
    }

    fn recover(&mut self) {
        self.calls.push(Call::Recover);
    }

    fn detach(&mut self) {
        self.calls.push(Call::Detach);
    }
}

pub struct Harness {
    pub core: PlayerCore,
    pub events: mpsc::Receiver<PlayerEvent>,
    pub broadcasts: broadcast::Receiver<BroadcastMessage>,
    pub calls: Calls,
}

/// Defaults tuned for tests: no relay, no probing.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.proxy.base = String::new();
    config.probe.enabled = false;
    config
}

pub fn harness(config: Config, adaptive: bool) -> Harness {
    let (engine, calls) = FakeEngine::new(adaptive);
    let (event_tx, events) = mpsc::channel(256);
    let (broadcast_tx, broadcasts) = broadcast::channel(256);
    let core = PlayerCore::new(config, Box::new(engine), broadcast_tx, event_tx).unwrap();
    Harness {
        core,
        events,
        broadcasts,
        calls,
    }
}

pub fn numbered(n: usize) -> ChannelList {
    ChannelList::new(
        (1..=n)
            .map(|i| Channel {
                id: Some(i.to_string()),
                name: format!("Channel {}", i),
                url: format!("http://streams.test/{}.m3u8", i),
                user_agent: None,
            })
            .collect(),
    )
    .unwrap()
}

impl Harness {
    pub async fn load(&mut self, list: ChannelList) {
        self.deliver(Ok(FetchedList {
            list,
            fallback: false,
        }))
        .await;
    }

    pub async fn deliver(&mut self, result: Result<FetchedList, tv_proto::error::FetchError>) {
        self.core
            .handle_event(PlayerEvent::ChannelsFetched {
                reason: RefreshReason::Manual,
                result,
            })
            .await;
    }

    pub async fn send(&mut self, evt: PlayerEvent) {
        self.core.handle_event(evt).await;
    }

    /// Feed queued events (timers, probes, fetches) back into the core until
    /// one matching `stop` has been handled.
    pub async fn pump_until(&mut self, stop: impl Fn(&PlayerEvent) -> bool) {
        loop {
            let evt = tokio::time::timeout(Duration::from_secs(30), self.events.recv())
                .await
                .expect("no event before timeout")
                .expect("event channel closed");
            let done = stop(&evt);
            self.core.handle_event(evt).await;
            if done {
                return;
            }
        }
    }

    pub fn session_id(&self) -> u64 {
        self.core.snapshot().session_id.expect("no session")
    }
}
