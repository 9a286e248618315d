//! Live-channel player core.
//!
//! `PlayerCore` is the single owner of all mutable player state.  Keyboard,
//! HTTP, timers, probes, list fetches and the streaming engine only ever
//! talk to it by sending `PlayerEvent`s; observers follow along through
//! `BroadcastMessage`s and the `StateManager` snapshot.

pub mod core;
pub mod engine;
pub mod http;
pub mod input;
pub mod mpv;
pub mod navigation;
pub mod playback;
pub mod prober;
pub mod proxy;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod state;
pub mod ui_state;
pub mod view;
pub mod watch;

/// What the core broadcasts to observers (view, tests).
#[derive(Debug, Clone)]
pub enum BroadcastMessage {
    /// The snapshot changed; receivers should read it from `StateManager`.
    StateUpdated,
    /// Transient on-screen notice (invalid channel number, fetch failure).
    Notice(String),
    /// Every availability probe of `round` has reported.  Sent once per round.
    ProbesSettled { round: u64 },
    /// A WARN/ERROR log line, forwarded by the tracing broadcast layer.
    Log(String),
}
