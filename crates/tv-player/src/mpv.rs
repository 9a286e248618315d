/// mpv-backed `StreamEngine`.
///
/// Architecture:
///
/// ```text
///   MpvEngine::spawn()
///         │
///         ├── writer_task   ← receives MpvRequest via mpsc, serialises → socket
///         ├── reader_task   ← reads JSON lines from socket
///         │                      ├── response (has request_id) → matched oneshot::Sender
///         │                      └── event / property-change   → translate_task
///         ├── driver_task   ← runs engine commands strictly in order
///         └── translate_task ← mpv events → EngineEvent for the bound session,
///                               switched only at mpv's next start-file
/// ```
///
/// The `StreamEngine` methods are synchronous: they only enqueue a command
/// for the driver task, so attach/play/detach are applied in call order.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use tv_proto::config::PlaybackConfig;
use tv_proto::error::EngineError;
use tv_proto::platform;
use tv_proto::protocol::StreamErrorKind;

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use crate::engine::{EngineEvent, EngineEvents, StreamEngine, StreamSource};

// ── observation property IDs ──────────────────────────────────────────────────

pub const OBS_CORE_IDLE: u64 = 1;
pub const OBS_PAUSE: u64 = 2;
pub const OBS_TIME_POS: u64 = 4;
pub const OBS_PAUSED_FOR_CACHE: u64 = 8;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

// ── wire types ────────────────────────────────────────────────────────────────

type Reply = Result<Value, String>;
type Waiters = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// One JSON line queued for the writer, plus where its reply goes.
struct Outgoing {
    id: u64,
    line: String,
    reply: oneshot::Sender<Reply>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.event_name()? != "property-change" {
            return None;
        }
        let id = self.raw.get("id")?.as_u64()?;
        Some((id, self.raw.get("data").unwrap_or(&Value::Null)))
    }

    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

#[derive(Debug)]
enum Incoming {
    Reply { id: u64, result: Reply },
    Event(MpvEvent),
}

/// Classify one line read from the IPC socket.  Blank and non-JSON lines
/// yield `None`.
fn parse_line(line: &str) -> Option<Incoming> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            debug!("mpv: ignoring non-json line '{}': {}", line, e);
            return None;
        }
    };
    let Some(id) = value.get("request_id").and_then(Value::as_u64) else {
        return Some(Incoming::Event(MpvEvent { raw: value }));
    };
    let result = match value.get("error").and_then(Value::as_str) {
        Some("success") => Ok(value),
        Some(other) => Err(other.to_string()),
        None => Err("reply without status".to_string()),
    };
    Some(Incoming::Reply { id, result })
}

// ── IPC handle ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<Outgoing>,
    ids: Arc<AtomicU64>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        let mut line = json!({ "command": command, "request_id": id }).to_string();
        line.push('\n');

        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Outgoing { id, line, reply })
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC writer stopped"))?;

        match tokio::time::timeout(REPLY_TIMEOUT, reply_rx).await {
            Err(_) => anyhow::bail!("mpv did not answer request {}", id),
            Ok(Err(_)) => anyhow::bail!("mpv request {} abandoned", id),
            Ok(Ok(result)) => result.map_err(|e| anyhow::anyhow!("mpv rejected request {}: {}", id, e)),
        }
    }

    /// Load `source` paused; playback starts on an explicit `start_playback`.
    pub async fn load(&self, source: &StreamSource) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", true])).await?;
        let headers: Vec<String> = source
            .headers
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect();
        self.send(json!(["set_property", "http-header-fields", headers]))
            .await?;
        debug!("mpv: loadfile {}", source.url);
        self.send(json!(["loadfile", source.url, "replace"])).await?;
        Ok(())
    }

    pub async fn start_playback(&self, muted: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "mute", muted])).await?;
        self.send(json!(["set_property", "pause", false])).await?;
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    /// Register observe_property for everything the translator reads.
    pub async fn observe_properties(&self) {
        let props = [
            (OBS_CORE_IDLE, "core-idle"),
            (OBS_PAUSE, "pause"),
            (OBS_TIME_POS, "time-pos"),
            (OBS_PAUSED_FOR_CACHE, "paused-for-cache"),
        ];
        for (id, name) in &props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── engine ────────────────────────────────────────────────────────────────────

enum DriverCommand {
    Attach {
        source: StreamSource,
        events: EngineEvents,
    },
    Play {
        muted: bool,
    },
    Recover,
    Detach,
}

/// Translator input.  Bindings are queued by the driver before the command
/// that starts or stops a file, so they sit in socket order with the events.
#[derive(Debug)]
enum Feed {
    Event(MpvEvent),
    Bind(Option<EngineEvents>),
}

/// Where translated events go.  A new binding waits for mpv's next
/// `start-file`: everything mpv reports before it belongs to the file that
/// was replaced.
#[derive(Debug, Default)]
enum Route {
    #[default]
    Nowhere,
    Pending(EngineEvents),
    Attached(EngineEvents),
}

impl Route {
    fn on_event(&mut self, evt: &MpvEvent) -> Option<&EngineEvents> {
        if evt.event_name() == Some("start-file") {
            if let Route::Pending(events) = self {
                let events = events.clone();
                *self = Route::Attached(events);
            }
        }
        match &*self {
            Route::Attached(events) => Some(events),
            _ => None,
        }
    }
}

pub struct MpvEngine {
    commands: mpsc::UnboundedSender<DriverCommand>,
    _process: Option<tokio::process::Child>,
}

impl MpvEngine {
    pub async fn spawn(config: &PlaybackConfig) -> anyhow::Result<Self> {
        let (feed_tx, feed_rx) = mpsc::channel::<Feed>(256);
        let (process, handle) = spawn_and_connect(config, feed_tx.clone()).await?;
        handle.observe_properties().await;
        Ok(Self::start(handle, feed_tx, feed_rx, Some(process)))
    }

    fn start(
        handle: MpvHandle,
        feed_tx: mpsc::Sender<Feed>,
        feed_rx: mpsc::Receiver<Feed>,
        process: Option<tokio::process::Child>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(driver_task(handle, cmd_rx, feed_tx));
        tokio::spawn(translate_task(feed_rx));
        Self {
            commands: cmd_tx,
            _process: process,
        }
    }

    fn enqueue(&self, cmd: DriverCommand) -> Result<(), EngineError> {
        self.commands
            .send(cmd)
            .map_err(|_| EngineError::Unavailable("mpv driver stopped".to_string()))
    }
}

impl StreamEngine for MpvEngine {
    fn supports_adaptive(&self) -> bool {
        true
    }

    fn attach(&mut self, source: &StreamSource, events: EngineEvents) -> Result<(), EngineError> {
        if source.url.trim().is_empty() {
            return Err(EngineError::Rejected {
                url: source.url.clone(),
                reason: "empty stream url".to_string(),
            });
        }
        self.enqueue(DriverCommand::Attach {
            source: source.clone(),
            events,
        })
    }

    fn play(&mut self, muted: bool) {
        if let Err(e) = self.enqueue(DriverCommand::Play { muted }) {
            warn!("mpv: {}", e);
        }
    }

    fn recover(&mut self) {
        if let Err(e) = self.enqueue(DriverCommand::Recover) {
            warn!("mpv: {}", e);
        }
    }

    fn detach(&mut self) {
        if let Err(e) = self.enqueue(DriverCommand::Detach) {
            warn!("mpv: {}", e);
        }
    }
}

async fn driver_task(
    handle: MpvHandle,
    mut rx: mpsc::UnboundedReceiver<DriverCommand>,
    feed: mpsc::Sender<Feed>,
) {
    let mut current: Option<(StreamSource, EngineEvents)> = None;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            DriverCommand::Attach { source, events } => {
                bind(&feed, Some(events.clone())).await;
                if let Err(e) = handle.load(&source).await {
                    warn!("mpv: load {} failed: {}", source.url, e);
                    events.send(load_failure(e)).await;
                }
                current = Some((source, events));
            }
            DriverCommand::Play { muted } => {
                if let Some((_, events)) = &current {
                    let outcome = match handle.start_playback(muted).await {
                        Ok(()) => EngineEvent::PlayStarted { muted },
                        Err(e) => EngineEvent::PlayRejected {
                            muted,
                            reason: e.to_string(),
                        },
                    };
                    events.send(outcome).await;
                }
            }
            DriverCommand::Recover => {
                if let Some((source, events)) = &current {
                    info!("mpv: reloading {} in place", source.url);
                    bind(&feed, Some(events.clone())).await;
                    if let Err(e) = handle.load(source).await {
                        events.send(load_failure(e)).await;
                    }
                }
            }
            DriverCommand::Detach => {
                current = None;
                bind(&feed, None).await;
                if let Err(e) = handle.stop().await {
                    debug!("mpv: stop failed: {}", e);
                }
            }
        }
    }
    debug!("mpv driver: task exiting");
}

async fn bind(feed: &mpsc::Sender<Feed>, events: Option<EngineEvents>) {
    if feed.send(Feed::Bind(events)).await.is_err() {
        debug!("mpv: translator gone");
    }
}

fn load_failure(e: anyhow::Error) -> EngineEvent {
    EngineEvent::Error {
        fatal: true,
        kind: StreamErrorKind::Other,
        details: e.to_string(),
    }
}

async fn translate_task(mut rx: mpsc::Receiver<Feed>) {
    let mut paused = true;
    let mut route = Route::default();
    while let Some(item) = rx.recv().await {
        match item {
            Feed::Bind(events) => {
                route = events.map_or(Route::Nowhere, Route::Pending);
            }
            Feed::Event(evt) => {
                let translated = translate(&evt, &mut paused);
                if let (Some(event), Some(events)) = (translated, route.on_event(&evt)) {
                    events.send(event).await;
                }
            }
        }
    }
    debug!("mpv translator: task exiting");
}

/// Map one mpv event to an engine event.  `paused` tracks the last observed
/// pause state so progress reports can carry it.
pub fn translate(evt: &MpvEvent, paused: &mut bool) -> Option<EngineEvent> {
    if let Some((obs_id, data)) = evt.as_property_change() {
        return match obs_id {
            OBS_PAUSE => {
                *paused = data.as_bool().unwrap_or(*paused);
                None
            }
            OBS_TIME_POS => data.as_f64().map(|position_secs| EngineEvent::Progress {
                position_secs,
                paused: *paused,
            }),
            OBS_CORE_IDLE if data.as_bool() == Some(false) => Some(EngineEvent::BufferAppending),
            OBS_PAUSED_FOR_CACHE if data.as_bool() == Some(true) => Some(EngineEvent::Stalled),
            _ => None,
        };
    }

    match evt.event_name()? {
        "file-loaded" => Some(EngineEvent::ManifestParsed),
        "end-file" if evt.raw.get("reason").and_then(Value::as_str) == Some("error") => {
            let details = evt
                .raw
                .get("file_error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            Some(EngineEvent::Error {
                fatal: true,
                kind: classify_file_error(&details),
                details,
            })
        }
        _ => None,
    }
}

pub fn classify_file_error(file_error: &str) -> StreamErrorKind {
    match file_error {
        "loading failed" => StreamErrorKind::Network,
        "unrecognized file format"
        | "no audio or video data played"
        | "no video or audio streams selected" => StreamErrorKind::Media,
        _ => StreamErrorKind::Other,
    }
}

// ── process / connection ──────────────────────────────────────────────────────

fn mpv_command(config: &PlaybackConfig) -> anyhow::Result<tokio::process::Command> {
    let mpv_binary = platform::find_mpv_binary(config.mpv_binary.as_deref())
        .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

    let stderr_path = platform::data_dir().join("mpv-stderr.log");
    let stderr_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&stderr_path)?;
    info!("mpv: logging stderr to {:?}", stderr_path);

    let mut cmd = tokio::process::Command::new(mpv_binary);
    cmd.arg("--idle=yes")
        .arg("--force-window=yes")
        .arg("--keep-open=no")
        .arg("--pause=yes")
        .arg(platform::mpv_socket_arg())
        .arg("--quiet")
        .arg(format!(
            "--volume={}",
            (config.volume * 100.0).clamp(0.0, 100.0).round() as i64
        ))
        .stdout(std::process::Stdio::null())
        .stderr(stderr_file)
        .kill_on_drop(true);
    Ok(cmd)
}

const CONNECT_WAIT: Duration = Duration::from_secs(5);
const CONNECT_POLL: Duration = Duration::from_millis(100);

#[cfg(unix)]
async fn spawn_and_connect(
    config: &PlaybackConfig,
    event_tx: mpsc::Sender<Feed>,
) -> anyhow::Result<(tokio::process::Child, MpvHandle)> {
    let socket_path = std::path::PathBuf::from(platform::mpv_socket_name());
    let _ = tokio::fs::remove_file(&socket_path).await;

    let child = mpv_command(config)?.spawn()?;
    info!("mpv: started pid {:?}, waiting for {}", child.id(), socket_path.display());

    let deadline = tokio::time::Instant::now() + CONNECT_WAIT;
    let stream = loop {
        match UnixStream::connect(&socket_path).await {
            Ok(stream) => break stream,
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(CONNECT_POLL).await;
            }
            Err(e) => anyhow::bail!("mpv IPC socket never came up: {}", e),
        }
    };
    info!("mpv: IPC connected");
    let (read_half, write_half) = stream.into_split();
    Ok((child, start_io_tasks(read_half, write_half, event_tx)))
}

#[cfg(windows)]
async fn spawn_and_connect(
    config: &PlaybackConfig,
    event_tx: mpsc::Sender<Feed>,
) -> anyhow::Result<(tokio::process::Child, MpvHandle)> {
    let child = mpv_command(config)?.spawn()?;
    let pipe_path = format!(r"\\.\pipe\{}", platform::mpv_socket_name());
    info!("mpv: started pid {:?}, waiting for {}", child.id(), pipe_path);

    let deadline = tokio::time::Instant::now() + CONNECT_WAIT;
    let client = loop {
        match ClientOptions::new().open(&pipe_path) {
            Ok(client) => break client,
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(CONNECT_POLL).await;
            }
            Err(e) => anyhow::bail!("mpv named pipe never came up: {}", e),
        }
    };
    info!("mpv: IPC connected");
    let (read_half, write_half) = tokio::io::split(client);
    Ok((child, start_io_tasks(read_half, write_half, event_tx)))
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<Feed>) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let waiters: Waiters = Arc::default();
    let (tx, rx) = mpsc::channel::<Outgoing>(64);

    tokio::spawn(writer_task(write_half, rx, waiters.clone()));
    tokio::spawn(reader_task(read_half, waiters, event_tx));

    MpvHandle {
        tx,
        ids: Arc::new(AtomicU64::new(1)),
    }
}

// ── socket tasks ──────────────────────────────────────────────────────────────

async fn reader_task<R>(read_half: R, waiters: Waiters, event_tx: mpsc::Sender<Feed>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(read_half).lines();
    let reason = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break "mpv closed the IPC connection".to_string(),
            Err(e) => {
                warn!("mpv: IPC read failed: {}", e);
                break format!("mpv IPC read failed: {}", e);
            }
        };
        match parse_line(&line) {
            Some(Incoming::Reply { id, result }) => match waiters.lock().await.remove(&id) {
                Some(waiter) => {
                    let _ = waiter.send(result);
                }
                None => debug!("mpv: unsolicited reply {}", id),
            },
            Some(Incoming::Event(event)) => {
                if event_tx.send(Feed::Event(event)).await.is_err() {
                    break "event consumer gone".to_string();
                }
            }
            None => {}
        }
    };

    debug!("mpv: reader stopping ({})", reason);
    for (_, waiter) in waiters.lock().await.drain() {
        let _ = waiter.send(Err(reason.clone()));
    }
}

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<Outgoing>, waiters: Waiters)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(Outgoing { id, line, reply }) = rx.recv().await {
        // the reader may see the reply before write_all returns
        waiters.lock().await.insert(id, reply);
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!("mpv: IPC write failed: {}", e);
            if let Some(waiter) = waiters.lock().await.remove(&id) {
                let _ = waiter.send(Err(e.to_string()));
            }
            break;
        }
    }
    debug!("mpv: writer stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PlayerEvent;
    use crate::engine::SessionId;

    fn event(raw: Value) -> MpvEvent {
        MpvEvent { raw }
    }

    #[test]
    fn test_progress_carries_pause_state() {
        let mut paused = true;
        let pause_off = event(json!({"event":"property-change","id":OBS_PAUSE,"name":"pause","data":false}));
        assert_eq!(translate(&pause_off, &mut paused), None);
        assert!(!paused);

        let pos = event(json!({"event":"property-change","id":OBS_TIME_POS,"name":"time-pos","data":2.5}));
        assert_eq!(
            translate(&pos, &mut paused),
            Some(EngineEvent::Progress {
                position_secs: 2.5,
                paused: false
            })
        );
    }

    #[test]
    fn test_end_file_error_classified() {
        let mut paused = false;
        let network = event(json!({"event":"end-file","reason":"error","file_error":"loading failed"}));
        assert!(matches!(
            translate(&network, &mut paused),
            Some(EngineEvent::Error {
                fatal: true,
                kind: StreamErrorKind::Network,
                ..
            })
        ));

        let stopped = event(json!({"event":"end-file","reason":"stop"}));
        assert_eq!(translate(&stopped, &mut paused), None);

        assert_eq!(
            classify_file_error("unrecognized file format"),
            StreamErrorKind::Media
        );
        assert_eq!(classify_file_error("init failed"), StreamErrorKind::Other);
    }

    #[test]
    fn test_file_loaded_is_manifest_ready() {
        let mut paused = true;
        let loaded = event(json!({"event":"file-loaded"}));
        assert_eq!(translate(&loaded, &mut paused), Some(EngineEvent::ManifestParsed));
    }

    #[test]
    fn test_parse_line_splits_replies_from_events() {
        assert!(parse_line("   ").is_none());
        assert!(parse_line("not json").is_none());

        match parse_line(r#"{"request_id":7,"error":"success","data":null}"#) {
            Some(Incoming::Reply { id: 7, result: Ok(_) }) => {}
            other => panic!("unexpected {:?}", other),
        }
        match parse_line(r#"{"request_id":8,"error":"property unavailable"}"#) {
            Some(Incoming::Reply { id: 8, result: Err(e) }) => assert_eq!(e, "property unavailable"),
            other => panic!("unexpected {:?}", other),
        }
        match parse_line(r#"{"event":"file-loaded"}"#) {
            Some(Incoming::Event(evt)) => assert_eq!(evt.event_name(), Some("file-loaded")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handle_matches_replies_over_socket() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(ours);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let handle = start_io_tasks(read_half, write_half, event_tx);

        // a scripted mpv: announce an event, then answer the first request
        tokio::spawn(async move {
            let (peer_read, mut peer_write) = tokio::io::split(theirs);
            let mut lines = BufReader::new(peer_read).lines();
            peer_write
                .write_all(b"{\"event\":\"idle\"}\n")
                .await
                .unwrap();
            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            let reply = json!({
                "request_id": request["request_id"],
                "error": "success",
                "data": "ok",
            });
            peer_write
                .write_all(format!("{}\n", reply).as_bytes())
                .await
                .unwrap();
        });

        let reply = handle.send(json!(["get_property", "idle-active"])).await.unwrap();
        assert_eq!(reply["data"], "ok");
        match event_rx.recv().await.unwrap() {
            Feed::Event(evt) => assert_eq!(evt.event_name(), Some("idle")),
            other => panic!("unexpected {:?}", other),
        }
    }

    fn engine_event(msg: PlayerEvent) -> (SessionId, EngineEvent) {
        match msg {
            PlayerEvent::Engine { session, event } => (session, event),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rebind_waits_for_next_start_file() {
        let (feed_tx, feed_rx) = mpsc::channel(16);
        let (core_tx, mut core_rx) = mpsc::channel(16);
        tokio::spawn(translate_task(feed_rx));

        let loading_failed =
            json!({"event":"end-file","reason":"error","file_error":"loading failed"});
        let feed = [
            Feed::Bind(Some(EngineEvents::new(1, core_tx.clone()))),
            Feed::Event(event(json!({"event":"start-file"}))),
            Feed::Event(event(json!({"event":"file-loaded"}))),
            // user switches while the first file's failure is still queued
            Feed::Bind(Some(EngineEvents::new(2, core_tx.clone()))),
            Feed::Event(event(loading_failed)),
            Feed::Event(event(json!({"event":"property-change","id":OBS_CORE_IDLE,"data":false}))),
            Feed::Event(event(json!({"event":"start-file"}))),
            Feed::Event(event(json!({"event":"file-loaded"}))),
        ];
        for item in feed {
            feed_tx.send(item).await.unwrap();
        }
        drop(feed_tx);
        drop(core_tx);

        let mut seen = Vec::new();
        while let Some(msg) = core_rx.recv().await {
            seen.push(engine_event(msg));
        }
        assert_eq!(
            seen,
            vec![(1, EngineEvent::ManifestParsed), (2, EngineEvent::ManifestParsed)]
        );
    }

    #[tokio::test]
    async fn test_detach_routes_nothing_until_next_attach() {
        let (feed_tx, feed_rx) = mpsc::channel(16);
        let (core_tx, mut core_rx) = mpsc::channel(16);
        tokio::spawn(translate_task(feed_rx));

        feed_tx
            .send(Feed::Bind(Some(EngineEvents::new(1, core_tx.clone()))))
            .await
            .unwrap();
        feed_tx.send(Feed::Bind(None)).await.unwrap();
        for raw in [
            json!({"event":"start-file"}),
            json!({"event":"property-change","id":OBS_PAUSED_FOR_CACHE,"data":true}),
        ] {
            feed_tx.send(Feed::Event(event(raw))).await.unwrap();
        }
        drop(feed_tx);
        drop(core_tx);
        assert!(core_rx.recv().await.is_none());
    }

    /// Plays mpv's side of the socket: every request succeeds, `loadfile`
    /// starts the file and `stop` fails the current one before answering.
    async fn scripted_mpv(peer: tokio::io::DuplexStream) {
        let (peer_read, mut peer_write) = tokio::io::split(peer);
        let mut lines = BufReader::new(peer_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            let mut out = Vec::new();
            let command = request["command"][0].as_str().unwrap_or_default().to_string();
            if command == "stop" {
                out.push(json!({"event":"end-file","reason":"error","file_error":"loading failed"}));
            }
            out.push(json!({"request_id": request["request_id"], "error": "success", "data": null}));
            if command == "loadfile" {
                out.push(json!({"event":"start-file"}));
                out.push(json!({"event":"file-loaded"}));
            }
            for value in out {
                if peer_write
                    .write_all(format!("{}\n", value).as_bytes())
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_switch_never_labels_old_events_with_new_session() {
        let (ours, theirs) = tokio::io::duplex(8192);
        let (read_half, write_half) = tokio::io::split(ours);
        let (feed_tx, feed_rx) = mpsc::channel(64);
        let handle = start_io_tasks(read_half, write_half, feed_tx.clone());
        tokio::spawn(scripted_mpv(theirs));
        let mut engine = MpvEngine::start(handle, feed_tx, feed_rx, None);

        let (core_tx, mut core_rx) = mpsc::channel(16);
        let source = |url: &str| StreamSource {
            url: url.to_string(),
            headers: Vec::new(),
        };
        engine
            .attach(&source("http://a/live.m3u8"), EngineEvents::new(1, core_tx.clone()))
            .unwrap();
        engine.detach();
        engine
            .attach(&source("http://b/live.m3u8"), EngineEvents::new(2, core_tx))
            .unwrap();

        // the first file's events may or may not reach its own session, but
        // the new session's first event is its own manifest
        loop {
            let (session, event) = engine_event(core_rx.recv().await.unwrap());
            if session == 2 {
                assert_eq!(event, EngineEvent::ManifestParsed);
                break;
            }
            assert_eq!(session, 1);
        }
    }
}
