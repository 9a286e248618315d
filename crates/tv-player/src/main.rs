use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tv_player::core::{PlayerCore, PlayerEvent, RefreshReason};
use tv_player::mpv::MpvEngine;
use tv_player::{http, input, view, BroadcastMessage};
use tv_proto::config::Config;

#[derive(Parser, Debug)]
#[command(name = "tvplayer", about = "Live TV channel player")]
struct Args {
    /// Config file (default: ~/.config/tvplayer/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Play this extended-M3U playlist (URL or path)
    #[arg(long, conflicts_with = "api")]
    playlist: Option<String>,
    /// Load channels from this backend listing endpoint
    #[arg(long)]
    api: Option<String>,
    /// Do not start the local control API
    #[arg(long)]
    no_http: bool,
}

/// Forwards WARN and ERROR events to the broadcast channel so the view can
/// show the latest one.
struct BroadcastLayer {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl<S> tracing_subscriber::Layer<S> for BroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        event.record(&mut MessageVisitor(&mut message));
        let _ = self.sender.send(BroadcastMessage::Log(message));
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (broadcast_tx, broadcast_rx) = broadcast::channel::<BroadcastMessage>(256);

    let data_dir = tv_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("player.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(BroadcastLayer {
            sender: broadcast_tx.clone(),
        })
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tv_player=debug,hyper_util=warn,reqwest=warn")
            }),
        )
        .init();

    eprintln!("tvplayer log: {}", log_path.display());
    info!("tvplayer starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(playlist) = args.playlist {
        config.source.playlist_url = playlist;
        config.source.api_url = None;
    }
    if let Some(api) = args.api {
        config.source.api_url = Some(api);
    }
    if args.no_http {
        config.http.enabled = false;
    }

    // ── Engine + core ────────────────────────────────────────────────────────
    let engine = MpvEngine::spawn(&config.playback).await?;

    let (event_tx, event_rx) = mpsc::channel::<PlayerEvent>(256);
    let core = PlayerCore::new(
        config.clone(),
        Box::new(engine),
        broadcast_tx.clone(),
        event_tx.clone(),
    )?;
    let state_manager = core.state_manager();

    if config.http.enabled {
        http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            state_manager.clone(),
            event_tx.clone(),
        );
    }

    // ── Terminal ─────────────────────────────────────────────────────────────
    terminal::enable_raw_mode()?;
    execute!(std::io::stdout(), EnterAlternateScreen, EnableMouseCapture)?;

    let window: view::SharedListWindow = Arc::new(Mutex::new(None));
    let view_task = view::spawn_view(state_manager, broadcast_rx, window.clone());
    let input_task = input::spawn_input(event_tx.clone(), window);

    event_tx
        .send(PlayerEvent::Refresh(RefreshReason::Initial))
        .await?;
    drop(event_tx);

    let result = core.run(event_rx).await;

    view_task.abort();
    let _ = execute!(std::io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
    let _ = terminal::disable_raw_mode();
    // the input thread notices the closed channel on its next poll
    let _ = input_task.await;

    info!("tvplayer exiting");
    result
}
