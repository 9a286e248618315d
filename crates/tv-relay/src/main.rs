use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tv_proto::config::Config;

#[derive(Parser, Debug)]
#[command(name = "tv-relay", about = "CORS and User-Agent relay for channel streams")]
struct Args {
    /// Config file (default: ~/.config/tvplayer/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen port (overrides relay.port)
    #[arg(long)]
    port: Option<u16>,
    /// Listen address (overrides relay.bind_address)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tv_relay=debug,hyper_util=warn,reqwest=warn")
            }),
        )
        .init();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let mut relay = config.relay;
    if let Some(port) = args.port {
        relay.port = port;
    }
    if let Some(bind) = args.bind {
        relay.bind_address = bind;
    }

    info!("tv-relay starting…");
    let server = tv_relay::start_server(&relay)?;

    tokio::select! {
        _ = server => {}
        _ = tokio::signal::ctrl_c() => info!("tv-relay interrupted"),
    }
    Ok(())
}
