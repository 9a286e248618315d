mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use common::fake_engine::{harness, test_config, Call};
use tokio::net::TcpListener;
use tv_player::core::{PlayerEvent, RefreshReason};
use tv_player::source::{build_client, ChannelSource};
use tv_player::BroadcastMessage;
use tv_proto::channel::{Channel, ChannelList};
use tv_proto::error::FetchError;
use tv_proto::protocol::AvailabilityStatus;

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

type Hits = Arc<Mutex<Vec<(String, Option<String>)>>>;

async fn relay_stub(State(hits): State<Hits>, uri: Uri, headers: HeaderMap) -> impl IntoResponse {
    let path = uri.path().to_string();
    let agent = headers
        .get("x-proxy-user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    hits.lock().unwrap().push((path.clone(), agent));

    if path.ends_with("/b") {
        (StatusCode::OK, HeaderMap::new())
    } else if path.ends_with("/c") {
        let mut moved = HeaderMap::new();
        moved.insert(header::LOCATION, "http://elsewhere.test/c".parse().unwrap());
        (StatusCode::FOUND, moved)
    } else {
        (StatusCode::NOT_FOUND, HeaderMap::new())
    }
}

#[tokio::test]
async fn probes_every_channel_but_the_active_one() {
    let hits: Hits = Arc::default();
    let addr = serve(
        Router::new()
            .route("/proxy/*target", get(relay_stub))
            .with_state(hits.clone()),
    )
    .await;

    let mut config = test_config();
    config.proxy.base = format!("http://{}/proxy/", addr);
    config.probe.enabled = true;
    config.probe.timeout_secs = 5;
    let mut h = harness(config, true);

    let mut channels = vec![
        Channel::new("A", "http://upstream.test/a"),
        Channel::new("B", "http://upstream.test/b"),
        Channel::new("C", "http://upstream.test/c"),
        Channel::new("D", "http://upstream.test/d"),
    ];
    channels[0].user_agent = Some("Box/1".into());
    channels[1].user_agent = Some("Box/2".into());
    h.load(ChannelList::new(channels).unwrap()).await;

    // the active channel is attached through the relay with its override
    match h.calls.all().first() {
        Some(Call::Attach { source, .. }) => {
            assert_eq!(
                source.url,
                format!("http://{}/proxy/http://upstream.test/a", addr)
            );
            assert_eq!(
                source.headers,
                vec![("X-Proxy-User-Agent".to_string(), "Box/1".to_string())]
            );
        }
        other => panic!("expected attach, got {:?}", other),
    }

    for _ in 0..3 {
        h.pump_until(|evt| matches!(evt, PlayerEvent::ProbeFinished { .. }))
            .await;
    }

    let statuses: Vec<_> = h
        .core
        .snapshot()
        .channels
        .iter()
        .map(|entry| entry.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            AvailabilityStatus::Checking,
            AvailabilityStatus::Online,
            AvailabilityStatus::Online,
            AvailabilityStatus::Offline,
        ]
    );

    let hits = hits.lock().unwrap().clone();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|(path, _)| !path.ends_with("/a")));
    assert!(hits
        .iter()
        .any(|(path, agent)| path.ends_with("/b") && agent.as_deref() == Some("Box/2")));

    let mut settled = 0;
    while let Ok(msg) = h.broadcasts.try_recv() {
        if matches!(msg, BroadcastMessage::ProbesSettled { round: 1 }) {
            settled += 1;
        }
    }
    assert_eq!(settled, 1);
}

const PLAYLIST: &str = "#EXTM3U\n\
#EXTINF:-1 tvg-id=\"n\",News\n\
http://upstream.test/news.m3u8\n\
#EXTINF:-1 tvg-id=\"m\",Music\n\
http://upstream.test/music.m3u8\n";

#[tokio::test]
async fn refreshes_coalesce_while_a_fetch_is_in_flight() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let counter = fetches.clone();
    let addr = serve(Router::new().route(
        "/playlist.m3u",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                PLAYLIST
            }
        }),
    ))
    .await;

    let mut config = test_config();
    config.source.playlist_url = format!("http://{}/playlist.m3u", addr);
    let mut h = harness(config, true);

    for _ in 0..3 {
        h.send(PlayerEvent::Refresh(RefreshReason::Manual)).await;
    }
    for _ in 0..2 {
        h.pump_until(|evt| matches!(evt, PlayerEvent::ChannelsFetched { .. }))
            .await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(fetches.load(Ordering::SeqCst), 2);
    let snapshot = h.core.snapshot();
    assert_eq!(snapshot.channels.len(), 2);
    assert_eq!(snapshot.channels[1].channel.name, "Music");
    assert_eq!(snapshot.active_index, Some(0));
    // the second load found the same channel and did not restart it
    assert_eq!(h.calls.attaches().len(), 1);
}

#[tokio::test]
async fn api_source_reads_channel_records() {
    let addr = serve(
        Router::new()
            .route(
                "/api/channels",
                get(|| async {
                    axum::Json(serde_json::json!([
                        {"id": "5", "name": "News", "url": "http://upstream.test/n", "userAgent": "Box/1"},
                        {"id": "6", "name": "Film", "url": "http://upstream.test/f"}
                    ]))
                }),
            )
            .route(
                "/api/broken",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
            )
            .route("/api/garbage", get(|| async { "{not json" })),
    )
    .await;
    let client = build_client(Duration::from_secs(5)).unwrap();

    let source = ChannelSource::Api {
        url: format!("http://{}/api/channels", addr),
    };
    let fetched = source.fetch(&client).await.unwrap();
    assert_eq!(fetched.list.len(), 2);
    let first = fetched.list.get(0).unwrap();
    assert_eq!(first.id.as_deref(), Some("5"));
    assert_eq!(first.user_agent.as_deref(), Some("Box/1"));

    let broken = ChannelSource::Api {
        url: format!("http://{}/api/broken", addr),
    };
    assert!(matches!(
        broken.fetch(&client).await,
        Err(FetchError::Status { status: 500, .. })
    ));

    let garbage = ChannelSource::Api {
        url: format!("http://{}/api/garbage", addr),
    };
    assert!(matches!(
        garbage.fetch(&client).await,
        Err(FetchError::Malformed { .. })
    ));
}

#[tokio::test]
async fn direct_stream_url_becomes_single_channel() {
    let addr = serve(Router::new().route(
        "/live.m3u8",
        get(|| async { "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\nseg1.ts\n" }),
    ))
    .await;
    let client = build_client(Duration::from_secs(5)).unwrap();
    let url = format!("http://{}/live.m3u8", addr);

    let source = ChannelSource::Playlist {
        url: url.clone(),
        fallback_name: "Live".into(),
    };
    let fetched = source.fetch(&client).await.unwrap();
    assert!(fetched.fallback);
    assert_eq!(fetched.list.len(), 1);
    assert_eq!(fetched.list.get(0).unwrap().url, url);
}
