//! Local control API.  Every mutating route is turned into a `Command` and
//! sent into the core loop; `/api/state` reads the published snapshot.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tv_proto::protocol::{Command, PlayerSnapshot};

use crate::core::PlayerEvent;
use crate::state::StateManager;

#[derive(Clone)]
struct HttpState {
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<PlayerEvent>,
}

pub fn router(state_manager: Arc<StateManager>, event_tx: mpsc::Sender<PlayerEvent>) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/select/:number", get(select_channel).post(select_channel))
        .route("/api/next", get(next_channel).post(next_channel))
        .route("/api/prev", get(prev_channel).post(prev_channel))
        .route("/api/refresh", get(refresh).post(refresh))
        .with_state(HttpState {
            state_manager,
            event_tx,
        })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<PlayerEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state_manager, event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<PlayerSnapshot> {
    Json(state.state_manager.get_state().await)
}

async fn dispatch(state: &HttpState, cmd: Command) -> StatusCode {
    if state
        .event_tx
        .send(PlayerEvent::Command(cmd.clone()))
        .await
        .is_err()
    {
        error!("Failed to send {:?} to the player core", cmd);
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

/// `number` is the 1-based channel number shown on screen.
async fn select_channel(State(state): State<HttpState>, Path(number): Path<usize>) -> StatusCode {
    info!("HTTP API: select channel {}", number);
    if number == 0 {
        return StatusCode::BAD_REQUEST;
    }
    dispatch(&state, Command::Select { index: number - 1 }).await
}

async fn next_channel(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: next channel");
    dispatch(&state, Command::Next).await
}

async fn prev_channel(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: previous channel");
    dispatch(&state, Command::Prev).await
}

async fn refresh(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: refresh channel list");
    dispatch(&state, Command::Refresh).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_select_is_one_based() {
        let (tx, mut rx) = mpsc::channel(4);
        let app = router(Arc::new(StateManager::new()), tx);

        let response = app
            .clone()
            .oneshot(Request::post("/api/select/12").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(matches!(
            rx.recv().await,
            Some(PlayerEvent::Command(Command::Select { index: 11 }))
        ));

        let response = app
            .oneshot(Request::get("/api/select/0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_state_is_snapshot_json() {
        let (tx, _rx) = mpsc::channel(4);
        let app = router(Arc::new(StateManager::new()), tx);
        let response = app
            .oneshot(Request::get("/api/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let snapshot: PlayerSnapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(snapshot.phase, tv_proto::protocol::SessionPhase::Idle);
    }
}
