//! Path-prefix HTTP relay.
//!
//! `ANY /proxy/<target>` (or `/proxy?url=<target>`) forwards the request to
//! `<target>` and streams the upstream response back with permissive CORS
//! headers.  The player routes channel URLs through it so that streams which
//! refuse foreign origins, or need a specific User-Agent, still play.  A
//! per-request User-Agent arrives in `X-Proxy-User-Agent`.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use futures_util::StreamExt;
use reqwest::{redirect::Policy, Client, Url};
use tokio::net::TcpListener;
use tokio_util::io::{ReaderStream, StreamReader};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};
use tv_proto::config::RelayConfig;

pub const USER_AGENT_HEADER: &str = "x-proxy-user-agent";

const PROXY_PREFIX: &str = "/proxy/";
const MAX_REQUEST_BODY: usize = 8 * 1024 * 1024;

/// Request headers that are never copied upstream.  Identity headers are
/// rewritten from the target, the rest are hop-by-hop.
const STRIPPED_REQUEST: &[&str] = &[
    "host",
    "origin",
    "referer",
    "user-agent",
    "content-length",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "te",
    "proxy-connection",
    USER_AGENT_HEADER,
];

const STRIPPED_RESPONSE: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "proxy-connection",
];

#[derive(Clone)]
pub struct RelayState {
    client: Client,
    default_user_agent: String,
    timeout: Duration,
}

impl RelayState {
    pub fn new(config: &RelayConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        // no overall timeout: live streams stay open indefinitely
        let client = Client::builder()
            .redirect(Policy::limited(10))
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            default_user_agent: config.default_user_agent.clone(),
            timeout,
        })
    }
}

#[derive(Debug)]
pub enum RelayError {
    BadTarget(String),
    Connect { target: String, details: String },
    Timeout { target: String },
    Internal { target: String, details: String },
}

impl RelayError {
    fn status(&self) -> StatusCode {
        match self {
            RelayError::BadTarget(_) => StatusCode::BAD_REQUEST,
            RelayError::Connect { .. } => StatusCode::BAD_GATEWAY,
            RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn from_reqwest(target: &Url, e: reqwest::Error) -> Self {
        let target = target.to_string();
        if e.is_timeout() {
            RelayError::Timeout { target }
        } else if e.is_connect() {
            RelayError::Connect {
                target,
                details: e.to_string(),
            }
        } else {
            RelayError::Internal {
                target,
                details: e.to_string(),
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details, target) = match self {
            RelayError::BadTarget(raw) => ("Invalid target URL", String::new(), raw),
            RelayError::Connect { target, details } => {
                ("Could not reach upstream", details, target)
            }
            RelayError::Timeout { target } => (
                "Upstream did not answer in time",
                String::new(),
                target,
            ),
            RelayError::Internal { target, details } => ("Relay request failed", details, target),
        };
        let body = serde_json::json!({
            "status": "error",
            "message": message,
            "details": details,
            "target": target,
        });
        (status, Json(body)).into_response()
    }
}

/// Turns whatever followed `/proxy/` into an absolute URL.  Path
/// normalisation upstream of us can collapse `http://` to `http:/`, and a
/// bare host means plain http.
pub fn normalize_target(raw: &str) -> Result<Url, RelayError> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let candidate = ["https:", "http:"]
        .iter()
        .find(|scheme| lowered.starts_with(*scheme))
        .map(|scheme| {
            let rest = trimmed[scheme.len()..].trim_start_matches('/');
            format!("{}//{}", scheme, rest)
        })
        .unwrap_or_else(|| format!("http://{}", trimmed.trim_start_matches('/')));

    match Url::parse(&candidate) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(url),
        _ => Err(RelayError::BadTarget(raw.to_string())),
    }
}

fn target_from_path(uri: &Uri) -> Result<Url, RelayError> {
    let rest = uri.path().strip_prefix(PROXY_PREFIX).unwrap_or_default();
    let mut url = normalize_target(rest)?;
    if let Some(query) = uri.query() {
        url.set_query(Some(query));
    }
    Ok(url)
}

pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .route("/", get(health))
        .route("/proxy", any(relay_query))
        .route("/proxy/*target", any(relay_path))
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "tv-relay is running"
}

async fn relay_path(
    State(state): State<RelayState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    match target_from_path(&uri) {
        Ok(target) => forward(&state, method, target, headers, body).await,
        Err(e) => {
            warn!("relay: rejecting {}", uri);
            e.into_response()
        }
    }
}

async fn relay_query(
    State(state): State<RelayState>,
    method: Method,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    let Some(raw) = params.get("url") else {
        return RelayError::BadTarget(String::new()).into_response();
    };
    match normalize_target(raw) {
        Ok(target) => forward(&state, method, target, headers, body).await,
        Err(e) => e.into_response(),
    }
}

fn is_stripped_request(name: &HeaderName) -> bool {
    let name = name.as_str();
    STRIPPED_REQUEST.contains(&name) || name.starts_with("x-forwarded-")
}

async fn forward(
    state: &RelayState,
    method: Method,
    target: Url,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match send_upstream(state, method, &target, &headers, body).await {
        Ok(response) => response,
        Err(e) => {
            error!("relay: {} failed: {:?}", target, e);
            e.into_response()
        }
    }
}

async fn send_upstream(
    state: &RelayState,
    method: Method,
    target: &Url,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, RelayError> {
    let user_agent = headers
        .get(USER_AGENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(&state.default_user_agent)
        .to_string();
    let origin = target.origin().ascii_serialization();

    debug!("relay: {} {} (ua={})", method, target, user_agent);

    let mut request = state.client.request(method, target.clone());
    for (name, value) in headers {
        if !is_stripped_request(name) {
            request = request.header(name, value);
        }
    }
    request = request
        .header(header::USER_AGENT, user_agent)
        .header(header::ORIGIN, origin.as_str())
        .header(header::REFERER, format!("{}/", origin));

    let payload = to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|e| RelayError::Internal {
            target: target.to_string(),
            details: e.to_string(),
        })?;
    if !payload.is_empty() {
        request = request.body(payload);
    }

    let upstream = match tokio::time::timeout(state.timeout, request.send()).await {
        Ok(result) => result.map_err(|e| RelayError::from_reqwest(target, e))?,
        Err(_) => {
            return Err(RelayError::Timeout {
                target: target.to_string(),
            })
        }
    };

    let status = upstream.status();
    if !status.is_success() {
        info!("relay: upstream returned {} for {}", status, target);
    }

    let mut builder = Response::builder().status(status);
    for (name, value) in upstream.headers() {
        let name_str = name.as_str();
        if STRIPPED_RESPONSE.contains(&name_str) || name_str.starts_with("access-control-") {
            continue;
        }
        if let Ok(hv) = HeaderValue::from_bytes(value.as_bytes()) {
            builder = builder.header(name_str, hv);
        }
    }

    let byte_stream = upstream
        .bytes_stream()
        .map(|result| result.map_err(std::io::Error::other));
    let body = Body::from_stream(ReaderStream::new(StreamReader::new(byte_stream)));

    builder.body(body).map_err(|e| RelayError::Internal {
        target: target.to_string(),
        details: e.to_string(),
    })
}

pub fn start_server(config: &RelayConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let app = router(RelayState::new(config)?);
    let addr = format!("{}:{}", config.bind_address, config.port);

    Ok(tokio::spawn(async move {
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind relay on {}: {}", addr, e);
                return;
            }
        };
        info!("Relay listening on http://{}{}", addr, PROXY_PREFIX);
        if let Err(e) = axum::serve(listener, app).await {
            error!("Relay server error: {}", e);
        }
    }))
}
