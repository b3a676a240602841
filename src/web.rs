//! Transport Listener (spec.md §4.F): WebSocket upgrade plus the HTTP
//! sideband (`clients`, `send`, `receive`).
//!
//! Router construction mirrors the teacher's `web::router` — a flat axum
//! `Router` with a `CorsLayer::permissive()` and a `TraceLayer`, state
//! injected via `.with_state()`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{DefaultBodyLimit, Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::RouterError;
use crate::frame::Frame;
use crate::peer::PeerHandle;
use crate::registry::GroupRegistry;
use crate::router::Router as FrameRouter;
use crate::slot::LargeMessageStore;

pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<GroupRegistry>,
    pub store: Arc<LargeMessageStore>,
    pub router: Arc<FrameRouter>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/{group}/connect", get(connect_handler))
        .route("/{group}/clients", get(clients_handler))
        .route(
            "/{group}/send",
            post(send_post_handler)
                .get(send_get_handler)
                .layer(DefaultBodyLimit::max(state.config.max_sideband_body)),
        )
        .route("/{group}/receive", get(receive_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

fn check_token(config: &ServerConfig, given: Option<&str>) -> bool {
    match &config.token {
        Some(expected) => given == Some(expected.as_str()),
        None => true,
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, message.into()).into_response()
}

fn handshake_error_response(err: RouterError) -> Response {
    let status = match err {
        RouterError::UnsupportedVersion(_) => StatusCode::CONFLICT,
        RouterError::InvalidId(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RouterError::Unauthorized => StatusCode::FORBIDDEN,
        RouterError::SlotNotFound => StatusCode::NOT_FOUND,
        RouterError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
    };
    error_response(status, err.to_string())
}

// ── WebSocket upgrade ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct ConnectQuery {
    id: String,
    v: String,
    t: Option<String>,
}

fn validate_handshake(config: &ServerConfig, q: &ConnectQuery) -> Result<(), RouterError> {
    let major = q.v.split('.').next().unwrap_or("");
    if major != "1" {
        return Err(RouterError::UnsupportedVersion(q.v.clone()));
    }
    if q.id.len() < 5 {
        return Err(RouterError::InvalidId(q.id.clone()));
    }
    if !check_token(config, q.t.as_deref()) {
        return Err(RouterError::Unauthorized);
    }
    Ok(())
}

async fn connect_handler(
    Path(group): Path<String>,
    Query(q): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(err) = validate_handshake(&state.config, &q) {
        return handshake_error_response(err);
    }
    ws.on_upgrade(move |socket| handle_socket(socket, group, q.id, q.v, state))
}

async fn handle_socket(mut socket: WebSocket, group: String, id: String, version: String, state: Arc<AppState>) {
    let connected_at_ms = now_ms();
    let (peer, mut io) = PeerHandle::new(id.clone(), group.clone(), connected_at_ms, version);

    // ADMITTED: welcome enqueued before the session is visible to others.
    peer.send(Frame::Welcome {
        max_payload: state.config.max_payload,
    });

    let evicted = state.registry.add(Arc::clone(&peer));
    if evicted.is_some() {
        tracing::info!(group = %group, id = %id, "evicted incumbent peer on duplicate id");
    }
    tracing::info!(group = %group, id = %id, "peer session admitted");
    broadcast_connect(&state.registry, &group, &peer);

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        state.router.handle_incoming(&group, &id, text.as_str());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Binary frames on the streaming transport are silently dropped (spec.md §7).
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            outgoing = io.outbound.recv() => {
                match outgoing {
                    Some(frame) => {
                        if socket.send(Message::Text(frame.encode().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = &mut io.closed => break,
        }
    }

    state.registry.remove(&group, &peer);
    broadcast_disconnect(&state.registry, &group, &id);
    tracing::info!(
        group = %group,
        id = %id,
        duration_ms = now_ms().saturating_sub(connected_at_ms),
        "peer session ended"
    );
}

fn broadcast_connect(registry: &GroupRegistry, group: &str, newcomer: &Arc<PeerHandle>) {
    for peer in registry.list(group) {
        if Arc::ptr_eq(&peer, newcomer) {
            continue;
        }
        if !peer.send(Frame::Connect {
            peer_id: newcomer.id.clone(),
        }) {
            tracing::warn!(group, peer_id = %peer.id, "back-pressure publishing connect");
        }
    }
}

fn broadcast_disconnect(registry: &GroupRegistry, group: &str, id: &str) {
    for peer in registry.list(group) {
        if !peer.send(Frame::Disconnect {
            peer_id: id.to_string(),
        }) {
            tracing::warn!(group, peer_id = %peer.id, "back-pressure publishing disconnect");
        }
    }
}

// ── GET /{group}/clients ────────────────────────────────────────────────

#[derive(Serialize)]
struct ClientInfo {
    id: String,
    connected: u64,
}

async fn clients_handler(Path(group): Path<String>, State(state): State<Arc<AppState>>) -> Json<Vec<ClientInfo>> {
    let clients = state
        .registry
        .list(&group)
        .into_iter()
        .map(|p| ClientInfo {
            id: p.id.clone(),
            connected: p.connected_at_ms,
        })
        .collect();
    Json(clients)
}

// ── POST/GET /{group}/send ──────────────────────────────────────────────

#[derive(Deserialize)]
struct SendQuery {
    id: String,
    t: Option<String>,
}

async fn send_post_handler(
    Path(group): Path<String>,
    Query(q): Query<SendQuery>,
    State(state): State<Arc<AppState>>,
    body: String,
) -> Response {
    match authorize_sideband(&state, &group, &q.id, q.t.as_deref()) {
        Ok(()) => {
            state.router.handle_incoming(&group, &q.id, &body);
            "ok".into_response()
        }
        Err(resp) => resp,
    }
}

#[derive(Deserialize)]
struct SendGetQuery {
    id: String,
    t: Option<String>,
    msg: String,
}

async fn send_get_handler(
    Path(group): Path<String>,
    Query(q): Query<SendGetQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if !state.config.dev_mode {
        return handshake_error_response(RouterError::MethodNotAllowed);
    }
    match authorize_sideband(&state, &group, &q.id, q.t.as_deref()) {
        Ok(()) => {
            state.router.handle_incoming(&group, &q.id, &q.msg);
            "ok".into_response()
        }
        Err(resp) => resp,
    }
}

fn authorize_sideband(state: &AppState, group: &str, id: &str, token: Option<&str>) -> Result<(), Response> {
    if !check_token(&state.config, token) {
        return Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }
    if state.registry.find_by_id(group, id).is_none() {
        return Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }
    Ok(())
}

// ── GET /{group}/receive ────────────────────────────────────────────────

#[derive(Deserialize)]
struct ReceiveQuery {
    #[allow(dead_code)]
    id: String,
    msg: String,
    t: Option<String>,
}

async fn receive_handler(
    Path(_group): Path<String>,
    Query(q): Query<ReceiveQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if !check_token(&state.config, q.t.as_deref()) {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    match state.store.take(&q.msg) {
        Some(payload) => payload.into_response(),
        None => handshake_error_response(RouterError::SlotNotFound),
    }
}
