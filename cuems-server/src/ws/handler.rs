//! Upgrade handlers for the two WebSocket paths this server serves.
//! Grounded on `ferrex-server/src/handlers/handle_websocket.rs`'s
//! `ws.on_upgrade(...)` pattern and `CuemsWsServer.connection_handler`'s
//! path-based routing (`/` vs `/upload`) in
//! `original_source/CuemsWsServer.py`.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;

use crate::ws::session;
use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct SessionQuery {
    #[serde(default)]
    pub session: Option<String>,
}

pub async fn project_manager_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Response {
    ws.on_upgrade(move |socket| session::run_project_manager_session(socket, state, query.session))
}

pub async fn upload_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session::run_upload_session(socket, state))
}
