pub mod messages;
pub mod node;
pub mod replication;
pub mod sync;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tracing::error;

use palaver_db::Database;
use palaver_gateway::{connection, dispatcher::Dispatcher};
use palaver_gossip::SyncCoordinator;
use palaver_node::{Node, NodeError, SharedNode};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub node: SharedNode,
    pub sync: SyncCoordinator,
}

/// All transport routes. Layering (CORS, tracing) is left to the
/// binary so tests can serve this router bare.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Client-facing
        .route("/node/initialize", post(node::initialize))
        .route("/health", get(node::health))
        .route("/peers", get(node::get_peers))
        .route(
            "/messages",
            post(messages::send_message).get(messages::get_messages),
        )
        .route("/rooms", get(messages::get_rooms))
        .route("/rooms/{room_id}/sync", post(sync::sync_room))
        .route("/ws/{room_id}", get(ws_subscribe))
        // Peer-facing replication
        .route("/gossip", post(replication::gossip_exchange))
        .route("/replicate", post(replication::replicate))
        .with_state(state)
}

/// Resolve the live node or reject: core operations before
/// initialization fail, they never half-work.
pub(crate) async fn require_node(state: &AppState) -> Result<Arc<Node>, StatusCode> {
    state
        .node
        .read()
        .await
        .clone()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

pub(crate) fn into_status(err: NodeError) -> StatusCode {
    match err {
        NodeError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        NodeError::Storage(e) => {
            error!("Storage failure: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn ws_subscribe(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let node = require_node(&state).await?;
    let dispatcher = state.dispatcher.clone();
    let node_id = node.identity().to_string();

    Ok(ws.on_upgrade(move |socket| {
        connection::handle_subscription(socket, dispatcher, node_id, room_id)
    }))
}
