use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use palaver_node::Node;
use palaver_types::api::{HealthResponse, InitializeRequest, InitializeResponse, PeersResponse};

use crate::{AppState, into_status, require_node};

/// Idempotent node initialization.
///
/// Reuses the persisted identity when one exists (restarts keep their
/// identity), otherwise adopts the requested identity or generates one.
/// Calling again with a conflicting explicit identity is a 409.
pub async fn initialize(
    State(state): State<AppState>,
    Json(req): Json<InitializeRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Fast path: already live in this process.
    if let Some(node) = state.node.read().await.clone() {
        return respond_existing(&node, req.node_id.as_deref()).await;
    }

    let mut slot = state.node.write().await;
    // Another request may have won the race for the write lock.
    if let Some(node) = slot.clone() {
        return respond_existing(&node, req.node_id.as_deref()).await;
    }

    let db = state.db.clone();
    let persisted = tokio::task::spawn_blocking(move || db.node_identity())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let existed = persisted.is_some();
    let identity = match (&persisted, &req.node_id) {
        (Some(stored), Some(requested)) if stored != requested => {
            return Err(StatusCode::CONFLICT);
        }
        (Some(stored), _) => stored.clone(),
        (None, Some(requested)) => requested.clone(),
        (None, None) => Uuid::new_v4().to_string(),
    };

    let db = state.db.clone();
    let to_persist = identity.clone();
    tokio::task::spawn_blocking(move || db.persist_node_identity(&to_persist))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let node = Node::restore(state.db.clone(), state.dispatcher.clone(), identity.clone())
        .await
        .map_err(into_status)?;
    let node = Arc::new(node);
    let clocks = node.clocks().await;
    *slot = Some(node);

    info!("Node initialized as '{}'", identity);
    Ok(Json(InitializeResponse {
        node_id: identity,
        clocks,
        existed,
    }))
}

async fn respond_existing(
    node: &Arc<Node>,
    requested: Option<&str>,
) -> Result<Json<InitializeResponse>, StatusCode> {
    if let Some(requested) = requested {
        if requested != node.identity() {
            return Err(StatusCode::CONFLICT);
        }
    }
    Ok(Json(InitializeResponse {
        node_id: node.identity().to_string(),
        clocks: node.clocks().await,
        existed: true,
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let node = state.node.read().await.clone();
    Json(HealthResponse {
        status: "online".into(),
        initialized: node.is_some(),
        node_id: node.map(|n| n.identity().to_string()),
    })
}

#[derive(Debug, Deserialize)]
pub struct PeerQuery {
    pub room_id: Option<String>,
}

/// Peer registry snapshot. With `room_id` the list is narrowed to
/// peers known to carry that room, i.e. peers that have acknowledged a
/// clock for it.
pub async fn get_peers(
    State(state): State<AppState>,
    Query(query): Query<PeerQuery>,
) -> Result<Json<PeersResponse>, StatusCode> {
    let node = require_node(&state).await?;
    let mut peers = node.peers().await.map_err(into_status)?;
    if let Some(room_id) = &query.room_id {
        peers.retain(|p| p.last_clocks.get(room_id).is_some());
    }
    Ok(Json(PeersResponse { peers }))
}
