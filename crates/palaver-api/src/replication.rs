//! Peer-facing replication endpoints: the receiving half of the
//! gossip exchange. Schema is validated here at the boundary; both
//! routes answer 503 until the node is initialized.

use axum::{Json, extract::State, http::StatusCode};
use tracing::{debug, warn};

use palaver_types::wire::{
    ExchangeRequest, ExchangeResponse, ReplicateRequest, ReplicateResponse,
};

use crate::{AppState, into_status, require_node};

/// Answer a gossip exchange: register the caller as a peer, then hand
/// back our clock table plus every message the caller's clocks have
/// not covered (optionally scoped to one room for on-demand sync).
pub async fn gossip_exchange(
    State(state): State<AppState>,
    Json(req): Json<ExchangeRequest>,
) -> Result<Json<ExchangeResponse>, StatusCode> {
    let node = require_node(&state).await?;

    // The caller told us where to reach it and what it has seen; a
    // statically configured topology self-completes this way.
    if !req.addr.is_empty() {
        if let Err(e) = node
            .mark_peer_synced(&req.addr, &req.node_id, &req.clocks)
            .await
        {
            warn!("Could not register gossiping peer {}: {}", req.addr, e);
        }
    }

    let messages = node
        .messages_after(req.room.as_deref(), &req.clocks)
        .await
        .map_err(into_status)?;

    debug!(
        "Exchange with '{}': sending {} messages",
        req.node_id,
        messages.len()
    );
    Ok(Json(ExchangeResponse {
        node_id: node.identity().to_string(),
        clocks: node.clocks().await,
        messages,
    }))
}

/// Accept a pushed delta. Admission is idempotent, so overlapping
/// gossip rounds re-delivering the same messages are harmless.
pub async fn replicate(
    State(state): State<AppState>,
    Json(req): Json<ReplicateRequest>,
) -> Result<Json<ReplicateResponse>, StatusCode> {
    let node = require_node(&state).await?;

    let (applied, duplicates) = node.admit_all(req.messages).await.map_err(into_status)?;

    if applied > 0 {
        debug!("Replicated {} messages from '{}'", applied, req.node_id);
    }
    Ok(Json(ReplicateResponse {
        applied,
        duplicates,
    }))
}
