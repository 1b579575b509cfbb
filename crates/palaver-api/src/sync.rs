use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use palaver_types::api::SyncRoomResponse;

use crate::{AppState, require_node};

/// On-demand catch-up for one room, triggered when a client opens it.
///
/// Always answers 200 once the node is initialized: sync failure is
/// never user-fatal, the client just sees what is stored locally.
pub async fn sync_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<SyncRoomResponse>, StatusCode> {
    let node = require_node(&state).await?;

    info!("Manual sync requested for room '{}'", room_id);
    let report = state.sync.sync_room(&node, &room_id).await;

    Ok(Json(SyncRoomResponse {
        status: "synced".into(),
        room_id,
        applied: report.applied,
    }))
}
