use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use palaver_types::api::SendMessageRequest;
use palaver_types::models::Message;

use crate::{AppState, into_status, require_node};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_room")]
    pub room_id: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_room() -> String {
    "general".into()
}

fn default_limit() -> u32 {
    50
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.room_id.is_empty() || req.content.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let node = require_node(&state).await?;
    let message = node
        .local_send(&req.room_id, &req.content)
        .await
        .map_err(into_status)?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let node = require_node(&state).await?;
    let messages = node
        .query(&query.room_id, query.limit.min(200), query.offset)
        .await
        .map_err(into_status)?;
    Ok(Json(messages))
}

pub async fn get_rooms(State(state): State<AppState>) -> Result<Json<Vec<String>>, StatusCode> {
    let node = require_node(&state).await?;
    let rooms = node.rooms().await.map_err(into_status)?;
    Ok(Json(rooms))
}
