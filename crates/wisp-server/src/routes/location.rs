//! Entity location lookup: `GET /api/entity/location`.

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::server::AppState;

use super::room_id_header;

/// Report where the entity is relative to the caller's room.
pub async fn entity_location(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(room_id) = room_id_header(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing x-room-id header" })),
        )
            .into_response();
    };
    match state.entity.current_room() {
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "the entity has not been born" })),
        )
            .into_response(),
        Some(entity_room) => {
            let is_here = entity_room == room_id;
            Json(json!({ "entityRoomId": entity_room, "isEntityHere": is_here })).into_response()
        }
    }
}
