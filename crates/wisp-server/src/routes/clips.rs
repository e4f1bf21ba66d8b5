//! The clip upload boundary: `POST /api/clips`.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, info};

use wisp_audio::AudioError;
use wisp_core::errors::GateError;
use wisp_core::events::ServerEvent;
use wisp_live::SubmitOutcome;

use crate::server::AppState;

use super::room_id_header;

/// Accept one voice clip and run it as a turn.
///
/// Checks run cheapest-first. The gate is claimed only after the clip
/// decoded, and is released again on every path that does not complete
/// a turn.
pub async fn upload_clip(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(room_id) = room_id_header(&headers) else {
        return reject(StatusCode::BAD_REQUEST, "missing x-room-id header");
    };
    if let Err(e) = state.gate.check(&room_id) {
        return gate_rejection(&e);
    }
    if state.registry.get_room(&room_id).is_none() {
        debug!(%room_id, "clip for an unknown room");
        return reject(StatusCode::FORBIDDEN, "unknown room");
    }
    if state.entity.current_room().as_ref() != Some(&room_id) {
        return reject(StatusCode::FORBIDDEN, "the entity is not in this room");
    }

    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    let clip = match wisp_audio::decode_clip(&body, mime, state.config.max_clip_secs) {
        Ok(clip) => clip,
        Err(AudioError::TooLong {
            duration_secs,
            limit_secs,
        }) => {
            info!(%room_id, duration_secs, limit_secs, "clip over the duration ceiling");
            return reject(StatusCode::PAYLOAD_TOO_LARGE, "clip is too long");
        }
        Err(e) => {
            debug!(%room_id, error = %e, "undecodable clip");
            return reject(StatusCode::BAD_REQUEST, "undecodable clip");
        }
    };

    // The decode took real time; claim authoritatively now.
    if let Err(e) = state.gate.engage(&room_id) {
        return gate_rejection(&e);
    }
    let _ = state
        .broadcast
        .broadcast_all(&ServerEvent::InputDeviceGlobalState {
            active: true,
            room_id: Some(room_id.clone()),
            cooldown_seconds: None,
        });

    info!(%room_id, duration_secs = clip.duration_secs, "clip accepted");
    match state.coordinator.submit_audio(&clip.samples).await {
        SubmitOutcome::Reply { text } => {
            // A mid-turn release (client toggled off) skips the cooldown.
            let cooldown = state
                .gate
                .complete(&room_id)
                .then(|| state.gate.cooldown_secs());
            let _ = state
                .broadcast
                .broadcast_all(&ServerEvent::InputDeviceGlobalState {
                    active: false,
                    room_id: None,
                    cooldown_seconds: cooldown,
                });
            Json(json!({ "text": text })).into_response()
        }
        SubmitOutcome::Busy => {
            let _ = state.gate.release(&room_id);
            let _ = state
                .broadcast
                .broadcast_all(&ServerEvent::InputDeviceGlobalState {
                    active: false,
                    room_id: None,
                    cooldown_seconds: None,
                });
            reject(StatusCode::TOO_MANY_REQUESTS, "a turn is already running")
        }
    }
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn gate_rejection(err: &GateError) -> Response {
    match err {
        GateError::Busy { holder_room } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "another room is capturing", "holderRoomId": holder_room })),
        )
            .into_response(),
        GateError::Cooldown { remaining_seconds } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "cooling down", "remainingSeconds": remaining_seconds })),
        )
            .into_response(),
    }
}
