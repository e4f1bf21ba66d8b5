//! HTTP route handlers.

pub mod clips;
pub mod location;

use axum::http::HeaderMap;

use wisp_core::ids::RoomId;

/// Header carrying the caller's room on HTTP endpoints.
pub const ROOM_ID_HEADER: &str = "x-room-id";

/// Extract the caller's room id from request headers.
#[must_use]
pub fn room_id_header(headers: &HeaderMap) -> Option<RoomId> {
    headers
        .get(ROOM_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(RoomId::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_parses_to_room_id() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(ROOM_ID_HEADER, HeaderValue::from_static("lobby"));
        assert_eq!(room_id_header(&headers), Some(RoomId::from("lobby")));
    }

    #[test]
    fn missing_or_empty_header_is_none() {
        assert_eq!(room_id_header(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        let _ = headers.insert(ROOM_ID_HEADER, HeaderValue::from_static(""));
        assert_eq!(room_id_header(&headers), None);
    }
}
