//! Branded ID newtypes.
//!
//! Rooms, sessions, connections, and turns all carry string identifiers
//! on the wire; wrapping each in its own newtype keeps them from being
//! swapped at call sites. All generated IDs are UUID v7: the timestamp
//! prefix makes them sortable-enough for logs and the random tail makes
//! them unique, which is exactly what turn disambiguation needs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn fresh() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a new random ID (UUID v7).
            #[must_use]
            pub fn generate() -> Self {
                Self(fresh())
            }

            /// Borrow the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// True when the inner string is empty.
            ///
            /// Client-supplied IDs arrive as free-form strings; an empty
            /// one is never valid.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::generate()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier for a room (one ephemeral world).
    RoomId
}

branded_id! {
    /// Identifier for one client's membership in a room.
    SessionId
}

branded_id! {
    /// Identifier for a live socket connection.
    ConnectionId
}

branded_id! {
    /// Identifier for one exclusive conversational turn.
    ///
    /// UUID v7 gives the timestamp-plus-random shape that stale-turn
    /// disambiguation relies on.
    TurnId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = RoomId::generate();
        let b = RoomId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn generated_ids_parse_as_uuid() {
        let id = TurnId::generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn from_str_round_trips() {
        let id = RoomId::from("room-7");
        assert_eq!(id.as_str(), "room-7");
        assert_eq!(String::from(id), "room-7");
    }

    #[test]
    fn serde_is_transparent() {
        let id = SessionId::from("s1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"s1\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn empty_detection() {
        assert!(RoomId::from("").is_empty());
        assert!(!RoomId::generate().is_empty());
    }

    #[test]
    fn display_matches_inner() {
        let id = ConnectionId::from("conn_9");
        assert_eq!(id.to_string(), "conn_9");
    }
}
