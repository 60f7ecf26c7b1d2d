//! Inbound protocol handling
//!
//! Turns one text frame from a connection into registry calls. Every failure
//! is a `ProtocolError` whose `Display` text goes back to the sender as an
//! `error` message; nothing in here can take down the run loop.

use crate::player::sanitize_name;
use crate::registry::Registry;
use crate::utils::trim_and_cap;
use serde_json::Value;
use shared::{ClientId, ClientMessage, ServerMessage, MAX_ROOM_ID_LEN};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("message has no type")]
    MissingType,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("not joined to a room")]
    NotJoined,
    #[error("already joined a room")]
    AlreadyJoined,
    #[error("invalid name")]
    InvalidName,
    #[error("invalid room id")]
    InvalidRoomId,
    #[error("server full")]
    ServerFull,
}

/// Parses a text frame into a `ClientMessage`.
///
/// The `type` tag is checked before the body so that an unknown type is
/// reported as such rather than as a shape error.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;
    if !ClientMessage::KINDS.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Room ids must be strings; they are trimmed and capped at `MAX_ROOM_ID_LEN` characters.
pub fn validate_room_id(raw: &Value) -> Result<String, ProtocolError> {
    raw.as_str()
        .and_then(|text| trim_and_cap(text, MAX_ROOM_ID_LEN))
        .ok_or(ProtocolError::InvalidRoomId)
}

pub fn validate_name(raw: &Value) -> Result<String, ProtocolError> {
    raw.as_str()
        .and_then(sanitize_name)
        .ok_or(ProtocolError::InvalidName)
}

/// Applies one inbound frame from `client`.
///
/// Returns the direct reply for the sender, if the message has one. State
/// changes are not echoed here; they reach everyone through the next
/// broadcast.
pub fn handle_message(
    registry: &mut Registry,
    client: ClientId,
    text: &str,
    now: Instant,
) -> Result<Option<ServerMessage>, ProtocolError> {
    match parse_client_message(text)? {
        ClientMessage::Join { room_id, name } => {
            let room_id = validate_room_id(&room_id)?;
            let name = validate_name(&name)?;
            let outcome = registry.join(client, &room_id, name)?;
            Ok(Some(ServerMessage::Joined {
                id: client,
                room_id: outcome.room_id,
            }))
        }
        ClientMessage::Ready { ready } => {
            registry.set_ready(client, ready)?;
            Ok(None)
        }
        ClientMessage::Flap => {
            registry.flap(client, now)?;
            Ok(None)
        }
        ClientMessage::Restart => {
            registry.restart(client, now)?;
            Ok(None)
        }
        ClientMessage::ListRooms => Ok(Some(ServerMessage::Rooms {
            rooms: registry.list_rooms(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use serde_json::json;
    use shared::LifecycleState;
    use tokio_test::{assert_err, assert_ok};

    fn registry() -> Registry {
        Registry::new(GameConfig {
            seed: Some(3),
            ..GameConfig::default()
        })
    }

    #[test]
    fn test_parse_known_messages() {
        let join = assert_ok!(parse_client_message(
            r#"{"type":"join","roomId":"alpha","name":"Ann"}"#
        ));
        assert_eq!(
            join,
            ClientMessage::Join {
                room_id: json!("alpha"),
                name: json!("Ann"),
            }
        );

        let ready = assert_ok!(parse_client_message(r#"{"type":"ready"}"#));
        assert_eq!(ready, ClientMessage::Ready { ready: true });

        let unready = assert_ok!(parse_client_message(r#"{"type":"ready","ready":false}"#));
        assert_eq!(unready, ClientMessage::Ready { ready: false });

        assert_ok!(parse_client_message(r#"{"type":"listRooms"}"#));
    }

    #[test]
    fn test_parse_failures() {
        let err = assert_err!(parse_client_message("{not json"));
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = assert_err!(parse_client_message(r#"{"roomId":"alpha"}"#));
        assert_eq!(err, ProtocolError::MissingType);

        let err = assert_err!(parse_client_message(r#"{"type":"teleport"}"#));
        assert_eq!(err, ProtocolError::UnknownType("teleport".to_string()));

        let err = assert_err!(parse_client_message(r#"{"type":"ready","ready":"yes"}"#));
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = assert_err!(parse_client_message("[1,2,3]"));
        assert_eq!(err, ProtocolError::MissingType);
    }

    #[test]
    fn test_room_id_validation() {
        assert_eq!(assert_ok!(validate_room_id(&json!("  alpha "))), "alpha");
        assert_eq!(
            assert_ok!(validate_room_id(&json!("r".repeat(50)))).len(),
            MAX_ROOM_ID_LEN
        );
        assert_err!(validate_room_id(&json!("   ")));
        assert_err!(validate_room_id(&json!(7)));
        assert_err!(validate_room_id(&Value::Null));
    }

    #[test]
    fn test_name_validation() {
        assert_eq!(assert_ok!(validate_name(&json!(" Ann "))), "Ann");
        assert_eq!(
            assert_err!(validate_name(&json!(""))),
            ProtocolError::InvalidName
        );
        assert_eq!(
            assert_err!(validate_name(&json!(["Ann"]))),
            ProtocolError::InvalidName
        );
        assert_eq!(
            assert_err!(validate_name(&Value::Null)),
            ProtocolError::InvalidName
        );
    }

    #[test]
    fn test_join_replies_with_id_and_room() {
        let mut registry = registry();
        let reply = assert_ok!(handle_message(
            &mut registry,
            7,
            r#"{"type":"join","roomId":"alpha","name":"Ann"}"#,
            Instant::now(),
        ));
        assert_eq!(
            reply,
            Some(ServerMessage::Joined {
                id: 7,
                room_id: "alpha".to_string(),
            })
        );
        assert_eq!(registry.room("alpha").map(|r| r.len()), Some(1));
    }

    #[test]
    fn test_invalid_join_leaves_no_room() {
        let mut registry = registry();
        let err = assert_err!(handle_message(
            &mut registry,
            7,
            r#"{"type":"join","roomId":"alpha","name":42}"#,
            Instant::now(),
        ));
        assert_eq!(err, ProtocolError::InvalidName);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_inputs_before_join_are_rejected() {
        let mut registry = registry();
        let now = Instant::now();
        for frame in [
            r#"{"type":"ready"}"#,
            r#"{"type":"flap"}"#,
            r#"{"type":"restart"}"#,
        ] {
            let err = assert_err!(handle_message(&mut registry, 1, frame, now));
            assert_eq!(err, ProtocolError::NotJoined);
        }
    }

    #[test]
    fn test_ready_frames_start_countdown() {
        let mut registry = registry();
        let now = Instant::now();
        for (id, name) in [(1, "Ann"), (2, "Bo")] {
            let frame = json!({"type": "join", "roomId": "alpha", "name": name}).to_string();
            assert_ok!(handle_message(&mut registry, id, &frame, now));
        }
        for id in [1, 2] {
            let reply = assert_ok!(handle_message(&mut registry, id, r#"{"type":"ready"}"#, now));
            assert!(reply.is_none());
        }

        registry.tick(now);
        assert_eq!(
            registry.room("alpha").map(|r| r.state()),
            Some(LifecycleState::Countdown)
        );
    }

    #[test]
    fn test_list_rooms_without_joining() {
        let mut registry = registry();
        let now = Instant::now();
        assert_ok!(handle_message(
            &mut registry,
            1,
            r#"{"type":"join","roomId":"alpha","name":"Ann"}"#,
            now,
        ));

        let reply = assert_ok!(handle_message(
            &mut registry,
            2,
            r#"{"type":"listRooms"}"#,
            now
        ));
        match reply {
            Some(ServerMessage::Rooms { rooms }) => {
                assert_eq!(rooms.len(), 1);
                assert_eq!(rooms[0].id, "alpha");
                assert_eq!(rooms[0].players, 1);
            }
            other => panic!("Unexpected reply: {:?}", other),
        }
    }

    #[test]
    fn test_error_text_is_client_message() {
        assert_eq!(ProtocolError::ServerFull.to_string(), "server full");
        assert_eq!(
            ProtocolError::UnknownType("x".to_string()).to_string(),
            "unknown message type: x"
        );
    }
}
