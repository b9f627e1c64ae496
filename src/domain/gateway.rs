use crate::domain::message::NewMessage;
use serde::Deserialize;
use uuid::Uuid;

/// A `send_message` frame: the message plus an optional client-chosen correlation id
/// echoed back in `message:sent` or `error`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutgoingMessage {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(flatten)]
    pub message: NewMessage,
}

/// Frames a socket client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join_room")]
    JoinRoom { room_id: Uuid },
    #[serde(rename = "leave_room")]
    LeaveRoom { room_id: Uuid },
    #[serde(rename = "send_message")]
    SendMessage(OutgoingMessage),
    #[serde(rename = "presence:heartbeat")]
    Heartbeat,
    #[serde(rename = "message:delivered")]
    Delivered { message_ids: Vec<Uuid> },
    #[serde(rename = "message:read")]
    Read { message_ids: Vec<Uuid> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MessageType;

    #[test]
    fn test_parse_join_room() {
        let room_id = Uuid::new_v4();
        let frame = format!(r#"{{"event":"join_room","data":{{"room_id":"{room_id}"}}}}"#);

        let event: ClientEvent = serde_json::from_str(&frame).unwrap();
        assert_eq!(event, ClientEvent::JoinRoom { room_id });
    }

    #[test]
    fn test_parse_heartbeat_without_data() {
        let event: ClientEvent = serde_json::from_str(r#"{"event":"presence:heartbeat"}"#).unwrap();
        assert_eq!(event, ClientEvent::Heartbeat);
    }

    #[test]
    fn test_parse_send_message() {
        let room_id = Uuid::new_v4();
        let frame = format!(
            r#"{{"event":"send_message","data":{{"client_id":"c-1","room_id":"{room_id}","type":"text","content":"hi"}}}}"#
        );

        let ClientEvent::SendMessage(outgoing) = serde_json::from_str(&frame).unwrap() else {
            panic!("expected send_message");
        };
        assert_eq!(outgoing.client_id.as_deref(), Some("c-1"));
        assert_eq!(outgoing.message.message_type, MessageType::Text);
        assert_eq!(outgoing.message.content.as_deref(), Some("hi"));
        assert!(!outgoing.message.is_view_once);
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"typing","data":{}}"#).is_err());
    }
}
