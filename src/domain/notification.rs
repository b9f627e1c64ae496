use crate::domain::message::MessageView;
use crate::domain::presence::PresenceStatus;
use crate::domain::receipt::ReceiptBatch;
use crate::domain::room::{Room, RoomSummary};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteScope {
    Me,
    Everyone,
}

/// Events pushed to socket clients. Serialized as `{"event": <name>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "new_message")]
    NewMessage(MessageView),
    #[serde(rename = "message_edited")]
    MessageEdited(MessageView),
    #[serde(rename = "message_deleted")]
    MessageDeleted { message_id: Uuid, room_id: Uuid, scope: DeleteScope },
    #[serde(rename = "message:receipt")]
    Receipt(ReceiptBatch),
    #[serde(rename = "message:sent")]
    MessageSent { client_id: Option<String>, message: MessageView },
    #[serde(rename = "session:revoked")]
    SessionRevoked { session_id: Uuid },
    #[serde(rename = "session:revoked-others")]
    SessionsRevokedOthers { kept_session_id: Uuid, revoked: u64 },
    #[serde(rename = "user:avatar:updated")]
    AvatarUpdated { user_id: Uuid, avatar_url: String },
    #[serde(rename = "user:avatar:deleted")]
    AvatarDeleted { user_id: Uuid },
    #[serde(rename = "room:updated")]
    RoomUpdated(RoomSummary),
    #[serde(rename = "group:created")]
    GroupCreated { room: Room, member_ids: Vec<Uuid> },
    #[serde(rename = "group:member_added")]
    GroupMemberAdded { room_id: Uuid, user_id: Uuid, added_by: Uuid },
    #[serde(rename = "group:member_removed")]
    GroupMemberRemoved { room_id: Uuid, user_id: Uuid, removed_by: Uuid },
    #[serde(rename = "presence:update")]
    PresenceUpdate(PresenceStatus),
    #[serde(rename = "error")]
    Error { client_id: Option<String>, error: String },
}

impl ServerEvent {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new_message",
            Self::MessageEdited(_) => "message_edited",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::Receipt(_) => "message:receipt",
            Self::MessageSent { .. } => "message:sent",
            Self::SessionRevoked { .. } => "session:revoked",
            Self::SessionsRevokedOthers { .. } => "session:revoked-others",
            Self::AvatarUpdated { .. } => "user:avatar:updated",
            Self::AvatarDeleted { .. } => "user:avatar:deleted",
            Self::RoomUpdated(_) => "room:updated",
            Self::GroupCreated { .. } => "group:created",
            Self::GroupMemberAdded { .. } => "group:member_added",
            Self::GroupMemberRemoved { .. } => "group:member_removed",
            Self::PresenceUpdate(_) => "presence:update",
            Self::Error { .. } => "error",
        }
    }
}

/// Who receives an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "lowercase")]
pub enum EventTarget {
    User(Uuid),
    Room(Uuid),
    Global,
}

/// Wire form of an event travelling between nodes over the pub/sub bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub target: EventTarget,
    pub event: ServerEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let session_id = Uuid::new_v4();
        let json = serde_json::to_value(ServerEvent::SessionRevoked { session_id }).unwrap();

        assert_eq!(json, json!({ "event": "session:revoked", "data": { "session_id": session_id } }));
    }

    #[test]
    fn test_name_matches_serialized_tag() {
        let event = ServerEvent::GroupMemberRemoved {
            room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            removed_by: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], event.name());
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = EventEnvelope {
            target: EventTarget::Room(Uuid::new_v4()),
            event: ServerEvent::MessageDeleted {
                message_id: Uuid::new_v4(),
                room_id: Uuid::new_v4(),
                scope: DeleteScope::Everyone,
            },
        };

        let bytes = serde_json::to_vec(&envelope).unwrap();
        let decoded: EventEnvelope = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_global_target_has_no_id() {
        let json = serde_json::to_value(EventTarget::Global).unwrap();
        assert_eq!(json, json!({ "scope": "global" }));
    }
}
