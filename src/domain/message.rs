use crate::domain::receipt::{Acknowledgments, Receipt};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

const MAX_POLL_OPTIONS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Gif,
    Audio,
    File,
    Poll,
    Location,
}

impl MessageType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Gif => "gif",
            Self::Audio => "audio",
            Self::File => "file",
            Self::Poll => "poll",
            Self::Location => "location",
        }
    }

    /// Media messages reference an uploaded object by URL.
    #[must_use]
    pub const fn is_media(self) -> bool {
        matches!(self, Self::Image | Self::Gif | Self::Audio | Self::File)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "gif" => Ok(Self::Gif),
            "audio" => Ok(Self::Audio),
            "file" => Ok(Self::File),
            "poll" => Ok(Self::Poll),
            "location" => Ok(Self::Location),
            other => Err(AppError::BadRequest(format!("Unknown message type: {other}"))),
        }
    }
}

/// A message as submitted by a client, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub room_id: Uuid,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_mime: Option<String>,
    #[serde(default)]
    pub media_size: Option<i64>,
    #[serde(default)]
    pub duration_ms: Option<i32>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub is_view_once: bool,
}

impl NewMessage {
    /// Checks the payload against the rules of its message type and normalizes text content.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` describing the first violated rule.
    pub fn validate(mut self, max_content_length: usize) -> Result<Self> {
        self.content = self.content.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());

        if self.content.as_ref().is_some_and(|c| c.chars().count() > max_content_length) {
            return Err(AppError::BadRequest(format!("Content exceeds {max_content_length} characters")));
        }

        if self.is_view_once && !self.message_type.is_media() {
            return Err(AppError::BadRequest("Only media messages can be view-once".into()));
        }

        if self.message_type.is_media() {
            let has_url = self.media_url.as_deref().is_some_and(|u| !u.trim().is_empty());
            if !has_url {
                return Err(AppError::BadRequest(format!("A {} message requires media_url", self.message_type)));
            }
            if self.media_size.is_some_and(|s| s < 0) {
                return Err(AppError::BadRequest("media_size cannot be negative".into()));
            }
        }

        match self.message_type {
            MessageType::Text => {
                if self.content.is_none() {
                    return Err(AppError::BadRequest("Text message content cannot be empty".into()));
                }
            }
            MessageType::Audio => {
                if !self.duration_ms.is_some_and(|d| d > 0) {
                    return Err(AppError::BadRequest("Audio message requires a positive duration_ms".into()));
                }
            }
            MessageType::Poll => validate_poll(self.metadata.as_ref())?,
            MessageType::Location => validate_location(self.metadata.as_ref())?,
            MessageType::Image | MessageType::Gif | MessageType::File => {}
        }

        Ok(self)
    }
}

fn validate_poll(metadata: Option<&serde_json::Value>) -> Result<()> {
    let metadata = metadata.ok_or_else(|| AppError::BadRequest("Poll requires metadata".into()))?;

    let question = metadata.get("question").and_then(serde_json::Value::as_str).map(str::trim).unwrap_or_default();
    if question.is_empty() {
        return Err(AppError::BadRequest("Poll requires a question".into()));
    }

    let options = metadata
        .get("options")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| AppError::BadRequest("Poll requires an options array".into()))?;

    let valid = options.iter().filter_map(serde_json::Value::as_str).filter(|o| !o.trim().is_empty()).count();
    if valid != options.len() || valid < 2 {
        return Err(AppError::BadRequest("Poll requires at least two non-empty options".into()));
    }
    if valid > MAX_POLL_OPTIONS {
        return Err(AppError::BadRequest(format!("Poll allows at most {MAX_POLL_OPTIONS} options")));
    }
    Ok(())
}

fn validate_location(metadata: Option<&serde_json::Value>) -> Result<()> {
    let metadata = metadata.ok_or_else(|| AppError::BadRequest("Location requires metadata".into()))?;
    let lat = metadata.get("lat").and_then(serde_json::Value::as_f64);
    let lng = metadata.get("lng").and_then(serde_json::Value::as_f64);

    match (lat, lng) {
        (Some(lat), Some(lng)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) => Ok(()),
        _ => Err(AppError::BadRequest("Location requires lat in -90..=90 and lng in -180..=180".into())),
    }
}

/// Trims replacement text for an edit and checks it is non-empty and within bounds.
///
/// # Errors
/// Returns `AppError::BadRequest` if the content is blank or too long.
pub fn normalize_edit(content: &str, max_content_length: usize) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("Text message content cannot be empty".into()));
    }
    if trimmed.chars().count() > max_content_length {
        return Err(AppError::BadRequest(format!("Content exceeds {max_content_length} characters")));
    }
    Ok(trimmed.to_string())
}

/// A voice note upload: an `audio` message without the general-purpose fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAudioMessage {
    pub room_id: Uuid,
    pub media_url: String,
    #[serde(default)]
    pub media_mime: Option<String>,
    #[serde(default)]
    pub media_size: Option<i64>,
    pub duration_ms: i32,
    #[serde(default)]
    pub is_view_once: bool,
}

impl From<NewAudioMessage> for NewMessage {
    fn from(audio: NewAudioMessage) -> Self {
        Self {
            room_id: audio.room_id,
            message_type: MessageType::Audio,
            content: None,
            media_url: Some(audio.media_url),
            media_mime: audio.media_mime.or_else(|| Some("audio/webm".to_string())),
            media_size: audio.media_size,
            duration_ms: Some(audio.duration_ms),
            metadata: None,
            is_view_once: audio.is_view_once,
        }
    }
}

/// A stored message.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_mime: Option<String>,
    pub media_size: Option<i64>,
    pub duration_ms: Option<i32>,
    pub metadata: Option<serde_json::Value>,
    pub is_view_once: bool,
    pub is_deleted_for_everyone: bool,
    pub deleted_for_user_ids: Vec<Uuid>,
    pub edited_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl Message {
    #[must_use]
    pub fn is_deleted_for(&self, user_id: Uuid) -> bool {
        self.deleted_for_user_ids.contains(&user_id)
    }

    /// Whether `user_id` may still see this message given when they last cleared the room.
    #[must_use]
    pub fn is_visible_to(&self, user_id: Uuid, cleared_at: Option<OffsetDateTime>) -> bool {
        !self.is_deleted_for(user_id) && cleared_at.is_none_or(|cleared| self.created_at > cleared)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewOnceState {
    Unopened,
    Opened,
}

/// A message as one particular viewer is allowed to see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_mime: Option<String>,
    pub media_size: Option<i64>,
    pub duration_ms: Option<i32>,
    pub metadata: Option<serde_json::Value>,
    pub is_view_once: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub view_once_state: Option<ViewOnceState>,
    pub is_deleted_for_everyone: bool,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub edited_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub acknowledgments: Acknowledgments,
}

impl MessageView {
    /// Projects a stored message for `viewer`. A view-once message the viewer has already
    /// opened loses its payload; the sender always keeps theirs.
    #[must_use]
    pub fn project(message: Message, receipts: &[Receipt], viewer: Option<Uuid>) -> Self {
        let acknowledgments = Acknowledgments::from_receipts(message.sender_id, receipts);

        let view_once_state = message.is_view_once.then(|| {
            let opened = viewer.is_some_and(|v| v != message.sender_id && acknowledgments.viewed_by.contains(&v));
            if opened { ViewOnceState::Opened } else { ViewOnceState::Unopened }
        });

        let mut view = Self {
            id: message.id,
            room_id: message.room_id,
            user_id: message.sender_id,
            message_type: message.message_type,
            content: message.content,
            media_url: message.media_url,
            media_mime: message.media_mime,
            media_size: message.media_size,
            duration_ms: message.duration_ms,
            metadata: message.metadata,
            is_view_once: message.is_view_once,
            view_once_state,
            is_deleted_for_everyone: message.is_deleted_for_everyone,
            edited_at: message.edited_at,
            created_at: message.created_at,
            acknowledgments,
        };

        if view.view_once_state == Some(ViewOnceState::Opened) {
            view.content = None;
            view.media_url = None;
            view.media_mime = None;
            view.media_size = None;
            view.metadata = None;
        }

        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::receipt::ReceiptKind;
    use serde_json::json;

    fn text(content: &str) -> NewMessage {
        NewMessage {
            room_id: Uuid::new_v4(),
            message_type: MessageType::Text,
            content: Some(content.to_string()),
            media_url: None,
            media_mime: None,
            media_size: None,
            duration_ms: None,
            metadata: None,
            is_view_once: false,
        }
    }

    fn stored(sender: Uuid, view_once: bool) -> Message {
        let now = OffsetDateTime::now_utc();
        Message {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            sender_id: sender,
            message_type: MessageType::Image,
            content: Some("caption".into()),
            media_url: Some("https://cdn.example/img.png".into()),
            media_mime: Some("image/png".into()),
            media_size: Some(1024),
            duration_ms: None,
            metadata: None,
            is_view_once: view_once,
            is_deleted_for_everyone: false,
            deleted_for_user_ids: vec![],
            edited_at: None,
            created_at: now,
            expires_at: now + time::Duration::days(1),
        }
    }

    fn receipt(message_id: Uuid, user_id: Uuid, kind: ReceiptKind) -> Receipt {
        Receipt { message_id, user_id, kind, recorded_at: OffsetDateTime::now_utc() }
    }

    #[test]
    fn test_text_is_trimmed() {
        let msg = text("  hello  ").validate(100).unwrap();
        assert_eq!(msg.content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_blank_text_rejected() {
        assert!(matches!(text("   ").validate(100), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_text_length_counts_chars() {
        assert!(text("ééé").validate(3).is_ok());
        assert!(matches!(text("éééé").validate(3), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_view_once_requires_media() {
        let mut msg = text("secret");
        msg.is_view_once = true;
        assert!(matches!(msg.validate(100), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_media_requires_url() {
        let mut msg = text("caption");
        msg.message_type = MessageType::Image;
        assert!(msg.clone().validate(100).is_err());

        msg.media_url = Some("https://cdn.example/a.png".into());
        assert!(msg.validate(100).is_ok());
    }

    #[test]
    fn test_audio_requires_duration() {
        let mut msg = text("");
        msg.message_type = MessageType::Audio;
        msg.media_url = Some("https://cdn.example/a.webm".into());
        assert!(msg.clone().validate(100).is_err());

        msg.duration_ms = Some(3200);
        assert!(msg.validate(100).is_ok());
    }

    #[test]
    fn test_poll_validation() {
        let mut msg = text("");
        msg.message_type = MessageType::Poll;
        msg.metadata = Some(json!({ "question": "Lunch?", "options": ["Yes"] }));
        assert!(msg.clone().validate(100).is_err());

        msg.metadata = Some(json!({ "question": "Lunch?", "options": ["Yes", " "] }));
        assert!(msg.clone().validate(100).is_err());

        msg.metadata = Some(json!({ "question": "Lunch?", "options": ["Yes", "No"] }));
        assert!(msg.validate(100).is_ok());
    }

    #[test]
    fn test_location_bounds() {
        let mut msg = text("");
        msg.message_type = MessageType::Location;
        msg.metadata = Some(json!({ "lat": 91.0, "lng": 0.0 }));
        assert!(msg.clone().validate(100).is_err());

        msg.metadata = Some(json!({ "lat": 51.5, "lng": -0.12, "label": "London" }));
        assert!(msg.validate(100).is_ok());
    }

    #[test]
    fn test_message_type_parse() {
        assert_eq!("gif".parse::<MessageType>().unwrap(), MessageType::Gif);
        assert!("sticker".parse::<MessageType>().is_err());
    }

    #[test]
    fn test_view_once_opened_strips_payload() {
        let sender = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let msg = stored(sender, true);
        let receipts = vec![receipt(msg.id, viewer, ReceiptKind::Viewed)];

        let view = MessageView::project(msg, &receipts, Some(viewer));

        assert_eq!(view.view_once_state, Some(ViewOnceState::Opened));
        assert!(view.media_url.is_none());
        assert!(view.content.is_none());
    }

    #[test]
    fn test_view_once_unopened_for_other_viewer() {
        let sender = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let other = Uuid::new_v4();
        let msg = stored(sender, true);
        let receipts = vec![receipt(msg.id, viewer, ReceiptKind::Viewed)];

        let view = MessageView::project(msg, &receipts, Some(other));

        assert_eq!(view.view_once_state, Some(ViewOnceState::Unopened));
        assert!(view.media_url.is_some());
    }

    #[test]
    fn test_sender_keeps_view_once_media() {
        let sender = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let msg = stored(sender, true);
        let receipts = vec![receipt(msg.id, viewer, ReceiptKind::Viewed)];

        let view = MessageView::project(msg, &receipts, Some(sender));

        assert_eq!(view.view_once_state, Some(ViewOnceState::Unopened));
        assert!(view.media_url.is_some());
        assert_eq!(view.acknowledgments.viewed_by, vec![viewer]);
    }

    #[test]
    fn test_visibility_respects_delete_and_clear() {
        let viewer = Uuid::new_v4();
        let mut msg = stored(Uuid::new_v4(), false);

        assert!(msg.is_visible_to(viewer, None));
        assert!(!msg.is_visible_to(viewer, Some(msg.created_at + time::Duration::seconds(1))));

        msg.deleted_for_user_ids.push(viewer);
        assert!(!msg.is_visible_to(viewer, None));
    }

    #[test]
    fn test_view_serializes_type_field() {
        let view = MessageView::project(stored(Uuid::new_v4(), false), &[], None);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["type"], "image");
        assert!(json.get("view_once_state").is_none());
        assert_eq!(json["read_by"], json!([]));
    }

    #[test]
    fn test_edit_content_is_trimmed_and_bounded() {
        assert_eq!(normalize_edit("  fixed  ", 10).unwrap(), "fixed");
        assert!(normalize_edit("   ", 10).is_err());
        assert!(normalize_edit("way too long for this", 5).is_err());
    }

    #[test]
    fn test_audio_shortcut_builds_valid_audio() {
        let audio = NewAudioMessage {
            room_id: Uuid::new_v4(),
            media_url: "https://cdn.example/v.webm".into(),
            media_mime: None,
            media_size: Some(2048),
            duration_ms: 3500,
            is_view_once: false,
        };

        let message = NewMessage::from(audio).validate(100).unwrap();
        assert_eq!(message.message_type, MessageType::Audio);
        assert_eq!(message.media_mime.as_deref(), Some("audio/webm"));
    }
}
