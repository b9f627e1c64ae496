use crate::domain::room::{MemberRole, Membership, Room, RoomKind, RoomSummary};
use crate::error::{AppError, Result};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct RoomRecord {
    pub(crate) id: Uuid,
    pub(crate) kind: String,
    pub(crate) name: Option<String>,
    pub(crate) created_by: Option<Uuid>,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<RoomRecord> for Room {
    type Error = AppError;

    fn try_from(record: RoomRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            kind: record.kind.parse::<RoomKind>().map_err(|_| AppError::Internal)?,
            name: record.name,
            created_by: record.created_by,
            created_at: record.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct MembershipRecord {
    pub(crate) room_id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) role: String,
    pub(crate) is_pinned: bool,
    pub(crate) is_archived: bool,
    pub(crate) is_hidden: bool,
    pub(crate) cleared_at: Option<OffsetDateTime>,
    pub(crate) joined_at: OffsetDateTime,
}

impl TryFrom<MembershipRecord> for Membership {
    type Error = AppError;

    fn try_from(record: MembershipRecord) -> Result<Self> {
        Ok(Self {
            room_id: record.room_id,
            user_id: record.user_id,
            role: record.role.parse::<MemberRole>().map_err(|_| AppError::Internal)?,
            is_pinned: record.is_pinned,
            is_archived: record.is_archived,
            is_hidden: record.is_hidden,
            cleared_at: record.cleared_at,
            joined_at: record.joined_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct RoomSummaryRecord {
    pub(crate) id: Uuid,
    pub(crate) kind: String,
    pub(crate) name: Option<String>,
    pub(crate) created_by: Option<Uuid>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) role: String,
    pub(crate) is_pinned: bool,
    pub(crate) is_archived: bool,
    pub(crate) is_hidden: bool,
    pub(crate) cleared_at: Option<OffsetDateTime>,
    pub(crate) member_ids: Vec<Uuid>,
    pub(crate) last_message_at: Option<OffsetDateTime>,
}

impl TryFrom<RoomSummaryRecord> for RoomSummary {
    type Error = AppError;

    fn try_from(record: RoomSummaryRecord) -> Result<Self> {
        Ok(Self {
            room: Room {
                id: record.id,
                kind: record.kind.parse::<RoomKind>().map_err(|_| AppError::Internal)?,
                name: record.name,
                created_by: record.created_by,
                created_at: record.created_at,
            },
            role: record.role.parse::<MemberRole>().map_err(|_| AppError::Internal)?,
            is_pinned: record.is_pinned,
            is_archived: record.is_archived,
            is_hidden: record.is_hidden,
            cleared_at: record.cleared_at,
            member_ids: record.member_ids,
            last_message_at: record.last_message_at,
        })
    }
}
