use crate::domain::receipt::{Receipt, ReceiptKind};
use crate::error::{AppError, Result};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct ReceiptRecord {
    pub(crate) message_id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) kind: String,
    pub(crate) recorded_at: OffsetDateTime,
}

impl TryFrom<ReceiptRecord> for Receipt {
    type Error = AppError;

    fn try_from(record: ReceiptRecord) -> Result<Self> {
        let kind = record.kind.parse::<ReceiptKind>().map_err(|_| AppError::Internal)?;
        Ok(Self { message_id: record.message_id, user_id: record.user_id, kind, recorded_at: record.recorded_at })
    }
}

/// A freshly inserted ledger row joined with the message it acknowledges.
#[derive(Debug, sqlx::FromRow)]
pub struct NewReceiptRecord {
    pub(crate) message_id: Uuid,
    pub(crate) room_id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) kind: String,
    pub(crate) recorded_at: OffsetDateTime,
}
