use crate::domain::session::UserSession;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct SessionRecord {
    pub(crate) id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) device_name: Option<String>,
    pub(crate) browser: Option<String>,
    pub(crate) os: Option<String>,
    pub(crate) ip_address: Option<String>,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) last_active_at: OffsetDateTime,
}

impl From<SessionRecord> for UserSession {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            device_name: record.device_name,
            browser: record.browser,
            os: record.os,
            ip_address: record.ip_address,
            created_at: record.created_at,
            last_active_at: record.last_active_at,
        }
    }
}
