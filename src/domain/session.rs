use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// A signed-in device. The row id is the `sid` claim of the device's JWT.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_name: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: OffsetDateTime,
    pub last_active_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub device_name: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub ip_address: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_active_at: OffsetDateTime,
    pub is_current: bool,
}

impl UserSession {
    #[must_use]
    pub fn into_view(self, current_session: Uuid) -> SessionView {
        SessionView {
            is_current: self.id == current_session,
            id: self.id,
            device_name: self.device_name,
            browser: self.browser,
            os: self.os,
            ip_address: self.ip_address,
            created_at: self.created_at,
            last_active_at: self.last_active_at,
        }
    }
}
