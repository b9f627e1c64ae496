use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

/// Keyset cursor for room history: `before` is the id of the oldest message already held.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub marked: usize,
}
