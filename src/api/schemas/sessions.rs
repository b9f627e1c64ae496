use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeOthersResponse {
    pub revoked: u64,
}
