use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AvatarRequest {
    pub avatar_url: String,
}
