use crate::domain::room::MembershipPatch;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ListRoomsQuery {
    #[serde(default)]
    pub include_hidden: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateDirectRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMembershipRequest {
    pub is_pinned: Option<bool>,
    pub is_archived: Option<bool>,
    pub is_hidden: Option<bool>,
}

impl From<UpdateMembershipRequest> for MembershipPatch {
    fn from(req: UpdateMembershipRequest) -> Self {
        Self { is_pinned: req.is_pinned, is_archived: req.is_archived, is_hidden: req.is_hidden }
    }
}
