pub mod health;
pub mod messages;
pub mod rooms;
pub mod sessions;
pub mod users;
