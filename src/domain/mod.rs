pub mod auth;
pub mod gateway;
pub mod message;
pub mod notification;
pub mod presence;
pub mod receipt;
pub mod room;
pub mod session;
pub mod user;
