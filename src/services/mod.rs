pub mod gateway;
pub mod health_service;
pub mod message_service;
pub mod notification_service;
pub mod presence_service;
pub mod receipt_service;
pub mod room_service;
pub mod session_service;
pub mod user_service;
