pub mod message_cleanup;
pub mod notification;
pub mod presence_sweep;

pub use message_cleanup::MessageCleanupWorker;
pub use notification::NotificationWorker;
pub use presence_sweep::PresenceSweepWorker;
