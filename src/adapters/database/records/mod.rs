pub mod message;
pub mod receipt;
pub mod room;
pub mod session;
pub mod user;

pub use message::MessageRecord;
pub use receipt::{NewReceiptRecord, ReceiptRecord};
pub use room::{MembershipRecord, RoomRecord, RoomSummaryRecord};
pub use session::SessionRecord;
pub use user::UserRecord;
