pub mod directory;
pub mod notifications;
pub mod timeline;
pub mod unread;

pub use directory::ConversationDirectory;
pub use notifications::{MarkReadToken, NotificationFeed};
pub use timeline::{MessageTimeline, SendReconciliation};
pub use unread::{total_unread_messages, total_unread_notifications};
