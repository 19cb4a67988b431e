//! Badge count derivations. Pure functions over store state, recomputed
//! on demand so there is never a second source of truth to go stale.

use crate::models::{Conversation, Notification};

pub fn total_unread_messages(conversations: &[Conversation]) -> u32 {
    conversations.iter().map(|c| c.unread_count).sum()
}

pub fn total_unread_notifications(notifications: &[Notification]) -> usize {
    notifications.iter().filter(|n| !n.is_read).count()
}
