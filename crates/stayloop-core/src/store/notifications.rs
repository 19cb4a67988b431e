use tracing::debug;

use crate::models::Notification;

/// Token for one in-flight optimistic mark-read. Holding it keeps the
/// rollback well-defined: commit on confirmation, rollback on failure.
#[must_use = "pending mark-read must be committed or rolled back"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkReadToken {
    notification_id: String,
    was_read: bool,
}

impl MarkReadToken {
    pub fn notification_id(&self) -> &str {
        &self.notification_id
    }
}

/// Read/unread list of system notifications, newest first. Structurally
/// the single-tier sibling of the directory/timeline pair: same lifecycle
/// (bulk fetch, live ingest, optimistic mutation), independent content.
pub struct NotificationFeed {
    items: Vec<Notification>,
}

impl NotificationFeed {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    // ===== Getters =====

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    // ===== Mutations =====

    pub fn replace_all(&mut self, mut items: Vec<Notification>) {
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.items = items;
    }

    /// Insert a pushed notification at its reverse-chronological position
    /// (normally a prepend). Duplicates by id are discarded.
    pub fn ingest_live(&mut self, notification: Notification) -> bool {
        if self.items.iter().any(|n| n.id == notification.id) {
            debug!(id = %notification.id, "duplicate notification discarded");
            return false;
        }
        let pos = self
            .items
            .partition_point(|n| n.created_at > notification.created_at);
        self.items.insert(pos, notification);
        true
    }

    /// Optimistically flip a notification to read. Returns a token to be
    /// committed or rolled back once the confirmation request settles, or
    /// `None` when there is nothing to do.
    pub fn mark_read(&mut self, id: &str) -> Option<MarkReadToken> {
        let notification = self.items.iter_mut().find(|n| n.id == id)?;
        if notification.is_read {
            return None;
        }
        notification.is_read = true;
        Some(MarkReadToken {
            notification_id: id.to_string(),
            was_read: false,
        })
    }

    pub fn commit(&mut self, token: MarkReadToken) {
        debug!(id = %token.notification_id, "mark-read confirmed");
    }

    /// Silent state reversion; the accompanying notice is the caller's
    /// responsibility.
    pub fn rollback(&mut self, token: MarkReadToken) {
        if let Some(notification) = self
            .items
            .iter_mut()
            .find(|n| n.id == token.notification_id)
        {
            notification.is_read = token.was_read;
        }
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;

    fn notification(id: &str, created_at: u64) -> Notification {
        Notification {
            id: id.to_string(),
            kind: NotificationKind::System,
            title: format!("notice {}", id),
            content: String::new(),
            is_read: false,
            action_ref: None,
            related_id: None,
            created_at,
        }
    }

    #[test]
    fn replace_all_orders_newest_first() {
        let mut feed = NotificationFeed::new();
        feed.replace_all(vec![notification("a", 100), notification("b", 300)]);
        assert_eq!(feed.items()[0].id, "b");
    }

    #[test]
    fn ingest_prepends_and_dedups() {
        let mut feed = NotificationFeed::new();
        feed.replace_all(vec![notification("a", 100)]);

        assert!(feed.ingest_live(notification("b", 200)));
        assert_eq!(feed.items()[0].id, "b");

        assert!(!feed.ingest_live(notification("b", 200)));
        assert_eq!(feed.items().len(), 2);
    }

    #[test]
    fn mark_read_commit_is_final() {
        let mut feed = NotificationFeed::new();
        feed.replace_all(vec![notification("a", 100)]);

        let token = feed.mark_read("a").unwrap();
        assert!(feed.get("a").unwrap().is_read);
        feed.commit(token);
        assert!(feed.get("a").unwrap().is_read);
    }

    #[test]
    fn mark_read_rollback_restores_unread() {
        let mut feed = NotificationFeed::new();
        feed.replace_all(vec![notification("a", 100)]);

        let token = feed.mark_read("a").unwrap();
        assert!(feed.get("a").unwrap().is_read);
        feed.rollback(token);
        assert!(!feed.get("a").unwrap().is_read);
    }

    #[test]
    fn mark_read_is_noop_for_read_or_missing() {
        let mut feed = NotificationFeed::new();
        feed.replace_all(vec![notification("a", 100)]);

        assert!(feed.mark_read("a").is_some());
        assert!(feed.mark_read("a").is_none());
        assert!(feed.mark_read("ghost").is_none());
    }
}
