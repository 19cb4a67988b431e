use tracing::debug;

use crate::models::{Conversation, Message};

/// Ordered set of conversation summaries for the current user, most
/// recent first. Owns summaries only; message bodies live in the
/// per-conversation timelines.
pub struct ConversationDirectory {
    conversations: Vec<Conversation>,
    open_conversation: Option<String>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self {
            conversations: Vec::new(),
            open_conversation: None,
        }
    }

    // ===== Getters =====

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn open_conversation(&self) -> Option<&str> {
        self.open_conversation.as_deref()
    }

    // ===== Mutations =====

    /// Bulk fetch result; replaces local state entirely. Summaries are
    /// cheap and fully re-derivable, so no merge is attempted. An open
    /// conversation stays cleared even if the server still counts it.
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        if let Some(open) = self.open_conversation.clone() {
            self.set_unread(&open, 0);
        }
        self.sort();
    }

    /// Track the focused conversation and optimistically clear its unread
    /// count. Read-state confirmation is fire-and-forget; messages that
    /// arrive strictly after the clear still count.
    pub fn open(&mut self, conversation_id: &str) {
        self.open_conversation = Some(conversation_id.to_string());
        self.clear_unread(conversation_id);
    }

    pub fn close(&mut self) -> Option<String> {
        self.open_conversation.take()
    }

    pub fn clear_unread(&mut self, conversation_id: &str) {
        self.set_unread(conversation_id, 0);
    }

    /// Register a locally created conversation so an optimistic first
    /// send has a summary to bump.
    pub fn start_conversation(
        &mut self,
        conversation_id: &str,
        peer_id: &str,
        peer_display_name: &str,
    ) {
        if self.get(conversation_id).is_some() {
            return;
        }
        self.conversations.push(Conversation {
            id: conversation_id.to_string(),
            peer_id: peer_id.to_string(),
            peer_display_name: peer_display_name.to_string(),
            peer_avatar_ref: None,
            last_message_preview: String::new(),
            last_message_at: 0,
            unread_count: 0,
        });
        self.sort();
    }

    /// Preview/time bump for a locally originated send. Never touches the
    /// unread count.
    pub fn apply_local_send(&mut self, conversation_id: &str, preview: &str, timestamp: u64) {
        let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            debug!(conversation_id, "local send for unknown conversation");
            return;
        };
        conversation.last_message_preview = preview.to_string();
        conversation.last_message_at = conversation.last_message_at.max(timestamp);
        self.sort();
    }

    /// Preview/time bump for an incoming message, incrementing the unread
    /// count unless the conversation is currently open. The first message
    /// of a new thread synthesizes a summary from the event payload; the
    /// sender id stands in for the display name until a directory update
    /// names the peer.
    pub fn apply_incoming_message(&mut self, message: &Message) {
        let is_open = self.open_conversation.as_deref() == Some(message.conversation_id.as_str());
        let preview = message.preview();

        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
        {
            conversation.last_message_preview = preview;
            conversation.last_message_at = conversation.last_message_at.max(message.created_at);
            if !is_open {
                conversation.unread_count += 1;
            }
        } else {
            self.conversations.push(Conversation {
                id: message.conversation_id.clone(),
                peer_id: message.sender_id.clone(),
                peer_display_name: message.sender_id.clone(),
                peer_avatar_ref: None,
                last_message_preview: preview,
                last_message_at: message.created_at,
                unread_count: if is_open { 0 } else { 1 },
            });
        }
        self.sort();
    }

    /// Directory summary pushed over the user stream. Replaces the local
    /// summary; an open conversation never accrues unread.
    pub fn upsert(&mut self, mut conversation: Conversation) {
        if self.open_conversation.as_deref() == Some(conversation.id.as_str()) {
            conversation.unread_count = 0;
        }
        if let Some(existing) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation.id)
        {
            *existing = conversation;
        } else {
            self.conversations.push(conversation);
        }
        self.sort();
    }

    fn set_unread(&mut self, conversation_id: &str, value: u32) {
        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            conversation.unread_count = value;
        }
    }

    fn sort(&mut self) {
        self.conversations
            .sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    }
}

impl Default for ConversationDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageStatus;

    fn summary(id: &str, last_message_at: u64, unread: u32) -> Conversation {
        Conversation {
            id: id.to_string(),
            peer_id: format!("peer-{}", id),
            peer_display_name: format!("Peer {}", id),
            peer_avatar_ref: None,
            last_message_preview: String::new(),
            last_message_at,
            unread_count: unread,
        }
    }

    fn incoming(conversation_id: &str, sender_id: &str, created_at: u64) -> Message {
        Message {
            id: format!("m-{}", created_at),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: "knock knock".into(),
            created_at,
            is_read: false,
            attachment_ref: None,
            status: MessageStatus::Confirmed,
        }
    }

    #[test]
    fn replace_all_orders_most_recent_first() {
        let mut directory = ConversationDirectory::new();
        directory.replace_all(vec![summary("a", 100, 0), summary("b", 300, 0)]);
        assert_eq!(directory.conversations()[0].id, "b");
    }

    #[test]
    fn clear_unread_then_incoming_while_closed_counts_one() {
        let mut directory = ConversationDirectory::new();
        directory.replace_all(vec![summary("c1", 100, 2)]);

        directory.open("c1");
        assert_eq!(directory.get("c1").unwrap().unread_count, 0);
        directory.close();

        directory.apply_incoming_message(&incoming("c1", "bob", 200));
        assert_eq!(directory.get("c1").unwrap().unread_count, 1);
    }

    #[test]
    fn open_conversation_does_not_accrue_unread() {
        let mut directory = ConversationDirectory::new();
        directory.replace_all(vec![summary("c1", 100, 2)]);

        directory.open("c1");
        assert_eq!(directory.get("c1").unwrap().unread_count, 0);

        directory.apply_incoming_message(&incoming("c1", "bob", 200));
        assert_eq!(directory.get("c1").unwrap().unread_count, 0);
        assert_eq!(directory.get("c1").unwrap().last_message_at, 200);
    }

    #[test]
    fn local_send_bumps_preview_without_touching_unread() {
        let mut directory = ConversationDirectory::new();
        directory.replace_all(vec![summary("c1", 100, 3)]);

        directory.apply_local_send("c1", "on my way", 500);
        let c = directory.get("c1").unwrap();
        assert_eq!(c.last_message_preview, "on my way");
        assert_eq!(c.last_message_at, 500);
        assert_eq!(c.unread_count, 3);
    }

    #[test]
    fn first_message_of_new_thread_synthesizes_summary() {
        let mut directory = ConversationDirectory::new();
        directory.apply_incoming_message(&incoming("c9", "mallory", 700));

        let c = directory.get("c9").unwrap();
        assert_eq!(c.peer_id, "mallory");
        assert_eq!(c.unread_count, 1);
        assert_eq!(c.last_message_at, 700);
    }

    #[test]
    fn server_replace_keeps_open_conversation_cleared() {
        let mut directory = ConversationDirectory::new();
        directory.replace_all(vec![summary("c1", 100, 0)]);
        directory.open("c1");

        // Refetch still counting messages we have already seen.
        directory.replace_all(vec![summary("c1", 100, 4)]);
        assert_eq!(directory.get("c1").unwrap().unread_count, 0);
    }

    #[test]
    fn upsert_replaces_or_inserts() {
        let mut directory = ConversationDirectory::new();
        directory.upsert(summary("c1", 100, 2));
        assert_eq!(directory.conversations().len(), 1);

        let mut updated = summary("c1", 400, 5);
        updated.peer_display_name = "Renamed".into();
        directory.upsert(updated);
        assert_eq!(directory.conversations().len(), 1);
        let c = directory.get("c1").unwrap();
        assert_eq!(c.peer_display_name, "Renamed");
        assert_eq!(c.unread_count, 5);
    }
}
