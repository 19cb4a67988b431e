use serde::{Deserialize, Serialize};

use crate::constants::PREVIEW_MAX_CHARS;

/// Delivery state of a timeline entry.
///
/// `Pending -> Confirmed` on successful reconciliation; a failed send is
/// removed from the timeline entirely, so there is no failed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Locally appended; `id` is a client-generated correlation id.
    Pending,
    /// Server-assigned id and canonical timestamp.
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    /// Unix epoch milliseconds.
    pub created_at: u64,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_ref: Option<String>,
    /// Messages on the wire are always confirmed; only the local
    /// optimistic send path produces `Pending` entries.
    #[serde(default = "MessageStatus::confirmed", skip_serializing)]
    pub status: MessageStatus,
}

impl MessageStatus {
    fn confirmed() -> Self {
        MessageStatus::Confirmed
    }
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }

    /// Char-safe truncated content for directory previews.
    pub fn preview(&self) -> String {
        truncate_chars(&self.content, PREVIEW_MAX_CHARS)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_content(content: &str) -> Message {
        Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "alice".into(),
            content: content.into(),
            created_at: 1_000,
            is_read: false,
            attachment_ref: None,
            status: MessageStatus::Confirmed,
        }
    }

    #[test]
    fn preview_keeps_short_content() {
        let m = message_with_content("see you at the cabin");
        assert_eq!(m.preview(), "see you at the cabin");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long: String = "é".repeat(200);
        let m = message_with_content(&long);
        let preview = m.preview();
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn wire_messages_deserialize_as_confirmed() {
        let json = r#"{
            "id": "42",
            "conversationId": "c1",
            "senderId": "bob",
            "content": "hi",
            "createdAt": 1000
        }"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert_eq!(m.status, MessageStatus::Confirmed);
        assert!(!m.is_read);
    }
}
