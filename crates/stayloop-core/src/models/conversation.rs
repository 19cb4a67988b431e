use serde::{Deserialize, Serialize};

/// Directory-level summary of a conversation with one peer.
/// Full message bodies live in the per-conversation timeline, never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub peer_id: String,
    pub peer_display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_avatar_ref: Option<String>,
    #[serde(default)]
    pub last_message_preview: String,
    /// Unix epoch milliseconds of the most recent message.
    #[serde(default)]
    pub last_message_at: u64,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    /// Deterministic conversation id for a participant pair. Both sides
    /// compute the same id without a round trip. The id is opaque: the
    /// peer is always carried in the dedicated `peer_id` field and the id
    /// is never split back into its parts.
    pub fn id_for(user_a: &str, user_b: &str) -> String {
        if user_a <= user_b {
            format!("{}_{}", user_a, user_b)
        } else {
            format!("{}_{}", user_b, user_a)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_for_is_symmetric() {
        assert_eq!(
            Conversation::id_for("alice", "bob"),
            Conversation::id_for("bob", "alice")
        );
    }

    #[test]
    fn id_for_distinct_pairs_differ() {
        assert_ne!(
            Conversation::id_for("alice", "bob"),
            Conversation::id_for("alice", "carol")
        );
    }
}
