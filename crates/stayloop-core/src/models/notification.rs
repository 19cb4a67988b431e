use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Points at a conversation (`related_id` is the conversation id).
    Message,
    Booking,
    Review,
    System,
}

/// System notification. Created only by the bulk fetch or a push event;
/// the only local mutation is the optimistic mark-read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tag_round_trips() {
        let json = r#"{
            "id": "n1",
            "type": "booking",
            "title": "Booking confirmed",
            "createdAt": 5000
        }"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.kind, NotificationKind::Booking);
        assert!(!n.is_read);
        assert!(n.related_id.is_none());
    }
}
