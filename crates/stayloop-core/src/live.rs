use serde::Deserialize;
use serde_json::Value;

use crate::models::{Conversation, Message, Notification};

/// Push-channel payloads arrive as loosely-typed JSON objects. Everything
/// is validated into one of these variants at the subscriber boundary so
/// the stores never handle untyped data.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// New message in a conversation the client is subscribed to.
    Message { message: Message },
    /// Ephemeral typing broadcast; unordered and lossy by contract.
    #[serde(rename_all = "camelCase")]
    Typing {
        conversation_id: String,
        peer_id: String,
    },
    /// Directory summary update pushed on the user stream.
    Conversation { conversation: Conversation },
    Notification { notification: Notification },
}

impl LiveEvent {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
