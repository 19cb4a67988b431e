use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{Conversation, Message, Notification};

/// Transport-level failure from the remote API. Converted into a
/// `SyncError` at the worker boundary; never shown to stores directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

/// Live push channel handle. The event source is a channel of raw JSON
/// payloads the core drains and validates; dropping the handle (or
/// calling `close`) releases the server-side subscription.
pub struct Subscription {
    events: mpsc::Receiver<Value>,
    closer: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<Value>) -> Self {
        Self {
            events,
            closer: None,
        }
    }

    pub fn with_closer(events: mpsc::Receiver<Value>, closer: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            events,
            closer: Some(closer),
        }
    }

    /// Next raw payload, or `None` once the channel has dropped.
    pub async fn next_event(&mut self) -> Option<Value> {
        self.events.recv().await
    }

    pub fn close(mut self) {
        if let Some(closer) = self.closer.take() {
            closer();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(closer) = self.closer.take() {
            closer();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// Remote operations consumed by the sync engine. The concrete transport
/// (HTTP + websocket, BaaS SDK, ...) lives behind this trait; tests drive
/// the engine with an in-process implementation built on channels.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn fetch_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, ApiError>;

    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ApiError>;

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        attachment_ref: Option<&str>,
    ) -> Result<Message, ApiError>;

    async fn fetch_notifications(&self, user_id: &str) -> Result<Vec<Notification>, ApiError>;

    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), ApiError>;

    async fn subscribe_conversation(&self, conversation_id: &str)
        -> Result<Subscription, ApiError>;

    async fn subscribe_user(&self, user_id: &str) -> Result<Subscription, ApiError>;

    /// Fire-and-forget presence broadcast. No acknowledgment, no retry;
    /// a lost signal only makes the indicator disappear early.
    async fn broadcast_typing(&self, conversation_id: &str, sender_id: &str);
}
