use std::sync::mpsc::Sender;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::BackendClient;
use crate::config::CoreConfig;
use crate::error::SyncError;
use crate::live::LiveEvent;
use crate::models::{Conversation, Message, Notification};

/// Commands sent from the runtime to the background worker.
#[derive(Debug, Clone)]
pub enum SyncCommand {
    LoadConversations,
    LoadNotifications,
    /// Explicit timeline refetch (caller-driven retry of a failed load).
    LoadMessages {
        conversation_id: String,
    },
    /// Attach the live channel for a conversation and load its timeline.
    /// Any previously open conversation channel is released first.
    OpenConversation {
        conversation_id: String,
    },
    CloseConversation {
        conversation_id: String,
    },
    SendMessage {
        conversation_id: String,
        correlation_id: String,
        content: String,
        attachment_ref: Option<String>,
    },
    MarkNotificationRead {
        notification_id: String,
    },
    /// Fire-and-forget typing broadcast.
    AnnounceTyping {
        conversation_id: String,
    },
    Shutdown,
}

/// State changes flowing back from the worker. The runtime drains these
/// on its own thread and applies them to the stores; the worker never
/// touches store state.
#[derive(Debug, Clone)]
pub enum SyncUpdate {
    ConversationsLoaded(Vec<Conversation>),
    MessagesLoaded {
        conversation_id: String,
        messages: Vec<Message>,
    },
    NotificationsLoaded(Vec<Notification>),
    SendConfirmed {
        conversation_id: String,
        correlation_id: String,
        message: Message,
    },
    NotificationMarkedRead {
        notification_id: String,
    },
    /// Validated push-channel event.
    Live(LiveEvent),
    /// Remote-call failure, already converted into the client taxonomy.
    Failed(SyncError),
}

/// Background worker owning the backend client and all live
/// subscriptions. Runs a single-threaded tokio runtime on its own
/// thread; commands arrive over an unbounded channel, updates flow back
/// over a channel the runtime drains.
pub struct SyncWorker {
    client: Arc<dyn BackendClient>,
    user_id: String,
    config: CoreConfig,
    command_rx: UnboundedReceiver<SyncCommand>,
    update_tx: Sender<SyncUpdate>,
    conversation_task: Option<(String, JoinHandle<()>)>,
    user_task: Option<JoinHandle<()>>,
}

impl SyncWorker {
    pub fn new(
        client: Arc<dyn BackendClient>,
        user_id: String,
        config: CoreConfig,
        command_rx: UnboundedReceiver<SyncCommand>,
        update_tx: Sender<SyncUpdate>,
    ) -> Self {
        Self {
            client,
            user_id,
            config,
            command_rx,
            update_tx,
            conversation_task: None,
            user_task: None,
        }
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build sync worker runtime")?;
        rt.block_on(self.run_async());
        Ok(())
    }

    async fn run_async(&mut self) {
        self.user_task = Some(tokio::spawn(run_user_channel(
            self.client.clone(),
            self.update_tx.clone(),
            self.user_id.clone(),
            self.config.clone(),
        )));

        while let Some(command) = self.command_rx.recv().await {
            match command {
                SyncCommand::LoadConversations => {
                    let update = match self.client.fetch_conversations(&self.user_id).await {
                        Ok(conversations) => SyncUpdate::ConversationsLoaded(conversations),
                        Err(err) => SyncUpdate::Failed(SyncError::Fetch {
                            what: "conversations",
                            reason: err.to_string(),
                        }),
                    };
                    let _ = self.update_tx.send(update);
                }
                SyncCommand::LoadNotifications => {
                    let update = match self.client.fetch_notifications(&self.user_id).await {
                        Ok(notifications) => SyncUpdate::NotificationsLoaded(notifications),
                        Err(err) => SyncUpdate::Failed(SyncError::Fetch {
                            what: "notifications",
                            reason: err.to_string(),
                        }),
                    };
                    let _ = self.update_tx.send(update);
                }
                SyncCommand::LoadMessages { conversation_id } => {
                    fetch_timeline(&self.client, &self.update_tx, &conversation_id).await;
                }
                SyncCommand::OpenConversation { conversation_id } => {
                    self.release_conversation_channel();
                    info!(conversation_id, "opening conversation channel");
                    let task = tokio::spawn(run_conversation_channel(
                        self.client.clone(),
                        self.update_tx.clone(),
                        conversation_id.clone(),
                        self.config.clone(),
                    ));
                    self.conversation_task = Some((conversation_id, task));
                }
                SyncCommand::CloseConversation { conversation_id } => {
                    let matches = self
                        .conversation_task
                        .as_ref()
                        .is_some_and(|(id, _)| *id == conversation_id);
                    if matches {
                        self.release_conversation_channel();
                    }
                }
                SyncCommand::SendMessage {
                    conversation_id,
                    correlation_id,
                    content,
                    attachment_ref,
                } => {
                    // Deliberately detached: an in-flight send must still
                    // reconcile even if the conversation is closed before
                    // the response lands.
                    let client = self.client.clone();
                    let update_tx = self.update_tx.clone();
                    tokio::spawn(async move {
                        let result = client
                            .send_message(&conversation_id, &content, attachment_ref.as_deref())
                            .await;
                        let update = match result {
                            Ok(message) => SyncUpdate::SendConfirmed {
                                conversation_id,
                                correlation_id,
                                message,
                            },
                            Err(err) => SyncUpdate::Failed(SyncError::SendFailed {
                                conversation_id,
                                correlation_id,
                                content,
                                attachment_ref,
                                reason: err.to_string(),
                            }),
                        };
                        let _ = update_tx.send(update);
                    });
                }
                SyncCommand::MarkNotificationRead { notification_id } => {
                    let client = self.client.clone();
                    let update_tx = self.update_tx.clone();
                    tokio::spawn(async move {
                        let update = match client.mark_notification_read(&notification_id).await {
                            Ok(()) => SyncUpdate::NotificationMarkedRead { notification_id },
                            Err(err) => SyncUpdate::Failed(SyncError::MarkReadFailed {
                                notification_id,
                                reason: err.to_string(),
                            }),
                        };
                        let _ = update_tx.send(update);
                    });
                }
                SyncCommand::AnnounceTyping { conversation_id } => {
                    let client = self.client.clone();
                    let user_id = self.user_id.clone();
                    tokio::spawn(async move {
                        client.broadcast_typing(&conversation_id, &user_id).await;
                    });
                }
                SyncCommand::Shutdown => break,
            }
        }

        self.release_conversation_channel();
        if let Some(task) = self.user_task.take() {
            task.abort();
        }
    }

    fn release_conversation_channel(&mut self) {
        if let Some((conversation_id, task)) = self.conversation_task.take() {
            debug!(conversation_id, "releasing conversation channel");
            // Aborting drops the Subscription, which releases the
            // server-side channel.
            task.abort();
        }
    }
}

/// Per-conversation channel loop: subscribe, reload the timeline to close
/// any gap (the transport does not replay events), drain until the
/// channel drops, then reconnect with backoff. After the attempt budget
/// is exhausted the loop degrades to fetch-only polling so updates are
/// never silently lost.
async fn run_conversation_channel(
    client: Arc<dyn BackendClient>,
    update_tx: Sender<SyncUpdate>,
    conversation_id: String,
    config: CoreConfig,
) {
    let mut failures: u32 = 0;
    loop {
        match client.subscribe_conversation(&conversation_id).await {
            Ok(mut subscription) => {
                failures = 0;
                fetch_timeline(&client, &update_tx, &conversation_id).await;
                while let Some(raw) = subscription.next_event().await {
                    forward_event(&update_tx, raw);
                }
                warn!(conversation_id, "conversation channel dropped");
                let _ = update_tx.send(SyncUpdate::Failed(SyncError::Subscription {
                    scope: format!("conversation {}", conversation_id),
                    reason: "channel dropped".into(),
                }));
            }
            Err(err) => {
                warn!(
                    conversation_id,
                    "conversation channel failed to establish: {}", err
                );
            }
        }

        failures += 1;
        if failures > config.reconnect_attempts {
            let _ = update_tx.send(SyncUpdate::Failed(SyncError::Subscription {
                scope: format!("conversation {}", conversation_id),
                reason: "reconnect budget exhausted; polling".into(),
            }));
            poll_timeline(&client, &update_tx, &conversation_id, &config).await;
            return;
        }
        tokio::time::sleep(config.reconnect_delay(failures)).await;
    }
}

/// Aggregate user stream: notifications and directory updates. The first
/// connection carries no compensating reload (the runtime's initial load
/// covers it); every reconnect refetches both feeds.
async fn run_user_channel(
    client: Arc<dyn BackendClient>,
    update_tx: Sender<SyncUpdate>,
    user_id: String,
    config: CoreConfig,
) {
    let mut failures: u32 = 0;
    let mut first_connection = true;
    loop {
        match client.subscribe_user(&user_id).await {
            Ok(mut subscription) => {
                failures = 0;
                if !first_connection {
                    fetch_user_feeds(&client, &update_tx, &user_id).await;
                }
                first_connection = false;
                while let Some(raw) = subscription.next_event().await {
                    forward_event(&update_tx, raw);
                }
                warn!(user_id, "user channel dropped");
                let _ = update_tx.send(SyncUpdate::Failed(SyncError::Subscription {
                    scope: "user stream".into(),
                    reason: "channel dropped".into(),
                }));
            }
            Err(err) => {
                warn!(user_id, "user channel failed to establish: {}", err);
            }
        }

        failures += 1;
        if failures > config.reconnect_attempts {
            let _ = update_tx.send(SyncUpdate::Failed(SyncError::Subscription {
                scope: "user stream".into(),
                reason: "reconnect budget exhausted; polling".into(),
            }));
            loop {
                tokio::time::sleep(config.degraded_poll_interval).await;
                fetch_user_feeds(&client, &update_tx, &user_id).await;
            }
        }
        tokio::time::sleep(config.reconnect_delay(failures)).await;
    }
}

fn forward_event(update_tx: &Sender<SyncUpdate>, raw: Value) {
    match LiveEvent::from_value(raw) {
        Ok(event) => {
            let _ = update_tx.send(SyncUpdate::Live(event));
        }
        Err(err) => {
            // Invalid payloads stop at this boundary; stores only ever
            // see validated events.
            warn!("discarding malformed live event: {}", err);
        }
    }
}

async fn fetch_timeline(
    client: &Arc<dyn BackendClient>,
    update_tx: &Sender<SyncUpdate>,
    conversation_id: &str,
) {
    let update = match client.fetch_messages(conversation_id).await {
        Ok(messages) => SyncUpdate::MessagesLoaded {
            conversation_id: conversation_id.to_string(),
            messages,
        },
        Err(err) => SyncUpdate::Failed(SyncError::Fetch {
            what: "messages",
            reason: err.to_string(),
        }),
    };
    let _ = update_tx.send(update);
}

async fn fetch_user_feeds(
    client: &Arc<dyn BackendClient>,
    update_tx: &Sender<SyncUpdate>,
    user_id: &str,
) {
    let conversations = match client.fetch_conversations(user_id).await {
        Ok(conversations) => SyncUpdate::ConversationsLoaded(conversations),
        Err(err) => SyncUpdate::Failed(SyncError::Fetch {
            what: "conversations",
            reason: err.to_string(),
        }),
    };
    let _ = update_tx.send(conversations);

    let notifications = match client.fetch_notifications(user_id).await {
        Ok(notifications) => SyncUpdate::NotificationsLoaded(notifications),
        Err(err) => SyncUpdate::Failed(SyncError::Fetch {
            what: "notifications",
            reason: err.to_string(),
        }),
    };
    let _ = update_tx.send(notifications);
}

async fn poll_timeline(
    client: &Arc<dyn BackendClient>,
    update_tx: &Sender<SyncUpdate>,
    conversation_id: &str,
    config: &CoreConfig,
) {
    loop {
        tokio::time::sleep(config.degraded_poll_interval).await;
        fetch_timeline(client, update_tx, conversation_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_live_events_never_reach_the_channel() {
        let (tx, rx) = std::sync::mpsc::channel();
        forward_event(&tx, json!({ "type": "message" }));
        assert!(rx.try_recv().is_err());

        forward_event(
            &tx,
            json!({ "type": "typing", "conversationId": "c1", "peerId": "bob" }),
        );
        assert!(matches!(
            rx.try_recv(),
            Ok(SyncUpdate::Live(LiveEvent::Typing { .. }))
        ));
    }
}
