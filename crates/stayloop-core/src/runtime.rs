use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, warn};

use crate::backend::BackendClient;
use crate::config::CoreConfig;
use crate::error::SyncError;
use crate::live::LiveEvent;
use crate::models::{Conversation, Message, Notification};
use crate::presence::TypingTracker;
use crate::store::{
    total_unread_messages, total_unread_notifications, ConversationDirectory, MarkReadToken,
    MessageTimeline, NotificationFeed,
};
use crate::worker::{SyncCommand, SyncUpdate, SyncWorker};

/// Cloneable handle for issuing commands to the background worker.
#[derive(Clone)]
pub struct SyncHandle {
    command_tx: UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    pub(crate) fn new(command_tx: UnboundedSender<SyncCommand>) -> Self {
        Self { command_tx }
    }

    pub fn send(&self, command: SyncCommand) -> Result<(), SendError<SyncCommand>> {
        self.command_tx.send(command)
    }
}

/// Client-side synchronization engine for one signed-in user.
///
/// Owns every store; all reconciliation runs inside [`SyncRuntime::pump`]
/// on the caller's thread, so stores need no locking. The worker thread
/// owns all I/O and feeds updates back over a channel. User actions
/// mutate local state optimistically and issue the confirmation request
/// in parallel; the confirmation response and the push echo funnel into
/// the same reconciliation, so either alone reaches a consistent state.
pub struct SyncRuntime {
    user_id: String,
    directory: ConversationDirectory,
    timelines: HashMap<String, MessageTimeline>,
    feed: NotificationFeed,
    presence: TypingTracker,
    pending_marks: HashMap<String, MarkReadToken>,
    notices: Vec<SyncError>,
    handle: SyncHandle,
    update_rx: Receiver<SyncUpdate>,
    worker_handle: Option<JoinHandle<()>>,
}

impl SyncRuntime {
    pub fn new(user_id: impl Into<String>, client: Arc<dyn BackendClient>) -> Self {
        Self::with_config(user_id, client, CoreConfig::default())
    }

    pub fn with_config(
        user_id: impl Into<String>,
        client: Arc<dyn BackendClient>,
        config: CoreConfig,
    ) -> Self {
        let user_id = user_id.into();
        let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();
        let (update_tx, update_rx) = std::sync::mpsc::channel();

        let worker = SyncWorker::new(
            client,
            user_id.clone(),
            config.clone(),
            command_rx,
            update_tx,
        );
        let worker_handle = std::thread::spawn(move || {
            if let Err(err) = worker.run() {
                error!("sync worker exited: {:#}", err);
            }
        });

        Self {
            user_id,
            directory: ConversationDirectory::new(),
            timelines: HashMap::new(),
            feed: NotificationFeed::new(),
            presence: TypingTracker::new(config.typing_expiry),
            pending_marks: HashMap::new(),
            notices: Vec::new(),
            handle: SyncHandle::new(command_tx),
            update_rx,
            worker_handle: Some(worker_handle),
        }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    // ===== User actions =====

    /// Kick off the initial bulk fetch of directory and feed.
    pub fn load(&mut self) {
        self.command(SyncCommand::LoadConversations);
        self.command(SyncCommand::LoadNotifications);
    }

    /// Focus a conversation: clears its unread count optimistically,
    /// drives the timeline fetch and attaches the live channel. Any
    /// previously open conversation is closed first.
    pub fn open_conversation(&mut self, conversation_id: &str) {
        if self.directory.open_conversation() == Some(conversation_id) {
            return;
        }
        self.close_conversation();
        self.directory.open(conversation_id);
        self.timelines
            .entry(conversation_id.to_string())
            .or_insert_with(|| MessageTimeline::new(conversation_id));
        self.command(SyncCommand::OpenConversation {
            conversation_id: conversation_id.to_string(),
        });
    }

    /// Release the open conversation's live channel and typing state.
    /// In-flight sends for it keep reconciling; only event interest is
    /// cancelled.
    pub fn close_conversation(&mut self) {
        if let Some(conversation_id) = self.directory.close() {
            self.presence.clear_conversation(&conversation_id);
            self.command(SyncCommand::CloseConversation { conversation_id });
        }
    }

    /// Register a fresh thread with a peer and return its deterministic
    /// conversation id.
    pub fn start_conversation(&mut self, peer_id: &str, peer_display_name: &str) -> String {
        let conversation_id = Conversation::id_for(&self.user_id, peer_id);
        self.directory
            .start_conversation(&conversation_id, peer_id, peer_display_name);
        conversation_id
    }

    /// Optimistic send: the returned message is already in the timeline
    /// (and the directory preview bumped) before the network settles.
    pub fn send_message(
        &mut self,
        conversation_id: &str,
        content: &str,
        attachment_ref: Option<String>,
    ) -> Message {
        let timeline = self
            .timelines
            .entry(conversation_id.to_string())
            .or_insert_with(|| MessageTimeline::new(conversation_id));
        let message =
            timeline.send_optimistic(&self.user_id, content, attachment_ref.clone(), now_ms());
        self.directory
            .apply_local_send(conversation_id, &message.preview(), message.created_at);
        self.command(SyncCommand::SendMessage {
            conversation_id: conversation_id.to_string(),
            correlation_id: message.id.clone(),
            content: content.to_string(),
            attachment_ref,
        });
        message
    }

    /// Called on every local input change; lossy by design.
    pub fn announce_typing(&mut self, conversation_id: &str) {
        self.command(SyncCommand::AnnounceTyping {
            conversation_id: conversation_id.to_string(),
        });
    }

    /// Optimistic mark-read with confirmation in parallel. No-op when the
    /// notification is unknown or already read.
    pub fn mark_notification_read(&mut self, notification_id: &str) {
        let Some(token) = self.feed.mark_read(notification_id) else {
            return;
        };
        self.pending_marks
            .insert(notification_id.to_string(), token);
        self.command(SyncCommand::MarkNotificationRead {
            notification_id: notification_id.to_string(),
        });
    }

    /// Retry a failed timeline load.
    pub fn reload_messages(&mut self, conversation_id: &str) {
        self.command(SyncCommand::LoadMessages {
            conversation_id: conversation_id.to_string(),
        });
    }

    // ===== Update pump =====

    /// Drain and apply pending worker updates, then expire stale typing
    /// indicators. Returns the number of updates applied. Hosts call this
    /// from their event loop (or after waking on channel readiness).
    pub fn pump(&mut self) -> usize {
        let now = Instant::now();
        let mut applied = 0;
        while let Ok(update) = self.update_rx.try_recv() {
            self.apply(update, now);
            applied += 1;
        }
        self.presence.sweep(now);
        applied
    }

    fn apply(&mut self, update: SyncUpdate, now: Instant) {
        match update {
            SyncUpdate::ConversationsLoaded(conversations) => {
                self.directory.replace_all(conversations);
            }
            SyncUpdate::MessagesLoaded {
                conversation_id,
                messages,
            } => {
                self.timelines
                    .entry(conversation_id.clone())
                    .or_insert_with(|| MessageTimeline::new(conversation_id))
                    .replace_all(messages);
            }
            SyncUpdate::NotificationsLoaded(notifications) => {
                self.feed.replace_all(notifications);
            }
            SyncUpdate::SendConfirmed {
                conversation_id,
                correlation_id,
                message,
            } => {
                let timeline = self
                    .timelines
                    .entry(conversation_id.clone())
                    .or_insert_with(|| MessageTimeline::new(conversation_id.clone()));
                match timeline.reconcile_send(&correlation_id, Ok(message.clone())) {
                    Ok(_) => {
                        self.directory.apply_local_send(
                            &conversation_id,
                            &message.preview(),
                            message.created_at,
                        );
                    }
                    Err(violation) => {
                        error!("{}", violation);
                        self.notices.push(violation);
                    }
                }
            }
            SyncUpdate::NotificationMarkedRead { notification_id } => {
                if let Some(token) = self.pending_marks.remove(&notification_id) {
                    self.feed.commit(token);
                }
            }
            SyncUpdate::Live(event) => self.apply_live(event, now),
            SyncUpdate::Failed(err) => self.apply_failure(err),
        }
    }

    fn apply_live(&mut self, event: LiveEvent, now: Instant) {
        match event {
            LiveEvent::Message { message } => {
                let conversation_id = message.conversation_id.clone();
                let inserted = self
                    .timelines
                    .entry(conversation_id.clone())
                    .or_insert_with(|| MessageTimeline::new(conversation_id.clone()))
                    .ingest_live(message.clone());

                if message.sender_id == self.user_id {
                    // Push echo of our own send; the directory was already
                    // bumped on the optimistic path.
                    if inserted {
                        self.directory.apply_local_send(
                            &conversation_id,
                            &message.preview(),
                            message.created_at,
                        );
                    }
                } else {
                    // A delivered message is conclusive evidence typing
                    // has stopped, even mid-window.
                    self.presence
                        .message_from(&conversation_id, &message.sender_id);
                    if inserted {
                        self.directory.apply_incoming_message(&message);
                    }
                }
            }
            LiveEvent::Typing {
                conversation_id,
                peer_id,
            } => {
                if peer_id != self.user_id {
                    self.presence.signal(&conversation_id, &peer_id, now);
                }
            }
            LiveEvent::Conversation { conversation } => {
                self.directory.upsert(conversation);
            }
            LiveEvent::Notification { notification } => {
                self.feed.ingest_live(notification);
            }
        }
    }

    fn apply_failure(&mut self, err: SyncError) {
        match &err {
            SyncError::SendFailed {
                conversation_id,
                correlation_id,
                reason,
                ..
            } => {
                if let Some(timeline) = self.timelines.get_mut(conversation_id) {
                    if let Err(violation) =
                        timeline.reconcile_send(correlation_id, Err(reason.clone()))
                    {
                        error!("{}", violation);
                        self.notices.push(violation);
                    }
                }
            }
            SyncError::MarkReadFailed {
                notification_id, ..
            } => {
                if let Some(token) = self.pending_marks.remove(notification_id) {
                    self.feed.rollback(token);
                }
            }
            _ => {}
        }
        self.notices.push(err);
    }

    // ===== Views =====

    pub fn conversations(&self) -> &[Conversation] {
        self.directory.conversations()
    }

    pub fn open_conversation_id(&self) -> Option<&str> {
        self.directory.open_conversation()
    }

    pub fn messages(&self, conversation_id: &str) -> &[Message] {
        self.timelines
            .get(conversation_id)
            .map(|t| t.messages())
            .unwrap_or(&[])
    }

    pub fn notifications(&self) -> &[Notification] {
        self.feed.items()
    }

    pub fn typing_peers(&self, conversation_id: &str) -> Vec<String> {
        self.presence.typing_peers(conversation_id, Instant::now())
    }

    pub fn total_unread_messages(&self) -> u32 {
        total_unread_messages(self.directory.conversations())
    }

    pub fn total_unread_notifications(&self) -> usize {
        total_unread_notifications(self.feed.items())
    }

    /// Dismissible notices accumulated since the last call. Contract
    /// violations are included; hosts should treat those as fatal.
    pub fn take_notices(&mut self) -> Vec<SyncError> {
        std::mem::take(&mut self.notices)
    }

    pub fn shutdown(&mut self) {
        let _ = self.handle.send(SyncCommand::Shutdown);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }

    fn command(&mut self, command: SyncCommand) {
        if self.handle.send(command).is_err() {
            warn!("sync worker is gone; command dropped");
        }
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
