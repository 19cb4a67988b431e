use std::collections::HashSet;

use tracing::{debug, error};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{Message, MessageStatus};

/// Outcome of reconciling an optimistic send against the server response.
#[derive(Debug, Clone, PartialEq)]
pub enum SendReconciliation {
    /// The optimistic entry was confirmed in place.
    Confirmed,
    /// The push echo of this message landed before the confirmation;
    /// the optimistic entry was dropped in favor of the echoed copy.
    DuplicateEcho,
    /// The send failed; the optimistic entry was removed. Carries the
    /// removed message so the caller can offer a retry with the same
    /// content.
    RolledBack(Message),
}

/// Per-conversation ordered, deduplicated message log.
///
/// Owns the Message instances for its conversation. The ordered set is
/// kept non-decreasing in `created_at` across loads, optimistic appends,
/// live ingestion and reconciliation. The confirmation response and the
/// push echo of the same send may arrive in either order; both funnel
/// through here and the timeline ends with exactly one entry per logical
/// message.
pub struct MessageTimeline {
    conversation_id: String,
    messages: Vec<Message>,
}

impl MessageTimeline {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Result of a bulk fetch; replaces the local set. Pending optimistic
    /// entries survive the replace so that an in-flight send still
    /// reconciles after a reconnect-triggered reload.
    pub fn replace_all(&mut self, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.created_at);
        let mut seen: HashSet<String> = HashSet::with_capacity(messages.len());
        messages.retain(|m| seen.insert(m.id.clone()));

        let pending: Vec<Message> = self
            .messages
            .drain(..)
            .filter(|m| m.is_pending() && !seen.contains(&m.id))
            .collect();

        self.messages = messages;
        for message in pending {
            self.insert_sorted(message);
        }
    }

    /// Append an optimistic entry with a client-generated correlation id
    /// and return it for immediate rendering. The confirmation request is
    /// issued by the caller in parallel.
    pub fn send_optimistic(
        &mut self,
        sender_id: &str,
        content: &str,
        attachment_ref: Option<String>,
        now_ms: u64,
    ) -> Message {
        // A fresh send is always the newest entry; clamp against the tail
        // in case of local clock weirdness.
        let created_at = now_ms.max(self.messages.last().map_or(0, |m| m.created_at));
        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: self.conversation_id.clone(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            created_at,
            is_read: false,
            attachment_ref,
            status: MessageStatus::Pending,
        };
        self.messages.push(message.clone());
        message
    }

    /// Reconcile an optimistic entry with the server response (or its
    /// failure). An unknown correlation id means the dedup contract was
    /// violated upstream and is reported as such, never swallowed.
    pub fn reconcile_send(
        &mut self,
        correlation_id: &str,
        result: Result<Message, String>,
    ) -> Result<SendReconciliation, SyncError> {
        let Some(pos) = self
            .messages
            .iter()
            .position(|m| m.is_pending() && m.id == correlation_id)
        else {
            error!(
                conversation_id = %self.conversation_id,
                correlation_id,
                "reconcile_send for unknown correlation id"
            );
            return Err(SyncError::UnknownCorrelation {
                correlation_id: correlation_id.to_string(),
            });
        };

        match result {
            Ok(server_message) => {
                if self.messages.iter().any(|m| m.id == server_message.id) {
                    // Echo-before-confirmation race: the live event already
                    // inserted the canonical copy.
                    self.messages.remove(pos);
                    debug!(
                        conversation_id = %self.conversation_id,
                        id = %server_message.id,
                        "confirmation arrived after push echo; dropped local copy"
                    );
                    Ok(SendReconciliation::DuplicateEcho)
                } else {
                    self.messages[pos] = Message {
                        status: MessageStatus::Confirmed,
                        ..server_message
                    };
                    // In-place id/timestamp swap normally preserves order;
                    // restore it if the canonical timestamp disagrees.
                    self.ensure_sorted();
                    Ok(SendReconciliation::Confirmed)
                }
            }
            Err(reason) => {
                let removed = self.messages.remove(pos);
                debug!(
                    conversation_id = %self.conversation_id,
                    correlation_id,
                    reason,
                    "optimistic send rolled back"
                );
                Ok(SendReconciliation::RolledBack(removed))
            }
        }
    }

    /// Insert a server-originated message. Returns false when the message
    /// was already present (push-channel echo of an already reconciled
    /// send, or a refetch overlap) and was discarded.
    pub fn ingest_live(&mut self, message: Message) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            debug!(
                conversation_id = %self.conversation_id,
                id = %message.id,
                "duplicate live message discarded"
            );
            return false;
        }
        self.insert_sorted(message);
        true
    }

    fn insert_sorted(&mut self, message: Message) {
        let pos = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(pos, message);
    }

    fn ensure_sorted(&mut self) {
        let sorted = self
            .messages
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at);
        if !sorted {
            self.messages.sort_by_key(|m| m.created_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(id: &str, created_at: u64) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: "c1".into(),
            sender_id: "bob".into(),
            content: format!("msg {}", id),
            created_at,
            is_read: false,
            attachment_ref: None,
            status: MessageStatus::Confirmed,
        }
    }

    fn assert_ascending(timeline: &MessageTimeline) {
        let stamps: Vec<u64> = timeline.messages().iter().map(|m| m.created_at).collect();
        let mut sorted = stamps.clone();
        sorted.sort_unstable();
        assert_eq!(stamps, sorted, "timeline must be ascending in created_at");
    }

    #[test]
    fn replace_all_sorts_and_dedups() {
        let mut timeline = MessageTimeline::new("c1");
        timeline.replace_all(vec![
            confirmed("b", 200),
            confirmed("a", 100),
            confirmed("b", 200),
        ]);
        assert_eq!(timeline.messages().len(), 2);
        assert_eq!(timeline.messages()[0].id, "a");
        assert_ascending(&timeline);
    }

    #[test]
    fn send_then_confirm_then_echo_yields_one_entry() {
        let mut timeline = MessageTimeline::new("c1");
        let optimistic = timeline.send_optimistic("alice", "hi", None, 1_000);
        assert_eq!(timeline.messages().len(), 1);
        assert!(timeline.messages()[0].is_pending());
        assert_eq!(timeline.messages()[0].content, "hi");

        let mut server = confirmed("42", 1_050);
        server.sender_id = "alice".into();
        server.content = "hi".into();
        let outcome = timeline
            .reconcile_send(&optimistic.id, Ok(server.clone()))
            .unwrap();
        assert_eq!(outcome, SendReconciliation::Confirmed);
        assert_eq!(timeline.messages().len(), 1);
        assert_eq!(timeline.messages()[0].id, "42");
        assert_eq!(timeline.messages()[0].status, MessageStatus::Confirmed);

        // Push echo of the same message arrives afterwards.
        assert!(!timeline.ingest_live(server));
        assert_eq!(timeline.messages().len(), 1);
    }

    #[test]
    fn echo_before_confirmation_yields_one_entry() {
        let mut timeline = MessageTimeline::new("c1");
        let optimistic = timeline.send_optimistic("alice", "hi", None, 1_000);

        let mut server = confirmed("42", 1_050);
        server.sender_id = "alice".into();
        server.content = "hi".into();
        assert!(timeline.ingest_live(server.clone()));
        assert_eq!(timeline.messages().len(), 2);

        let outcome = timeline.reconcile_send(&optimistic.id, Ok(server)).unwrap();
        assert_eq!(outcome, SendReconciliation::DuplicateEcho);
        assert_eq!(timeline.messages().len(), 1);
        assert_eq!(timeline.messages()[0].id, "42");
        assert_ascending(&timeline);
    }

    #[test]
    fn failed_send_restores_prior_state() {
        let mut timeline = MessageTimeline::new("c1");
        timeline.replace_all(vec![confirmed("a", 100), confirmed("b", 200)]);
        let before: Vec<Message> = timeline.messages().to_vec();

        let optimistic = timeline.send_optimistic("alice", "hi", None, 300);
        assert_eq!(timeline.messages().len(), 3);

        let outcome = timeline
            .reconcile_send(&optimistic.id, Err("network error".into()))
            .unwrap();
        match outcome {
            SendReconciliation::RolledBack(removed) => assert_eq!(removed.content, "hi"),
            other => panic!("expected rollback, got {:?}", other),
        }
        assert_eq!(timeline.messages(), before.as_slice());
    }

    #[test]
    fn unknown_correlation_id_is_reported() {
        let mut timeline = MessageTimeline::new("c1");
        let err = timeline
            .reconcile_send("nope", Ok(confirmed("42", 100)))
            .unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn ingest_inserts_out_of_order_arrivals_sorted() {
        let mut timeline = MessageTimeline::new("c1");
        timeline.replace_all(vec![confirmed("a", 100), confirmed("c", 300)]);
        assert!(timeline.ingest_live(confirmed("b", 200)));
        let ids: Vec<&str> = timeline.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_ascending(&timeline);
    }

    #[test]
    fn optimistic_timestamp_clamps_to_tail() {
        let mut timeline = MessageTimeline::new("c1");
        timeline.replace_all(vec![confirmed("a", 5_000)]);
        // Local clock behind the last server timestamp.
        timeline.send_optimistic("alice", "hi", None, 4_000);
        assert_ascending(&timeline);
    }

    #[test]
    fn reload_preserves_pending_entries() {
        let mut timeline = MessageTimeline::new("c1");
        let optimistic = timeline.send_optimistic("alice", "hi", None, 1_000);

        // Reconnect-triggered reload while the send is still in flight.
        timeline.replace_all(vec![confirmed("a", 500)]);
        assert_eq!(timeline.messages().len(), 2);
        assert!(timeline.messages()[1].is_pending());

        let mut server = confirmed("42", 1_100);
        server.content = "hi".into();
        let outcome = timeline.reconcile_send(&optimistic.id, Ok(server)).unwrap();
        assert_eq!(outcome, SendReconciliation::Confirmed);
        assert_eq!(timeline.messages().len(), 2);
    }
}
