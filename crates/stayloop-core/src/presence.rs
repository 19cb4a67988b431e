use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::constants::TYPING_EXPIRY_MS;

/// Ephemeral per-peer typing state, derived from lossy broadcast
/// signals. Never persisted, never fetched: an entry exists only while a
/// signal has been received within the expiry window.
///
/// Each signal resets a deadline rather than arming a fixed-count poll,
/// so bursty signals do not flicker the indicator. A delivered message
/// from the peer clears the entry immediately; a trailing signal still in
/// flight would only re-arm it for one window.
pub struct TypingTracker {
    expiry: Duration,
    deadlines: HashMap<(String, String), Instant>,
}

impl TypingTracker {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            deadlines: HashMap::new(),
        }
    }

    /// Typing signal from `peer_id` in `conversation_id`; starts or
    /// resets the expiry window.
    pub fn signal(&mut self, conversation_id: &str, peer_id: &str, now: Instant) {
        self.deadlines.insert(
            (conversation_id.to_string(), peer_id.to_string()),
            now + self.expiry,
        );
    }

    pub fn is_typing(&self, conversation_id: &str, peer_id: &str, now: Instant) -> bool {
        self.deadlines
            .get(&(conversation_id.to_string(), peer_id.to_string()))
            .is_some_and(|deadline| *deadline > now)
    }

    /// Peers currently typing in a conversation.
    pub fn typing_peers(&self, conversation_id: &str, now: Instant) -> Vec<String> {
        let mut peers: Vec<String> = self
            .deadlines
            .iter()
            .filter(|((conversation, _), deadline)| {
                conversation.as_str() == conversation_id && **deadline > now
            })
            .map(|((_, peer), _)| peer.clone())
            .collect();
        peers.sort();
        peers
    }

    /// A delivered message is conclusive evidence typing has stopped.
    pub fn message_from(&mut self, conversation_id: &str, peer_id: &str) {
        self.deadlines
            .remove(&(conversation_id.to_string(), peer_id.to_string()));
    }

    /// Conversation closed; its typing state is destroyed with it.
    pub fn clear_conversation(&mut self, conversation_id: &str) {
        self.deadlines
            .retain(|(conversation, _), _| conversation.as_str() != conversation_id);
    }

    /// Drop expired entries.
    pub fn sweep(&mut self, now: Instant) {
        self.deadlines.retain(|_, deadline| *deadline > now);
    }

    /// Earliest pending deadline, for hosts scheduling a wake-up.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(Duration::from_millis(TYPING_EXPIRY_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> TypingTracker {
        TypingTracker::new(Duration::from_secs(3))
    }

    #[test]
    fn expires_after_window_without_new_signal() {
        let mut t = tracker();
        let start = Instant::now();
        t.signal("c1", "bob", start);

        assert!(t.is_typing("c1", "bob", start + Duration::from_secs(2)));
        assert!(!t.is_typing("c1", "bob", start + Duration::from_secs(4)));
    }

    #[test]
    fn new_signal_resets_the_window() {
        let mut t = tracker();
        let start = Instant::now();
        t.signal("c1", "bob", start);
        t.signal("c1", "bob", start + Duration::from_secs(2));

        // Past the first deadline but within the reset one.
        assert!(t.is_typing("c1", "bob", start + Duration::from_secs(4)));
        assert!(!t.is_typing("c1", "bob", start + Duration::from_secs(6)));
    }

    #[test]
    fn delivered_message_clears_immediately() {
        let mut t = tracker();
        let start = Instant::now();
        t.signal("c1", "bob", start);

        t.message_from("c1", "bob");
        assert!(!t.is_typing("c1", "bob", start + Duration::from_millis(1)));
    }

    #[test]
    fn state_is_scoped_per_conversation_and_peer() {
        let mut t = tracker();
        let start = Instant::now();
        t.signal("c1", "bob", start);
        t.signal("c2", "carol", start);

        assert!(!t.is_typing("c1", "carol", start));
        assert!(!t.is_typing("c2", "bob", start));
        assert_eq!(t.typing_peers("c1", start), vec!["bob".to_string()]);

        t.clear_conversation("c1");
        assert!(t.typing_peers("c1", start).is_empty());
        assert!(t.is_typing("c2", "carol", start));
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let mut t = tracker();
        let start = Instant::now();
        t.signal("c1", "bob", start);
        t.signal("c1", "carol", start + Duration::from_secs(2));

        t.sweep(start + Duration::from_secs(4));
        assert_eq!(t.typing_peers("c1", start + Duration::from_secs(4)), vec![
            "carol".to_string()
        ]);
        assert_eq!(t.next_deadline(), Some(start + Duration::from_secs(5)));
    }
}
