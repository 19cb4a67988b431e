use thiserror::Error;

/// Client-facing failure taxonomy. Every remote-call failure is converted
/// into one of these at the worker boundary; none propagate unhandled.
/// All variants are transient notices except `UnknownCorrelation`, which
/// signals a violated reconciliation contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// A bulk load failed. Non-fatal and retryable; callers render an
    /// empty state in the meantime.
    #[error("failed to fetch {what}: {reason}")]
    Fetch { what: &'static str, reason: String },

    /// An optimistic send could not be confirmed. The optimistic entry
    /// has been rolled back; the notice carries the rolled-back content
    /// so a retry needs nothing beyond the notice itself.
    #[error("send failed in conversation {conversation_id}: {reason}")]
    SendFailed {
        conversation_id: String,
        correlation_id: String,
        content: String,
        attachment_ref: Option<String>,
        reason: String,
    },

    /// A push channel failed to establish or dropped.
    #[error("subscription for {scope} lost: {reason}")]
    Subscription { scope: String, reason: String },

    /// An optimistic read-state change was rolled back.
    #[error("failed to mark notification {notification_id} read: {reason}")]
    MarkReadFailed {
        notification_id: String,
        reason: String,
    },

    /// A reconciliation referenced a correlation id the timeline does not
    /// track. This is a programmer error, not a transient failure.
    #[error("unknown correlation id {correlation_id}")]
    UnknownCorrelation { correlation_id: String },
}

impl SyncError {
    /// Notices are surfaced to the user and dismissed; contract
    /// violations should be treated as fatal by the host.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, SyncError::UnknownCorrelation { .. })
    }
}
