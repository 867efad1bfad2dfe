//! Dispatch attempts and acknowledgments
//!
//! Both are append-only evidence: an attempt records one delivery try,
//! an acknowledgment records one human confirming receipt. Neither is
//! ever mutated after creation.

use crate::contact::Channel;
use crate::ids::{AttemptId, ContactId, ExecutionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single channel attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// The channel accepted the message for delivery
    Delivered,
    /// The channel rejected the message
    Failed { reason: String },
    /// The channel did not answer within the delivery deadline
    TimedOut,
}

impl AttemptOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, AttemptOutcome::Delivered)
    }
}

/// One dispatch try: a channel, a contact, a timestamp, an outcome
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub id: AttemptId,
    pub execution_id: ExecutionId,
    pub tier_index: u32,
    pub contact_id: ContactId,
    pub channel: Channel,
    pub attempted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

impl NotificationAttempt {
    pub fn new(
        execution_id: ExecutionId,
        tier_index: u32,
        contact_id: ContactId,
        channel: Channel,
        outcome: AttemptOutcome,
    ) -> Self {
        Self {
            id: AttemptId::generate(),
            execution_id,
            tier_index,
            contact_id,
            channel,
            attempted_at: Utc::now(),
            outcome,
        }
    }
}

/// Per-contact result of one tier's dispatch fan-out
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContactDispatchStatus {
    pub contact_id: ContactId,
    /// At least one channel accepted the message
    pub delivered: bool,
    /// Total attempts made across all channels for this contact
    pub attempts: u32,
}

/// A recipient's confirmation of receipt.
///
/// Created at most once per (contact, workflow) pair; the first
/// acknowledgment wins and later ones are audit-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcknowledgmentRecord {
    pub execution_id: ExecutionId,
    pub contact_id: ContactId,
    pub acknowledged_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Seconds between workflow start and this acknowledgment
    pub latency_secs: u64,
}
