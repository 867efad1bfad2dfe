//! Audit trail entries
//!
//! Every state transition, dispatch attempt, acknowledgment, and
//! denial produces one immutable entry. Entries carry a per-workflow
//! monotonic sequence number in addition to wall-clock time, so
//! ordering stays deterministic under clock skew.

use crate::attempt::NotificationAttempt;
use crate::event::{EventType, Severity, Subject};
use crate::execution::ExecutionState;
use crate::ids::{ContactId, ExecutionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who (or what) produced an audit entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditActor {
    /// The engine itself (timers, dispatch, backstop)
    System,
    /// A recipient, via an acknowledgment path
    Contact(ContactId),
    /// A human operator (cancellation, intervention)
    Operator(String),
}

/// What happened, as a closed set of auditable events
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AuditEvent {
    /// A workflow execution was created
    ExecutionCreated {
        event_type: EventType,
        severity: Severity,
        subject: Subject,
    },
    /// The execution moved between lifecycle states
    StateChanged {
        from: ExecutionState,
        to: ExecutionState,
    },
    /// A tier was armed and its contacts targeted
    TierArmed { tier_index: u32, tier_name: String },
    /// A tier's acknowledgment deadline elapsed without acknowledgment
    TierDeadlineElapsed { tier_index: u32 },
    /// One channel attempt finished
    DispatchAttempted { attempt: NotificationAttempt },
    /// An acknowledgment was accepted (first for this workflow)
    AcknowledgmentRecorded {
        contact_id: ContactId,
        latency_secs: u64,
    },
    /// A duplicate or post-terminal acknowledgment, recorded but
    /// never altering the outcome
    LateAcknowledgment { contact_id: ContactId },
    /// The compliance gate denied dispatch for a tier
    ComplianceDenied { tier_index: u32, reason: String },
    /// Every tier elapsed without acknowledgment; hard alert raised
    EscalationExhausted { tier_count: u32 },
    /// The workflow was cancelled
    Cancelled { reason: String },
    /// Lost timer or crashed task, recovered by the lifetime backstop.
    /// Distinct category for post-incident review.
    InternalError { detail: String },
}

/// One immutable audit record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub execution_id: ExecutionId,
    /// Per-workflow monotonic sequence number, starting at 0
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub actor: AuditActor,
    pub event: AuditEvent,
}

impl AuditEntry {
    /// The tier index this entry arms, if it is a tier activation.
    pub fn armed_tier(&self) -> Option<u32> {
        match &self.event {
            AuditEvent::TierArmed { tier_index, .. } => Some(*tier_index),
            _ => None,
        }
    }

    /// The state this entry transitions into, if it is a transition.
    pub fn resulting_state(&self) -> Option<ExecutionState> {
        match &self.event {
            AuditEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        }
    }
}
