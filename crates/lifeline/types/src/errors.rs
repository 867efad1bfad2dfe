//! Error taxonomy for the escalation engine

use crate::event::EventType;
use crate::ids::ExecutionId;

/// Errors surfaced to callers of the escalation engine.
///
/// Deliberately narrow: dispatch failures, compliance denials, and
/// acknowledgment races are absorbed by the scheduler and drive
/// escalation forward, so they appear as `AttemptOutcome` values and
/// audit events rather than errors. Exhaustion is a workflow outcome
/// delivered on the engine's alert channel, not a `Result`.
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("No escalation policy registered for event type: {0}")]
    PolicyNotFound(EventType),

    #[error("Invalid escalation policy for {event_type}: {reason}")]
    InvalidPolicy {
        event_type: EventType,
        reason: String,
    },

    #[error("Workflow execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("Scheduler internal error for execution {execution_id}: {detail}")]
    SchedulerInternal {
        execution_id: ExecutionId,
        detail: String,
    },

    #[error("Workflow execution is already terminal")]
    AlreadyTerminal,

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("No contacts resolved for any role in the policy")]
    NoContactsResolved,
}

/// Result type alias for escalation operations
pub type EscalationResult<T> = Result<T, EscalationError>;
