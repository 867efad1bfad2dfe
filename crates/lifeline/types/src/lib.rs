//! Lifeline domain types
//!
//! Pure data model for the escalation engine: identifiers, event
//! classification, contacts and channels, escalation policies, the
//! workflow execution state machine, notification attempts,
//! acknowledgments, and the audit trail.
//!
//! Everything here is synchronous and side-effect free. The state
//! machine in [`execution`] is driven by the engine crate but is
//! fully unit-testable without any timer or channel.

#![deny(unsafe_code)]

pub mod attempt;
pub mod audit;
pub mod contact;
pub mod errors;
pub mod event;
pub mod execution;
pub mod ids;
pub mod policy;

pub use attempt::{
    AcknowledgmentRecord, AttemptOutcome, ContactDispatchStatus, NotificationAttempt,
};
pub use audit::{AuditActor, AuditEntry, AuditEvent};
pub use contact::{Channel, ChannelEndpoint, Contact};
pub use errors::{EscalationError, EscalationResult};
pub use event::{EventType, Severity, Subject};
pub use execution::{ExecutionState, TerminalOutcome, WorkflowExecution};
pub use ids::{AttemptId, ContactId, ExecutionId, RoleId};
pub use policy::{EscalationPolicy, Tier};
