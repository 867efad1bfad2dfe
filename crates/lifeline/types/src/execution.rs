//! Workflow executions: the pure escalation state machine
//!
//! `PENDING → ACTIVE → (ACKNOWLEDGED | ESCALATED → ACTIVE | EXHAUSTED | CANCELLED)`
//!
//! A `WorkflowExecution` is owned by exactly one scheduler task at a
//! time; all transitions happen through the methods here so the
//! invariants hold no matter what the timers do:
//!
//! - the tier index never regresses,
//! - a workflow has exactly one terminal outcome,
//! - nothing mutates once the workflow is terminal.
//!
//! Timers, dispatch, and audit are the engine's concern. This module
//! has no side effects and is testable without any channel.

use crate::errors::{EscalationError, EscalationResult};
use crate::event::{EventType, Severity, Subject};
use crate::ids::{ContactId, ExecutionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of one escalation run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    /// Created, tier 0 not yet armed
    Pending,
    /// A tier is armed and awaiting acknowledgment
    Active,
    /// Transient: a tier deadline elapsed and the next tier is arming
    Escalated,
    /// A recipient confirmed receipt (terminal)
    Acknowledged,
    /// Every tier elapsed without acknowledgment (terminal)
    Exhausted,
    /// Stopped by an operator or upstream resolution (terminal)
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionState::Acknowledged | ExecutionState::Exhausted | ExecutionState::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Pending => write!(f, "pending"),
            ExecutionState::Active => write!(f, "active"),
            ExecutionState::Escalated => write!(f, "escalated"),
            ExecutionState::Acknowledged => write!(f, "acknowledged"),
            ExecutionState::Exhausted => write!(f, "exhausted"),
            ExecutionState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How a workflow ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalOutcome {
    Acknowledged {
        contact_id: ContactId,
        latency_secs: u64,
    },
    Exhausted,
    Cancelled {
        reason: String,
    },
}

/// One escalation run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub event_type: EventType,
    pub severity: Severity,
    pub subject: Subject,
    pub state: ExecutionState,
    /// Index of the most recently armed tier. Monotone non-decreasing.
    pub tier_index: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TerminalOutcome>,
    /// Free-form context handed to the template renderer
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl WorkflowExecution {
    pub fn new(event_type: EventType, severity: Severity, subject: Subject) -> Self {
        Self {
            id: ExecutionId::generate(),
            event_type,
            severity,
            subject,
            state: ExecutionState::Pending,
            tier_index: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            outcome: None,
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.state == ExecutionState::Active
    }

    /// Transition `Pending → Active` for tier 0.
    pub fn start(&mut self) -> EscalationResult<()> {
        if self.state != ExecutionState::Pending {
            return Err(EscalationError::InvalidTransition(format!(
                "cannot start from {}",
                self.state
            )));
        }
        self.state = ExecutionState::Active;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Advance to the next tier: `Active → Escalated → Active`.
    ///
    /// Returns the newly armed tier index. The caller is responsible
    /// for knowing whether a next tier exists; this method only
    /// guarantees the index cannot regress.
    pub fn escalate(&mut self) -> EscalationResult<u32> {
        self.ensure_not_terminal()?;
        if self.state != ExecutionState::Active {
            return Err(EscalationError::InvalidTransition(format!(
                "cannot escalate from {}",
                self.state
            )));
        }
        self.state = ExecutionState::Escalated;
        self.tier_index += 1;
        self.state = ExecutionState::Active;
        Ok(self.tier_index)
    }

    /// Terminal transition to `Acknowledged`.
    pub fn acknowledge(&mut self, contact_id: ContactId, latency_secs: u64) -> EscalationResult<()> {
        self.ensure_not_terminal()?;
        self.state = ExecutionState::Acknowledged;
        self.outcome = Some(TerminalOutcome::Acknowledged {
            contact_id,
            latency_secs,
        });
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal transition to `Exhausted`.
    pub fn exhaust(&mut self) -> EscalationResult<()> {
        self.ensure_not_terminal()?;
        self.state = ExecutionState::Exhausted;
        self.outcome = Some(TerminalOutcome::Exhausted);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal transition to `Cancelled`, reachable from any
    /// non-terminal state.
    pub fn cancel(&mut self, reason: impl Into<String>) -> EscalationResult<()> {
        self.ensure_not_terminal()?;
        self.state = ExecutionState::Cancelled;
        self.outcome = Some(TerminalOutcome::Cancelled {
            reason: reason.into(),
        });
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_not_terminal(&self) -> EscalationResult<()> {
        if self.is_terminal() {
            return Err(EscalationError::AlreadyTerminal);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_execution() -> WorkflowExecution {
        WorkflowExecution::new(
            EventType::ClinicalResult,
            Severity::Critical,
            Subject::patient("mrn-42"),
        )
    }

    #[test]
    fn test_lifecycle_ack() {
        let mut exec = make_execution();
        assert_eq!(exec.state, ExecutionState::Pending);

        exec.start().unwrap();
        assert!(exec.is_active());
        assert!(exec.started_at.is_some());

        exec.acknowledge(ContactId::new("c1"), 30).unwrap();
        assert!(exec.is_terminal());
        assert!(matches!(
            exec.outcome,
            Some(TerminalOutcome::Acknowledged { latency_secs: 30, .. })
        ));
    }

    #[test]
    fn test_escalate_increments_tier() {
        let mut exec = make_execution();
        exec.start().unwrap();
        assert_eq!(exec.tier_index, 0);
        assert_eq!(exec.escalate().unwrap(), 1);
        assert_eq!(exec.escalate().unwrap(), 2);
        assert!(exec.is_active());
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut exec = make_execution();
        exec.start().unwrap();
        assert!(matches!(
            exec.start(),
            Err(EscalationError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_escalate_before_start_rejected() {
        let mut exec = make_execution();
        assert!(exec.escalate().is_err());
        assert_eq!(exec.tier_index, 0);
    }

    #[test]
    fn test_terminal_is_immutable() {
        let mut exec = make_execution();
        exec.start().unwrap();
        exec.exhaust().unwrap();

        assert!(matches!(
            exec.acknowledge(ContactId::new("late"), 99),
            Err(EscalationError::AlreadyTerminal)
        ));
        assert!(matches!(exec.escalate(), Err(EscalationError::AlreadyTerminal)));
        assert!(matches!(
            exec.cancel("too late"),
            Err(EscalationError::AlreadyTerminal)
        ));
        // Outcome unchanged
        assert_eq!(exec.outcome, Some(TerminalOutcome::Exhausted));
    }

    #[test]
    fn test_cancel_from_pending() {
        let mut exec = make_execution();
        exec.cancel("emergency resolved").unwrap();
        assert_eq!(exec.state, ExecutionState::Cancelled);
        assert!(exec.completed_at.is_some());
    }

    #[test]
    fn test_context_payload() {
        let exec = make_execution().with_context("panel", "potassium");
        assert_eq!(exec.context.get("panel").unwrap(), "potassium");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Escalate,
            Acknowledge,
            Exhaust,
            Cancel,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                3 => Just(Op::Escalate),
                1 => Just(Op::Acknowledge),
                1 => Just(Op::Exhaust),
                1 => Just(Op::Cancel),
            ]
        }

        proptest! {
            /// Under any operation sequence, the tier index never
            /// regresses and the first terminal outcome is final.
            #[test]
            fn tier_monotone_and_terminal_once(ops in prop::collection::vec(op_strategy(), 1..40)) {
                let mut exec = make_execution();
                exec.start().unwrap();

                let mut last_tier = exec.tier_index;
                let mut first_outcome: Option<TerminalOutcome> = None;

                for op in ops {
                    let _ = match op {
                        Op::Escalate => exec.escalate().map(|_| ()),
                        Op::Acknowledge => exec.acknowledge(ContactId::new("c"), 1),
                        Op::Exhaust => exec.exhaust(),
                        Op::Cancel => exec.cancel("op"),
                    };

                    prop_assert!(exec.tier_index >= last_tier);
                    last_tier = exec.tier_index;

                    if exec.is_terminal() {
                        match &first_outcome {
                            None => first_outcome = exec.outcome.clone(),
                            Some(outcome) => prop_assert_eq!(Some(outcome), exec.outcome.as_ref()),
                        }
                    }
                }
            }
        }
    }
}
