//! Append-only audit log
//!
//! A single global append point, safe for concurrent writers across
//! all executions. Each entry gets the next per-workflow sequence
//! number under the same lock that appends it, so sequences are gap
//! free and strictly ordered even when wall-clock timestamps tie.

use lifeline_types::{
    AuditActor, AuditEntry, AuditEvent, EscalationError, EscalationResult, ExecutionId,
    ExecutionState,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct AuditLogInner {
    entries: HashMap<ExecutionId, Vec<AuditEntry>>,
    next_sequence: HashMap<ExecutionId, u64>,
}

/// Append-only, tamper-evident audit log
#[derive(Default)]
pub struct AuditLog {
    inner: Mutex<AuditLogInner>,
}

/// Final state reconstructed from an exported audit trail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayedExecution {
    pub final_state: ExecutionState,
    /// Number of tier activations observed
    pub tier_activations: u32,
    /// Highest tier index armed
    pub max_tier_index: Option<u32>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry, assigning the next sequence number for the
    /// workflow.
    pub fn record(
        &self,
        execution_id: &ExecutionId,
        actor: AuditActor,
        event: AuditEvent,
    ) -> AuditEntry {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let sequence = inner
            .next_sequence
            .entry(execution_id.clone())
            .or_insert(0);
        let entry = AuditEntry {
            execution_id: execution_id.clone(),
            sequence: *sequence,
            recorded_at: chrono::Utc::now(),
            actor,
            event,
        };
        *sequence += 1;
        inner
            .entries
            .entry(execution_id.clone())
            .or_default()
            .push(entry.clone());
        entry
    }

    /// Export the ordered audit trail for one workflow.
    pub fn export(&self, execution_id: &ExecutionId) -> Vec<AuditEntry> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.get(execution_id).cloned().unwrap_or_default()
    }

    /// Number of entries recorded for one workflow.
    pub fn entry_count(&self, execution_id: &ExecutionId) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.get(execution_id).map(Vec::len).unwrap_or(0)
    }

    /// Recompute the sequence chain for a workflow and flag gaps.
    ///
    /// Used for compliance testing, not normal operation.
    pub fn verify_chain(&self, execution_id: &ExecutionId) -> EscalationResult<()> {
        let entries = self.export(execution_id);
        for (index, entry) in entries.iter().enumerate() {
            if entry.sequence != index as u64 {
                return Err(EscalationError::SchedulerInternal {
                    execution_id: execution_id.clone(),
                    detail: format!(
                        "audit chain gap: expected sequence {}, found {}",
                        index, entry.sequence
                    ),
                });
            }
        }
        Ok(())
    }

    /// Fold an exported trail back into the workflow's final state and
    /// tier activation count. Replaying an export must reconstruct the
    /// same outcome the live workflow reached.
    pub fn replay(entries: &[AuditEntry]) -> ReplayedExecution {
        let mut final_state = ExecutionState::Pending;
        let mut tier_activations = 0u32;
        let mut max_tier_index = None;

        for entry in entries {
            if let Some(state) = entry.resulting_state() {
                final_state = state;
            }
            if let Some(tier_index) = entry.armed_tier() {
                tier_activations += 1;
                max_tier_index = Some(max_tier_index.map_or(tier_index, |m: u32| m.max(tier_index)));
            }
        }

        ReplayedExecution {
            final_state,
            tier_activations,
            max_tier_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_types::ContactId;

    fn state_change(from: ExecutionState, to: ExecutionState) -> AuditEvent {
        AuditEvent::StateChanged { from, to }
    }

    #[test]
    fn test_sequences_are_gap_free_per_execution() {
        let log = AuditLog::new();
        let a = ExecutionId::new("a");
        let b = ExecutionId::new("b");

        log.record(&a, AuditActor::System, state_change(ExecutionState::Pending, ExecutionState::Active));
        log.record(&b, AuditActor::System, state_change(ExecutionState::Pending, ExecutionState::Active));
        log.record(&a, AuditActor::System, AuditEvent::TierArmed { tier_index: 0, tier_name: "t0".into() });

        let trail = log.export(&a);
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].sequence, 0);
        assert_eq!(trail[1].sequence, 1);
        assert_eq!(log.export(&b)[0].sequence, 0);

        log.verify_chain(&a).unwrap();
        log.verify_chain(&b).unwrap();
    }

    #[test]
    fn test_verify_chain_detects_gap() {
        let log = AuditLog::new();
        let id = ExecutionId::new("gap");
        log.record(&id, AuditActor::System, state_change(ExecutionState::Pending, ExecutionState::Active));

        // Forge a gap by skipping a sequence number
        {
            let mut inner = log.inner.lock().unwrap();
            *inner.next_sequence.get_mut(&id).unwrap() += 1;
        }
        log.record(&id, AuditActor::System, AuditEvent::TierDeadlineElapsed { tier_index: 0 });

        assert!(matches!(
            log.verify_chain(&id),
            Err(EscalationError::SchedulerInternal { .. })
        ));
    }

    #[test]
    fn test_replay_reconstructs_state_and_tiers() {
        let log = AuditLog::new();
        let id = ExecutionId::new("r");

        log.record(&id, AuditActor::System, state_change(ExecutionState::Pending, ExecutionState::Active));
        log.record(&id, AuditActor::System, AuditEvent::TierArmed { tier_index: 0, tier_name: "t0".into() });
        log.record(&id, AuditActor::System, AuditEvent::TierDeadlineElapsed { tier_index: 0 });
        log.record(&id, AuditActor::System, state_change(ExecutionState::Active, ExecutionState::Escalated));
        log.record(&id, AuditActor::System, state_change(ExecutionState::Escalated, ExecutionState::Active));
        log.record(&id, AuditActor::System, AuditEvent::TierArmed { tier_index: 1, tier_name: "t1".into() });
        log.record(&id, AuditActor::Contact(ContactId::new("c1")), AuditEvent::AcknowledgmentRecorded { contact_id: ContactId::new("c1"), latency_secs: 42 });
        log.record(&id, AuditActor::System, state_change(ExecutionState::Active, ExecutionState::Acknowledged));

        let replayed = AuditLog::replay(&log.export(&id));
        assert_eq!(replayed.final_state, ExecutionState::Acknowledged);
        assert_eq!(replayed.tier_activations, 2);
        assert_eq!(replayed.max_tier_index, Some(1));
    }

    #[test]
    fn test_export_unknown_execution_is_empty() {
        let log = AuditLog::new();
        assert!(log.export(&ExecutionId::new("none")).is_empty());
        assert_eq!(log.entry_count(&ExecutionId::new("none")), 0);
        log.verify_chain(&ExecutionId::new("none")).unwrap();
    }
}
