//! Acknowledgment tracker: single source of truth for "has anyone
//! acknowledged"
//!
//! Multiple channels can race to report the same human's response.
//! The first successful record under the lock wins; every later call
//! is a no-op that still surfaces for auditing.

use chrono::Utc;
use lifeline_types::{AcknowledgmentRecord, ContactId, ExecutionId};
use std::collections::HashMap;
use std::sync::Mutex;

/// Result of recording an acknowledgment
#[derive(Clone, Debug)]
pub enum AckOutcome {
    /// First acknowledgment for this workflow; it decides the outcome
    First(AcknowledgmentRecord),
    /// The workflow was already acknowledged; audit-only
    Duplicate(AcknowledgmentRecord),
}

impl AckOutcome {
    pub fn is_first(&self) -> bool {
        matches!(self, AckOutcome::First(_))
    }

    pub fn record(&self) -> &AcknowledgmentRecord {
        match self {
            AckOutcome::First(record) | AckOutcome::Duplicate(record) => record,
        }
    }
}

/// Tracks acknowledgments across all workflows
#[derive(Default)]
pub struct AcknowledgmentTracker {
    records: Mutex<HashMap<ExecutionId, Vec<AcknowledgmentRecord>>>,
}

impl AcknowledgmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an acknowledgment. The first record for a workflow wins;
    /// subsequent records from other contacts are marked duplicates. A
    /// contact acknowledges a workflow at most once: a repeat from the
    /// same contact returns their original record unchanged.
    ///
    /// `latency_secs` is measured by the scheduler against the
    /// workflow's start on the runtime clock, so it stays exact under
    /// a paused test clock.
    pub fn record(
        &self,
        execution_id: &ExecutionId,
        contact_id: ContactId,
        message: Option<String>,
        latency_secs: u64,
    ) -> AckOutcome {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let entry = records.entry(execution_id.clone()).or_default();

        if let Some(existing) = entry.iter().find(|r| r.contact_id == contact_id) {
            return AckOutcome::Duplicate(existing.clone());
        }

        let record = AcknowledgmentRecord {
            execution_id: execution_id.clone(),
            contact_id,
            acknowledged_at: Utc::now(),
            message,
            latency_secs,
        };
        let first = entry.is_empty();
        entry.push(record.clone());

        if first {
            AckOutcome::First(record)
        } else {
            AckOutcome::Duplicate(record)
        }
    }

    /// Has this workflow been acknowledged by anyone?
    pub fn is_acknowledged(&self, execution_id: &ExecutionId) -> bool {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(execution_id).is_some_and(|r| !r.is_empty())
    }

    /// All acknowledgment records for a workflow, first-wins order.
    pub fn records_for(&self, execution_id: &ExecutionId) -> Vec<AcknowledgmentRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(execution_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_wins() {
        let tracker = AcknowledgmentTracker::new();
        let id = ExecutionId::new("e1");

        let first = tracker.record(&id, ContactId::new("c1"), None, 12);
        assert!(first.is_first());
        assert_eq!(first.record().latency_secs, 12);

        let second = tracker.record(&id, ContactId::new("c2"), Some("on it".into()), 15);
        assert!(!second.is_first());
        assert_eq!(second.record().contact_id, ContactId::new("c2"));

        assert!(tracker.is_acknowledged(&id));
        assert_eq!(tracker.records_for(&id).len(), 2);
    }

    #[test]
    fn test_same_contact_records_at_most_once() {
        let tracker = AcknowledgmentTracker::new();
        let id = ExecutionId::new("e1");
        tracker.record(&id, ContactId::new("c1"), None, 5);

        let dup = tracker.record(&id, ContactId::new("c1"), Some("again".into()), 9);
        assert!(!dup.is_first());
        // Repeat from the same contact keeps their original record
        assert_eq!(dup.record().latency_secs, 5);
        assert_eq!(dup.record().message, None);
        assert_eq!(tracker.records_for(&id).len(), 1);
    }

    #[test]
    fn test_unacknowledged() {
        let tracker = AcknowledgmentTracker::new();
        assert!(!tracker.is_acknowledged(&ExecutionId::new("none")));
        assert!(tracker.records_for(&ExecutionId::new("none")).is_empty());
    }

    #[test]
    fn test_executions_are_independent() {
        let tracker = AcknowledgmentTracker::new();
        tracker.record(&ExecutionId::new("a"), ContactId::new("c1"), None, 0);
        assert!(!tracker.is_acknowledged(&ExecutionId::new("b")));
    }
}
