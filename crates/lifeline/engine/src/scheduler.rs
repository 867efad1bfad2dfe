//! Escalation scheduler: one task, one workflow, one clock
//!
//! Each workflow execution is owned by exactly one tokio task. The
//! task drives the pure state machine in `lifeline_types::execution`,
//! arms tier deadlines, invokes the dispatcher, and answers
//! acknowledge/cancel commands over an mpsc channel. That channel is
//! the per-execution serialization point: no timer and no command
//! ever touch the execution concurrently.
//!
//! The command branch of the select loop is polled first (`biased`),
//! so an acknowledgment observed at the same instant as a tier
//! deadline wins the race. Escalating an already-handled page is the
//! failure mode we refuse.

use crate::ack_tracker::AcknowledgmentTracker;
use crate::adapters::{ComplianceGate, ComplianceVerdict, NotificationMetadata, RenderedMessage};
use crate::audit_log::AuditLog;
use crate::dispatcher::NotificationDispatcher;
use lifeline_types::{
    AuditActor, AuditEvent, Contact, ContactId, EscalationPolicy, EventType, ExecutionId,
    ExecutionState, RoleId, Severity, Subject, Tier, WorkflowExecution,
};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::{Instant, Sleep};

/// Hard signals the engine raises to its embedder. Never dropped
/// silently: they are delivered on the orchestrator's alert channel.
#[derive(Clone, Debug)]
pub enum EngineAlert {
    /// All tiers consumed without acknowledgment
    EscalationExhausted {
        execution_id: ExecutionId,
        event_type: EventType,
        severity: Severity,
        subject: Subject,
        tier_count: u32,
    },
    /// Lost timer or crashed task, recovered by the lifetime backstop
    SchedulerInternal {
        execution_id: ExecutionId,
        detail: String,
    },
}

/// Reply to an acknowledge command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckResponse {
    Accepted { latency_secs: u64 },
    AlreadyAcknowledged,
}

/// Commands accepted by a running scheduler task
pub(crate) enum SchedulerCommand {
    Acknowledge {
        contact_id: ContactId,
        message: Option<String>,
        reply: oneshot::Sender<AckResponse>,
    },
    Cancel {
        reason: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to one running (or finished) execution
pub(crate) struct ExecutionHandle {
    pub(crate) commands: mpsc::Sender<SchedulerCommand>,
    pub(crate) snapshot: Arc<RwLock<WorkflowExecution>>,
}

/// Everything a scheduler task needs at spawn time
pub(crate) struct SchedulerSeed {
    pub execution: WorkflowExecution,
    pub policy: Arc<EscalationPolicy>,
    pub contacts: HashMap<RoleId, Vec<Contact>>,
    pub messages: Arc<HashMap<String, RenderedMessage>>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub gate: Arc<dyn ComplianceGate>,
    pub audit: Arc<AuditLog>,
    pub acks: Arc<AcknowledgmentTracker>,
    pub alerts: mpsc::Sender<EngineAlert>,
    pub backstop_margin_secs: u64,
}

/// Spawn the scheduler task for one execution.
pub(crate) fn spawn(seed: SchedulerSeed) -> ExecutionHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (abort_tx, _) = watch::channel(false);
    let snapshot = Arc::new(RwLock::new(seed.execution.clone()));

    let scheduler = EscalationScheduler {
        execution: seed.execution,
        policy: seed.policy,
        contacts: seed.contacts,
        messages: seed.messages,
        dispatcher: seed.dispatcher,
        gate: seed.gate,
        audit: seed.audit,
        acks: seed.acks,
        alerts: seed.alerts,
        backstop_margin_secs: seed.backstop_margin_secs,
        snapshot: Arc::clone(&snapshot),
        commands: command_rx,
        commands_closed: false,
        abort_tx,
        started: Instant::now(),
    };
    tokio::spawn(scheduler.run());

    ExecutionHandle {
        commands: command_tx,
        snapshot,
    }
}

enum WaitOutcome {
    Elapsed,
    Terminated,
}

struct EscalationScheduler {
    execution: WorkflowExecution,
    policy: Arc<EscalationPolicy>,
    contacts: HashMap<RoleId, Vec<Contact>>,
    messages: Arc<HashMap<String, RenderedMessage>>,
    dispatcher: Arc<NotificationDispatcher>,
    gate: Arc<dyn ComplianceGate>,
    audit: Arc<AuditLog>,
    acks: Arc<AcknowledgmentTracker>,
    alerts: mpsc::Sender<EngineAlert>,
    backstop_margin_secs: u64,
    snapshot: Arc<RwLock<WorkflowExecution>>,
    commands: mpsc::Receiver<SchedulerCommand>,
    commands_closed: bool,
    abort_tx: watch::Sender<bool>,
    started: Instant,
}

impl EscalationScheduler {
    async fn run(mut self) {
        let execution_id = self.execution.id.clone();
        self.audit.record(
            &execution_id,
            AuditActor::System,
            AuditEvent::ExecutionCreated {
                event_type: self.execution.event_type,
                severity: self.execution.severity,
                subject: self.execution.subject.clone(),
            },
        );

        if let Err(error) = self.execution.start() {
            tracing::error!(execution_id = %execution_id, %error, "Failed to start execution");
            return;
        }
        self.record_transition(ExecutionState::Pending, ExecutionState::Active);
        self.publish().await;

        // Lost-timer backstop: forces a terminal state even if every
        // tier timer below goes missing.
        let backstop_secs = self.policy.max_lifetime_secs() + self.backstop_margin_secs;
        let backstop = tokio::time::sleep(Duration::from_secs(backstop_secs));
        tokio::pin!(backstop);

        // Tier 0 arming delay (zero for critical severity).
        let initial_delay = self
            .policy
            .effective_delay_secs(0, self.execution.severity);
        if initial_delay > 0 {
            if let WaitOutcome::Terminated = self
                .wait(Duration::from_secs(initial_delay), backstop.as_mut())
                .await
            {
                return;
            }
        }

        loop {
            let tier_index = self.execution.tier_index;
            let Some(tier) = self.policy.tier(tier_index as usize).cloned() else {
                self.force_terminal("tier index beyond policy").await;
                return;
            };

            self.audit.record(
                &self.execution.id,
                AuditActor::System,
                AuditEvent::TierArmed {
                    tier_index,
                    tier_name: tier.name.clone(),
                },
            );
            tracing::info!(
                execution_id = %self.execution.id,
                tier_index,
                tier = %tier.name,
                "Tier armed"
            );

            // The gate is an external collaborator; race it against the
            // backstop so a stalled check cannot wedge the workflow.
            let gate = Arc::clone(&self.gate);
            let metadata = self.metadata_for(tier_index, &tier);
            let verdict = tokio::select! {
                verdict = gate.check(&metadata) => verdict,
                _ = backstop.as_mut() => {
                    self.backstop_fired().await;
                    return;
                }
            };
            match verdict {
                ComplianceVerdict::Allow => {
                    self.spawn_dispatch(tier_index, &tier);

                    let deadline_secs = self.policy.ack_deadline_secs(tier_index as usize);
                    if let WaitOutcome::Terminated = self
                        .wait(Duration::from_secs(deadline_secs), backstop.as_mut())
                        .await
                    {
                        return;
                    }
                }
                ComplianceVerdict::Deny { reason } => {
                    // A silent swallow here would lose an urgent page:
                    // record the denial and fall straight through to
                    // the timeout path so escalation continues.
                    tracing::warn!(
                        execution_id = %self.execution.id,
                        tier_index,
                        reason = %reason,
                        "Compliance gate denied tier dispatch"
                    );
                    self.audit.record(
                        &self.execution.id,
                        AuditActor::System,
                        AuditEvent::ComplianceDenied { tier_index, reason },
                    );
                }
            }

            self.audit.record(
                &self.execution.id,
                AuditActor::System,
                AuditEvent::TierDeadlineElapsed { tier_index },
            );

            if self.policy.is_last_tier(tier_index as usize) {
                self.exhaust(tier.ack_required).await;
                return;
            }

            if let Err(error) = self.execution.escalate() {
                tracing::error!(execution_id = %self.execution.id, %error, "Escalation failed");
                self.force_terminal("state machine rejected escalation").await;
                return;
            }
            self.record_transition(ExecutionState::Active, ExecutionState::Escalated);
            self.record_transition(ExecutionState::Escalated, ExecutionState::Active);
            self.publish().await;
        }
    }

    /// Wait out one duration while serving commands. Returns
    /// `Terminated` if a command or the backstop ended the workflow.
    async fn wait(
        &mut self,
        duration: Duration,
        mut backstop: Pin<&mut Sleep>,
    ) -> WaitOutcome {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv(), if !self.commands_closed => {
                    match command {
                        Some(command) => {
                            if self.handle_command(command).await {
                                return WaitOutcome::Terminated;
                            }
                        }
                        None => self.commands_closed = true,
                    }
                }

                _ = deadline.as_mut() => return WaitOutcome::Elapsed,

                _ = backstop.as_mut() => {
                    self.backstop_fired().await;
                    return WaitOutcome::Terminated;
                }
            }
        }
    }

    /// Apply one command. Returns true if the workflow reached a
    /// terminal state.
    async fn handle_command(&mut self, command: SchedulerCommand) -> bool {
        match command {
            SchedulerCommand::Acknowledge {
                contact_id,
                message,
                reply,
            } => {
                let latency_secs = self.started.elapsed().as_secs();
                let outcome =
                    self.acks
                        .record(&self.execution.id, contact_id.clone(), message, latency_secs);

                if !outcome.is_first() {
                    // Cannot normally happen while the task is alive,
                    // but the tracker is the source of truth.
                    self.audit.record(
                        &self.execution.id,
                        AuditActor::Contact(contact_id.clone()),
                        AuditEvent::LateAcknowledgment { contact_id },
                    );
                    let _ = reply.send(AckResponse::AlreadyAcknowledged);
                    return false;
                }

                let previous = self.execution.state;
                if self
                    .execution
                    .acknowledge(contact_id.clone(), latency_secs)
                    .is_err()
                {
                    let _ = reply.send(AckResponse::AlreadyAcknowledged);
                    return false;
                }

                self.abort_dispatch();
                self.audit.record(
                    &self.execution.id,
                    AuditActor::Contact(contact_id.clone()),
                    AuditEvent::AcknowledgmentRecorded {
                        contact_id: contact_id.clone(),
                        latency_secs,
                    },
                );
                self.record_transition(previous, ExecutionState::Acknowledged);
                self.publish().await;

                tracing::info!(
                    execution_id = %self.execution.id,
                    contact_id = %contact_id,
                    latency_secs,
                    "Workflow acknowledged"
                );
                let _ = reply.send(AckResponse::Accepted { latency_secs });
                true
            }

            SchedulerCommand::Cancel { reason, reply } => {
                let previous = self.execution.state;
                if self.execution.cancel(reason.clone()).is_err() {
                    let _ = reply.send(false);
                    return false;
                }

                self.abort_dispatch();
                self.audit.record(
                    &self.execution.id,
                    AuditActor::Operator("orchestrator".to_string()),
                    AuditEvent::Cancelled {
                        reason: reason.clone(),
                    },
                );
                self.record_transition(previous, ExecutionState::Cancelled);
                self.publish().await;

                tracing::info!(
                    execution_id = %self.execution.id,
                    reason = %reason,
                    "Workflow cancelled"
                );
                let _ = reply.send(true);
                true
            }
        }
    }

    /// All tiers elapsed without acknowledgment.
    async fn exhaust(&mut self, raise_alert: bool) {
        let previous = self.execution.state;
        if self.execution.exhaust().is_err() {
            return;
        }
        self.abort_dispatch();

        let tier_count = self.policy.tier_count() as u32;
        self.record_transition(previous, ExecutionState::Exhausted);
        self.audit.record(
            &self.execution.id,
            AuditActor::System,
            AuditEvent::EscalationExhausted { tier_count },
        );
        self.publish().await;

        tracing::error!(
            execution_id = %self.execution.id,
            tier_count,
            "Maximum escalation reached without acknowledgment"
        );

        if raise_alert {
            let alert = EngineAlert::EscalationExhausted {
                execution_id: self.execution.id.clone(),
                event_type: self.execution.event_type,
                severity: self.execution.severity,
                subject: self.execution.subject.clone(),
                tier_count,
            };
            if self.alerts.send(alert).await.is_err() {
                tracing::error!(
                    execution_id = %self.execution.id,
                    "Alert channel closed; exhaustion signal undeliverable"
                );
            }
        }
    }

    /// Backstop timer fired: a tier timer was lost or the task
    /// stalled. Force a terminal state and flag it for post-incident
    /// review.
    async fn backstop_fired(&mut self) {
        let detail = "maximum workflow lifetime exceeded; forcing EXHAUSTED".to_string();
        self.audit.record(
            &self.execution.id,
            AuditActor::System,
            AuditEvent::InternalError {
                detail: detail.clone(),
            },
        );
        self.exhaust(true).await;

        let alert = EngineAlert::SchedulerInternal {
            execution_id: self.execution.id.clone(),
            detail,
        };
        let _ = self.alerts.send(alert).await;
    }

    async fn force_terminal(&mut self, detail: &str) {
        self.audit.record(
            &self.execution.id,
            AuditActor::System,
            AuditEvent::InternalError {
                detail: detail.to_string(),
            },
        );
        self.exhaust(true).await;
    }

    /// Launch the dispatch fan-out for one tier. Runs detached so the
    /// acknowledgment clock is independent of delivery outcome;
    /// attempts are audited from inside the dispatcher.
    fn spawn_dispatch(&self, tier_index: u32, tier: &Tier) {
        let contacts = self.contacts_for(tier);
        if contacts.is_empty() {
            tracing::warn!(
                execution_id = %self.execution.id,
                tier_index,
                "No contacts resolved for tier; deadline still applies"
            );
            return;
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let messages = Arc::clone(&self.messages);
        let execution_id = self.execution.id.clone();
        let tier = tier.clone();
        let abort = self.abort_tx.subscribe();

        tokio::spawn(async move {
            dispatcher
                .dispatch_tier(&execution_id, tier_index, &tier, &contacts, &messages, abort)
                .await;
        });
    }

    fn contacts_for(&self, tier: &Tier) -> Vec<Contact> {
        let mut seen = std::collections::HashSet::new();
        let mut contacts = Vec::new();
        for role in &tier.roles {
            if let Some(role_contacts) = self.contacts.get(role) {
                for contact in role_contacts {
                    if seen.insert(contact.id.clone()) {
                        contacts.push(contact.clone());
                    }
                }
            }
        }
        contacts
    }

    fn metadata_for(&self, tier_index: u32, tier: &Tier) -> NotificationMetadata {
        NotificationMetadata {
            execution_id: self.execution.id.clone(),
            event_type: self.execution.event_type,
            severity: self.execution.severity,
            subject: self.execution.subject.clone(),
            tier_index,
            roles: tier.roles.clone(),
            channels: tier.channels.clone(),
        }
    }

    fn abort_dispatch(&self) {
        let _ = self.abort_tx.send(true);
    }

    fn record_transition(&self, from: ExecutionState, to: ExecutionState) {
        self.audit.record(
            &self.execution.id,
            AuditActor::System,
            AuditEvent::StateChanged { from, to },
        );
    }

    async fn publish(&self) {
        *self.snapshot.write().await = self.execution.clone();
    }
}
