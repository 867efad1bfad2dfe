//! Workflow orchestrator: the engine's front door
//!
//! The orchestrator owns the policy registry, resolves contacts and
//! renders messages before a workflow starts, and tracks one
//! `ExecutionHandle` per live workflow. Everything after start runs
//! inside the per-execution scheduler task; the orchestrator only
//! forwards acknowledge/cancel commands and reads state snapshots.
//!
//! Contacts are resolved once, at start. A roster change mid-workflow
//! does not retarget tiers that are already armed; the snapshot taken
//! here is the one the whole escalation runs against.

use crate::ack_tracker::AcknowledgmentTracker;
use crate::adapters::{
    ChannelAdapter, ComplianceGate, ContactDirectory, RenderedMessage, TemplateRenderer,
};
use crate::audit_log::AuditLog;
use crate::config::EngineConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::policy_registry::PolicyRegistry;
use crate::scheduler::{
    self, AckResponse, EngineAlert, ExecutionHandle, SchedulerCommand, SchedulerSeed,
};
use lifeline_types::{
    AuditActor, AuditEvent, Contact, ContactId, EscalationError, EscalationResult, EventType,
    ExecutionId, RoleId, Severity, Subject, WorkflowExecution,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Result of a cancel request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelStatus {
    Cancelled,
    AlreadyTerminal,
}

/// Coordinates escalation workflows end to end.
pub struct WorkflowOrchestrator {
    config: EngineConfig,
    policies: PolicyRegistry,
    directory: Arc<dyn ContactDirectory>,
    renderer: Arc<dyn TemplateRenderer>,
    gate: Arc<dyn ComplianceGate>,
    dispatcher: Arc<NotificationDispatcher>,
    audit: Arc<AuditLog>,
    acks: Arc<AcknowledgmentTracker>,
    alerts: mpsc::Sender<EngineAlert>,
    executions: RwLock<HashMap<ExecutionId, ExecutionHandle>>,
}

impl WorkflowOrchestrator {
    /// Build an orchestrator. Returns the receiving end of the alert
    /// channel; the embedder must drain it, exhaustion signals are
    /// delivered nowhere else.
    pub fn new(
        config: EngineConfig,
        policies: PolicyRegistry,
        channel_adapter: Arc<dyn ChannelAdapter>,
        gate: Arc<dyn ComplianceGate>,
        directory: Arc<dyn ContactDirectory>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> (Self, mpsc::Receiver<EngineAlert>) {
        let (alert_tx, alert_rx) = mpsc::channel(config.alert_channel_capacity);
        let audit = Arc::new(AuditLog::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            channel_adapter,
            Arc::clone(&audit),
            config.dispatch.clone(),
        ));

        let orchestrator = Self {
            config,
            policies,
            directory,
            renderer,
            gate,
            dispatcher,
            audit,
            acks: Arc::new(AcknowledgmentTracker::new()),
            alerts: alert_tx,
            executions: RwLock::new(HashMap::new()),
        };
        (orchestrator, alert_rx)
    }

    /// Start an escalation workflow for one event.
    ///
    /// Fails fast when no policy covers the event type, or when every
    /// role named by the policy resolves to zero contacts. A partially
    /// empty roster is allowed; empty tiers burn their deadline and
    /// escalate.
    pub async fn start_escalation(
        &self,
        event_type: EventType,
        severity: Severity,
        subject: Subject,
        context: HashMap<String, String>,
    ) -> EscalationResult<ExecutionId> {
        let policy = self.policies.get(event_type)?;

        let contacts = self.resolve_contacts(&policy.all_roles(), &subject).await;
        if contacts.values().all(|list| list.is_empty()) {
            tracing::error!(
                event_type = %event_type,
                subject = %subject,
                "No contacts resolved for any role; refusing to start"
            );
            return Err(EscalationError::NoContactsResolved);
        }

        let messages = self
            .render_messages(event_type, severity, &subject, &context, &contacts)
            .await;

        let mut execution = WorkflowExecution::new(event_type, severity, subject);
        for (key, value) in context {
            execution = execution.with_context(key, value);
        }
        let execution_id = execution.id.clone();

        tracing::info!(
            execution_id = %execution_id,
            event_type = %event_type,
            severity = %severity,
            "Starting escalation workflow"
        );

        let handle = scheduler::spawn(SchedulerSeed {
            execution,
            policy,
            contacts,
            messages: Arc::new(messages),
            dispatcher: Arc::clone(&self.dispatcher),
            gate: Arc::clone(&self.gate),
            audit: Arc::clone(&self.audit),
            acks: Arc::clone(&self.acks),
            alerts: self.alerts.clone(),
            backstop_margin_secs: self.config.backstop_margin_secs,
        });

        self.executions
            .write()
            .await
            .insert(execution_id.clone(), handle);
        Ok(execution_id)
    }

    /// Record an acknowledgment from a contact.
    ///
    /// First acknowledgment wins and terminates the workflow; anything
    /// after a terminal state is answered `AlreadyAcknowledged` and
    /// recorded as a late acknowledgment in the audit trail.
    pub async fn acknowledge(
        &self,
        execution_id: &ExecutionId,
        contact_id: ContactId,
        message: Option<String>,
    ) -> EscalationResult<AckResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = SchedulerCommand::Acknowledge {
            contact_id: contact_id.clone(),
            message,
            reply: reply_tx,
        };

        let executions = self.executions.read().await;
        let handle = executions
            .get(execution_id)
            .ok_or_else(|| EscalationError::ExecutionNotFound(execution_id.clone()))?;

        if handle.commands.send(command).await.is_ok() {
            if let Ok(response) = reply_rx.await {
                return Ok(response);
            }
        }

        // Scheduler task already finished: the workflow is terminal.
        self.audit.record(
            execution_id,
            AuditActor::Contact(contact_id.clone()),
            AuditEvent::LateAcknowledgment { contact_id },
        );
        Ok(AckResponse::AlreadyAcknowledged)
    }

    /// Cancel a running workflow (upstream resolved, operator action).
    pub async fn cancel(
        &self,
        execution_id: &ExecutionId,
        reason: impl Into<String>,
    ) -> EscalationResult<CancelStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = SchedulerCommand::Cancel {
            reason: reason.into(),
            reply: reply_tx,
        };

        let executions = self.executions.read().await;
        let handle = executions
            .get(execution_id)
            .ok_or_else(|| EscalationError::ExecutionNotFound(execution_id.clone()))?;

        if handle.commands.send(command).await.is_ok() {
            if let Ok(cancelled) = reply_rx.await {
                return Ok(if cancelled {
                    CancelStatus::Cancelled
                } else {
                    CancelStatus::AlreadyTerminal
                });
            }
        }
        Ok(CancelStatus::AlreadyTerminal)
    }

    /// Current state snapshot of one execution.
    pub async fn status(&self, execution_id: &ExecutionId) -> EscalationResult<WorkflowExecution> {
        let executions = self.executions.read().await;
        let handle = executions
            .get(execution_id)
            .ok_or_else(|| EscalationError::ExecutionNotFound(execution_id.clone()))?;
        let snapshot = handle.snapshot.read().await.clone();
        Ok(snapshot)
    }

    /// Snapshots of all non-terminal executions.
    pub async fn active_executions(&self) -> Vec<WorkflowExecution> {
        let executions = self.executions.read().await;
        let mut active = Vec::new();
        for handle in executions.values() {
            let snapshot = handle.snapshot.read().await;
            if !snapshot.is_terminal() {
                active.push(snapshot.clone());
            }
        }
        active
    }

    pub async fn execution_count(&self) -> usize {
        self.executions.read().await.len()
    }

    /// Drop handles for finished workflows. Their audit trail and
    /// acknowledgment records remain queryable.
    pub async fn prune_terminal(&self) -> usize {
        let mut executions = self.executions.write().await;
        let mut terminal = Vec::new();
        for (id, handle) in executions.iter() {
            if handle.snapshot.read().await.is_terminal() {
                terminal.push(id.clone());
            }
        }
        for id in &terminal {
            executions.remove(id);
        }
        terminal.len()
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn acknowledgments(&self) -> &Arc<AcknowledgmentTracker> {
        &self.acks
    }

    async fn resolve_contacts(
        &self,
        roles: &[RoleId],
        subject: &Subject,
    ) -> HashMap<RoleId, Vec<Contact>> {
        let mut contacts = HashMap::new();
        for role in roles {
            let resolved = self.directory.resolve(role, subject).await;
            if resolved.is_empty() {
                tracing::warn!(role = %role, subject = %subject, "Role resolved to no contacts");
            }
            contacts.insert(role.clone(), resolved);
        }
        contacts
    }

    /// Render the outgoing message once per contact language. The
    /// dispatcher picks per contact, falling back to English.
    async fn render_messages(
        &self,
        event_type: EventType,
        severity: Severity,
        subject: &Subject,
        context: &HashMap<String, String>,
        contacts: &HashMap<RoleId, Vec<Contact>>,
    ) -> HashMap<String, RenderedMessage> {
        let template_id = template_for(event_type);

        let mut variables = context.clone();
        variables.insert("subject".to_string(), subject.to_string());
        variables.insert("severity".to_string(), severity.to_string());

        let mut languages: HashSet<String> = contacts
            .values()
            .flatten()
            .map(|contact| contact.language.clone())
            .collect();
        languages.insert("en".to_string());

        let mut messages = HashMap::new();
        for language in languages {
            let rendered = self.renderer.render(template_id, &variables, &language).await;
            messages.insert(language, rendered);
        }
        messages
    }
}

/// Message template for each event type.
fn template_for(event_type: EventType) -> &'static str {
    match event_type {
        EventType::PatientVisit => "patient-visit-notice",
        EventType::ClinicalResult => "clinical-result-notice",
        EventType::FacilityEmergency => "facility-emergency-alert",
        EventType::ProviderAlert => "provider-alert-notice",
    }
}
