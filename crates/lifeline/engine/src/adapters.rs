//! External collaborator seams
//!
//! The engine never places a call, screens consent, stores a contact,
//! or renders a sentence itself. Each of those concerns is a trait an
//! embedder implements; the engine only consumes the behavior
//! contracts below.

use async_trait::async_trait;
use lifeline_types::{
    Channel, Contact, EventType, ExecutionId, RoleId, Severity, Subject,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A message after template rendering, ready for a channel
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub template_id: String,
    pub language: String,
    pub body: String,
}

/// Metadata handed to the compliance gate before any dispatch.
///
/// Deliberately excludes clinical content: the gate screens consent
/// and PHI exposure from routing facts alone.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationMetadata {
    pub execution_id: ExecutionId,
    pub event_type: EventType,
    pub severity: Severity,
    pub subject: Subject,
    pub tier_index: u32,
    pub roles: Vec<RoleId>,
    pub channels: Vec<Channel>,
}

/// Immediate accept/reject from a delivery transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Accepted,
    Rejected { reason: String },
}

/// Allow/deny verdict from the compliance gate
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComplianceVerdict {
    Allow,
    Deny { reason: String },
}

/// Sends one message over one channel and reports immediate
/// accept/reject. May take up to its own delivery timeout; the
/// dispatcher enforces a deadline around every call.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn send(
        &self,
        contact: &Contact,
        channel: Channel,
        address: &str,
        message: &RenderedMessage,
    ) -> SendOutcome;
}

/// Validates a pending notification (consent, identifiers, PHI
/// exposure) and returns a verdict. A denial blocks dispatch for the
/// tier but never stops escalation.
#[async_trait]
pub trait ComplianceGate: Send + Sync {
    async fn check(&self, metadata: &NotificationMetadata) -> ComplianceVerdict;
}

/// Resolves a recipient role to concrete contacts for one subject.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn resolve(&self, role: &RoleId, subject: &Subject) -> Vec<Contact>;
}

/// Renders the outgoing message. Invoked by the orchestrator before a
/// workflow starts; the scheduler never renders content itself.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    async fn render(
        &self,
        template_id: &str,
        variables: &HashMap<String, String>,
        language: &str,
    ) -> RenderedMessage;
}
