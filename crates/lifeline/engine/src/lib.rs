//! Lifeline escalation engine
//!
//! Drives tiered notification-escalation workflows for healthcare
//! events: arm a tier, notify its on-call roles, wait for an
//! acknowledgment, and climb to the next tier when none arrives.
//! Delivery transports, contact directories, message rendering, and
//! compliance screening are adapter traits supplied by the embedder.
//!
//! Entry point is [`WorkflowOrchestrator`]; everything after
//! [`WorkflowOrchestrator::start_escalation`] runs inside a dedicated
//! scheduler task per workflow.

#![deny(unsafe_code)]

pub mod ack_tracker;
pub mod adapters;
pub mod audit_log;
pub mod config;
pub mod dispatcher;
pub mod orchestrator;
pub mod policy_registry;
pub mod scheduler;

pub use ack_tracker::{AckOutcome, AcknowledgmentTracker};
pub use adapters::{
    ChannelAdapter, ComplianceGate, ComplianceVerdict, ContactDirectory, NotificationMetadata,
    RenderedMessage, SendOutcome, TemplateRenderer,
};
pub use audit_log::{AuditLog, ReplayedExecution};
pub use config::{DispatchConfig, EngineConfig};
pub use dispatcher::NotificationDispatcher;
pub use orchestrator::{CancelStatus, WorkflowOrchestrator};
pub use policy_registry::PolicyRegistry;
pub use scheduler::{AckResponse, EngineAlert};
