//! Event classification
//!
//! Incoming events are classified by a closed event type and an
//! ordered severity. Both are exhaustively matched across the engine
//! so adding a variant is a compile-visible change.

use serde::{Deserialize, Serialize};

/// The kind of event driving an escalation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Patient visit lifecycle event (admission, discharge, transfer)
    PatientVisit,
    /// Abnormal or critical clinical result
    ClinicalResult,
    /// Facility-level emergency (code, evacuation, system outage)
    FacilityEmergency,
    /// Direct alert targeted at a provider
    ProviderAlert,
}

impl EventType {
    /// All event types, in escalation-policy registration order
    pub fn all() -> [EventType; 4] {
        [
            EventType::PatientVisit,
            EventType::ClinicalResult,
            EventType::FacilityEmergency,
            EventType::ProviderAlert,
        ]
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::PatientVisit => write!(f, "patient-visit"),
            EventType::ClinicalResult => write!(f, "clinical-result"),
            EventType::FacilityEmergency => write!(f, "facility-emergency"),
            EventType::ProviderAlert => write!(f, "provider-alert"),
        }
    }
}

/// Severity of an event, ordered from least to most urgent
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    /// Can wait for normal working cadence
    Routine,
    /// Needs attention within the policy's tier windows
    Urgent,
    /// Most urgent: tier 0 is always armed with zero delay
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Routine => write!(f, "routine"),
            Severity::Urgent => write!(f, "urgent"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// What the escalation is about: a patient or a physical location
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    Patient { id: String },
    Location { id: String },
}

impl Subject {
    pub fn patient(id: impl Into<String>) -> Self {
        Subject::Patient { id: id.into() }
    }

    pub fn location(id: impl Into<String>) -> Self {
        Subject::Location { id: id.into() }
    }

    /// The raw subject identifier
    pub fn id(&self) -> &str {
        match self {
            Subject::Patient { id } => id,
            Subject::Location { id } => id,
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Patient { id } => write!(f, "patient:{}", id),
            Subject::Location { id } => write!(f, "location:{}", id),
        }
    }
}
