//! Policy registry: validated escalation policies by event type
//!
//! Policies are immutable once registered and shared read-only across
//! every execution. Registering a policy for an event type replaces
//! the previous one; in-flight executions keep the `Arc` they started
//! with.

use lifeline_types::{EscalationError, EscalationPolicy, EscalationResult, EventType};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of escalation policies, keyed by event type
#[derive(Clone, Debug, Default)]
pub struct PolicyRegistry {
    policies: HashMap<EventType, Arc<EscalationPolicy>>,
}

impl PolicyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Create a registry pre-loaded with the built-in policy for
    /// every event type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for event_type in EventType::all() {
            // Built-ins are validated by test; registration cannot fail
            let policy = EscalationPolicy::default_for(event_type);
            registry.policies.insert(event_type, Arc::new(policy));
        }
        registry
    }

    /// Register a policy, validating it first.
    pub fn register(&mut self, policy: EscalationPolicy) -> EscalationResult<()> {
        policy.validate()?;
        let event_type = policy.event_type;
        self.policies.insert(event_type, Arc::new(policy));
        tracing::info!(event_type = %event_type, "Escalation policy registered");
        Ok(())
    }

    /// Get the policy for an event type.
    pub fn get(&self, event_type: EventType) -> EscalationResult<Arc<EscalationPolicy>> {
        self.policies
            .get(&event_type)
            .cloned()
            .ok_or(EscalationError::PolicyNotFound(event_type))
    }

    pub fn contains(&self, event_type: EventType) -> bool {
        self.policies.contains_key(&event_type)
    }

    pub fn count(&self) -> usize {
        self.policies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_types::{Channel, Tier};

    fn make_policy(event_type: EventType) -> EscalationPolicy {
        EscalationPolicy::new(event_type).with_tier(
            Tier::new("only")
                .with_role("provider")
                .with_channel(Channel::Sms),
        )
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = PolicyRegistry::new();
        registry
            .register(make_policy(EventType::ProviderAlert))
            .unwrap();

        let policy = registry.get(EventType::ProviderAlert).unwrap();
        assert_eq!(policy.tier_count(), 1);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_register_invalid_rejected() {
        let mut registry = PolicyRegistry::new();
        let result = registry.register(EscalationPolicy::new(EventType::PatientVisit));
        assert!(result.is_err());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_unknown_event_type() {
        let registry = PolicyRegistry::new();
        assert!(matches!(
            registry.get(EventType::FacilityEmergency),
            Err(EscalationError::PolicyNotFound(EventType::FacilityEmergency))
        ));
    }

    #[test]
    fn test_defaults_cover_every_event_type() {
        let registry = PolicyRegistry::with_defaults();
        for event_type in EventType::all() {
            assert!(registry.contains(event_type));
        }
        assert_eq!(registry.count(), 4);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = PolicyRegistry::with_defaults();
        registry
            .register(make_policy(EventType::ClinicalResult))
            .unwrap();
        assert_eq!(registry.get(EventType::ClinicalResult).unwrap().tier_count(), 1);
    }
}
