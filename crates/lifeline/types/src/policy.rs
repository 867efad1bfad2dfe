//! Escalation policies: ordered tier tables per event type
//!
//! A policy is configuration data, validated once at registration and
//! read-only afterwards. Each tier names who to reach, over which
//! channels, after what delay, and how hard to try.
//!
//! Timing model: a tier's `delay_secs` is measured from the previous
//! tier's activation (tier 0 from workflow start). A tier's
//! acknowledgment deadline is the next tier's delay; the final tier
//! uses its own `ack_timeout_secs`.

use crate::contact::Channel;
use crate::errors::{EscalationError, EscalationResult};
use crate::event::{EventType, Severity};
use crate::ids::RoleId;
use serde::{Deserialize, Serialize};

/// One ordered step of an escalation policy
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tier {
    /// Human-readable tier name, used in the audit trail
    pub name: String,
    /// Delay before this tier is armed, from the previous tier's
    /// activation (tier 0: from workflow start). May be zero.
    pub delay_secs: u64,
    /// Acknowledgment deadline once this tier is the last one armed
    pub ack_timeout_secs: u64,
    /// Maximum delivery attempts per contact per channel
    pub max_attempts: u32,
    /// Whether an acknowledgment is mandatory before the workflow can
    /// terminate successfully at this tier
    pub ack_required: bool,
    /// Recipient roles to target
    pub roles: Vec<RoleId>,
    /// Allowed channels, intersected with each contact's preferences
    pub channels: Vec<Channel>,
}

impl Tier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay_secs: 0,
            ack_timeout_secs: 300,
            max_attempts: 2,
            ack_required: true,
            roles: Vec::new(),
            channels: Vec::new(),
        }
    }

    pub fn with_delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    pub fn with_ack_timeout_secs(mut self, secs: u64) -> Self {
        self.ack_timeout_secs = secs;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_ack_required(mut self, required: bool) -> Self {
        self.ack_required = required;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(RoleId::new(role));
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }
}

/// An ordered sequence of tiers for one event type
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub event_type: EventType,
    pub tiers: Vec<Tier>,
}

impl EscalationPolicy {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            tiers: Vec::new(),
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Validate the policy before it enters the registry.
    pub fn validate(&self) -> EscalationResult<()> {
        if self.tiers.is_empty() {
            return Err(EscalationError::InvalidPolicy {
                event_type: self.event_type,
                reason: "policy has no tiers".into(),
            });
        }
        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.roles.is_empty() {
                return Err(EscalationError::InvalidPolicy {
                    event_type: self.event_type,
                    reason: format!("tier {} ('{}') has no recipient roles", index, tier.name),
                });
            }
            if tier.channels.is_empty() {
                return Err(EscalationError::InvalidPolicy {
                    event_type: self.event_type,
                    reason: format!("tier {} ('{}') has no channels", index, tier.name),
                });
            }
            if tier.max_attempts == 0 {
                return Err(EscalationError::InvalidPolicy {
                    event_type: self.event_type,
                    reason: format!("tier {} ('{}') has max_attempts = 0", index, tier.name),
                });
            }
        }
        Ok(())
    }

    pub fn tier(&self, index: usize) -> Option<&Tier> {
        self.tiers.get(index)
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_last_tier(&self, index: usize) -> bool {
        index + 1 == self.tiers.len()
    }

    /// Every role named by any tier, first occurrence order, no
    /// duplicates.
    pub fn all_roles(&self) -> Vec<RoleId> {
        let mut roles = Vec::new();
        for tier in &self.tiers {
            for role in &tier.roles {
                if !roles.contains(role) {
                    roles.push(role.clone());
                }
            }
        }
        roles
    }

    /// Delay before arming a tier, with the critical-severity clamp:
    /// the most urgent events always arm tier 0 immediately.
    pub fn effective_delay_secs(&self, index: usize, severity: Severity) -> u64 {
        if index == 0 && severity == Severity::Critical {
            return 0;
        }
        self.tier(index).map(|t| t.delay_secs).unwrap_or(0)
    }

    /// Acknowledgment deadline for a tier once it has been armed:
    /// the next tier's delay, or the tier's own timeout if it is last.
    pub fn ack_deadline_secs(&self, index: usize) -> u64 {
        match self.tiers.get(index + 1) {
            Some(next) => next.delay_secs,
            None => self.tiers.get(index).map(|t| t.ack_timeout_secs).unwrap_or(0),
        }
    }

    /// Upper bound on workflow lifetime: the sum of every tier's arming
    /// delay plus the final tier's acknowledgment deadline. The engine
    /// adds a margin and uses this as the lost-timer backstop.
    pub fn max_lifetime_secs(&self) -> u64 {
        let delays: u64 = self.tiers.iter().map(|t| t.delay_secs).sum();
        delays + self.tiers.last().map(|t| t.ack_timeout_secs).unwrap_or(0)
    }

    /// Built-in policy table for an event type.
    pub fn default_for(event_type: EventType) -> Self {
        match event_type {
            EventType::PatientVisit => Self::new(event_type)
                .with_tier(
                    Tier::new("care-team")
                        .with_delay_secs(0)
                        .with_ack_timeout_secs(900)
                        .with_role("primary-nurse")
                        .with_channel(Channel::Push)
                        .with_channel(Channel::Sms),
                )
                .with_tier(
                    Tier::new("charge-nurse")
                        .with_delay_secs(900)
                        .with_ack_timeout_secs(900)
                        .with_role("charge-nurse")
                        .with_channel(Channel::Sms)
                        .with_channel(Channel::Voice),
                ),
            EventType::ClinicalResult => Self::new(event_type)
                .with_tier(
                    Tier::new("ordering-provider")
                        .with_delay_secs(0)
                        .with_ack_timeout_secs(600)
                        .with_max_attempts(3)
                        .with_role("ordering-provider")
                        .with_channel(Channel::Voice)
                        .with_channel(Channel::Sms)
                        .with_channel(Channel::Push),
                )
                .with_tier(
                    Tier::new("covering-provider")
                        .with_delay_secs(600)
                        .with_ack_timeout_secs(600)
                        .with_max_attempts(3)
                        .with_role("covering-provider")
                        .with_channel(Channel::Voice)
                        .with_channel(Channel::Sms),
                )
                .with_tier(
                    Tier::new("department-chief")
                        .with_delay_secs(600)
                        .with_ack_timeout_secs(900)
                        .with_role("department-chief")
                        .with_channel(Channel::Voice)
                        .with_channel(Channel::Sms),
                ),
            EventType::FacilityEmergency => Self::new(event_type)
                .with_tier(
                    Tier::new("on-site-response")
                        .with_delay_secs(0)
                        .with_ack_timeout_secs(120)
                        .with_max_attempts(3)
                        .with_role("charge-nurse")
                        .with_role("security-lead")
                        .with_channel(Channel::Voice)
                        .with_channel(Channel::Sms)
                        .with_channel(Channel::Push),
                )
                .with_tier(
                    Tier::new("facility-command")
                        .with_delay_secs(120)
                        .with_ack_timeout_secs(180)
                        .with_max_attempts(3)
                        .with_role("administrator-on-call")
                        .with_channel(Channel::Voice)
                        .with_channel(Channel::Sms),
                )
                .with_tier(
                    Tier::new("executive")
                        .with_delay_secs(180)
                        .with_ack_timeout_secs(300)
                        .with_role("facility-executive")
                        .with_channel(Channel::Voice)
                        .with_channel(Channel::Sms)
                        .with_channel(Channel::Email),
                ),
            EventType::ProviderAlert => Self::new(event_type)
                .with_tier(
                    Tier::new("provider")
                        .with_delay_secs(0)
                        .with_ack_timeout_secs(600)
                        .with_role("provider")
                        .with_channel(Channel::Push)
                        .with_channel(Channel::Sms),
                )
                .with_tier(
                    Tier::new("practice-backup")
                        .with_delay_secs(600)
                        .with_ack_timeout_secs(900)
                        .with_role("covering-provider")
                        .with_channel(Channel::Sms)
                        .with_channel(Channel::Voice),
                ),
        }
    }
}
