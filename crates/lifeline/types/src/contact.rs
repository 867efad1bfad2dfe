//! Contacts and delivery channels
//!
//! A contact is a snapshot of a recipient from the external directory:
//! role, preferred language, and an ordered list of channel endpoints.
//! The snapshot is taken once at workflow start so a mid-escalation
//! directory update cannot race the dispatcher.

use crate::ids::{ContactId, RoleId};
use serde::{Deserialize, Serialize};

/// A delivery medium for one notification attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Voice,
    Sms,
    Push,
    Email,
}

impl Channel {
    /// Voice attempts always get an SMS shadow follow-up, because a
    /// completed call is not evidence a human actually heard it.
    pub fn is_voice(&self) -> bool {
        matches!(self, Channel::Voice)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Voice => write!(f, "voice"),
            Channel::Sms => write!(f, "sms"),
            Channel::Push => write!(f, "push"),
            Channel::Email => write!(f, "email"),
        }
    }
}

/// One reachable address on one channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEndpoint {
    pub channel: Channel,
    pub address: String,
}

impl ChannelEndpoint {
    pub fn new(channel: Channel, address: impl Into<String>) -> Self {
        Self {
            channel,
            address: address.into(),
        }
    }
}

/// A recipient snapshot held for the duration of one workflow
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub role: RoleId,
    /// Preferred language for rendered messages (BCP 47 tag)
    pub language: String,
    /// Endpoints in the contact's preference order
    pub endpoints: Vec<ChannelEndpoint>,
}

impl Contact {
    pub fn new(id: ContactId, name: impl Into<String>, role: RoleId) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            language: "en".to_string(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_endpoint(mut self, channel: Channel, address: impl Into<String>) -> Self {
        self.endpoints.push(ChannelEndpoint::new(channel, address));
        self
    }

    /// Endpoints this contact can be reached on for a tier, in the
    /// contact's preference order intersected with the tier's allowed
    /// channel set.
    pub fn endpoints_for(&self, allowed: &[Channel]) -> Vec<&ChannelEndpoint> {
        self.endpoints
            .iter()
            .filter(|e| allowed.contains(&e.channel))
            .collect()
    }
}
