//! Registered protocols and their capabilities.
//!
//! Rules may only reference protocols that an adapter has registered.

use crate::event::EndpointType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a protocol adapter can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Protocol type, e.g. `irc` or `mumble`.
    pub protocol_type: String,
    /// Whether the adapter can send to channels.
    #[serde(default = "default_true")]
    pub channels: bool,
    /// Whether the adapter can send to individual users.
    #[serde(default = "default_true")]
    pub users: bool,
}

fn default_true() -> bool {
    true
}

impl Capabilities {
    /// Capabilities of a protocol that can reach both channels and users.
    #[must_use]
    pub fn new(protocol_type: impl Into<String>) -> Self {
        Self {
            protocol_type: protocol_type.into(),
            channels: true,
            users: true,
        }
    }

    /// Disable delivery to users.
    #[must_use]
    pub fn without_users(mut self) -> Self {
        self.users = false;
        self
    }

    /// Disable delivery to channels.
    #[must_use]
    pub fn without_channels(mut self) -> Self {
        self.channels = false;
        self
    }

    /// Whether the protocol can address endpoints of this type.
    #[must_use]
    pub fn supports(&self, endpoint_type: EndpointType) -> bool {
        match endpoint_type {
            EndpointType::Channel => self.channels,
            EndpointType::User => self.users,
        }
    }
}

/// The protocols available to rules, keyed by protocol name.
#[derive(Debug, Clone, Default)]
pub struct ProtocolSet {
    protocols: BTreeMap<String, Capabilities>,
}

impl ProtocolSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a protocol. Returns `false` if the name was already taken,
    /// in which case the existing entry is kept.
    pub fn insert(&mut self, name: impl Into<String>, capabilities: Capabilities) -> bool {
        let name = name.into();
        if self.protocols.contains_key(&name) {
            return false;
        }
        self.protocols.insert(name, capabilities);
        true
    }

    /// Builder-style [`ProtocolSet::insert`].
    #[must_use]
    pub fn with(mut self, name: &str, capabilities: Capabilities) -> Self {
        self.insert(name, capabilities);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Capabilities> {
        self.protocols.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.protocols.contains_key(name)
    }

    /// The type of a registered protocol.
    #[must_use]
    pub fn protocol_type(&self, name: &str) -> Option<&str> {
        self.protocols.get(name).map(|c| c.protocol_type.as_str())
    }

    /// Whether any registered protocol has this type.
    #[must_use]
    pub fn has_type(&self, protocol_type: &str) -> bool {
        self.protocols
            .values()
            .any(|c| c.protocol_type == protocol_type)
    }

    /// Registered protocol names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.protocols.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}
