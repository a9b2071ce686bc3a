//! Normalized events produced by protocol adapters.
//!
//! Events are transient: an adapter builds one, the dispatcher consumes it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// A unique event identifier, used to correlate log lines.
pub type EventId = u64;

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a process-unique event ID.
#[must_use]
pub fn generate_event_id() -> EventId {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Whether a source or target names a channel or a single user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    /// A group channel.
    Channel,
    /// A direct conversation with a user.
    User,
}

impl EndpointType {
    /// The configuration spelling of this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::User => "user",
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel" => Ok(Self::Channel),
            "user" => Ok(Self::User),
            _ => Err(()),
        }
    }
}

/// The category of a conversational occurrence.
///
/// The set is open: protocols may emit kinds the relay has no name for,
/// which are carried as [`EventKind::Other`] and can still be templated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Action,
    Join,
    Part,
    Kick,
    Disconnect,
    Connect,
    MovedFrom,
    MovedTo,
    Remove,
    Other(String),
}

impl EventKind {
    /// Parse a kind name. `-` and `_` are interchangeable, so `moved-from`
    /// and `moved_from` name the same kind.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().replace('-', "_").to_ascii_lowercase();
        match normalized.as_str() {
            "message" => Self::Message,
            "action" => Self::Action,
            "join" => Self::Join,
            "part" => Self::Part,
            "kick" => Self::Kick,
            "disconnect" => Self::Disconnect,
            "connect" => Self::Connect,
            "moved_from" => Self::MovedFrom,
            "moved_to" => Self::MovedTo,
            "remove" => Self::Remove,
            _ => Self::Other(normalized),
        }
    }

    /// Canonical name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::Action => "action",
            Self::Join => "join",
            Self::Part => "part",
            Self::Kick => "kick",
            Self::Disconnect => "disconnect",
            Self::Connect => "connect",
            Self::MovedFrom => "moved_from",
            Self::MovedTo => "moved_to",
            Self::Remove => "remove",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::parse(&name))
    }
}

/// A normalized event from a protocol adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier.
    #[serde(default = "generate_event_id", skip_serializing)]
    pub id: EventId,
    /// What happened.
    pub kind: EventKind,
    /// Name of the protocol instance the event came from.
    pub protocol: String,
    /// Type of that protocol (e.g. `irc`), when the adapter knows it.
    #[serde(default)]
    pub protocol_type: Option<String>,
    /// Channel or user the event happened in.
    pub source: String,
    /// Whether `source` is a channel or a user.
    pub source_type: EndpointType,
    /// The actor.
    pub user: String,
    /// Channel involved, for join/part/kick/move events.
    #[serde(default)]
    pub channel: Option<String>,
    /// Who performed a kick.
    #[serde(default)]
    pub kicker: Option<String>,
    /// Message body or reason text.
    #[serde(default)]
    pub message: Option<String>,
    /// Whether a removal was a ban rather than a kick.
    #[serde(default)]
    pub banned: bool,
    /// Set by an earlier handler to stop the event from being relayed.
    #[serde(default)]
    pub cancelled: bool,
}

impl Event {
    /// Create a new event with no kind-specific fields set.
    #[must_use]
    pub fn new(
        kind: EventKind,
        protocol: impl Into<String>,
        source: impl Into<String>,
        source_type: EndpointType,
        user: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_event_id(),
            kind,
            protocol: protocol.into(),
            protocol_type: None,
            source: source.into(),
            source_type,
            user: user.into(),
            channel: None,
            kicker: None,
            message: None,
            banned: false,
            cancelled: false,
        }
    }

    /// A message posted in a channel.
    #[must_use]
    pub fn channel_message(
        protocol: impl Into<String>,
        channel: impl Into<String>,
        user: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let channel = channel.into();
        Self::new(
            EventKind::Message,
            protocol,
            channel.clone(),
            EndpointType::Channel,
            user,
        )
        .with_channel(channel)
        .with_message(message)
    }

    /// A private message sent to the relay's own user.
    #[must_use]
    pub fn private_message(
        protocol: impl Into<String>,
        user: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let user = user.into();
        Self::new(
            EventKind::Message,
            protocol,
            user.clone(),
            EndpointType::User,
            user,
        )
        .with_message(message)
    }

    #[must_use]
    pub fn with_protocol_type(mut self, protocol_type: impl Into<String>) -> Self {
        self.protocol_type = Some(protocol_type.into());
        self
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn with_kicker(mut self, kicker: impl Into<String>) -> Self {
        self.kicker = Some(kicker.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_banned(mut self, banned: bool) -> Self {
        self.banned = banned;
        self
    }

    #[must_use]
    pub fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }
}
