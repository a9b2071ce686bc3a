//! Relay rules.
//!
//! A rule pairs a source matcher with a destination and a set of
//! per-event-kind templates. Rules are immutable once built.

use crate::event::{EndpointType, Event, EventKind};
use crate::template::Template;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Name of the formatting scope that applies to every protocol.
pub const GENERAL_SCOPE: &str = "general";

/// Where a rule takes events from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    /// Protocol instance name.
    pub protocol: String,
    /// Channel name. Ignored for user sources.
    pub source: Option<String>,
    /// Channel or user.
    pub source_type: EndpointType,
}

impl Source {
    /// Whether an event originates from this source.
    ///
    /// Comparison is exact and case-sensitive. A user source matches
    /// private messages from any user.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.protocol == event.protocol
            && self.source_type == event.source_type
            && match self.source_type {
                EndpointType::User => true,
                EndpointType::Channel => self.source.as_deref() == Some(event.source.as_str()),
            }
    }
}

/// Where a rule delivers rendered text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Destination {
    /// Protocol instance name.
    pub protocol: String,
    /// Channel or user name.
    pub target: String,
    /// Channel or user.
    pub target_type: EndpointType,
}

impl Destination {
    #[must_use]
    pub fn new(
        protocol: impl Into<String>,
        target: impl Into<String>,
        target_type: EndpointType,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            target: target.into(),
            target_type,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.protocol, self.target_type, self.target)
    }
}

/// Templates keyed by scope (`general` or a protocol) and event kind.
#[derive(Debug, Clone, Default)]
pub struct Formatting {
    scopes: HashMap<String, HashMap<EventKind, Template>>,
}

impl Formatting {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template, replacing any existing one for the same scope and kind.
    pub fn insert(&mut self, scope: impl Into<String>, kind: EventKind, template: Template) {
        self.scopes
            .entry(scope.into())
            .or_default()
            .insert(kind, template);
    }

    /// Builder-style [`Formatting::insert`] taking the raw template string.
    #[must_use]
    pub fn with(mut self, scope: &str, kind: EventKind, template: &str) -> Self {
        self.insert(scope, kind, Template::parse(template));
        self
    }

    /// The template for an exact scope and kind.
    #[must_use]
    pub fn get(&self, scope: &str, kind: &EventKind) -> Option<&Template> {
        self.scopes.get(scope).and_then(|s| s.get(kind))
    }

    /// Names of all configured scopes.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    /// Every configured template with its scope and kind.
    pub fn templates(&self) -> impl Iterator<Item = (&str, &EventKind, &Template)> {
        self.scopes.iter().flat_map(|(scope, kinds)| {
            kinds
                .iter()
                .map(move |(kind, template)| (scope.as_str(), kind, template))
        })
    }

    /// Number of configured templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named relay rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique rule name.
    pub name: String,
    /// Source matcher.
    pub from: Source,
    /// Delivery destination.
    pub to: Destination,
    /// Templates.
    pub formatting: Formatting,
}

impl Rule {
    /// Whether this rule applies to an event.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.from.matches(event)
    }

    /// Whether the rule would deliver back into the channel it reads from.
    #[must_use]
    pub fn is_self_relay(&self) -> bool {
        self.from.protocol == self.to.protocol
            && self.from.source_type == self.to.target_type
            && self.from.source.as_deref() == Some(self.to.target.as_str())
    }
}
