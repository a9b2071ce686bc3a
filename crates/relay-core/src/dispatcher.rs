//! Relay dispatcher.
//!
//! Turns one inbound event into the set of texts to deliver: match the
//! event against the active rule table, render each matching rule, and
//! drop the rules that have no template for the event kind.

use crate::event::{Event, EventId};
use crate::matcher::match_event;
use crate::render::render;
use crate::rule::Destination;
use crate::store::RuleStore;
use crate::table::RuleTable;
use std::sync::Arc;
use tracing::{debug, trace};

/// Rendered text bound for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResult {
    /// Rule that produced this result.
    pub rule: String,
    /// Event that triggered it.
    pub event_id: EventId,
    /// Where to deliver.
    pub destination: Destination,
    /// What to deliver.
    pub text: String,
}

/// Everything the dispatcher decided for one event.
#[derive(Debug, Clone, Default)]
pub struct Routed {
    /// Results to deliver, in rule order.
    pub results: Vec<RelayResult>,
    /// Number of rules that matched.
    pub matched: usize,
    /// Version of the rule table used.
    pub table_version: u64,
    /// The event was cancelled and not matched at all.
    pub cancelled: bool,
}

impl Routed {
    /// Matching rules with no template for the event kind.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.matched - self.results.len()
    }
}

/// Route an event through a specific table.
#[must_use]
pub fn route(table: &RuleTable, event: &Event) -> Routed {
    if event.cancelled {
        trace!(event = event.id, "Event cancelled, not relaying");
        return Routed {
            cancelled: true,
            ..Routed::default()
        };
    }

    let matches = match_event(event, table);
    let matched = matches.len();

    let results: Vec<RelayResult> = matches
        .into_iter()
        .filter_map(|rule| match render(rule, event) {
            Some(text) => Some(RelayResult {
                rule: rule.name.clone(),
                event_id: event.id,
                destination: rule.to.clone(),
                text,
            }),
            None => {
                trace!(rule = %rule.name, kind = %event.kind, "No template, not relaying");
                None
            }
        })
        .collect();

    Routed {
        results,
        matched,
        table_version: 0,
        cancelled: false,
    }
}

/// Routes events using whichever rule table is active.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Arc<RuleStore>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }

    /// The store this dispatcher reads from.
    #[must_use]
    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Route an event, reporting match and skip counts.
    ///
    /// The whole event is routed against a single table snapshot.
    #[must_use]
    pub fn route(&self, event: &Event) -> Routed {
        let snapshot = self.store.snapshot();
        let mut routed = route(&snapshot.table, event);
        routed.table_version = snapshot.version;

        debug!(
            event = event.id,
            kind = %event.kind,
            protocol = %event.protocol,
            source = %event.source,
            matched = routed.matched,
            relayed = routed.results.len(),
            "Dispatched event"
        );
        routed
    }

    /// Results to deliver for an event.
    #[must_use]
    pub fn dispatch(&self, event: &Event) -> Vec<RelayResult> {
        self.route(event).results
    }
}
