//! Event matching.

use crate::event::Event;
use crate::rule::Rule;
use crate::table::RuleTable;

/// Select every rule that applies to an event, in configuration order.
///
/// A rule applies when its source protocol and source type equal the
/// event's, and, for channel sources, the channel name equals the event's
/// source. All matching rules are returned; there is no first-match-wins.
#[must_use]
pub fn match_event<'t>(event: &Event, table: &'t RuleTable) -> Vec<&'t Rule> {
    table.rules_matching(&event.protocol, &event.source, event.source_type)
}
