//! Template resolution and rendering.
//!
//! For a rule and an event, the template is looked up in this order:
//!
//! 1. the scope named after the event's protocol instance,
//! 2. the scope named after the event's protocol type, if it differs,
//! 3. the `general` scope.
//!
//! If none of them has a template for the event kind, the event is not
//! relayed by that rule.

use crate::event::Event;
use crate::rule::{Rule, GENERAL_SCOPE};
use crate::template::Template;

/// Find the template a rule uses for an event, if any.
#[must_use]
pub fn resolve_template<'r>(rule: &'r Rule, event: &Event) -> Option<&'r Template> {
    let formatting = &rule.formatting;

    formatting
        .get(&event.protocol, &event.kind)
        .or_else(|| {
            event
                .protocol_type
                .as_deref()
                .filter(|t| *t != event.protocol)
                .and_then(|t| formatting.get(t, &event.kind))
        })
        .or_else(|| formatting.get(GENERAL_SCOPE, &event.kind))
}

/// Render the text a rule relays for an event.
///
/// Returns `None` when the rule has no template for the event kind.
#[must_use]
pub fn render(rule: &Rule, event: &Event) -> Option<String> {
    resolve_template(rule, event).map(|template| template.render(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EndpointType, EventKind};
    use crate::rule::{Destination, Formatting, Source};

    fn rule(formatting: Formatting) -> Rule {
        Rule {
            name: "name1".to_string(),
            from: Source {
                protocol: "mumble".to_string(),
                source: Some("Root".to_string()),
                source_type: EndpointType::Channel,
            },
            to: Destination::new("irc-esper", "#Ultros", EndpointType::Channel),
            formatting,
        }
    }

    fn connect_event() -> Event {
        Event::new(EventKind::Connect, "mumble", "Root", EndpointType::Channel, "Dan")
    }

    #[test]
    fn test_general_template_used_without_override() {
        let rule = rule(
            Formatting::new().with(GENERAL_SCOPE, EventKind::Connect, "* {USER} connected"),
        );
        assert_eq!(render(&rule, &connect_event()).as_deref(), Some("* Dan connected"));
    }

    #[test]
    fn test_protocol_override_wins() {
        let rule = rule(
            Formatting::new()
                .with(GENERAL_SCOPE, EventKind::Connect, "* {USER} connected")
                .with("mumble", EventKind::Connect, "* {USER} connected to Mumble"),
        );
        assert_eq!(
            render(&rule, &connect_event()).as_deref(),
            Some("* Dan connected to Mumble")
        );
    }

    #[test]
    fn test_protocol_type_scope() {
        let rule = rule(
            Formatting::new()
                .with(GENERAL_SCOPE, EventKind::Disconnect, "* {USER} left")
                .with("irc", EventKind::Disconnect, "* {USER} quit ({MESSAGE})"),
        );
        let event = Event::new(
            EventKind::Disconnect,
            "irc-esper",
            "#Ultros",
            EndpointType::Channel,
            "Bob",
        )
        .with_protocol_type("irc")
        .with_message("Ping timeout");

        assert_eq!(render(&rule, &event).as_deref(), Some("* Bob quit (Ping timeout)"));
    }

    #[test]
    fn test_missing_kind_is_skipped() {
        // Only an irc-specific disconnect template: mumble disconnects are never relayed.
        let rule = rule(Formatting::new().with("irc", EventKind::Disconnect, "* {USER} quit"));
        let event = Event::new(
            EventKind::Disconnect,
            "mumble",
            "Root",
            EndpointType::Channel,
            "Dan",
        )
        .with_protocol_type("mumble");

        assert!(resolve_template(&rule, &event).is_none());
        assert!(render(&rule, &event).is_none());
    }

    #[test]
    fn test_render_is_repeatable() {
        let rule = rule(
            Formatting::new().with(GENERAL_SCOPE, EventKind::Connect, "* {USER} connected"),
        );
        let event = connect_event();
        assert_eq!(render(&rule, &event), render(&rule, &event));
    }
}
