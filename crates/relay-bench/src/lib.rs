//! Shared fixtures for relay benchmarks.

use relay_core::{
    Capabilities, DestinationSpec, Event, ProtocolSet, RuleSpec, RuleTable, RulesConfig,
    SourceSpec,
};
use std::collections::BTreeMap;

/// Protocol instances used by every fixture.
#[must_use]
pub fn protocols() -> ProtocolSet {
    ProtocolSet::new()
        .with("irc-esper", Capabilities::new("irc"))
        .with("irc-archives", Capabilities::new("irc"))
        .with("mumble", Capabilities::new("mumble"))
}

/// A configuration with `channels` source channels on `irc-esper`, each
/// relayed to `fan_out` destinations.
#[must_use]
pub fn rules_config(channels: usize, fan_out: usize) -> RulesConfig {
    let mut rules = Vec::with_capacity(channels * fan_out);

    for c in 0..channels {
        for d in 0..fan_out {
            let (protocol, target) = if d % 2 == 0 {
                ("irc-archives", format!("#archive-{c}-{d}"))
            } else {
                ("mumble", format!("Room{c}-{d}"))
            };

            let mut general = BTreeMap::new();
            general.insert("message".to_string(), Some("<{USER}> {MESSAGE}".to_string()));
            general.insert(
                "kick".to_string(),
                Some("* {USER} was {BANNED?} from {CHANNEL} by {KICKER} ({MESSAGE})".to_string()),
            );
            let mut formatting = BTreeMap::new();
            formatting.insert("general".to_string(), general);

            rules.push((
                format!("rule-{c}-{d}"),
                RuleSpec {
                    from: Some(SourceSpec {
                        protocol: Some("irc-esper".to_string()),
                        source: Some(channel_name(c)),
                        source_type: Some("channel".to_string()),
                    }),
                    to: Some(DestinationSpec {
                        protocol: Some(protocol.to_string()),
                        target: Some(target),
                        target_type: Some("channel".to_string()),
                    }),
                    formatting,
                },
            ));
        }
    }

    RulesConfig {
        protocol_support: vec!["irc".to_string(), "mumble".to_string()],
        rules,
    }
}

/// Load a table built by [`rules_config`].
///
/// # Panics
///
/// Panics if the fixture configuration fails validation.
#[must_use]
pub fn table(channels: usize, fan_out: usize) -> RuleTable {
    RuleTable::load(&rules_config(channels, fan_out), &protocols())
        .expect("fixture rules are valid")
}

/// Name of the `n`th fixture channel.
#[must_use]
pub fn channel_name(n: usize) -> String {
    format!("#chan-{n}")
}

/// A message posted in the `n`th fixture channel.
#[must_use]
pub fn message(n: usize) -> Event {
    Event::channel_message("irc-esper", channel_name(n), "Alice", "hello there")
}
