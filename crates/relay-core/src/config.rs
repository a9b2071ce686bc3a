//! Relay section of the configuration file.
//!
//! These types mirror the file as written. Every field is optional here so
//! that [`crate::RuleTable::load`] can report all problems at once instead
//! of stopping at the first missing key.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;

/// The keys of the configuration file the relay core reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesConfig {
    /// Protocol types the relay works with. Empty means any.
    #[serde(rename = "protocol-support", default)]
    pub protocol_support: Vec<String>,

    /// Rules in file order.
    #[serde(default, deserialize_with = "ordered_rules")]
    pub rules: Vec<(String, RuleSpec)>,
}

/// A rule as written in the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleSpec {
    #[serde(default)]
    pub from: Option<SourceSpec>,
    #[serde(default)]
    pub to: Option<DestinationSpec>,
    /// Scope (`general` or a protocol) to event kind to template.
    /// A `null` template is the same as omitting it.
    #[serde(default)]
    pub formatting: BTreeMap<String, BTreeMap<String, Option<String>>>,
}

/// The `from` block of a rule.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSpec {
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
}

/// The `to` block of a rule.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DestinationSpec {
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub target_type: Option<String>,
}

/// Deserialize a mapping into a vector of entries, keeping document order.
fn ordered_rules<'de, D>(deserializer: D) -> Result<Vec<(String, RuleSpec)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct RulesVisitor;

    impl<'de> Visitor<'de> for RulesVisitor {
        type Value = Vec<(String, RuleSpec)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping of rule names to rules")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut rules = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, Option<RuleSpec>>()? {
                rules.push((entry.0, entry.1.unwrap_or_default()));
            }
            Ok(rules)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(RulesVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_keep_file_order() {
        let config: RulesConfig = serde_json::from_str(
            r#"{
                "protocol-support": ["irc", "mumble"],
                "rules": {
                    "zeta": {},
                    "alpha": {},
                    "mid": {}
                }
            }"#,
        )
        .unwrap();

        let names: Vec<_> = config.rules.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(config.protocol_support, vec!["irc", "mumble"]);
    }

    #[test]
    fn test_missing_sections_default() {
        let config: RulesConfig = serde_json::from_str(r#"{"rules": null}"#).unwrap();
        assert!(config.rules.is_empty());
        assert!(config.protocol_support.is_empty());

        let config: RulesConfig = serde_json::from_str("{}").unwrap();
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_null_rule_body() {
        let config: RulesConfig = serde_json::from_str(r#"{"rules": {"empty": null}}"#).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert!(config.rules[0].1.from.is_none());
    }

    #[test]
    fn test_rule_spec_fields() {
        let config: RulesConfig = serde_json::from_str(
            r##"{
                "rules": {
                    "name1": {
                        "from": {
                            "protocol": "irc-esper", "source": "#Ultros", "source_type": "channel"
                        },
                        "to": {
                            "protocol": "irc-archives", "target": "#Ultros",
                            "target_type": "channel"
                        },
                        "formatting": {
                            "general": {"join": "* {USER} joined {CHANNEL}", "part": null}
                        }
                    }
                }
            }"##,
        )
        .unwrap();

        let (name, spec) = &config.rules[0];
        assert_eq!(name, "name1");
        let from = spec.from.as_ref().unwrap();
        assert_eq!(from.protocol.as_deref(), Some("irc-esper"));
        assert_eq!(spec.formatting["general"]["part"], None);
    }
}
