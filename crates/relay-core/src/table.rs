//! The rule table.
//!
//! A table is built from configuration in one pass, validated as a whole,
//! and never modified afterwards. Reloading builds a new table.

use crate::config::{DestinationSpec, RuleSpec, RulesConfig, SourceSpec};
use crate::error::{ConfigError, LoadWarning, ValidationIssue};
use crate::event::{EndpointType, EventKind};
use crate::protocol::ProtocolSet;
use crate::rule::{Destination, Formatting, Rule, Source, GENERAL_SCOPE};
use crate::template::Template;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Rule indices for one source protocol, in configuration order.
#[derive(Debug, Default)]
struct ProtocolRules {
    channels: HashMap<String, Vec<usize>>,
    users: Vec<usize>,
}

/// An immutable, validated set of relay rules.
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
    index: HashMap<String, ProtocolRules>,
    warnings: Vec<LoadWarning>,
}

impl RuleTable {
    /// A table with no rules.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from already-constructed rules, without validation.
    #[must_use]
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        let index = build_index(&rules);
        Self {
            rules,
            index,
            warnings: Vec::new(),
        }
    }

    /// Validate configuration and build a table.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] listing every problem found if any rule
    /// is invalid. No partial table is produced.
    pub fn load(config: &RulesConfig, protocols: &ProtocolSet) -> Result<Self, ConfigError> {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut rules = Vec::with_capacity(config.rules.len());
        let mut seen = HashSet::new();

        for (name, spec) in &config.rules {
            if name.trim().is_empty() {
                issues.push(ValidationIssue::EmptyRuleName);
                continue;
            }
            if !seen.insert(name.as_str()) {
                issues.push(ValidationIssue::DuplicateRule { rule: name.clone() });
                continue;
            }

            let mut checker = RuleChecker {
                rule: name,
                protocols,
                protocol_support: &config.protocol_support,
                issues: &mut issues,
            };
            if let Some(rule) = checker.build(spec) {
                collect_warnings(&rule, protocols, &config.protocol_support, &mut warnings);
                rules.push(rule);
            }
        }

        if !issues.is_empty() {
            for issue in &issues {
                warn!(%issue, "Invalid relay rule");
            }
            return Err(ConfigError::new(issues));
        }

        for warning in &warnings {
            warn!(%warning, "Relay rule warning");
        }

        let mut table = Self::from_rules(rules);
        table.warnings = warnings;

        info!(
            rules = table.len(),
            warnings = table.warnings.len(),
            "Loaded rule table"
        );
        Ok(table)
    }

    /// Rules whose source matches, in configuration order.
    ///
    /// For user sources the source name is not compared.
    #[must_use]
    pub fn rules_matching(
        &self,
        protocol: &str,
        source: &str,
        source_type: EndpointType,
    ) -> Vec<&Rule> {
        let Some(entry) = self.index.get(protocol) else {
            return Vec::new();
        };

        let indices: &[usize] = match source_type {
            EndpointType::User => &entry.users,
            EndpointType::Channel => entry
                .channels
                .get(source)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        };

        indices.iter().map(|&i| &self.rules[i]).collect()
    }

    /// All rules in configuration order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Warnings produced while loading.
    #[must_use]
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn build_index(rules: &[Rule]) -> HashMap<String, ProtocolRules> {
    let mut index: HashMap<String, ProtocolRules> = HashMap::new();

    for (i, rule) in rules.iter().enumerate() {
        let entry = index.entry(rule.from.protocol.clone()).or_default();
        match rule.from.source_type {
            EndpointType::User => entry.users.push(i),
            EndpointType::Channel => {
                if let Some(channel) = &rule.from.source {
                    entry.channels.entry(channel.clone()).or_default().push(i);
                }
            }
        }
    }

    index
}

/// Validates one rule, recording issues as it goes.
struct RuleChecker<'a> {
    rule: &'a str,
    protocols: &'a ProtocolSet,
    protocol_support: &'a [String],
    issues: &'a mut Vec<ValidationIssue>,
}

impl RuleChecker<'_> {
    fn build(&mut self, spec: &RuleSpec) -> Option<Rule> {
        let from = match &spec.from {
            Some(from) => self.source(from),
            None => {
                self.missing("from");
                None
            }
        };
        let to = match &spec.to {
            Some(to) => self.destination(to),
            None => {
                self.missing("to");
                None
            }
        };

        let formatting = build_formatting(spec);

        Some(Rule {
            name: self.rule.to_string(),
            from: from?,
            to: to?,
            formatting,
        })
    }

    fn source(&mut self, spec: &SourceSpec) -> Option<Source> {
        let protocol = self.protocol(spec.protocol.as_deref(), "from.protocol");
        let source_type = self.endpoint_type(spec.source_type.as_deref(), "from.source_type");

        let source = match source_type {
            Some(EndpointType::Channel) => {
                Some(self.required(spec.source.as_deref(), "from.source")?.to_string())
            }
            _ => spec.source.clone(),
        };

        let (protocol, source_type) = (protocol?, source_type?);
        self.check_endpoint(&protocol, source_type);

        Some(Source {
            protocol,
            source,
            source_type,
        })
    }

    fn destination(&mut self, spec: &DestinationSpec) -> Option<Destination> {
        let protocol = self.protocol(spec.protocol.as_deref(), "to.protocol");
        let target = self.required(spec.target.as_deref(), "to.target");
        let target_type = self.endpoint_type(spec.target_type.as_deref(), "to.target_type");

        let (protocol, target, target_type) = (protocol?, target?, target_type?);
        self.check_endpoint(&protocol, target_type);

        Some(Destination::new(protocol, target, target_type))
    }

    fn protocol(&mut self, value: Option<&str>, field: &'static str) -> Option<String> {
        let name = self.required(value, field)?;

        let Some(protocol_type) = self.protocols.protocol_type(name) else {
            self.issues.push(ValidationIssue::UnknownProtocol {
                rule: self.rule.to_string(),
                field,
                protocol: name.to_string(),
            });
            return None;
        };

        if !self.protocol_support.is_empty()
            && !self
                .protocol_support
                .iter()
                .any(|s| s == protocol_type || s == name)
        {
            self.issues.push(ValidationIssue::UnsupportedProtocolType {
                rule: self.rule.to_string(),
                protocol: name.to_string(),
                protocol_type: protocol_type.to_string(),
            });
            return None;
        }

        Some(name.to_string())
    }

    fn endpoint_type(&mut self, value: Option<&str>, field: &'static str) -> Option<EndpointType> {
        let value = self.required(value, field)?;
        match value.parse() {
            Ok(endpoint_type) => Some(endpoint_type),
            Err(()) => {
                self.issues.push(ValidationIssue::InvalidEndpointType {
                    rule: self.rule.to_string(),
                    field,
                    value: value.to_string(),
                });
                None
            }
        }
    }

    fn check_endpoint(&mut self, protocol: &str, endpoint_type: EndpointType) {
        if let Some(caps) = self.protocols.get(protocol) {
            if !caps.supports(endpoint_type) {
                self.issues.push(ValidationIssue::UnsupportedEndpoint {
                    rule: self.rule.to_string(),
                    protocol: protocol.to_string(),
                    endpoint_type,
                });
            }
        }
    }

    fn required<'v>(&mut self, value: Option<&'v str>, field: &'static str) -> Option<&'v str> {
        match value {
            None => {
                self.missing(field);
                None
            }
            Some(v) if v.trim().is_empty() => {
                self.issues.push(ValidationIssue::EmptyField {
                    rule: self.rule.to_string(),
                    field,
                });
                None
            }
            Some(v) => Some(v),
        }
    }

    fn missing(&mut self, field: &'static str) {
        self.issues.push(ValidationIssue::MissingField {
            rule: self.rule.to_string(),
            field,
        });
    }
}

fn build_formatting(spec: &RuleSpec) -> Formatting {
    let mut formatting = Formatting::new();
    for (scope, kinds) in &spec.formatting {
        for (kind, template) in kinds {
            if let Some(template) = template {
                formatting.insert(scope.clone(), EventKind::parse(kind), Template::parse(template));
            }
        }
    }
    formatting
}

fn collect_warnings(
    rule: &Rule,
    protocols: &ProtocolSet,
    protocol_support: &[String],
    warnings: &mut Vec<LoadWarning>,
) {
    if rule.is_self_relay() {
        warnings.push(LoadWarning::SelfRelay {
            rule: rule.name.clone(),
        });
    }

    if rule.formatting.is_empty() {
        warnings.push(LoadWarning::NoTemplates {
            rule: rule.name.clone(),
        });
    }

    let mut scopes: Vec<&str> = rule.formatting.scopes().collect();
    scopes.sort_unstable();
    for scope in scopes {
        let known = scope == GENERAL_SCOPE
            || protocols.contains(scope)
            || protocols.has_type(scope)
            || protocol_support.iter().any(|s| s == scope);
        if !known {
            warnings.push(LoadWarning::UnknownScope {
                rule: rule.name.clone(),
                scope: scope.to_string(),
            });
        }
    }

    let mut unknown: Vec<LoadWarning> = rule
        .formatting
        .templates()
        .flat_map(|(scope, kind, template)| {
            template
                .unknown_tokens()
                .iter()
                .map(move |token| LoadWarning::UnknownToken {
                    rule: rule.name.clone(),
                    scope: scope.to_string(),
                    kind: kind.to_string(),
                    token: token.clone(),
                })
        })
        .collect();
    unknown.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
    warnings.extend(unknown);

    debug!(rule = %rule.name, templates = rule.formatting.len(), "Validated rule");
}
