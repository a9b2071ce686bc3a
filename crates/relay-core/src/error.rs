//! Configuration errors and load warnings.

use std::fmt;
use thiserror::Error;

/// A single problem found while validating the rule configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    /// A rule has an empty name.
    #[error("rule with an empty name")]
    EmptyRuleName,

    /// Two rules share a name.
    #[error("rule '{rule}': duplicate rule name")]
    DuplicateRule { rule: String },

    /// A required key is absent.
    #[error("rule '{rule}': missing required field '{field}'")]
    MissingField { rule: String, field: &'static str },

    /// A required key is present but empty.
    #[error("rule '{rule}': field '{field}' must not be empty")]
    EmptyField { rule: String, field: &'static str },

    /// `source_type` or `target_type` is neither `channel` nor `user`.
    #[error("rule '{rule}': field '{field}' must be 'channel' or 'user', got '{value}'")]
    InvalidEndpointType {
        rule: String,
        field: &'static str,
        value: String,
    },

    /// The rule names a protocol no adapter has registered.
    #[error("rule '{rule}': field '{field}' names unknown protocol '{protocol}'")]
    UnknownProtocol {
        rule: String,
        field: &'static str,
        protocol: String,
    },

    /// The protocol's type is not listed under `protocol-support`.
    #[error(
        "rule '{rule}': protocol '{protocol}' has type '{protocol_type}', \
         which is not listed in protocol-support"
    )]
    UnsupportedProtocolType {
        rule: String,
        protocol: String,
        protocol_type: String,
    },

    /// The protocol cannot address this kind of endpoint.
    #[error("rule '{rule}': protocol '{protocol}' cannot address a {endpoint_type}")]
    UnsupportedEndpoint {
        rule: String,
        protocol: String,
        endpoint_type: crate::EndpointType,
    },
}

/// The rule configuration is invalid.
///
/// Holds every issue found, so that one load reports all of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid relay configuration ({} issue(s)): {}", .issues.len(), IssueList(.issues))]
pub struct ConfigError {
    pub issues: Vec<ValidationIssue>,
}

impl ConfigError {
    #[must_use]
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }
}

struct IssueList<'a>(&'a [ValidationIssue]);

impl fmt::Display for IssueList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Something suspicious but not fatal found while loading rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// A template contains a brace group that is not a known token.
    UnknownToken {
        rule: String,
        scope: String,
        kind: String,
        token: String,
    },
    /// A formatting scope matches no protocol name or type.
    UnknownScope { rule: String, scope: String },
    /// The rule delivers into the channel it reads from.
    SelfRelay { rule: String },
    /// The rule has no templates and will never relay anything.
    NoTemplates { rule: String },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownToken {
                rule,
                scope,
                kind,
                token,
            } => write!(
                f,
                "rule '{rule}': template {scope}.{kind} uses unknown token '{{{token}}}'"
            ),
            Self::UnknownScope { rule, scope } => write!(
                f,
                "rule '{rule}': formatting scope '{scope}' matches no protocol"
            ),
            Self::SelfRelay { rule } => {
                write!(f, "rule '{rule}': relays back into its own source")
            }
            Self::NoTemplates { rule } => {
                write!(f, "rule '{rule}': no templates configured, nothing will be relayed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_lists_all_issues() {
        let err = ConfigError::new(vec![
            ValidationIssue::MissingField {
                rule: "a".to_string(),
                field: "from",
            },
            ValidationIssue::DuplicateRule {
                rule: "b".to_string(),
            },
        ]);

        let text = err.to_string();
        assert!(text.contains("2 issue(s)"));
        assert!(text.contains("rule 'a': missing required field 'from'"));
        assert!(text.contains("rule 'b': duplicate rule name"));
    }

    #[test]
    fn test_warning_display() {
        let warning = LoadWarning::UnknownToken {
            rule: "name1".to_string(),
            scope: "general".to_string(),
            kind: "join".to_string(),
            token: "COLOUR".to_string(),
        };
        assert_eq!(
            warning.to_string(),
            "rule 'name1': template general.join uses unknown token '{COLOUR}'"
        );
    }
}
