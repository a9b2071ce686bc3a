//! Message templates.
//!
//! A template is parsed once, when the rule table is loaded, into literal
//! text and placeholder tokens. Rendering substitutes event fields for the
//! tokens verbatim: substituted values are never re-scanned for tokens.

use crate::event::Event;
use std::fmt;
use tracing::warn;

/// A placeholder recognized inside `{...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    /// `{USER}`: the actor.
    User,
    /// `{MESSAGE}`: message body or reason.
    Message,
    /// `{TARGET}`: channel or user the event happened in.
    Target,
    /// `{PROTOCOL}`: source protocol name.
    Protocol,
    /// `{CHANNEL}`: channel joined, parted, kicked from or moved between.
    Channel,
    /// `{KICKER}`: who performed a kick.
    Kicker,
    /// `{BANNED?}`: `banned` or `kicked`, depending on the event.
    Banned,
}

impl Token {
    /// Look up a token by the name written between the braces.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "USER" => Some(Self::User),
            "MESSAGE" => Some(Self::Message),
            "TARGET" => Some(Self::Target),
            "PROTOCOL" => Some(Self::Protocol),
            "CHANNEL" => Some(Self::Channel),
            "KICKER" => Some(Self::Kicker),
            "BANNED?" => Some(Self::Banned),
            _ => None,
        }
    }

    /// The name written between the braces.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Message => "MESSAGE",
            Self::Target => "TARGET",
            Self::Protocol => "PROTOCOL",
            Self::Channel => "CHANNEL",
            Self::Kicker => "KICKER",
            Self::Banned => "BANNED?",
        }
    }

    /// Resolve this token against an event.
    ///
    /// Returns `None` when the event does not carry the field.
    #[must_use]
    pub fn resolve<'e>(&self, event: &'e Event) -> Option<&'e str> {
        match self {
            Self::User => Some(&event.user),
            Self::Message => event.message.as_deref(),
            Self::Target => Some(&event.source),
            Self::Protocol => Some(&event.protocol),
            Self::Channel => event.channel.as_deref(),
            Self::Kicker => event.kicker.as_deref(),
            Self::Banned => Some(if event.banned { "banned" } else { "kicked" }),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(Token),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    unknown: Vec<String>,
}

impl Template {
    /// Parse a template string.
    ///
    /// Brace groups that do not name a known token are kept as literal text
    /// and listed by [`Template::unknown_tokens`].
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut unknown = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let Some(close) = after.find('}') else {
                literal.push_str(&rest[open..]);
                rest = "";
                break;
            };

            let name = &after[..close];
            if name.contains('{') {
                // Stray opening brace; the real group starts later.
                literal.push('{');
                rest = after;
                continue;
            }

            match Token::from_name(name) {
                Some(token) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Token(token));
                }
                None => {
                    unknown.push(name.to_string());
                    literal.push('{');
                    literal.push_str(name);
                    literal.push('}');
                }
            }
            rest = &after[close + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: source.to_string(),
            segments,
            unknown,
        }
    }

    /// The template as written in configuration.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Brace groups that are not recognized tokens.
    #[must_use]
    pub fn unknown_tokens(&self) -> &[String] {
        &self.unknown
    }

    /// Tokens used by this template, in order of appearance.
    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Token(t) => Some(*t),
            Segment::Literal(_) => None,
        })
    }

    /// Render the template for an event.
    ///
    /// A token whose field the event does not carry is left in the output
    /// as written, and a warning is logged.
    #[must_use]
    pub fn render(&self, event: &Event) -> String {
        let mut out = String::with_capacity(self.source.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(token) => match token.resolve(event) {
                    Some(value) => out.push_str(value),
                    None => {
                        warn!(
                            token = %token,
                            kind = %event.kind,
                            protocol = %event.protocol,
                            "Template token has no value for this event"
                        );
                        out.push_str(&token.to_string());
                    }
                },
            }
        }
        out
    }
}
