//! # relay-core
//!
//! Rule-based relaying of chat events between protocol backends.
//!
//! This crate provides the parts of the relay that do no I/O:
//!
//! - **Event** - Normalized occurrence reported by a protocol adapter
//! - **RuleTable** - Validated, immutable set of relay rules
//! - **Matcher** - Selects the rules that apply to an event
//! - **Template** - Placeholder substitution for outbound text
//! - **Dispatcher** - Matches, renders and emits relay results
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Event    │────▶│   Matcher   │────▶│  Renderer   │────▶│ RelayResult │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │  RuleStore  │  (snapshot swapped on reload)
//!                     └─────────────┘
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod matcher;
pub mod protocol;
pub mod render;
pub mod rule;
pub mod store;
pub mod table;
pub mod template;

pub use config::{DestinationSpec, RuleSpec, RulesConfig, SourceSpec};
pub use dispatcher::{route, Dispatcher, RelayResult, Routed};
pub use error::{ConfigError, LoadWarning, ValidationIssue};
pub use event::{EndpointType, Event, EventId, EventKind};
pub use matcher::match_event;
pub use protocol::{Capabilities, ProtocolSet};
pub use render::render;
pub use rule::{Destination, Formatting, Rule, Source, GENERAL_SCOPE};
pub use store::{RuleStore, Snapshot};
pub use table::RuleTable;
pub use template::{Template, Token};
