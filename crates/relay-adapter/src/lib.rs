//! # relay-adapter
//!
//! Protocol adapter layer for the chat relay.
//!
//! Every chat backend (IRC, Mumble, ...) is wrapped in a [`ProtocolAdapter`]
//! and registered by name. The relay never depends on concrete adapter
//! types:
//!
//! - **ProtocolAdapter** - Event source and delivery sink for one protocol
//! - **AdapterRegistry** - Adapters keyed by protocol name
//! - **Outbox** - Per-destination delivery queues with line delay
//! - **ChannelAdapter** - In-process adapter driven through tokio channels
//!
//! ```rust,ignore
//! use relay_adapter::{AdapterRegistry, ChannelAdapter};
//! use relay_core::Capabilities;
//!
//! let mut registry = AdapterRegistry::new();
//! registry.register(Arc::new(ChannelAdapter::new("mumble", Capabilities::new("mumble"))))?;
//! let rule_protocols = registry.protocols();
//! ```

pub mod channel;
pub mod outbox;
pub mod registry;
pub mod traits;

pub use channel::{AdapterHandle, ChannelAdapter, Delivery};
pub use outbox::{DeliveryReport, DeliveryStatus, DropReason, Outbox, OutboxConfig, ShutdownMode};
pub use registry::AdapterRegistry;
pub use traits::{AdapterError, ProtocolAdapter};
