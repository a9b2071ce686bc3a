//! Protocol adapter interface.
//!
//! An adapter connects the relay to one chat protocol instance. It feeds
//! normalized events in and accepts rendered text for delivery. The relay
//! only ever talks to adapters through this trait.

use async_trait::async_trait;
use relay_core::{Capabilities, EndpointType, Event};
use thiserror::Error;
use tokio::sync::mpsc;

/// Adapter errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// No adapter is registered under this protocol name.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// An adapter is already registered under this protocol name.
    #[error("Protocol already registered: {0}")]
    AlreadyRegistered(String),

    /// The adapter is not connected.
    #[error("Protocol offline: {0}")]
    Offline(String),

    /// The protocol refused the line because of rate limiting.
    #[error("Rate limited")]
    RateLimited,

    /// The target could not be reached.
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    /// The event stream or delivery queue was closed.
    #[error("Closed")]
    Closed,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// A chat protocol instance the relay can read from and write to.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Protocol instance name rules refer to, e.g. `irc-esper`.
    fn name(&self) -> &str;

    /// What this adapter can address.
    fn capabilities(&self) -> Capabilities;

    /// Forward inbound events until the protocol connection ends.
    ///
    /// Returns `Ok(())` on a clean shutdown.
    async fn run(&self, events: mpsc::Sender<Event>) -> Result<(), AdapterError>;

    /// Deliver one line of text to a channel or user.
    async fn deliver(
        &self,
        target: &str,
        target_type: EndpointType,
        text: &str,
    ) -> Result<(), AdapterError>;

    /// Check if the adapter is able to deliver.
    fn is_healthy(&self) -> bool {
        true
    }
}
