//! In-process adapter backed by tokio channels.
//!
//! Events are pushed in through an [`AdapterHandle`]; delivered lines are
//! recorded and broadcast to subscribers. Used by the HTTP ingest surface
//! and by tests.

use crate::traits::{AdapterError, ProtocolAdapter};
use async_trait::async_trait;
use relay_core::{Capabilities, EndpointType, Event};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Inbound buffer capacity.
const DEFAULT_INBOUND_CAPACITY: usize = 1024;

/// Broadcast capacity for delivered lines.
const DEFAULT_DELIVERY_CAPACITY: usize = 256;

/// Delivered lines kept for [`ChannelAdapter::deliveries`].
const DEFAULT_HISTORY: usize = 256;

/// A line delivered through a [`ChannelAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub target: String,
    pub target_type: EndpointType,
    pub text: String,
}

/// Pushes events into a [`ChannelAdapter`].
#[derive(Debug, Clone)]
pub struct AdapterHandle {
    protocol: String,
    protocol_type: String,
    sender: mpsc::Sender<Event>,
}

impl AdapterHandle {
    /// Protocol name events are stamped with.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Emit an event as if it arrived from the protocol.
    ///
    /// The event's protocol name and type are overwritten with the
    /// adapter's own.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Closed`] if the adapter has shut down.
    pub async fn emit(&self, mut event: Event) -> Result<(), AdapterError> {
        event.protocol.clone_from(&self.protocol);
        event.protocol_type = Some(self.protocol_type.clone());
        self.sender
            .send(event)
            .await
            .map_err(|_| AdapterError::Closed)
    }
}

/// An adapter whose inbound and outbound sides are in-process channels.
pub struct ChannelAdapter {
    name: String,
    capabilities: Capabilities,
    handle: AdapterHandle,
    inbound: Mutex<Option<mpsc::Receiver<Event>>>,
    delivered: Mutex<VecDeque<Delivery>>,
    history: usize,
    broadcast: broadcast::Sender<Delivery>,
    online: AtomicBool,
}

impl ChannelAdapter {
    /// Create a new adapter.
    #[must_use]
    pub fn new(name: impl Into<String>, capabilities: Capabilities) -> Self {
        Self::with_capacity(name, capabilities, DEFAULT_INBOUND_CAPACITY)
    }

    /// Create a new adapter with a specific inbound buffer size.
    #[must_use]
    pub fn with_capacity(
        name: impl Into<String>,
        capabilities: Capabilities,
        capacity: usize,
    ) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (broadcast, _) = broadcast::channel(DEFAULT_DELIVERY_CAPACITY);

        Self {
            handle: AdapterHandle {
                protocol: name.clone(),
                protocol_type: capabilities.protocol_type.clone(),
                sender,
            },
            name,
            capabilities,
            inbound: Mutex::new(Some(receiver)),
            delivered: Mutex::new(VecDeque::new()),
            history: DEFAULT_HISTORY,
            broadcast,
            online: AtomicBool::new(true),
        }
    }

    /// Keep at most `history` delivered lines; older ones are forgotten.
    #[must_use]
    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    /// A handle for pushing events into this adapter.
    #[must_use]
    pub fn handle(&self) -> AdapterHandle {
        self.handle.clone()
    }

    /// Subscribe to delivered lines.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.broadcast.subscribe()
    }

    /// The most recently delivered lines, oldest first.
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Mark the adapter online or offline. Offline adapters fail delivery.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
        info!(protocol = %self.name, online, "Adapter status changed");
    }
}

#[async_trait]
impl ProtocolAdapter for ChannelAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    async fn run(&self, events: mpsc::Sender<Event>) -> Result<(), AdapterError> {
        let receiver = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut receiver) = receiver else {
            return Err(AdapterError::Other(format!(
                "adapter {} is already running",
                self.name
            )));
        };

        debug!(protocol = %self.name, "Adapter inbound loop started");
        while let Some(event) = receiver.recv().await {
            if events.send(event).await.is_err() {
                break;
            }
        }
        debug!(protocol = %self.name, "Adapter inbound loop stopped");
        Ok(())
    }

    async fn deliver(
        &self,
        target: &str,
        target_type: EndpointType,
        text: &str,
    ) -> Result<(), AdapterError> {
        if !self.is_healthy() {
            return Err(AdapterError::Offline(self.name.clone()));
        }
        if !self.capabilities.supports(target_type) {
            return Err(AdapterError::DeliveryFailed(format!(
                "{} cannot address a {target_type}",
                self.name
            )));
        }

        let delivery = Delivery {
            target: target.to_string(),
            target_type,
            text: text.to_string(),
        };
        info!(protocol = %self.name, target = %target, text = %text, "Delivered");

        {
            let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
            delivered.push_back(delivery.clone());
            while delivered.len() > self.history {
                delivered.pop_front();
            }
        }
        // No subscribers is fine.
        let _ = self.broadcast.send(delivery);
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_emit_stamps_protocol() {
        let adapter = Arc::new(ChannelAdapter::new("irc-esper", Capabilities::new("irc")));
        let (tx, mut rx) = mpsc::channel(8);

        let runner = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.run(tx).await })
        };

        adapter
            .handle()
            .emit(Event::channel_message("whatever", "#Ultros", "Alice", "hi"))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.protocol, "irc-esper");
        assert_eq!(event.protocol_type.as_deref(), Some("irc"));

        drop(rx);
        adapter
            .handle()
            .emit(Event::channel_message("x", "#Ultros", "Alice", "bye"))
            .await
            .unwrap();
        assert!(runner.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_run_twice_fails() {
        let adapter = Arc::new(ChannelAdapter::new("mumble", Capabilities::new("mumble")));
        let (tx, _rx) = mpsc::channel(8);

        let first = {
            let adapter = adapter.clone();
            let tx = tx.clone();
            tokio::spawn(async move { adapter.run(tx).await })
        };
        while adapter.inbound.lock().unwrap().is_some() {
            tokio::task::yield_now().await;
        }

        assert!(adapter.run(tx).await.is_err());
        first.abort();
    }

    #[tokio::test]
    async fn test_deliver_records_and_broadcasts() {
        let adapter = ChannelAdapter::new("mumble", Capabilities::new("mumble"));
        let mut sub = adapter.subscribe();

        adapter
            .deliver("Root", EndpointType::Channel, "<Alice> hi")
            .await
            .unwrap();

        assert_eq!(sub.recv().await.unwrap().text, "<Alice> hi");
        assert_eq!(adapter.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let adapter =
            ChannelAdapter::new("irc-archives", Capabilities::new("irc")).with_history(16);

        for i in 0..1000 {
            adapter
                .deliver("#Ultros", EndpointType::Channel, &i.to_string())
                .await
                .unwrap();
        }

        let delivered = adapter.deliveries();
        assert_eq!(delivered.len(), 16);
        assert_eq!(delivered[0].text, "984");
        assert_eq!(delivered[15].text, "999");
    }

    #[tokio::test]
    async fn test_offline_and_unsupported_delivery() {
        let adapter = ChannelAdapter::new("mumble", Capabilities::new("mumble").without_users());

        let err = adapter
            .deliver("Dan", EndpointType::User, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::DeliveryFailed(_)));

        adapter.set_online(false);
        let err = adapter
            .deliver("Root", EndpointType::Channel, "hi")
            .await
            .unwrap_err();
        assert_eq!(err, AdapterError::Offline("mumble".to_string()));
        assert!(adapter.deliveries().is_empty());
    }
}
