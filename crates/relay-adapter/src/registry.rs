//! Registry of protocol adapters, keyed by protocol name.

use crate::traits::{AdapterError, ProtocolAdapter};
use relay_core::{EndpointType, ProtocolSet};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// All adapters known to the relay.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its protocol name.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::AlreadyRegistered`] if the name is taken.
    pub fn register(&mut self, adapter: Arc<dyn ProtocolAdapter>) -> Result<(), AdapterError> {
        let name = adapter.name().to_string();
        if self.adapters.contains_key(&name) {
            return Err(AdapterError::AlreadyRegistered(name));
        }

        info!(
            protocol = %name,
            protocol_type = %adapter.capabilities().protocol_type,
            "Registered protocol adapter"
        );
        self.adapters.insert(name, adapter);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ProtocolAdapter>> {
        self.adapters.get(name)
    }

    /// Registered adapters in name order.
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn ProtocolAdapter>> {
        self.adapters.values()
    }

    /// The protocol names and capabilities rules may refer to.
    #[must_use]
    pub fn protocols(&self) -> ProtocolSet {
        let mut set = ProtocolSet::new();
        for (name, adapter) in &self.adapters {
            set.insert(name.clone(), adapter.capabilities());
        }
        set
    }

    /// Deliver a line through the named protocol.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UnknownProtocol`] if no adapter has that
    /// name, or whatever the adapter reports.
    pub async fn deliver(
        &self,
        protocol: &str,
        target: &str,
        target_type: EndpointType,
        text: &str,
    ) -> Result<(), AdapterError> {
        let adapter = self
            .adapters
            .get(protocol)
            .ok_or_else(|| AdapterError::UnknownProtocol(protocol.to_string()))?;

        debug!(protocol = %protocol, target = %target, "Delivering");
        adapter.deliver(target, target_type, text).await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
