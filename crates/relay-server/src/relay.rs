//! The running relay.
//!
//! Wires adapters, the dispatcher and the outbox together. Each adapter
//! gets its own ingest worker, so a busy protocol never delays events
//! from another one, and events from one adapter are dispatched in the
//! order they arrive.

use crate::config::Config;
use crate::metrics;
use anyhow::{anyhow, Context, Result};
use relay_adapter::{
    AdapterHandle, AdapterRegistry, ChannelAdapter, Outbox, OutboxConfig, ProtocolAdapter,
    ShutdownMode,
};
use relay_core::{Destination, Dispatcher, Event, RuleStore, RuleTable, RulesConfig, Snapshot};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Buffer between an adapter and its ingest worker.
const INGEST_CAPACITY: usize = 1024;

/// Shared relay state.
pub struct Relay {
    registry: Arc<AdapterRegistry>,
    handles: BTreeMap<String, AdapterHandle>,
    dispatcher: Dispatcher,
    outbox: Arc<Outbox>,
    config_path: Option<PathBuf>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    reporter: Mutex<Option<JoinHandle<()>>>,
}

impl Relay {
    /// Build a relay from configuration, with one channel adapter per
    /// configured protocol.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial rule table is invalid.
    pub fn from_config(config: &Config, config_path: Option<PathBuf>) -> Result<Self> {
        let adapters = config
            .protocols
            .iter()
            .map(|(name, protocol)| Arc::new(ChannelAdapter::new(name, protocol.capabilities())))
            .collect();

        let mut relay = Self::with_adapters(adapters, &config.relay, config.outbox_config())?;
        relay.config_path = config_path;
        Ok(relay)
    }

    /// Build a relay around a set of channel adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if two adapters share a name or the rule
    /// configuration is invalid.
    pub fn with_adapters(
        adapters: Vec<Arc<ChannelAdapter>>,
        rules: &RulesConfig,
        outbox_config: OutboxConfig,
    ) -> Result<Self> {
        let mut registry = AdapterRegistry::new();
        let mut handles = BTreeMap::new();
        for adapter in adapters {
            handles.insert(adapter.name().to_string(), adapter.handle());
            registry.register(adapter)?;
        }

        let table = RuleTable::load(rules, &registry.protocols())
            .context("Invalid relay rules")?;
        metrics::set_active_rules(table.len());

        let registry = Arc::new(registry);
        let outbox = Arc::new(Outbox::new(registry.clone(), outbox_config));

        Ok(Self {
            registry,
            handles,
            dispatcher: Dispatcher::new(Arc::new(RuleStore::new(table))),
            outbox,
            config_path: None,
            tasks: Mutex::new(Vec::new()),
            reporter: Mutex::new(None),
        })
    }

    /// Start adapters, ingest workers and delivery reporting.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        for adapter in self.registry.adapters() {
            let (tx, rx) = mpsc::channel(INGEST_CAPACITY);

            let runner = adapter.clone();
            tasks.push(tokio::spawn(async move {
                match runner.run(tx).await {
                    Ok(()) => info!(protocol = %runner.name(), "Adapter stopped"),
                    Err(e) => error!(protocol = %runner.name(), error = %e, "Adapter failed"),
                }
            }));

            tasks.push(tokio::spawn(ingest(
                adapter.clone(),
                rx,
                self.dispatcher.clone(),
                self.outbox.clone(),
            )));
        }

        *self.reporter.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(tokio::spawn(report_deliveries(self.outbox.subscribe())));

        info!(adapters = self.registry.len(), "Relay started");
    }

    /// The active rule table and its version.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.dispatcher.store().snapshot()
    }

    /// Handle for injecting events into a protocol's adapter.
    #[must_use]
    pub fn handle(&self, protocol: &str) -> Option<&AdapterHandle> {
        self.handles.get(protocol)
    }

    /// Re-read the configuration file and swap in its rules.
    ///
    /// Only `protocol-support` and `rules` take effect; protocol
    /// definitions require a restart.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no configuration file, it cannot be
    /// parsed, or its rules are invalid. The active table is kept.
    pub fn reload(&self) -> Result<u64> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| anyhow!("No configuration file to reload from"))?;

        let config = match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                metrics::record_reload(false);
                return Err(e);
            }
        };
        Ok(self.reload_rules(&config.relay)?)
    }

    /// Validate rules and make them active.
    ///
    /// # Errors
    ///
    /// Returns the validation error; the active table is kept.
    pub fn reload_rules(&self, rules: &RulesConfig) -> Result<u64, relay_core::ConfigError> {
        let result = self
            .dispatcher
            .store()
            .reload(rules, &self.registry.protocols());

        metrics::record_reload(result.is_ok());
        if result.is_ok() {
            let snapshot = self.snapshot();
            metrics::set_active_rules(snapshot.table.len());

            let destinations: HashSet<&Destination> =
                snapshot.table.rules().iter().map(|rule| &rule.to).collect();
            self.outbox.retain(|destination| destinations.contains(destination));
        }
        result
    }

    /// Stop ingesting and shut down delivery.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        let tasks =
            std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));

        // Ingest workers only yield between events, so no event is left
        // half dispatched.
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        self.outbox.shutdown(mode).await;

        if let Some(reporter) = self
            .reporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            reporter.abort();
        }

        info!("Relay stopped");
    }
}

/// Dispatch events from one adapter.
async fn ingest(
    adapter: Arc<dyn ProtocolAdapter>,
    mut events: mpsc::Receiver<Event>,
    dispatcher: Dispatcher,
    outbox: Arc<Outbox>,
) {
    let protocol_type = adapter.capabilities().protocol_type;

    while let Some(mut event) = events.recv().await {
        if event.protocol != adapter.name() {
            warn!(
                adapter = %adapter.name(),
                protocol = %event.protocol,
                "Event protocol does not match its adapter, correcting"
            );
            event.protocol = adapter.name().to_string();
        }
        if event.protocol_type.is_none() {
            event.protocol_type = Some(protocol_type.clone());
        }

        let start = Instant::now();
        metrics::record_event(&event.protocol, &event.kind);

        let routed = dispatcher.route(&event);
        if routed.cancelled {
            metrics::record_cancelled(&event.protocol);
            continue;
        }
        metrics::record_routed(routed.results.len(), routed.skipped());

        for result in routed.results {
            outbox.enqueue(result);
        }
        metrics::record_dispatch_latency(start.elapsed().as_secs_f64());
    }

    debug!(protocol = %adapter.name(), "Ingest worker stopped");
}

/// Turn delivery reports into metrics.
async fn report_deliveries(mut reports: broadcast::Receiver<relay_adapter::DeliveryReport>) {
    loop {
        match reports.recv().await {
            Ok(report) => metrics::record_delivery(&report.destination.protocol, &report.status),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Delivery report listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
