//! Outbound delivery queues.
//!
//! Each destination gets its own FIFO queue and worker task, so a slow or
//! rate-limited protocol only delays its own lines and lines to one target
//! keep their arrival order. Enqueueing never waits.

use crate::registry::AdapterRegistry;
use crate::traits::AdapterError;
use dashmap::DashMap;
use relay_core::{Destination, EventId, RelayResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Default per-destination queue capacity.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Report broadcast capacity.
const REPORT_CAPACITY: usize = 1024;

/// Outbox configuration.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Lines buffered per destination before new ones are dropped.
    pub queue_capacity: usize,
    /// Pause after each delivered line.
    pub line_delay: Duration,
    /// Per-protocol overrides of `line_delay`.
    pub protocol_line_delays: HashMap<String, Duration>,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            line_delay: Duration::ZERO,
            protocol_line_delays: HashMap::new(),
        }
    }
}

impl OutboxConfig {
    /// The line delay used for a protocol.
    #[must_use]
    pub fn line_delay_for(&self, protocol: &str) -> Duration {
        self.protocol_line_delays
            .get(protocol)
            .copied()
            .unwrap_or(self.line_delay)
    }
}

/// Why a line was dropped before reaching the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The destination's queue was full.
    QueueFull,
    /// The outbox is shutting down.
    Closed,
}

/// What happened to one relay result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed(AdapterError),
    Dropped(DropReason),
}

/// Outcome of one relay result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub rule: String,
    pub event_id: EventId,
    pub destination: Destination,
    pub status: DeliveryStatus,
}

impl DeliveryReport {
    fn new(result: &RelayResult, status: DeliveryStatus) -> Self {
        Self {
            rule: result.rule.clone(),
            event_id: result.event_id,
            destination: result.destination.clone(),
            status,
        }
    }
}

/// How to treat queued lines on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Deliver what is queued, giving up after the timeout.
    Drain(Duration),
    /// Drop queued lines and stop at once.
    Abort,
}

/// Worker handles and the closed flag, changed together.
#[derive(Default)]
struct Workers {
    handles: Vec<JoinHandle<()>>,
    closed: bool,
}

/// Per-destination delivery queues.
///
/// Queues are created, pruned and closed under the `workers` lock, so no
/// queue can be started once shutdown has begun.
pub struct Outbox {
    registry: Arc<AdapterRegistry>,
    config: OutboxConfig,
    queues: DashMap<Destination, mpsc::Sender<RelayResult>>,
    workers: Mutex<Workers>,
    reports: broadcast::Sender<DeliveryReport>,
}

impl Outbox {
    /// Create an outbox delivering through the given adapters.
    #[must_use]
    pub fn new(registry: Arc<AdapterRegistry>, config: OutboxConfig) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            registry,
            config,
            queues: DashMap::new(),
            workers: Mutex::new(Workers::default()),
            reports,
        }
    }

    /// Subscribe to delivery reports.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryReport> {
        self.reports.subscribe()
    }

    /// Number of destinations with a queue.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Number of delivery workers still running.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.lock_workers()
            .handles
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Queue a result for delivery.
    ///
    /// Returns `false` if the line was dropped; a report is published
    /// either way once the line's fate is known. Must be called from
    /// within a tokio runtime.
    pub fn enqueue(&self, result: RelayResult) -> bool {
        let existing = self
            .queues
            .get(&result.destination)
            .map(|sender| sender.clone());

        let Some(sender) = existing.or_else(|| self.start_queue(&result.destination)) else {
            self.drop_line(&result, DropReason::Closed);
            return false;
        };

        match sender.try_send(result) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(result)) => {
                warn!(
                    destination = %result.destination,
                    rule = %result.rule,
                    "Delivery queue full, dropping line"
                );
                self.drop_line(&result, DropReason::QueueFull);
                false
            }
            Err(mpsc::error::TrySendError::Closed(result)) => {
                self.drop_line(&result, DropReason::Closed);
                false
            }
        }
    }

    /// Close the queues of destinations that `keep` rejects.
    ///
    /// Their workers deliver what is already queued and then exit. A later
    /// line for a closed destination starts a fresh queue.
    pub fn retain(&self, keep: impl Fn(&Destination) -> bool) {
        let mut workers = self.lock_workers();
        if workers.closed {
            return;
        }

        let before = self.queues.len();
        self.queues.retain(|destination, _| keep(destination));
        workers.handles.retain(|handle| !handle.is_finished());

        let pruned = before - self.queues.len();
        if pruned > 0 {
            debug!(pruned, remaining = self.queues.len(), "Closed unused delivery queues");
        }
    }

    /// Stop accepting lines and shut the workers down.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        let mut workers = {
            let mut workers = self.lock_workers();
            workers.closed = true;
            // Dropping the senders lets each worker finish its queue and exit.
            self.queues.clear();
            std::mem::take(&mut workers.handles)
        };
        info!(workers = workers.len(), ?mode, "Shutting down outbox");

        match mode {
            ShutdownMode::Abort => {
                for worker in &workers {
                    worker.abort();
                }
            }
            ShutdownMode::Drain(timeout) => {
                let drained = tokio::time::timeout(timeout, async {
                    for worker in &mut workers {
                        let _ = worker.await;
                    }
                })
                .await;

                if drained.is_err() {
                    warn!("Outbox drain timed out, abandoning queued lines");
                    for worker in &workers {
                        worker.abort();
                    }
                }
            }
        }
    }

    /// The sender for a destination's queue, starting its worker if needed.
    ///
    /// Returns `None` once the outbox is closed.
    fn start_queue(&self, destination: &Destination) -> Option<mpsc::Sender<RelayResult>> {
        let mut workers = self.lock_workers();
        if workers.closed {
            return None;
        }
        if let Some(sender) = self.queues.get(destination) {
            return Some(sender.clone());
        }

        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let delay = self.config.line_delay_for(&destination.protocol);

        debug!(destination = %destination, ?delay, "Starting delivery worker");
        let handle = tokio::spawn(run_worker(
            self.registry.clone(),
            destination.clone(),
            rx,
            delay,
            self.reports.clone(),
        ));

        workers.handles.retain(|handle| !handle.is_finished());
        workers.handles.push(handle);
        self.queues.insert(destination.clone(), tx.clone());
        Some(tx)
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Workers> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drop_line(&self, result: &RelayResult, reason: DropReason) {
        // No subscribers is fine.
        let _ = self
            .reports
            .send(DeliveryReport::new(result, DeliveryStatus::Dropped(reason)));
    }
}

async fn run_worker(
    registry: Arc<AdapterRegistry>,
    destination: Destination,
    mut queue: mpsc::Receiver<RelayResult>,
    delay: Duration,
    reports: broadcast::Sender<DeliveryReport>,
) {
    while let Some(result) = queue.recv().await {
        let status = match registry
            .deliver(
                &destination.protocol,
                &destination.target,
                destination.target_type,
                &result.text,
            )
            .await
        {
            Ok(()) => {
                trace!(destination = %destination, rule = %result.rule, "Line delivered");
                DeliveryStatus::Delivered
            }
            Err(e) => {
                warn!(
                    destination = %destination,
                    rule = %result.rule,
                    error = %e,
                    "Delivery failed"
                );
                DeliveryStatus::Failed(e)
            }
        };

        let _ = reports.send(DeliveryReport::new(&result, status));

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    debug!(destination = %destination, "Delivery worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelAdapter;
    use relay_core::{Capabilities, EndpointType};
    use tokio::time::Instant;

    fn result(protocol: &str, target: &str, text: &str) -> RelayResult {
        RelayResult {
            rule: "name1".to_string(),
            event_id: 1,
            destination: Destination::new(protocol, target, EndpointType::Channel),
            text: text.to_string(),
        }
    }

    fn setup(config: OutboxConfig) -> (Arc<ChannelAdapter>, Arc<ChannelAdapter>, Outbox) {
        let irc = Arc::new(ChannelAdapter::new("irc-archives", Capabilities::new("irc")));
        let mumble = Arc::new(ChannelAdapter::new("mumble", Capabilities::new("mumble")));

        let mut registry = AdapterRegistry::new();
        registry.register(irc.clone()).unwrap();
        registry.register(mumble.clone()).unwrap();

        (irc, mumble, Outbox::new(Arc::new(registry), config))
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let (irc, _, outbox) = setup(OutboxConfig::default());
        let mut reports = outbox.subscribe();

        for text in ["one", "two", "three"] {
            assert!(outbox.enqueue(result("irc-archives", "#Ultros", text)));
        }
        for _ in 0..3 {
            assert_eq!(reports.recv().await.unwrap().status, DeliveryStatus::Delivered);
        }

        let texts: Vec<_> = irc.deliveries().into_iter().map(|d| d.text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(outbox.queue_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_destinations() {
        let (irc, mumble, outbox) = setup(OutboxConfig::default());
        mumble.set_online(false);
        let mut reports = outbox.subscribe();

        outbox.enqueue(result("mumble", "Root", "lost"));
        outbox.enqueue(result("irc-archives", "#Ultros", "kept"));
        outbox.enqueue(result("xmpp", "room", "nowhere"));

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let report = reports.recv().await.unwrap();
            statuses.push((report.destination.protocol, report.status));
        }
        statuses.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            statuses,
            vec![
                ("irc-archives".to_string(), DeliveryStatus::Delivered),
                (
                    "mumble".to_string(),
                    DeliveryStatus::Failed(AdapterError::Offline("mumble".to_string()))
                ),
                (
                    "xmpp".to_string(),
                    DeliveryStatus::Failed(AdapterError::UnknownProtocol("xmpp".to_string()))
                ),
            ]
        );
        assert_eq!(irc.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_line() {
        let (_, _, outbox) = setup(OutboxConfig {
            queue_capacity: 1,
            ..OutboxConfig::default()
        });
        let mut reports = outbox.subscribe();

        // The worker has not run yet, so the queue holds exactly one line.
        assert!(outbox.enqueue(result("irc-archives", "#Ultros", "first")));
        assert!(!outbox.enqueue(result("irc-archives", "#Ultros", "second")));

        let report = reports.recv().await.unwrap();
        assert_eq!(report.status, DeliveryStatus::Dropped(DropReason::QueueFull));
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_delay() {
        let mut protocol_line_delays = HashMap::new();
        protocol_line_delays.insert("irc-archives".to_string(), Duration::from_secs(2));
        let (_, _, outbox) = setup(OutboxConfig {
            protocol_line_delays,
            ..OutboxConfig::default()
        });
        let mut reports = outbox.subscribe();

        let start = Instant::now();
        outbox.enqueue(result("irc-archives", "#Ultros", "one"));
        outbox.enqueue(result("irc-archives", "#Ultros", "two"));
        outbox.enqueue(result("mumble", "Root", "fast"));

        let mut irc_times = Vec::new();
        for _ in 0..3 {
            let report = reports.recv().await.unwrap();
            if report.destination.protocol == "irc-archives" {
                irc_times.push(start.elapsed());
            } else {
                assert!(start.elapsed() < Duration::from_secs(1));
            }
        }

        assert!(irc_times[0] < Duration::from_secs(1));
        assert!(irc_times[1] >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_drain_on_shutdown() {
        let (irc, _, outbox) = setup(OutboxConfig::default());

        for text in ["a", "b", "c"] {
            outbox.enqueue(result("irc-archives", "#Ultros", text));
        }
        outbox.shutdown(ShutdownMode::Drain(Duration::from_secs(5))).await;

        assert_eq!(irc.deliveries().len(), 3);
        assert_eq!(outbox.queue_count(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown() {
        let (irc, _, outbox) = setup(OutboxConfig::default());
        outbox.shutdown(ShutdownMode::Abort).await;

        let mut reports = outbox.subscribe();
        assert!(!outbox.enqueue(result("irc-archives", "#Ultros", "late")));
        assert_eq!(
            reports.recv().await.unwrap().status,
            DeliveryStatus::Dropped(DropReason::Closed)
        );
        assert!(irc.deliveries().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_queue_outlives_shutdown() {
        for _ in 0..200 {
            let (_, _, outbox) = setup(OutboxConfig::default());
            let outbox = Arc::new(outbox);

            let producer = {
                let outbox = outbox.clone();
                tokio::spawn(async move {
                    for i in 0..64 {
                        outbox.enqueue(result("irc-archives", &format!("#c{i}"), "x"));
                        tokio::task::yield_now().await;
                    }
                })
            };
            outbox.shutdown(ShutdownMode::Abort).await;
            producer.await.unwrap();

            assert_eq!(outbox.queue_count(), 0);
            assert_eq!(outbox.worker_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_retain_closes_unused_queues() {
        let (irc, _, outbox) = setup(OutboxConfig::default());
        let mut reports = outbox.subscribe();

        outbox.enqueue(result("irc-archives", "#Ultros", "kept"));
        outbox.enqueue(result("irc-archives", "#old", "last line"));
        outbox.enqueue(result("mumble", "Root", "gone"));
        assert_eq!(outbox.queue_count(), 3);

        outbox.retain(|destination| destination.target == "#Ultros");
        assert_eq!(outbox.queue_count(), 1);

        // Lines queued before pruning are still delivered.
        for _ in 0..3 {
            assert_eq!(reports.recv().await.unwrap().status, DeliveryStatus::Delivered);
        }
        assert_eq!(irc.deliveries().len(), 2);

        tokio::time::timeout(Duration::from_secs(5), async {
            while outbox.worker_count() > 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        // A pruned destination gets a fresh queue when it is used again.
        assert!(outbox.enqueue(result("mumble", "Root", "back")));
        assert_eq!(outbox.queue_count(), 2);
        assert_eq!(reports.recv().await.unwrap().status, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_line_delay_override() {
        let mut config = OutboxConfig {
            line_delay: Duration::from_millis(100),
            ..OutboxConfig::default()
        };
        config
            .protocol_line_delays
            .insert("irc-esper".to_string(), Duration::from_millis(500));

        assert_eq!(config.line_delay_for("irc-esper"), Duration::from_millis(500));
        assert_eq!(config.line_delay_for("mumble"), Duration::from_millis(100));
    }
}
