// src/publisher.rs
//! Fan-out of readings to any number of subscribers
//!
//! Readings are queued on a bounded inbound channel and a single loop hands
//! each one to every current subscriber. Every subscriber has its own small
//! queue drained by its own task, and every hand-off is bounded by a
//! timeout, so one stalled subscriber never holds up the producer or the
//! other subscribers. It simply misses the readings it had no room for.

use crate::{
    error::{RelayError, Result},
    gps::Reading,
    sink::ReadingSink,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Sizing and timing of a publisher
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Readings waiting for the distribution loop before `publish` blocks
    pub inbound_capacity: usize,
    /// Readings waiting for a single subscriber
    pub subscriber_capacity: usize,
    /// How long one subscriber may keep a reading waiting before it is skipped
    pub delivery_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 100,
            subscriber_capacity: 10,
            delivery_timeout: Duration::from_secs(5),
        }
    }
}

/// Lifecycle of a publisher. A stopped publisher is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Idle,
    Running,
    Stopped,
}

impl PublisherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PublisherState::Idle,
            1 => PublisherState::Running,
            _ => PublisherState::Stopped,
        }
    }
}

/// Outcome of handing one reading to the current subscribers
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub timed_out: usize,
    /// Subscriber went away between snapshot and send
    pub dropped: usize,
}

/// The publisher's end of one subscription
#[derive(Clone)]
struct Receiver {
    queue: mpsc::Sender<Reading>,
    cancel: CancellationToken,
}

struct Inner {
    config: PublisherConfig,
    inbound: mpsc::Sender<Reading>,
    pending: Mutex<Option<mpsc::Receiver<Reading>>>,
    receivers: Mutex<HashMap<Uuid, Receiver>>,
    shutdown: CancellationToken,
    state: AtomicU8,
}

impl Inner {
    fn receivers(&self) -> MutexGuard<'_, HashMap<Uuid, Receiver>> {
        self.receivers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PublisherState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// Distributes readings from one producer to many subscribers.
///
/// Cloning is cheap and every clone drives the same publisher.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<Inner>,
}

impl Publisher {
    /// Create a publisher that stops when `shutdown` is cancelled
    pub fn new(config: PublisherConfig, shutdown: CancellationToken) -> Self {
        let (inbound, pending) = mpsc::channel(config.inbound_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                config,
                inbound,
                pending: Mutex::new(Some(pending)),
                receivers: Mutex::new(HashMap::new()),
                shutdown,
                state: AtomicU8::new(PublisherState::Idle as u8),
            }),
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.inner.config
    }

    pub fn state(&self) -> PublisherState {
        PublisherState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == PublisherState::Running
    }

    /// Number of registered subscribers
    pub fn receiver_count(&self) -> usize {
        self.inner.receivers().len()
    }

    /// Stop the distribution loop and every subscription
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Queue a reading for distribution.
    ///
    /// Nothing is queued while nobody is subscribed. Waits for room when the
    /// inbound queue is full.
    pub async fn publish(&self, reading: Reading) -> Result<()> {
        if self.receiver_count() == 0 {
            debug!("no receivers, skipping publish");
            return Ok(());
        }

        tokio::select! {
            _ = self.inner.shutdown.cancelled() => {
                Err(RelayError::Publisher("publisher stopped".to_string()))
            }
            sent = self.inner.inbound.send(reading) => {
                sent.map_err(|_| RelayError::Publisher("publisher stopped".to_string()))
            }
        }
    }

    /// Register a sink. Its readings are delivered by a dedicated task, in
    /// the order they were published.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add_receiver(&self, sink: Arc<dyn ReadingSink>) -> Subscription {
        let id = Uuid::new_v4();
        let (queue, rx) = mpsc::channel(self.inner.config.subscriber_capacity.max(1));
        let cancel = self.inner.shutdown.child_token();

        info!(%id, sink = sink.name(), "adding receiver");
        self.inner.receivers().insert(
            id,
            Receiver {
                queue,
                cancel: cancel.clone(),
            },
        );
        tokio::spawn(deliver(id, rx, sink, cancel.clone()));

        Subscription {
            id,
            cancel,
            publisher: Arc::downgrade(&self.inner),
        }
    }

    /// Run the distribution loop until shutdown
    pub async fn run(&self) -> Result<()> {
        let inbound = self.take_inbound()?;
        self.run_loop(inbound).await;
        Ok(())
    }

    /// Start the distribution loop on its own task
    pub fn spawn(&self) -> Result<JoinHandle<()>> {
        let inbound = self.take_inbound()?;
        let publisher = self.clone();
        Ok(tokio::spawn(async move { publisher.run_loop(inbound).await }))
    }

    fn take_inbound(&self) -> Result<mpsc::Receiver<Reading>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| RelayError::Publisher("publisher already started".to_string()))
    }

    async fn run_loop(&self, mut inbound: mpsc::Receiver<Reading>) {
        let shutdown = self.inner.shutdown.clone();
        self.inner.set_state(PublisherState::Running);
        info!("running publisher");

        loop {
            let reading = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                reading = inbound.recv() => match reading {
                    Some(reading) => reading,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                summary = self.dispatch(reading) => {
                    debug!(
                        delivered = summary.delivered,
                        timed_out = summary.timed_out,
                        dropped = summary.dropped,
                        "dispatched reading"
                    );
                }
            }
        }

        self.inner.set_state(PublisherState::Stopped);
        info!("shutdown requested, stopping publisher");
    }

    /// Hand one reading to every current subscriber at once and wait until
    /// each has either taken it or timed out.
    pub(crate) async fn dispatch(&self, reading: Reading) -> DispatchSummary {
        let targets: Vec<(Uuid, Receiver)> = self
            .inner
            .receivers()
            .iter()
            .map(|(id, receiver)| (*id, receiver.clone()))
            .collect();

        debug!(receivers = targets.len(), "sending reading");
        let timeout = self.inner.config.delivery_timeout;
        let mut attempts = JoinSet::new();
        for (id, receiver) in targets {
            attempts.spawn(send_with_timeout(id, reading.clone(), receiver, timeout));
        }

        let mut summary = DispatchSummary::default();
        while let Some(result) = attempts.join_next().await {
            match result {
                Ok(Delivery::Delivered) => summary.delivered += 1,
                Ok(Delivery::TimedOut) => summary.timed_out += 1,
                Ok(Delivery::Dropped) | Err(_) => summary.dropped += 1,
            }
        }
        summary
    }
}

enum Delivery {
    Delivered,
    TimedOut,
    Dropped,
}

/// The send is dropped, not left running, when the timeout or the
/// subscription's cancellation wins.
async fn send_with_timeout(
    id: Uuid,
    reading: Reading,
    receiver: Receiver,
    timeout: Duration,
) -> Delivery {
    tokio::select! {
        _ = receiver.cancel.cancelled() => Delivery::Dropped,
        sent = tokio::time::timeout(timeout, receiver.queue.send(reading)) => match sent {
            Ok(Ok(())) => Delivery::Delivered,
            Ok(Err(_)) => Delivery::Dropped,
            Err(_) => {
                warn!(%id, "receiver timed out");
                Delivery::TimedOut
            }
        },
    }
}

/// Drain one subscription's queue into its sink until cancelled
async fn deliver(
    id: Uuid,
    mut queue: mpsc::Receiver<Reading>,
    sink: Arc<dyn ReadingSink>,
    cancel: CancellationToken,
) {
    debug!(%id, sink = sink.name(), "running receiver");
    loop {
        let reading = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            reading = queue.recv() => match reading {
                Some(reading) => reading,
                None => break,
            },
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = sink.write(&reading) => {
                if let Err(e) = result {
                    warn!(%id, sink = sink.name(), error = %e, "error writing reading");
                }
            }
        }
    }
    debug!(%id, "receiver stopped");
}

/// Handle to one registered subscriber
pub struct Subscription {
    id: Uuid,
    cancel: CancellationToken,
    publisher: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True once removed, or once the whole publisher has shut down
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop delivery and unregister. Calling this more than once is harmless.
    pub fn remove(&self) {
        if let Some(inner) = self.publisher.upgrade() {
            let mut receivers = inner.receivers();
            if receivers.remove(&self.id).is_some() {
                info!(id = %self.id, "removing receiver");
            }
        }
        self.cancel.cancel();
    }

    /// Resolves when the subscription is removed or the publisher stops
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::{
        sync::Semaphore,
        time::{sleep, timeout, Instant},
    };

    fn reading(bearing: f64) -> Reading {
        Reading {
            latitude: 51.417331,
            longitude: -0.284835,
            timestamp: Utc.with_ymd_and_hms(2018, 2, 3, 22, 45, 37).unwrap(),
            active: true,
            speed: 0.29 * 1.852001,
            bearing,
        }
    }

    /// Forwards everything it receives to a channel the test can read
    struct Collector {
        tx: mpsc::UnboundedSender<Reading>,
    }

    fn collector() -> (Arc<Collector>, mpsc::UnboundedReceiver<Reading>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Collector { tx }), rx)
    }

    #[async_trait]
    impl ReadingSink for Collector {
        async fn write(&self, reading: &Reading) -> Result<()> {
            self.tx
                .send(reading.clone())
                .map_err(|_| RelayError::Other("collector closed".to_string()))
        }
    }

    /// Blocks in `write` until the test hands out permits
    struct Gated {
        gate: Arc<Semaphore>,
        tx: mpsc::UnboundedSender<Reading>,
    }

    #[async_trait]
    impl ReadingSink for Gated {
        async fn write(&self, reading: &Reading) -> Result<()> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| RelayError::Other("gate closed".to_string()))?;
            permit.forget();
            let _ = self.tx.send(reading.clone());
            Ok(())
        }
    }

    /// Fails every other write
    struct Flaky {
        calls: std::sync::atomic::AtomicUsize,
        tx: mpsc::UnboundedSender<Reading>,
    }

    #[async_trait]
    impl ReadingSink for Flaky {
        async fn write(&self, reading: &Reading) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.tx.send(reading.clone());
            if call % 2 == 0 {
                Err(RelayError::Other("flaky".to_string()))
            } else {
                Ok(())
            }
        }
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Reading>) -> Reading {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for reading")
            .expect("channel closed")
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_without_receivers_is_dropped() {
        let publisher = Publisher::new(PublisherConfig::default(), CancellationToken::new());
        publisher.spawn().unwrap();

        publisher.publish(reading(1.0)).await.unwrap();

        let (sink, mut rx) = collector();
        let _subscription = publisher.add_receiver(sink);
        sleep(Duration::from_secs(10)).await;

        assert!(rx.try_recv().is_err());
        publisher.shutdown();
    }

    #[tokio::test]
    async fn test_single_subscriber_sees_publish_order() {
        let publisher = Publisher::new(PublisherConfig::default(), CancellationToken::new());
        publisher.spawn().unwrap();
        let (sink, mut rx) = collector();
        let _subscription = publisher.add_receiver(sink);

        for i in 0..50 {
            publisher.publish(reading(i as f64)).await.unwrap();
        }
        for i in 0..50 {
            assert_eq!(recv(&mut rx).await.bearing, i as f64);
        }
        publisher.shutdown();
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_reading() {
        let publisher = Publisher::new(PublisherConfig::default(), CancellationToken::new());
        publisher.spawn().unwrap();

        let mut receivers = Vec::new();
        let mut subscriptions = Vec::new();
        for _ in 0..5 {
            let (sink, rx) = collector();
            subscriptions.push(publisher.add_receiver(sink));
            receivers.push(rx);
        }
        assert_eq!(publisher.receiver_count(), 5);

        publisher.publish(reading(7.0)).await.unwrap();
        for rx in receivers.iter_mut() {
            assert_eq!(recv(rx).await, reading(7.0));
        }
        publisher.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscriber_is_skipped() {
        let config = PublisherConfig {
            subscriber_capacity: 1,
            ..PublisherConfig::default()
        };
        let publisher = Publisher::new(config, CancellationToken::new());

        let (fast_a, mut rx_a) = collector();
        let (fast_b, mut rx_b) = collector();
        let gate = Arc::new(Semaphore::new(0));
        let (stalled_tx, mut stalled_rx) = mpsc::unbounded_channel();
        let _a = publisher.add_receiver(fast_a);
        let _b = publisher.add_receiver(fast_b);
        let _stalled = publisher.add_receiver(Arc::new(Gated {
            gate: Arc::clone(&gate),
            tx: stalled_tx,
        }));

        // first reading blocks inside the stalled sink, second fills its queue
        assert_eq!(publisher.dispatch(reading(1.0)).await.delivered, 3);
        assert_eq!(publisher.dispatch(reading(2.0)).await.delivered, 3);

        let start = Instant::now();
        let summary = publisher.dispatch(reading(3.0)).await;
        let elapsed = start.elapsed();

        assert_eq!(
            summary,
            DispatchSummary {
                delivered: 2,
                timed_out: 1,
                dropped: 0
            }
        );
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(recv(rx).await.bearing, 1.0);
            assert_eq!(recv(rx).await.bearing, 2.0);
            assert_eq!(recv(rx).await.bearing, 3.0);
        }

        gate.add_permits(10);
        assert_eq!(publisher.dispatch(reading(4.0)).await.delivered, 3);
        assert_eq!(recv(&mut stalled_rx).await.bearing, 1.0);
        assert_eq!(recv(&mut stalled_rx).await.bearing, 2.0);
        assert_eq!(recv(&mut stalled_rx).await.bearing, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscriber_does_not_delay_others() {
        let config = PublisherConfig {
            subscriber_capacity: 1,
            ..PublisherConfig::default()
        };
        let publisher = Publisher::new(config, CancellationToken::new());
        publisher.spawn().unwrap();

        let (fast, mut rx) = collector();
        let _fast = publisher.add_receiver(fast);
        let (stalled_tx, _stalled_rx) = mpsc::unbounded_channel();
        let _stalled = publisher.add_receiver(Arc::new(Gated {
            gate: Arc::new(Semaphore::new(0)),
            tx: stalled_tx,
        }));

        for i in 0..3 {
            publisher.publish(reading(i as f64)).await.unwrap();
        }

        // the third reading reaches the fast subscriber without waiting out
        // the stalled one's timeout
        let start = Instant::now();
        for i in 0..3 {
            assert_eq!(recv(&mut rx).await.bearing, i as f64);
        }
        assert!(start.elapsed() < Duration::from_secs(1));
        publisher.shutdown();
    }

    #[tokio::test]
    async fn test_removed_subscriber_receives_nothing() {
        let publisher = Publisher::new(PublisherConfig::default(), CancellationToken::new());
        publisher.spawn().unwrap();

        let (kept, mut kept_rx) = collector();
        let (removed, mut removed_rx) = collector();
        let _kept = publisher.add_receiver(kept);
        let subscription = publisher.add_receiver(removed);

        subscription.remove();
        subscription.remove();
        assert!(subscription.is_cancelled());
        assert_eq!(publisher.receiver_count(), 1);

        publisher.publish(reading(9.0)).await.unwrap();
        assert_eq!(recv(&mut kept_rx).await.bearing, 9.0);
        sleep(Duration::from_millis(50)).await;
        assert!(removed_rx.try_recv().is_err());
        publisher.shutdown();
    }

    #[tokio::test]
    async fn test_dispatch_after_removal_is_harmless() {
        let publisher = Publisher::new(PublisherConfig::default(), CancellationToken::new());
        let (sink, _rx) = collector();
        let subscription = publisher.add_receiver(sink);
        subscription.remove();

        let summary = publisher.dispatch(reading(1.0)).await;
        assert_eq!(summary, DispatchSummary::default());
    }

    #[tokio::test]
    async fn test_sink_errors_do_not_stop_delivery() {
        let publisher = Publisher::new(PublisherConfig::default(), CancellationToken::new());
        publisher.spawn().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = publisher.add_receiver(Arc::new(Flaky {
            calls: Default::default(),
            tx,
        }));

        for i in 0..4 {
            publisher.publish(reading(i as f64)).await.unwrap();
        }
        for i in 0..4 {
            assert_eq!(recv(&mut rx).await.bearing, i as f64);
        }
        publisher.shutdown();
    }

    #[tokio::test]
    async fn test_cannot_start_twice() {
        let publisher = Publisher::new(PublisherConfig::default(), CancellationToken::new());
        assert_eq!(publisher.state(), PublisherState::Idle);

        let _handle = publisher.spawn().unwrap();
        assert!(matches!(publisher.spawn(), Err(RelayError::Publisher(_))));
        assert!(matches!(publisher.run().await, Err(RelayError::Publisher(_))));
        publisher.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let shutdown = CancellationToken::new();
        let publisher = Publisher::new(PublisherConfig::default(), shutdown.clone());
        let handle = publisher.spawn().unwrap();
        let (sink, _rx) = collector();
        let subscription = publisher.add_receiver(sink);

        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(publisher.state(), PublisherState::Stopped);
        assert!(subscription.is_cancelled());
        assert!(matches!(
            publisher.publish(reading(1.0)).await,
            Err(RelayError::Publisher(_))
        ));
    }
}
