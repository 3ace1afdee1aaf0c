//! Live fan-out of run events to stream subscribers
//!
//! Process-local: each process only delivers to the clients connected to
//! it. Delivery is best-effort; a full subscriber queue drops the frame for
//! that subscriber and the client closes the gap by replaying from its
//! cursor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::types::RunEvent;

struct Subscriber {
    tx: mpsc::Sender<RunEvent>,
    dropped: Arc<AtomicU64>,
}

type SubscriberMap = HashMap<String, HashMap<u64, Subscriber>>;

#[derive(Default)]
struct BrokerInner {
    runs: Mutex<SubscriberMap>,
    next_id: AtomicU64,
}

impl BrokerInner {
    fn lock(&self) -> MutexGuard<'_, SubscriberMap> {
        // Critical sections never panic mid-update, so poisoned data is still valid
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, run_id: &str, id: u64) {
        let mut runs = self.lock();
        if let Some(subs) = runs.get_mut(run_id) {
            subs.remove(&id);
            if subs.is_empty() {
                runs.remove(run_id);
            }
        }
    }
}

/// Per-run subscriber registry
#[derive(Clone)]
pub struct EventBroker {
    inner: Arc<BrokerInner>,
    capacity: usize,
}

impl EventBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Register a bounded queue for `run_id`
    pub fn subscribe(&self, run_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let dropped = Arc::new(AtomicU64::new(0));

        self.inner.lock().entry(run_id.to_string()).or_default().insert(
            id,
            Subscriber {
                tx,
                dropped: dropped.clone(),
            },
        );
        debug!(run_id, subscription = id, "Broker subscription opened");

        Subscription {
            run_id: run_id.to_string(),
            id,
            rx,
            dropped,
            inner: self.inner.clone(),
        }
    }

    /// Non-blocking send to every subscriber of the event's run.
    ///
    /// Returns the number of subscribers that accepted the frame.
    pub fn publish(&self, event: &RunEvent) -> usize {
        let mut runs = self.inner.lock();
        let Some(subs) = runs.get_mut(&event.run_id) else {
            return 0;
        };

        let mut delivered = 0;
        subs.retain(|id, sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    run_id = %event.run_id,
                    seq = event.seq,
                    subscription = id,
                    dropped,
                    "Subscriber queue full, dropping frame"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if subs.is_empty() {
            runs.remove(&event.run_id);
        }
        delivered
    }

    pub fn subscriber_count(&self, run_id: &str) -> usize {
        self.inner.lock().get(run_id).map(|subs| subs.len()).unwrap_or(0)
    }
}

/// Receiving end of one stream; unsubscribes when dropped
pub struct Subscription {
    run_id: String,
    id: u64,
    rx: mpsc::Receiver<RunEvent>,
    dropped: Arc<AtomicU64>,
    inner: Arc<BrokerInner>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.rx.recv().await
    }

    /// Frames dropped for this subscriber so far
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.remove(&self.run_id, self.id);
        debug!(run_id = %self.run_id, subscription = self.id, "Broker subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(run_id: &str, seq: u64) -> RunEvent {
        RunEvent {
            run_id: run_id.to_string(),
            seq,
            kind: "message".into(),
            persona: None,
            payload: serde_json::Value::Null,
            is_key_node: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_only_matching_run() {
        let broker = EventBroker::new(8);
        let mut a = broker.subscribe("run-a");
        let mut b = broker.subscribe("run-b");

        assert_eq!(broker.publish(&event("run-a", 1)), 1);
        assert_eq!(a.recv().await.unwrap().seq, 1);
        assert!(b.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_preserves_order() {
        let broker = EventBroker::new(2);
        let mut sub = broker.subscribe("r");
        for seq in 1..=5 {
            broker.publish(&event("r", seq));
        }
        assert_eq!(sub.dropped(), 3);
        assert_eq!(sub.recv().await.unwrap().seq, 1);
        assert_eq!(sub.recv().await.unwrap().seq, 2);

        broker.publish(&event("r", 6));
        assert_eq!(sub.recv().await.unwrap().seq, 6);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let broker = EventBroker::new(4);
        let sub = broker.subscribe("r");
        let other = broker.subscribe("r");
        assert_eq!(broker.subscriber_count("r"), 2);
        drop(sub);
        assert_eq!(broker.subscriber_count("r"), 1);
        drop(other);
        assert_eq!(broker.subscriber_count("r"), 0);
        assert_eq!(broker.publish(&event("r", 1)), 0);
    }
}
