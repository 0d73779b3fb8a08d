//! Event Broker
//!
//! In-memory, per-job publish/subscribe for progress events. Each job gets a
//! channel holding a bounded buffer of recent events and the senders of its
//! live subscribers. Channels live in a sharded map, so jobs only contend with
//! jobs hashed to the same shard, and every operation on one job runs under
//! that job's shard lock. That makes "replay then register" atomic with respect
//! to `publish`, so a subscriber never misses or duplicates an event.
//!
//! Event history is best-effort and does not survive a restart; the terminal
//! job record in the database is the only durable state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use playrank_core::domain::event::{EventKind, ProgressEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

struct JobChannel {
    buffer: VecDeque<ProgressEvent>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<ProgressEvent>>,
}

impl JobChannel {
    fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
            subscribers: HashMap::new(),
        }
    }
}

/// Process-wide registry of job channels
pub struct EventBroker {
    channels: DashMap<Uuid, JobChannel>,
    buffer_size: usize,
    next_subscriber: AtomicU64,
    /// Set by [`EventBroker::close_all`]; later subscriptions end at once
    closed: AtomicBool,
}

impl EventBroker {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: DashMap::new(),
            buffer_size: buffer_size.max(1),
            next_subscriber: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a subscriber for `job_id`
    ///
    /// The subscription first yields a `stream.open` acknowledgment, then every
    /// buffered event in publish order, then live events. After
    /// [`close_all`](Self::close_all) it yields the acknowledgment only.
    pub fn subscribe(self: &Arc<Self>, job_id: Uuid) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);

        if self.closed.load(Ordering::SeqCst) {
            let open = ProgressEvent::new(job_id, EventKind::StreamOpen)
                .with_payload(serde_json::json!({ "buffered": 0 }));
            let _ = tx.send(open);
            return Subscription {
                broker: Arc::clone(self),
                job_id,
                id,
                receiver: rx,
            };
        }

        let mut channel = self.channels.entry(job_id).or_insert_with(JobChannel::new);
        let open = ProgressEvent::new(job_id, EventKind::StreamOpen)
            .with_payload(serde_json::json!({ "buffered": channel.buffer.len() }));
        // The receiver is still in our hands, these sends cannot fail
        let _ = tx.send(open);
        for event in &channel.buffer {
            let _ = tx.send(event.clone());
        }
        channel.subscribers.insert(id, tx);
        drop(channel);

        tracing::debug!(job_id = %job_id, subscriber = id, "Subscriber registered");

        Subscription {
            broker: Arc::clone(self),
            job_id,
            id,
            receiver: rx,
        }
    }

    /// Buffer `event` and deliver it to every live subscriber of its job
    ///
    /// Subscribers whose connection is gone are dropped without affecting the
    /// publisher or their siblings.
    pub fn publish(&self, event: ProgressEvent) {
        let mut channel = self
            .channels
            .entry(event.job_id)
            .or_insert_with(JobChannel::new);

        if channel.buffer.len() >= self.buffer_size {
            channel.buffer.pop_front();
        }
        channel.buffer.push_back(event.clone());

        let before = channel.subscribers.len();
        channel
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
        let lost = before - channel.subscribers.len();
        if lost > 0 {
            tracing::debug!(job_id = %event.job_id, lost, "Dropped disconnected subscribers");
        }
    }

    /// End every subscription of `job_id` and release its buffer
    ///
    /// Subscribers still receive whatever was already delivered to them, then
    /// their stream ends. Returns the number of subscribers that were attached.
    pub fn close(&self, job_id: Uuid) -> usize {
        match self.channels.remove(&job_id) {
            Some((_, channel)) => {
                tracing::debug!(job_id = %job_id, subscribers = channel.subscribers.len(), "Channel closed");
                channel.subscribers.len()
            }
            None => 0,
        }
    }

    /// Close every channel and refuse live subscriptions from now on
    ///
    /// Used at shutdown, so streams of jobs this process is not driving end
    /// too. Returns the number of subscribers that were attached.
    pub fn close_all(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let job_ids: Vec<Uuid> = self.channels.iter().map(|entry| *entry.key()).collect();
        let detached: usize = job_ids.into_iter().map(|job_id| self.close(job_id)).sum();
        tracing::info!(detached, "All event channels closed");
        detached
    }

    /// Remove one subscriber; harmless if it or its channel is already gone
    fn unsubscribe(&self, job_id: Uuid, id: u64) {
        if let Some(mut channel) = self.channels.get_mut(&job_id) {
            channel.subscribers.remove(&id);
        }
        // A channel created only by subscribers carries nothing worth keeping
        self.channels.remove_if(&job_id, |_, channel| {
            channel.subscribers.is_empty() && channel.buffer.is_empty()
        });
    }

    pub fn subscriber_count(&self, job_id: Uuid) -> usize {
        self.channels
            .get(&job_id)
            .map(|c| c.subscribers.len())
            .unwrap_or(0)
    }

    pub fn buffered(&self, job_id: Uuid) -> Vec<ProgressEvent> {
        self.channels
            .get(&job_id)
            .map(|c| c.buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a channel currently exists for `job_id`
    pub fn is_open(&self, job_id: Uuid) -> bool {
        self.channels.contains_key(&job_id)
    }
}

/// A live subscription; unsubscribes when dropped
pub struct Subscription {
    broker: Arc<EventBroker>,
    job_id: Uuid,
    id: u64,
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl Subscription {
    /// Next event, or `None` once the channel was closed and drained
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broker.unsubscribe(self.job_id, self.id);
    }
}
