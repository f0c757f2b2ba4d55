// ============================
// crates/backend-lib/src/broadcast.rs
// ============================
//! Topic-keyed wake-up signals for streaming connections.
//!
//! Each listener owns a single-slot channel. A send to a listener whose slot
//! is still full is dropped, so bursts coalesce into one pending wake-up and
//! a sender never waits on a slow consumer.
use dashmap::DashMap;
use metrics::counter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::metrics::{BROADCAST_MISSED, BROADCAST_SENT};

/// Some listeners already had a signal pending; the rest were signalled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("topic {topic}: {missed} of {total} listeners could not be signalled")]
pub struct IncompleteBroadcast {
    pub topic: String,
    pub delivered: usize,
    pub missed: usize,
    pub total: usize,
}

#[derive(Default)]
struct Topic {
    listeners: RwLock<TopicListeners>,
}

#[derive(Default)]
struct TopicListeners {
    /// Last id handed out; never reused for the life of the process
    last_id: u64,
    senders: HashMap<u64, mpsc::Sender<()>>,
}

/// In-memory pub-sub hub keyed by topic name
#[derive(Clone, Default)]
pub struct Broadcaster {
    topics: Arc<DashMap<String, Arc<Topic>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every listener on `topic`, returning how many were woken.
    ///
    /// Listeners whose slot is already full are skipped and reported through
    /// the error; everyone else has still been signalled.
    pub fn send(&self, topic: &str) -> Result<usize, IncompleteBroadcast> {
        // Clone the Arc out so the map shard is not held during fan-out
        let Some(entry) = self.topics.get(topic).map(|t| Arc::clone(t.value())) else {
            return Ok(0);
        };

        let listeners = entry.listeners.read();
        let total = listeners.senders.len();
        let mut delivered = 0;
        let mut missed = 0;

        for sender in listeners.senders.values() {
            match sender.try_send(()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(())) => missed += 1,
                // Receiver is being dropped; its entry goes away with it
                Err(TrySendError::Closed(())) => {},
            }
        }
        drop(listeners);

        counter!(BROADCAST_SENT).increment(delivered as u64);
        if missed > 0 {
            counter!(BROADCAST_MISSED).increment(missed as u64);
            return Err(IncompleteBroadcast {
                topic: topic.to_owned(),
                delivered,
                missed,
                total,
            });
        }
        Ok(delivered)
    }

    /// Register a listener on `topic`, creating the topic on first use
    pub fn listen(&self, topic: &str) -> Listener {
        let entry = Arc::clone(
            self.topics
                .entry(topic.to_owned())
                .or_default()
                .value(),
        );

        let (tx, rx) = mpsc::channel(1);
        let id = {
            let mut listeners = entry.listeners.write();
            listeners.last_id += 1;
            let id = listeners.last_id;
            listeners.senders.insert(id, tx);
            id
        };

        Listener {
            id,
            topic: topic.to_owned(),
            registry: entry,
            rx,
        }
    }

    /// Listeners currently registered on `topic`
    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |t| t.listeners.read().senders.len())
    }

    /// Topics referenced so far
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

/// A subscription to one topic. Dropping it unregisters it.
pub struct Listener {
    id: u64,
    topic: String,
    registry: Arc<Topic>,
    rx: mpsc::Receiver<()>,
}

impl Listener {
    /// Id, unique within the topic
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next wake-up
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Consume a pending wake-up without waiting
    pub fn try_recv(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Unregister; same as dropping
    pub fn close(self) {}
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.registry.listeners.write().senders.remove(&self.id);
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}
