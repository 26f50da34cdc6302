// In-process pub/sub for run change signals
//
// Signals are advisory: they carry no payload beyond "this run changed" and
// subscribers re-query the store for authoritative state. Delivery uses a
// bounded broadcast buffer per topic; a subscriber that falls behind loses
// the oldest pending signals and simply re-queries on the next one, so a
// missed signal delays a refresh but never corrupts anything.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::BroadcastStream;

/// Per-subscriber signal buffer; overflow drops the oldest pending signal.
const SIGNAL_BUFFER: usize = 16;

/// Change signal published to a run's topic
#[derive(Debug, Clone)]
pub struct Signal {
    pub run_id: String,
}

/// Topic carrying updates for one run.
pub fn run_topic(run_id: &str) -> String {
    format!("runUpdated:{}", run_id)
}

/// Topic-keyed broadcast fan-out, in-process only.
#[derive(Clone, Default)]
pub struct Broker {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Signal>>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `signal` to every current subscriber of `topic`.
    ///
    /// Never blocks on slow subscribers. When the last subscriber is gone
    /// the topic entry is dropped to keep the registry bounded.
    pub async fn publish(&self, topic: &str, signal: Signal) {
        let mut topics = self.topics.lock().await;
        if let Some(sender) = topics.get(topic) {
            if sender.send(signal).is_err() {
                topics.remove(topic);
            }
        }
    }

    /// Subscribe to a topic. The stream ends when dropped; calling
    /// `subscribe` again starts a fresh subscription.
    pub async fn subscribe(&self, topic: &str) -> BroadcastStream<Signal> {
        let mut topics = self.topics.lock().await;
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(SIGNAL_BUFFER).0);
        BroadcastStream::new(sender.subscribe())
    }
}
