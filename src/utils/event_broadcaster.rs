use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

/// Keyed fan-out of events over `tokio::sync::broadcast` channels.
///
/// A channel is created lazily the first time a key is subscribed to.
/// Publishing on a key nobody subscribed to drops the event. Subscribers that
/// fall more than `buffer_size` events behind miss the oldest ones. Channels
/// whose receivers are all gone linger until
/// [`cleanup_idle`](Self::cleanup_idle) is called; `PipelineExecutor` does so
/// at the start of every run.
///
/// ```rust
/// use rowdag::utils::EventBroadcaster;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let broadcaster = EventBroadcaster::<String, u32>::new(16);
/// let mut receiver = broadcaster.subscribe("pipeline-1".to_string()).await;
///
/// assert_eq!(broadcaster.publish("pipeline-1".to_string(), 7).await, 1);
/// assert_eq!(receiver.recv().await.unwrap(), 7);
/// # }
/// ```
pub struct EventBroadcaster<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    channels: Arc<RwLock<HashMap<K, broadcast::Sender<V>>>>,
    buffer_size: usize,
}

impl<K, V> EventBroadcaster<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            buffer_size: buffer_size.max(1),
        }
    }

    pub async fn subscribe(&self, key: K) -> broadcast::Receiver<V> {
        self.sender(key).await.subscribe()
    }

    /// Sends `event` to every current subscriber of `key` and returns how
    /// many received it. Publishing without subscribers is not an error.
    pub async fn publish(&self, key: K, event: V) -> usize {
        let sender = {
            let channels = self.channels.read().await;
            channels.get(&key).cloned()
        };
        // No channel means nobody ever subscribed; nothing to deliver.
        match sender {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub async fn receiver_count(&self, key: &K) -> usize {
        self.channels
            .read()
            .await
            .get(key)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    /// Drops channels that have no receivers left and returns how many went.
    pub async fn cleanup_idle(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    async fn sender(&self, key: K) -> broadcast::Sender<V> {
        if let Some(sender) = self.channels.read().await.get(&key) {
            return sender.clone();
        }

        // Another task may have created the channel between the two locks
        self.channels
            .write()
            .await
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .clone()
    }
}

impl<K, V> Clone for EventBroadcaster<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            buffer_size: self.buffer_size,
        }
    }
}

impl<K, V> Default for EventBroadcaster<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(256)
    }
}
