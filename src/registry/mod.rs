//! Push subscriptions grouped by topic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::Subscription;
use crate::store::{self, SharedBlobStore, StorageError};

pub const BLOB_KEY: &str = "subscriptions";

/// Why a register/unregister request was refused.
///
/// Clients see the same status for both; the variant only matters for logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("endpoint already subscribed to '{0}'")]
    AlreadySubscribed(String),
}

pub struct SubscriptionRegistry {
    topics: RwLock<BTreeMap<String, Vec<Subscription>>>,
    dirty: AtomicBool,
    blobs: SharedBlobStore,
}

impl SubscriptionRegistry {
    /// Load persisted subscriptions. A missing or corrupt blob is an error.
    pub fn load(blobs: SharedBlobStore) -> Result<Self, StorageError> {
        let topics: BTreeMap<String, Vec<Subscription>> = store::load_json(&*blobs, BLOB_KEY)?;
        tracing::info!(
            topics = topics.len(),
            subscribers = topics.values().map(Vec::len).sum::<usize>(),
            "loaded subscriptions"
        );
        Ok(Self::with_topics(blobs, topics))
    }

    pub fn with_topics(blobs: SharedBlobStore, topics: BTreeMap<String, Vec<Subscription>>) -> Self {
        Self {
            topics: RwLock::new(topics),
            dirty: AtomicBool::new(false),
            blobs,
        }
    }

    /// An empty registry knowing the given topics.
    pub fn empty<I, T>(blobs: SharedBlobStore, topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let topics = topics.into_iter().map(|t| (t.into(), Vec::new())).collect();
        Self::with_topics(blobs, topics)
    }

    pub async fn is_empty(&self) -> bool {
        self.topics.read().await.is_empty()
    }

    /// Add an empty subscriber list for every topic not yet known.
    /// Returns how many topics were added.
    pub async fn seed_topics<I, T>(&self, topics: I) -> usize
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut map = self.topics.write().await;
        let mut added = 0;
        for topic in topics {
            if let std::collections::btree_map::Entry::Vacant(slot) = map.entry(topic.into()) {
                slot.insert(Vec::new());
                added += 1;
            }
        }
        if added > 0 {
            self.dirty.store(true, Ordering::SeqCst);
        }
        added
    }

    /// Make `topic` known. Returns `true` if it was new.
    pub async fn ensure_topic(&self, topic: &str) -> bool {
        if self.topics.read().await.contains_key(topic) {
            return false;
        }
        self.seed_topics([topic]).await == 1
    }

    pub async fn register(&self, topic: &str, subscription: Subscription) -> Result<(), Rejection> {
        let mut map = self.topics.write().await;
        let subscribers = map
            .get_mut(topic)
            .ok_or_else(|| Rejection::UnknownTopic(topic.to_string()))?;

        if subscribers.contains(&subscription) {
            return Err(Rejection::AlreadySubscribed(topic.to_string()));
        }

        subscribers.push(subscription);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Remove the subscription with `endpoint` from `topic`.
    ///
    /// Removing an endpoint that is not subscribed succeeds, so clients can
    /// retry freely. Returns whether anything was removed.
    pub async fn unregister(&self, topic: &str, endpoint: &str) -> Result<bool, Rejection> {
        let mut map = self.topics.write().await;
        let subscribers = map
            .get_mut(topic)
            .ok_or_else(|| Rejection::UnknownTopic(topic.to_string()))?;

        let before = subscribers.len();
        subscribers.retain(|s| s.endpoint != endpoint);
        let removed = subscribers.len() != before;
        if removed {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(removed)
    }

    pub async fn list_subscribers(&self, topic: &str) -> Result<Vec<Subscription>, Rejection> {
        self.topics
            .read()
            .await
            .get(topic)
            .cloned()
            .ok_or_else(|| Rejection::UnknownTopic(topic.to_string()))
    }

    pub async fn contains_topic(&self, topic: &str) -> bool {
        self.topics.read().await.contains_key(topic)
    }

    pub async fn topics(&self) -> Vec<String> {
        self.topics.read().await.keys().cloned().collect()
    }

    pub async fn subscriber_counts(&self) -> BTreeMap<String, usize> {
        self.topics
            .read()
            .await
            .iter()
            .map(|(t, subs)| (t.clone(), subs.len()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Persist the whole registry if it changed since the last flush.
    /// A failed write leaves the registry dirty for the next attempt.
    pub async fn flush(&self) -> Result<bool, StorageError> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        let snapshot = self.topics.read().await.clone();
        if let Err(e) = store::save_json(&*self.blobs, BLOB_KEY, &snapshot) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        tracing::debug!(topics = snapshot.len(), "flushed subscriptions");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryBlobStore;

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::empty(Arc::new(MemoryBlobStore::new()), ["3A", "1B"])
    }

    fn sub(n: u32) -> Subscription {
        Subscription::new(format!("https://push.example/{}", n), "p256dh", "auth")
    }

    #[tokio::test]
    async fn test_register_appends_in_order() {
        let registry = registry();
        registry.register("3A", sub(1)).await.unwrap();
        registry.register("3A", sub(2)).await.unwrap();

        let subs = registry.list_subscribers("3A").await.unwrap();
        assert_eq!(subs, vec![sub(1), sub(2)]);
        assert!(registry.list_subscribers("1B").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_duplicate_endpoint_rejected() {
        let registry = registry();
        registry.register("3A", sub(1)).await.unwrap();

        let mut rotated = sub(1);
        rotated.keys.auth = "new-auth".into();
        let err = registry.register("3A", rotated).await.unwrap_err();

        assert_eq!(err, Rejection::AlreadySubscribed("3A".into()));
        assert_eq!(registry.list_subscribers("3A").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_endpoint_may_follow_several_topics() {
        let registry = registry();
        registry.register("3A", sub(1)).await.unwrap();
        registry.register("1B", sub(1)).await.unwrap();
        assert_eq!(registry.list_subscribers("1B").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_unknown_topic_rejected() {
        let registry = registry();
        let err = registry.register("9Z", sub(1)).await.unwrap_err();
        assert_eq!(err, Rejection::UnknownTopic("9Z".into()));
        assert!(!registry.contains_topic("9Z").await);
    }

    #[tokio::test]
    async fn test_unregister_removes_by_endpoint() {
        let registry = registry();
        registry.register("3A", sub(1)).await.unwrap();
        registry.register("3A", sub(2)).await.unwrap();

        assert!(registry.unregister("3A", "https://push.example/1").await.unwrap());
        assert_eq!(registry.list_subscribers("3A").await.unwrap(), vec![sub(2)]);
    }

    #[tokio::test]
    async fn test_unregister_missing_endpoint_is_noop() {
        let registry = registry();
        registry.register("3A", sub(1)).await.unwrap();

        assert!(!registry.unregister("3A", "https://push.example/404").await.unwrap());
        assert_eq!(registry.list_subscribers("3A").await.unwrap(), vec![sub(1)]);
    }

    #[tokio::test]
    async fn test_unregister_unknown_topic_rejected() {
        let registry = registry();
        let err = registry
            .unregister("9Z", "https://push.example/1")
            .await
            .unwrap_err();
        assert_eq!(err, Rejection::UnknownTopic("9Z".into()));
    }

    #[tokio::test]
    async fn test_list_unknown_topic() {
        assert!(registry().list_subscribers("9Z").await.is_err());
    }

    #[tokio::test]
    async fn test_seed_and_ensure_topic() {
        let registry =
            SubscriptionRegistry::with_topics(Arc::new(MemoryBlobStore::new()), BTreeMap::new());
        assert!(registry.is_empty().await);

        assert_eq!(registry.seed_topics(["3A", "1B"]).await, 2);
        assert_eq!(registry.seed_topics(["3A"]).await, 0);
        assert!(registry.ensure_topic("2C").await);
        assert!(!registry.ensure_topic("2C").await);
        assert_eq!(registry.topics().await, vec!["1B", "2C", "3A"]);
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let blobs: SharedBlobStore = Arc::new(MemoryBlobStore::new());
        let registry = SubscriptionRegistry::empty(blobs.clone(), ["3A"]);
        registry.register("3A", sub(7)).await.unwrap();

        assert!(registry.flush().await.unwrap());
        assert!(!registry.is_dirty());

        let reloaded = SubscriptionRegistry::load(blobs).unwrap();
        assert_eq!(reloaded.list_subscribers("3A").await.unwrap(), vec![sub(7)]);
        assert_eq!(reloaded.subscriber_counts().await["3A"], 1);
    }

    #[tokio::test]
    async fn test_rejected_register_does_not_dirty() {
        let registry = registry();
        let _ = registry.register("9Z", sub(1)).await;
        assert!(!registry.is_dirty());
    }
}
