use std::sync::Arc;

use crate::app::error::Result;
use crate::config::Config;
use crate::detector::ChangeDetector;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::fingerprint::FingerprintStore;
use crate::normalizer::Normalizer;
use crate::push::{DisabledDispatcher, Dispatcher, VapidKeys, WebPushDispatcher};
use crate::registry::SubscriptionRegistry;
use crate::store::{self, SharedBlobStore};

pub struct AppContext {
    pub config: Config,
    pub fingerprints: Arc<FingerprintStore>,
    pub registry: Arc<SubscriptionRegistry>,
    pub detector: Arc<ChangeDetector>,
    pub vapid_keys: Option<VapidKeys>,
}

impl AppContext {
    /// Open the configured storage and wire up the production components.
    ///
    /// Fails if either persisted store is missing or corrupt.
    pub async fn new(config: Config) -> Result<Self> {
        let path = config.storage.resolved_path()?;
        let blobs = store::open(config.storage.backend, &path)?;

        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::with_options(
            config.feeds.fetch_timeout(),
            &config.feeds.user_agent,
        )?);

        let vapid_keys = config.push.vapid_keys();
        let dispatcher: Arc<dyn Dispatcher + Send + Sync> = match vapid_keys {
            Some(ref keys) => Arc::new(WebPushDispatcher::new(
                keys.clone(),
                config.push.subject.clone(),
                config.push.ttl_secs,
            )?),
            None => {
                tracing::warn!("VAPID keys not configured; push delivery disabled");
                Arc::new(DisabledDispatcher)
            }
        };

        Self::with_parts(config, blobs, fetcher, dispatcher, vapid_keys).await
    }

    pub async fn with_parts(
        config: Config,
        blobs: SharedBlobStore,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        dispatcher: Arc<dyn Dispatcher + Send + Sync>,
        vapid_keys: Option<VapidKeys>,
    ) -> Result<Self> {
        let fingerprints = Arc::new(FingerprintStore::load(blobs.clone())?);
        let registry = Arc::new(SubscriptionRegistry::load(blobs)?);

        // Every fingerprinted topic must accept subscriptions.
        let seeded = registry.seed_topics(fingerprints.topics().await).await;
        if seeded > 0 {
            tracing::info!(topics = seeded, "added fingerprinted topics to subscription registry");
        }

        let normalizer =
            Normalizer::with_markers(&config.feeds.start_marker, &config.feeds.end_marker);
        let detector = Arc::new(ChangeDetector::new(
            fetcher,
            dispatcher,
            normalizer,
            fingerprints.clone(),
            registry.clone(),
            config.detector_settings(),
        ));

        Ok(Self {
            config,
            fingerprints,
            registry,
            detector,
            vapid_keys,
        })
    }

    /// Flush both stores. Failures are logged; the stores stay dirty and
    /// the next flush retries.
    pub async fn flush(&self) {
        match self.fingerprints.flush().await {
            Ok(true) => tracing::info!("saved fingerprints"),
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "failed to save fingerprints; will retry"),
        }
        match self.registry.flush().await {
            Ok(true) => tracing::info!("saved subscriptions"),
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "failed to save subscriptions; will retry"),
        }
    }
}
