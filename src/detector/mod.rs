//! Change detection and notification fan-out.
//!
//! One cycle fetches the feed index, then for every topic:
//!
//! ```text
//! fetch → normalize → fingerprint → compare → (notify subscribers)
//! ```
//!
//! Topics are independent: a failing fetch only marks its own topic as
//! failed and leaves the stored fingerprint alone. Dispatch failures are
//! counted per subscriber and never stop the remaining dispatches.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use url::Url;

use crate::app::{NotifierError, Result};
use crate::domain::{FeedIndex, RunReport, TopicOutcome};
use crate::fetcher::Fetcher;
use crate::fingerprint::{self, FingerprintStore};
use crate::normalizer::Normalizer;
use crate::push::Dispatcher;
use crate::registry::SubscriptionRegistry;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_MESSAGE: &str = "Promjena Rasporeda!";

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub index_url: String,
    /// Field of each feed index entry holding the page URL.
    pub url_field: String,
    /// Payload pushed to subscribers of a changed topic.
    pub message: String,
    pub fetch_timeout: Duration,
    pub workers: usize,
    /// Drop subscriptions whose push endpoint is gone.
    pub prune_expired: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            index_url: String::new(),
            url_field: "RASPORED".to_string(),
            message: DEFAULT_MESSAGE.to_string(),
            fetch_timeout: Duration::from_secs(10),
            workers: DEFAULT_WORKERS,
            prune_expired: true,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DispatchTally {
    notified: usize,
    failed: usize,
    pruned: usize,
}

pub struct ChangeDetector {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    dispatcher: Arc<dyn Dispatcher + Send + Sync>,
    normalizer: Normalizer,
    fingerprints: Arc<FingerprintStore>,
    registry: Arc<SubscriptionRegistry>,
    settings: DetectorSettings,
    // Held for the whole cycle; at most one sweep touches the stores.
    cycle_lock: Arc<Mutex<()>>,
}

impl ChangeDetector {
    pub fn new(
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        dispatcher: Arc<dyn Dispatcher + Send + Sync>,
        normalizer: Normalizer,
        fingerprints: Arc<FingerprintStore>,
        registry: Arc<SubscriptionRegistry>,
        settings: DetectorSettings,
    ) -> Self {
        Self {
            fetcher,
            dispatcher,
            normalizer,
            fingerprints,
            registry,
            settings,
            cycle_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    /// Resolve once no cycle is in flight.
    pub async fn wait_idle(&self) {
        let _guard = self.cycle_lock.lock().await;
    }

    /// Run one cycle, waiting for any cycle already in flight to finish.
    ///
    /// Only a failure to obtain the feed index aborts the cycle; per-topic
    /// failures are reported in the returned [`RunReport`].
    pub async fn run_cycle(&self, notify: bool) -> Result<RunReport> {
        let _guard = self.cycle_lock.lock().await;
        self.sweep(notify).await
    }

    /// Start a cycle on a background task and return immediately.
    ///
    /// Returns `false` (and starts nothing) when a cycle is already running.
    pub fn trigger(self: &Arc<Self>, notify: bool) -> bool {
        let guard = match Arc::clone(&self.cycle_lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::info!(notify, "cycle already running; dropping trigger");
                return false;
            }
        };

        let detector = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            match detector.sweep(notify).await {
                Ok(report) => log_report(&report),
                Err(e) => tracing::error!(error = %e, "cycle aborted"),
            }
        });
        true
    }

    async fn sweep(&self, notify: bool) -> Result<RunReport> {
        let started_at = Utc::now();
        let index = self.fetch_index().await?;
        tracing::info!(topics = index.len(), notify, "starting cycle");

        // Owned entries keep the per-topic futures free of borrows into `index`.
        let entries: Vec<(String, Option<String>)> = index
            .iter()
            .map(|(topic, url)| (topic.to_string(), url.map(str::to_string)))
            .collect();

        let outcomes: BTreeMap<String, TopicOutcome> = stream::iter(entries)
            .map(|(topic, url)| async move {
                let outcome = self.process_topic(&topic, url.as_deref(), notify).await;
                (topic, outcome)
            })
            .buffer_unordered(self.settings.workers.max(1))
            .collect()
            .await;

        Ok(RunReport {
            notify,
            started_at,
            finished_at: Utc::now(),
            outcomes,
        })
    }

    async fn fetch_index(&self) -> Result<FeedIndex> {
        let body = self.fetch_bounded(&self.settings.index_url).await?;
        FeedIndex::parse(&body, &self.settings.url_field)
    }

    async fn process_topic(&self, topic: &str, url: Option<&str>, notify: bool) -> TopicOutcome {
        let fingerprint = match self.fingerprint_topic(topic, url).await {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                tracing::warn!(topic, error = %e, "failed to refresh topic; keeping previous fingerprint");
                return TopicOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        if self.registry.ensure_topic(topic).await {
            tracing::info!(topic, "new topic registered");
        }

        if !self.fingerprints.compare_and_update(topic, &fingerprint).await {
            tracing::debug!(topic, %fingerprint, "unchanged");
            return TopicOutcome::Unchanged { fingerprint };
        }

        tracing::info!(topic, %fingerprint, "changed");
        let tally = if notify {
            self.notify_subscribers(topic).await
        } else {
            DispatchTally::default()
        };

        TopicOutcome::Changed {
            fingerprint,
            notified: tally.notified,
            failed: tally.failed,
            pruned: tally.pruned,
        }
    }

    async fn fingerprint_topic(&self, topic: &str, url: Option<&str>) -> Result<String> {
        let url = url.ok_or_else(|| {
            NotifierError::FeedIndex(format!(
                "entry for '{}' has no '{}' url",
                topic, self.settings.url_field
            ))
        })?;
        Url::parse(url)?;

        let document = self.fetch_bounded(url).await?;
        let normalized = self.normalizer.normalize(&document)?;
        Ok(fingerprint::compute(&normalized))
    }

    async fn fetch_bounded(&self, url: &str) -> Result<String> {
        let timeout = self.settings.fetch_timeout;
        match tokio::time::timeout(timeout, self.fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(NotifierError::Timeout {
                url: url.to_string(),
                secs: timeout.as_secs(),
            }),
        }
    }

    async fn notify_subscribers(&self, topic: &str) -> DispatchTally {
        let subscribers = match self.registry.list_subscribers(topic).await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                tracing::warn!(topic, error = %e, "cannot list subscribers");
                return DispatchTally::default();
            }
        };

        tracing::info!(topic, subscribers = subscribers.len(), "notifying");
        let message = self.settings.message.as_str();
        let results = join_all(subscribers.iter().map(|sub| async move {
            (sub, self.dispatcher.dispatch(sub, message).await)
        }))
        .await;

        let mut tally = DispatchTally::default();
        for (sub, result) in results {
            let error = match result {
                Ok(()) => {
                    tally.notified += 1;
                    continue;
                }
                Err(error) => error,
            };

            tally.failed += 1;
            tracing::warn!(topic, endpoint = %sub.endpoint, error = %error, "push dispatch failed");

            if error.is_gone() && self.settings.prune_expired {
                if let Ok(true) = self.registry.unregister(topic, &sub.endpoint).await {
                    tracing::info!(topic, endpoint = %sub.endpoint, "pruned expired subscription");
                    tally.pruned += 1;
                }
            }
        }
        tally
    }
}

/// One summary line per cycle, plus one per failed topic.
pub fn log_report(report: &RunReport) {
    for topic in report.failed_topics() {
        if let Some(TopicOutcome::Failed { error }) = report.outcome(topic) {
            tracing::warn!(topic, error = %error, "topic failed");
        }
    }

    let elapsed = report.finished_at.signed_duration_since(report.started_at);
    tracing::info!(
        notify = report.notify,
        topics = report.outcomes.len(),
        changed = ?report.changed_topics(),
        failed = report.failed_topics().len(),
        notified = report.total_notified(),
        elapsed_ms = elapsed.num_milliseconds(),
        "cycle complete"
    );
}
