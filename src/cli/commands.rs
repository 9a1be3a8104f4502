use std::collections::BTreeMap;
use std::sync::Arc;

use crate::app::{AppContext, NotifierError, Result};
use crate::config::Config;
use crate::daemon::{self, Daemon, DaemonConfig};
use crate::domain::{FeedIndex, RunReport, Subscription, TopicOutcome};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::fingerprint;
use crate::push::vapid::{PRIVATE_KEY_ENV, PUBLIC_KEY_ENV};
use crate::push::VapidKeys;
use crate::registry::{self, SubscriptionRegistry};
use crate::server::{Api, HttpServer};
use crate::store::{self, SharedBlobStore};

pub async fn serve(config: Config) -> Result<()> {
    let keys = require_vapid_keys(config.push.vapid_keys())?;
    let daemon_config = DaemonConfig::from_schedule(&config.schedule)?;
    let ctx = Arc::new(AppContext::new(config).await?);

    let server = HttpServer::bind(&ctx.config.server.bind)?;
    println!("Listening on http://{}", server.addr());

    let api = Arc::new(Api::new(
        ctx.registry.clone(),
        ctx.detector.clone(),
        keys.public_key,
    ));
    let stop_server = server.shutdown_handle();
    let server_task = server.spawn(api, ctx.config.server.allowed_origin.clone());

    // Stop accepting requests before the scheduler's final flush.
    let shutdown = async move {
        daemon::shutdown_signal().await;
        tracing::info!("shutdown requested");
        stop_server.shutdown();
        if let Err(e) = server_task.await {
            tracing::warn!(error = %e, "http server task failed");
        }
    };

    Daemon::new(ctx, daemon_config).run(shutdown).await;
    println!("Stopped");
    Ok(())
}

pub async fn check(config: Config, notify: bool, json: bool) -> Result<()> {
    let ctx = AppContext::new(config).await?;
    let report = ctx.detector.run_cycle(notify).await?;
    ctx.flush().await;

    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| NotifierError::Other(format!("cannot render report: {}", e)))?;
        println!("{}", rendered);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    if report.outcomes.is_empty() {
        println!("Feed index lists no topics");
        return;
    }

    for (topic, outcome) in &report.outcomes {
        match outcome {
            TopicOutcome::Changed {
                fingerprint,
                notified,
                failed,
                pruned,
            } => {
                println!("  {:<8} changed    {}", topic, short(fingerprint));
                if report.notify {
                    println!(
                        "           notified {}, failed {}, pruned {}",
                        notified, failed, pruned
                    );
                }
            }
            TopicOutcome::Unchanged { fingerprint } => {
                println!("  {:<8} unchanged  {}", topic, short(fingerprint));
            }
            TopicOutcome::Failed { error } => {
                println!("  {:<8} failed     {}", topic, error);
            }
        }
    }

    println!(
        "Cycle complete: {} topics, {} changed, {} failed, {} notified",
        report.outcomes.len(),
        report.changed_topics().len(),
        report.failed_topics().len(),
        report.total_notified()
    );
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

/// Create whichever blobs are absent. Existing blobs are never touched.
pub async fn init(config: Config) -> Result<()> {
    let blobs = open_blobs(&config)?;
    let location = blobs.location();

    let existing: Option<BTreeMap<String, String>> =
        store::load_json_opt(&*blobs, fingerprint::BLOB_KEY)?;
    match existing {
        Some(hashes) => println!("Fingerprints already present ({} topics)", hashes.len()),
        None => {
            store::save_json(&*blobs, fingerprint::BLOB_KEY, &BTreeMap::<String, String>::new())?;
            println!("Created empty fingerprints in {}", location);
        }
    }

    let existing: Option<BTreeMap<String, Vec<Subscription>>> =
        store::load_json_opt(&*blobs, registry::BLOB_KEY)?;
    match existing {
        Some(topics) => println!("Subscriptions already present ({} topics)", topics.len()),
        None => {
            let topics: BTreeMap<String, Vec<Subscription>> = index_topics(&config)
                .await
                .into_iter()
                .map(|topic| (topic, Vec::new()))
                .collect();
            store::save_json(&*blobs, registry::BLOB_KEY, &topics)?;
            println!("Created subscriptions for {} topics in {}", topics.len(), location);
        }
    }

    Ok(())
}

/// Topics listed by the feed index, or none if it cannot be read. Topics
/// missing here are added by the first cycle.
async fn index_topics(config: &Config) -> Vec<String> {
    match fetch_index(config).await {
        Ok(index) => index.topics().map(str::to_string).collect(),
        Err(e) => {
            tracing::warn!(url = %config.feeds.index_url, error = %e, "cannot read feed index; starting with no topics");
            eprintln!("Warning: could not read feed index: {}", e);
            Vec::new()
        }
    }
}

async fn fetch_index(config: &Config) -> Result<FeedIndex> {
    let fetcher = HttpFetcher::with_options(config.feeds.fetch_timeout(), &config.feeds.user_agent)?;
    let body = fetcher.fetch(&config.feeds.index_url).await?;
    FeedIndex::parse(&body, &config.feeds.url_field)
}

pub fn print_keys() {
    let keys = VapidKeys::generate();
    println!("{}={}", PUBLIC_KEY_ENV, keys.public_key);
    println!("{}={}", PRIVATE_KEY_ENV, keys.private_key);
}

pub async fn list_subscribers(config: Config) -> Result<()> {
    let blobs = open_blobs(&config)?;
    let registry = SubscriptionRegistry::load(blobs)?;
    let counts = registry.subscriber_counts().await;

    if counts.is_empty() {
        println!("No topics");
        return Ok(());
    }

    for (topic, count) in &counts {
        println!("  {:<8} {}", topic, count);
    }
    println!("Total: {} subscribers", counts.values().sum::<usize>());
    Ok(())
}

fn open_blobs(config: &Config) -> Result<SharedBlobStore> {
    let path = config.storage.resolved_path()?;
    Ok(store::open(config.storage.backend, &path)?)
}

/// The configured VAPID pair. Without one, print a fresh pair to put in
/// the config and fail.
fn require_vapid_keys(configured: Option<VapidKeys>) -> Result<VapidKeys> {
    if let Some(keys) = configured {
        keys.validate()?;
        return Ok(keys);
    }

    tracing::error!("VAPID keys are not configured");
    eprintln!("{}", missing_keys_hint(&VapidKeys::generate()));
    Err(NotifierError::Push("VAPID keys are not configured".to_string()))
}

fn missing_keys_hint(generated: &VapidKeys) -> String {
    format!(
        "VAPID keys are not configured. Add these to the [push] section of the config\n\
         or export them as {} / {}:\n\n\
         public_key = \"{}\"\n\
         private_key = \"{}\"",
        PUBLIC_KEY_ENV, PRIVATE_KEY_ENV, generated.public_key, generated.private_key
    )
}
