//! # timetable-notifier
//!
//! Watches published class timetable pages and sends Web Push notifications
//! to browsers subscribed to a class when its timetable changes.
//!
//! ## Architecture
//!
//! Each cycle runs a per-topic pipeline:
//!
//! ```text
//! Feed index → Fetcher → Normalizer → Fingerprint → Registry → Push
//! ```
//!
//! - [`fetcher`]: HTTP client for the feed index and timetable pages
//! - [`normalizer`]: Cuts the timetable body out of a page and masks volatile attributes
//! - [`fingerprint`]: SHA-256 fingerprints with compare-and-update semantics
//! - [`registry`]: Push subscriptions grouped by topic
//! - [`push`]: Web Push delivery with VAPID
//!
//! ## Quick Start
//!
//! ```bash
//! # Generate VAPID keys and add them to the config
//! timetable-notifier keys
//!
//! # Create the stores
//! timetable-notifier init
//!
//! # Run one cycle without notifying anyone
//! timetable-notifier check
//!
//! # Run the HTTP API and scheduler
//! timetable-notifier serve
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Application context and error types
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: TOML configuration
//! - [`daemon`]: Cycle and flush timers
//! - [`detector`]: The change-detection cycle
//! - [`domain`]: Subscriptions, feed index, cycle reports
//! - [`server`]: HTTP API
//! - [`store`]: Blob persistence

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// stores, fetcher, dispatcher, detector.
pub mod app;

/// Command-line interface using clap.
///
/// - `serve` - Run the HTTP API and scheduler
/// - `check [--notify] [--json]` - Run one cycle now
/// - `init` - Create empty stores
/// - `keys` - Generate a VAPID key pair
/// - `subscribers` - Subscriber counts per topic
pub mod cli;

/// Configuration loaded from `~/.config/timetable-notifier/config.toml`.
pub mod config;

/// Periodic cycle and flush scheduling for `serve`.
pub mod daemon;

/// Change detection and notification fan-out.
///
/// - [`ChangeDetector`](detector::ChangeDetector): runs cycles, one at a time
/// - [`DetectorSettings`](detector::DetectorSettings): index URL, message, limits
pub mod detector;

/// Core domain models.
///
/// - [`Subscription`](domain::Subscription): A browser push subscription
/// - [`FeedIndex`](domain::FeedIndex): topic → page URL
/// - [`RunReport`](domain::RunReport): Per-topic outcome of a cycle
pub mod domain;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for fetching a URL as text
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

pub mod fingerprint;

pub mod normalizer;

/// Push delivery.
///
/// - [`Dispatcher`](push::Dispatcher): Async trait for one delivery attempt
/// - [`WebPushDispatcher`](push::WebPushDispatcher): Web Push with VAPID signing
pub mod push;

pub mod registry;

/// HTTP API built on tiny_http.
pub mod server;

/// Blob persistence.
///
/// - [`BlobStore`](store::BlobStore): Trait for loading and replacing blobs
/// - [`FileBlobStore`](store::FileBlobStore): One JSON file per blob
/// - [`SqliteBlobStore`](store::SqliteBlobStore): SQLite `blobs` table
pub mod store;
