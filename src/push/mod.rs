//! Push delivery to browser subscriptions.
//!
//! - [`Dispatcher`]: one delivery attempt to one subscription
//! - [`WebPushDispatcher`](webpush::WebPushDispatcher): Web Push (RFC 8030) with VAPID
//! - [`VapidKeys`](vapid::VapidKeys): application server key pair

pub mod vapid;
pub mod webpush;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Subscription;

pub use vapid::VapidKeys;
pub use webpush::WebPushDispatcher;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The push service no longer knows this endpoint (HTTP 404/410).
    #[error("endpoint gone: {0}")]
    Gone(String),

    #[error("push rejected: {0}")]
    Rejected(String),
}

impl DispatchError {
    pub fn is_gone(&self) -> bool {
        matches!(self, DispatchError::Gone(_))
    }
}

#[async_trait]
pub trait Dispatcher {
    async fn dispatch(&self, subscription: &Subscription, message: &str) -> Result<(), DispatchError>;
}

/// Used when no VAPID keys are configured; every attempt fails.
pub struct DisabledDispatcher;

#[async_trait]
impl Dispatcher for DisabledDispatcher {
    async fn dispatch(&self, _subscription: &Subscription, _message: &str) -> Result<(), DispatchError> {
        Err(DispatchError::Rejected(
            "push delivery is not configured".to_string(),
        ))
    }
}
