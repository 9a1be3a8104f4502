use async_trait::async_trait;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessage, WebPushMessageBuilder,
};

use crate::app::{NotifierError, Result};
use crate::domain::Subscription;
use crate::push::{DispatchError, Dispatcher, VapidKeys};

pub const DEFAULT_TTL_SECS: u32 = 24 * 3600;

pub struct WebPushDispatcher {
    client: IsahcWebPushClient,
    keys: VapidKeys,
    subject: String,
    ttl: u32,
}

impl WebPushDispatcher {
    /// `subject` is the VAPID `sub` claim: a `mailto:` or `https:` URL the
    /// push service can use to contact the operator.
    pub fn new(keys: VapidKeys, subject: impl Into<String>, ttl: u32) -> Result<Self> {
        keys.validate()?;
        let client = IsahcWebPushClient::new()
            .map_err(|e| NotifierError::Push(format!("failed to build push client: {}", e)))?;

        Ok(Self {
            client,
            keys,
            subject: subject.into(),
            ttl,
        })
    }

    fn build_message(
        &self,
        subscription: &Subscription,
        message: &str,
    ) -> std::result::Result<WebPushMessage, WebPushError> {
        let info = SubscriptionInfo::new(
            &subscription.endpoint,
            &subscription.keys.p256dh,
            &subscription.keys.auth,
        );

        let mut signature =
            VapidSignatureBuilder::from_base64(&self.keys.private_key, web_push::URL_SAFE_NO_PAD, &info)?;
        signature.add_claim("sub", self.subject.as_str());

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_ttl(self.ttl);
        builder.set_payload(ContentEncoding::Aes128Gcm, message.as_bytes());
        builder.set_vapid_signature(signature.build()?);
        builder.build()
    }
}

fn classify(endpoint: &str, error: WebPushError) -> DispatchError {
    match error {
        WebPushError::EndpointNotValid { .. } | WebPushError::EndpointNotFound { .. } => {
            DispatchError::Gone(endpoint.to_string())
        }
        other => DispatchError::Rejected(other.to_string()),
    }
}

#[async_trait]
impl Dispatcher for WebPushDispatcher {
    async fn dispatch(&self, subscription: &Subscription, message: &str) -> std::result::Result<(), DispatchError> {
        let push = self
            .build_message(subscription, message)
            .map_err(|e| classify(&subscription.endpoint, e))?;

        self.client
            .send(push)
            .await
            .map_err(|e| classify(&subscription.endpoint, e))
    }
}
