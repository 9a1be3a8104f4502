//! HTTP API for browsers and manual triggers.
//!
//! Routing lives in [`Api`], which is async and transport-free. [`HttpServer`]
//! owns the tiny_http listener and drives requests through the API on a
//! blocking thread.

mod response;

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use tiny_http::{Method, Server};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::app::{NotifierError, Result};
use crate::detector::ChangeDetector;
use crate::domain::Subscription;
use crate::registry::SubscriptionRegistry;

pub use response::Reply;

/// Upper bound on request bodies; subscriptions are well under 1 KiB.
pub const MAX_BODY_BYTES: u64 = 16 * 1024;

const KNOWN_PATHS: [&str; 5] = [
    "/update_hashes",
    "/update_subscriptions",
    "/vapidPublicKey",
    "/register",
    "/unregister",
];

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    subscription: Subscription,
    #[serde(alias = "razred")]
    topic: String,
}

#[derive(Debug, Deserialize)]
struct UnregisterRequest {
    subscription: EndpointRef,
    #[serde(alias = "razred")]
    topic: String,
}

#[derive(Debug, Deserialize)]
struct EndpointRef {
    endpoint: String,
}

pub struct Api {
    registry: Arc<SubscriptionRegistry>,
    detector: Arc<ChangeDetector>,
    public_key: String,
}

impl Api {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        detector: Arc<ChangeDetector>,
        public_key: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            detector,
            public_key: public_key.into(),
        }
    }

    pub async fn handle(&self, method: &Method, url: &str, body: &[u8]) -> Reply {
        let path = url.split('?').next().unwrap_or(url);

        match (method, path) {
            (Method::Options, _) => Reply::no_content(),
            (Method::Get, "/update_hashes") => {
                self.detector.trigger(false);
                Reply::status(200)
            }
            (Method::Get, "/update_subscriptions") => {
                self.detector.trigger(true);
                Reply::status(200)
            }
            (Method::Get, "/vapidPublicKey") => Reply::text(200, self.public_key.clone()),
            (Method::Post, "/register") => self.register(body).await,
            (Method::Post, "/unregister") => self.unregister(body).await,
            (_, path) if KNOWN_PATHS.contains(&path) => Reply::status(405),
            _ => Reply::status(404),
        }
    }

    async fn register(&self, body: &[u8]) -> Reply {
        let request: RegisterRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => return Reply::text(400, format!("malformed register body: {}", e)),
        };

        let endpoint = request.subscription.endpoint.clone();
        match self.registry.register(&request.topic, request.subscription).await {
            Ok(()) => {
                tracing::info!(topic = %request.topic, %endpoint, "subscribed");
                Reply::status(201)
            }
            Err(rejection) => {
                tracing::debug!(topic = %request.topic, %endpoint, %rejection, "register rejected");
                Reply::status(422)
            }
        }
    }

    async fn unregister(&self, body: &[u8]) -> Reply {
        let request: UnregisterRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => return Reply::text(400, format!("malformed unregister body: {}", e)),
        };

        let endpoint = request.subscription.endpoint;
        match self.registry.unregister(&request.topic, &endpoint).await {
            Ok(removed) => {
                if removed {
                    tracing::info!(topic = %request.topic, %endpoint, "unsubscribed");
                }
                Reply::status(201)
            }
            Err(rejection) => {
                tracing::debug!(topic = %request.topic, %endpoint, %rejection, "unregister rejected");
                Reply::status(422)
            }
        }
    }
}

/// Bound listener, ready to serve.
pub struct HttpServer {
    server: Arc<Server>,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn bind(addr: &str) -> Result<Self> {
        let server = Server::http(addr)
            .map_err(|e| NotifierError::Other(format!("cannot bind {}: {}", addr, e)))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| NotifierError::Other(format!("{} is not an IP address", addr)))?;
        tracing::info!(%addr, "listening");
        Ok(Self {
            server: Arc::new(server),
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle to stop the request loop from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.server))
    }

    /// Run the request loop on a blocking thread until shut down.
    pub fn spawn(self, api: Arc<Api>, allowed_origin: String) -> JoinHandle<()> {
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || {
            for mut request in self.server.incoming_requests() {
                let mut body = Vec::new();
                let read = request
                    .as_reader()
                    .take(MAX_BODY_BYTES + 1)
                    .read_to_end(&mut body);

                let reply = match read {
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read request body");
                        Reply::status(400)
                    }
                    Ok(_) if body.len() as u64 > MAX_BODY_BYTES => Reply::status(413),
                    Ok(_) => handle.block_on(api.handle(request.method(), request.url(), &body)),
                };

                tracing::debug!(method = %request.method(), url = request.url(), status = reply.status, "request");
                if let Err(e) = response::respond(request, reply, &allowed_origin) {
                    tracing::warn!(error = %e, "failed to send response");
                }
            }
            tracing::info!("http server stopped");
        })
    }
}

#[derive(Clone)]
pub struct ShutdownHandle(Arc<Server>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.unblock();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;
    use crate::detector::DetectorSettings;
    use crate::fetcher::Fetcher;
    use crate::fingerprint::FingerprintStore;
    use crate::normalizer::Normalizer;
    use crate::push::DisabledDispatcher;
    use crate::store::{MemoryBlobStore, SharedBlobStore};

    struct NoFetch;

    #[async_trait]
    impl Fetcher for NoFetch {
        async fn fetch(&self, url: &str) -> Result<String> {
            Err(NotifierError::Other(format!("offline: {}", url)))
        }
    }

    fn api() -> (Api, Arc<SubscriptionRegistry>) {
        let blobs: SharedBlobStore = Arc::new(MemoryBlobStore::new());
        let fingerprints = Arc::new(FingerprintStore::with_hashes(blobs.clone(), BTreeMap::new()));
        let registry = Arc::new(SubscriptionRegistry::empty(blobs, ["3A", "3B"]));
        let detector = Arc::new(ChangeDetector::new(
            Arc::new(NoFetch),
            Arc::new(DisabledDispatcher),
            Normalizer::new(),
            fingerprints,
            registry.clone(),
            DetectorSettings::default(),
        ));
        (Api::new(registry.clone(), detector, "BPublicKey"), registry)
    }

    fn register_body(topic_field: &str, topic: &str, endpoint: &str) -> Vec<u8> {
        let mut body = serde_json::json!({
            "subscription": {
                "endpoint": endpoint,
                "expirationTime": null,
                "keys": { "p256dh": "BPub", "auth": "secret" }
            }
        });
        body[topic_field] = serde_json::Value::from(topic);
        body.to_string().into_bytes()
    }

    #[tokio::test]
    async fn test_vapid_public_key() {
        let (api, _) = api();
        let reply = api.handle(&Method::Get, "/vapidPublicKey", b"").await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, "BPublicKey");
        assert!(reply.content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let (api, registry) = api();
        let body = register_body("topic", "3A", "https://push.example/1");

        let first = api.handle(&Method::Post, "/register", &body).await;
        assert_eq!(first.status, 201);
        let second = api.handle(&Method::Post, "/register", &body).await;
        assert_eq!(second.status, 422);

        assert_eq!(registry.list_subscribers("3A").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_accepts_razred_alias() {
        let (api, registry) = api();
        let body = register_body("razred", "3B", "https://push.example/2");
        let reply = api.handle(&Method::Post, "/register", &body).await;
        assert_eq!(reply.status, 201);
        assert_eq!(registry.list_subscribers("3B").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_unknown_topic() {
        let (api, _) = api();
        let body = register_body("topic", "9Z", "https://push.example/1");
        let reply = api.handle(&Method::Post, "/register", &body).await;
        assert_eq!(reply.status, 422);
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let (api, _) = api();
        let reply = api.handle(&Method::Post, "/register", b"{ nope").await;
        assert_eq!(reply.status, 400);
        let reply = api
            .handle(&Method::Post, "/unregister", br#"{"topic":"3A"}"#)
            .await;
        assert_eq!(reply.status, 400);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let (api, registry) = api();
        let body = register_body("topic", "3A", "https://push.example/1");
        api.handle(&Method::Post, "/register", &body).await;

        let unregister = br#"{"subscription":{"endpoint":"https://push.example/1"},"topic":"3A"}"#;
        let first = api.handle(&Method::Post, "/unregister", unregister).await;
        assert_eq!(first.status, 201);
        let second = api.handle(&Method::Post, "/unregister", unregister).await;
        assert_eq!(second.status, 201);
        assert!(registry.list_subscribers("3A").await.unwrap().is_empty());

        let unknown = br#"{"subscription":{"endpoint":"https://push.example/1"},"topic":"9Z"}"#;
        let reply = api.handle(&Method::Post, "/unregister", unknown).await;
        assert_eq!(reply.status, 422);
    }

    #[tokio::test]
    async fn test_triggers_respond_immediately() {
        let (api, _) = api();
        let reply = api.handle(&Method::Get, "/update_hashes", b"").await;
        assert_eq!(reply.status, 200);
        let reply = api.handle(&Method::Get, "/update_subscriptions?x=1", b"").await;
        assert_eq!(reply.status, 200);
    }

    #[tokio::test]
    async fn test_unknown_path_and_wrong_method() {
        let (api, _) = api();
        assert_eq!(api.handle(&Method::Get, "/nope", b"").await.status, 404);
        assert_eq!(api.handle(&Method::Get, "/register", b"").await.status, 405);
        assert_eq!(api.handle(&Method::Options, "/register", b"").await.status, 204);
    }
}
