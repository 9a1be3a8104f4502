use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, Response};

use timetable_notifier::app::{NotifierError, Result};
use timetable_notifier::detector::{ChangeDetector, DetectorSettings};
use timetable_notifier::fetcher::Fetcher;
use timetable_notifier::fingerprint::FingerprintStore;
use timetable_notifier::normalizer::Normalizer;
use timetable_notifier::push::DisabledDispatcher;
use timetable_notifier::registry::SubscriptionRegistry;
use timetable_notifier::server::{Api, HttpServer};
use timetable_notifier::store::{MemoryBlobStore, SharedBlobStore};

const ORIGIN: &str = "https://raspored.example";

struct Offline;

#[async_trait]
impl Fetcher for Offline {
    async fn fetch(&self, url: &str) -> Result<String> {
        Err(NotifierError::Other(format!("offline: {}", url)))
    }
}

fn api() -> Api {
    let blobs: SharedBlobStore = Arc::new(MemoryBlobStore::new());
    let fingerprints = Arc::new(FingerprintStore::with_hashes(blobs.clone(), BTreeMap::new()));
    let registry = Arc::new(SubscriptionRegistry::empty(blobs, ["3A"]));
    let detector = Arc::new(ChangeDetector::new(
        Arc::new(Offline),
        Arc::new(DisabledDispatcher),
        Normalizer::new(),
        fingerprints,
        registry.clone(),
        DetectorSettings::default(),
    ));
    Api::new(registry, detector, "BPublicKey")
}

fn assert_cors(response: &Response) {
    let headers = response.headers();
    assert_eq!(
        headers.get("access-control-allow-origin").unwrap(),
        ORIGIN,
        "missing origin on {}",
        response.url()
    );
    assert_eq!(
        headers.get("access-control-allow-headers").unwrap(),
        "Origin, X-Requested-With, Content-Type, Accept"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_every_response_carries_cors_headers() {
    let server = HttpServer::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", server.addr());
    let stop = server.shutdown_handle();
    let task = server.spawn(Arc::new(api()), ORIGIN.to_string());
    let client = reqwest::Client::new();

    let key = client
        .get(format!("{}/vapidPublicKey", base))
        .send()
        .await
        .unwrap();
    assert_eq!(key.status(), 200);
    assert_cors(&key);
    assert_eq!(key.text().await.unwrap(), "BPublicKey");

    let preflight = client
        .request(Method::OPTIONS, format!("{}/register", base))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), 204);
    assert_cors(&preflight);

    let register = client
        .post(format!("{}/register", base))
        .body(
            r#"{"subscription": {"endpoint": "https://push.example/1", "keys": {"p256dh": "BPub", "auth": "secret"}}, "razred": "3A"}"#,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(register.status(), 201);
    assert_cors(&register);

    let missing = client.get(format!("{}/nope", base)).send().await.unwrap();
    assert_eq!(missing.status(), 404);
    assert_cors(&missing);

    stop.shutdown();
    task.await.unwrap();
}
