use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A browser push subscription as produced by `PushManager.subscribe()`.
///
/// Fields other than `endpoint` and `keys` (e.g. `expirationTime`) are kept
/// verbatim so the persisted record round-trips what the browser sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

impl Subscription {
    pub fn new(endpoint: impl Into<String>, p256dh: impl Into<String>, auth: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: SubscriptionKeys {
                p256dh: p256dh.into(),
                auth: auth.into(),
            },
            extra: BTreeMap::new(),
        }
    }
}

// Identity is the endpoint; a re-subscribe with rotated keys is the same target.
impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
    }
}

impl Eq for Subscription {}

#[cfg(test)]
mod tests {
    use super::*;

    const BROWSER_JSON: &str = r#"{
        "endpoint": "https://fcm.googleapis.com/fcm/send/abc",
        "expirationTime": null,
        "keys": { "p256dh": "BPub", "auth": "secret" }
    }"#;

    #[test]
    fn test_deserialize_browser_subscription() {
        let sub: Subscription = serde_json::from_str(BROWSER_JSON).unwrap();
        assert_eq!(sub.endpoint, "https://fcm.googleapis.com/fcm/send/abc");
        assert_eq!(sub.keys.p256dh, "BPub");
        assert_eq!(sub.keys.auth, "secret");
        assert!(sub.extra.contains_key("expirationTime"));
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let sub: Subscription = serde_json::from_str(BROWSER_JSON).unwrap();
        let value = serde_json::to_value(&sub).unwrap();
        assert_eq!(value["expirationTime"], serde_json::Value::Null);
        assert_eq!(value["keys"]["auth"], "secret");
    }

    #[test]
    fn test_equality_is_by_endpoint() {
        let a = Subscription::new("https://push.example/1", "k1", "a1");
        let b = Subscription::new("https://push.example/1", "k2", "a2");
        let c = Subscription::new("https://push.example/2", "k1", "a1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
