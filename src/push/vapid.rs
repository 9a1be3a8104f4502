use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::SecretKey;
use rand_core::OsRng;

use crate::app::{NotifierError, Result};

pub const PUBLIC_KEY_ENV: &str = "VAPID_PUBLIC_KEY";
pub const PRIVATE_KEY_ENV: &str = "VAPID_PRIVATE_KEY";

/// VAPID application server keys, URL-safe base64 without padding.
///
/// `public_key` is the uncompressed P-256 point handed to browsers;
/// `private_key` is the raw 32-byte scalar used to sign push requests.
#[derive(Clone, PartialEq, Eq)]
pub struct VapidKeys {
    pub public_key: String,
    pub private_key: String,
}

impl VapidKeys {
    pub fn new(public_key: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: private_key.into(),
        }
    }

    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(false);
        Self {
            public_key: URL_SAFE_NO_PAD.encode(public.as_bytes()),
            private_key: URL_SAFE_NO_PAD.encode(secret.to_bytes()),
        }
    }

    /// Check that the private key is a valid P-256 scalar and that it
    /// derives the configured public key.
    pub fn validate(&self) -> Result<()> {
        let secret_bytes = decode(&self.private_key, "private")?;
        let secret = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| NotifierError::Push(format!("invalid VAPID private key: {}", e)))?;

        let public_bytes = decode(&self.public_key, "public")?;
        let derived = secret.public_key().to_encoded_point(false);
        if derived.as_bytes() != public_bytes.as_slice() {
            return Err(NotifierError::Push(
                "VAPID public key does not match the private key".to_string(),
            ));
        }
        Ok(())
    }
}

fn decode(value: &str, which: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value.trim().trim_end_matches('='))
        .map_err(|e| NotifierError::Push(format!("VAPID {} key is not base64url: {}", which, e)))
}

// Keep the private key out of logs.
impl fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
