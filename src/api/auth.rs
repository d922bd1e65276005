//! API credentials and HMAC-SHA256 request signing.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// API credentials for signed endpoints.
///
/// The secret is held in a `SecretString` so it never shows up in Debug
/// output and is zeroed on drop.
#[derive(Clone)]
pub struct ApiCredentials {
    api_key: String,
    secret_key: SecretString,
}

impl ApiCredentials {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key: SecretString::from(secret_key),
        }
    }

    /// Get the API key (public, safe to log).
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Hex-encoded HMAC-SHA256 of `message` keyed with the secret
    pub fn sign(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.expose_secret().as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Append `timestamp`, `recvWindow` and the signature to ordered params
    pub fn signed_query(&self, params: &[(&str, String)], timestamp_ms: i64, recv_window_ms: u64) -> String {
        let mut parts: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        parts.push(format!("recvWindow={}", recv_window_ms));
        parts.push(format!("timestamp={}", timestamp_ms));

        let query = parts.join("&");
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}
