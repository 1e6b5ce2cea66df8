//! RSA-PSS authentication for the Kalshi API.
//!
//! Signature format: `RSA-PSS(SHA256, timestamp + method + path)` → base64.
//! The `path` must NOT include query parameters.

use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::{BlindedSigningKey, Signature};
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;

use common::Error;

/// Holds the API key id and the parsed RSA private key.
///
/// Constructed once at startup and handed to the REST and WebSocket
/// clients; there is no other credential state in the process.
#[derive(Clone)]
pub struct KalshiAuth {
    pub api_key: String,
    signing_key: BlindedSigningKey<Sha256>,
}

impl std::fmt::Debug for KalshiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiAuth")
            .field("api_key", &self.api_key)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

impl KalshiAuth {
    /// Create from raw API key and PEM-encoded private key string.
    ///
    /// The PEM string may contain literal `\n` (two chars) instead of real
    /// newlines — we normalise both forms.
    pub fn new(api_key: &str, pem_string: &str) -> Result<Self, Error> {
        let pem = pem_string.replace("\\n", "\n");
        let pem = pem.trim();

        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| Error::Auth(format!("Failed to parse RSA private key: {e}")))?;

        let signing_key = BlindedSigningKey::<Sha256>::new(private_key);

        Ok(Self {
            api_key: api_key.to_string(),
            signing_key,
        })
    }

    /// Sign a request, returning `(timestamp_ms_string, base64_signature)`.
    ///
    /// The message to sign is: `{timestamp}{METHOD}{path_without_query}`.
    pub fn sign_request(&self, method: &str, path: &str) -> (String, String) {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();

        // Strip query parameters.
        let path_clean = path.split('?').next().unwrap_or(path);

        let message = format!("{}{}{}", timestamp, method, path_clean);
        let mut rng = rand::thread_rng();
        let signature: Signature = self.signing_key.sign_with_rng(&mut rng, message.as_bytes());

        let sig_b64 = base64::engine::general_purpose::STANDARD.encode(signature.to_bytes());

        (timestamp, sig_b64)
    }

    /// Build an authenticated `reqwest::header::HeaderMap`.
    pub fn headers(&self, method: &str, path: &str) -> reqwest::header::HeaderMap {
        let (timestamp, signature) = self.sign_request(method, path);

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "KALSHI-ACCESS-KEY",
            self.api_key.parse().expect("invalid api key header"),
        );
        headers.insert(
            "KALSHI-ACCESS-TIMESTAMP",
            timestamp.parse().expect("invalid timestamp header"),
        );
        headers.insert(
            "KALSHI-ACCESS-SIGNATURE",
            signature.parse().expect("invalid signature header"),
        );
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_auth() -> KalshiAuth {
        // Generate a small test key (not for production — just structure test).
        let private_key =
            RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("keygen failed");
        let pem =
            rsa::pkcs1::EncodeRsaPrivateKey::to_pkcs1_pem(&private_key, rsa::pkcs1::LineEnding::LF)
                .expect("pem encode failed");
        KalshiAuth::new("test-key-id", pem.as_ref()).expect("auth init failed")
    }

    #[test]
    fn test_sign_request_format() {
        let auth = test_auth();

        let (ts, sig) = auth.sign_request("GET", "/trade-api/v2/portfolio/balance?foo=bar");

        // Timestamp should be numeric milliseconds.
        assert!(ts.parse::<i64>().is_ok(), "timestamp should be numeric");

        // Signature should be valid base64 and the RSA-2048 PSS length.
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&sig)
            .expect("signature should be valid base64");
        assert_eq!(decoded.len(), 256, "RSA-2048 PSS sig should be 256 bytes");
    }

    #[test]
    fn test_escaped_newlines_accepted() {
        let private_key =
            RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("keygen failed");
        let pem =
            rsa::pkcs1::EncodeRsaPrivateKey::to_pkcs1_pem(&private_key, rsa::pkcs1::LineEnding::LF)
                .expect("pem encode failed");

        // Simulate a key pasted into an env var with literal \n sequences.
        let escaped = pem.replace('\n', "\\n");
        assert!(KalshiAuth::new("test-key-id", &escaped).is_ok());
    }
}
