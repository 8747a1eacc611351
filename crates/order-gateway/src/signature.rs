//! # Webhook Signature Verification
//!
//! The provider signs `"{webhook-id}.{webhook-timestamp}.{raw body}"` with
//! HMAC-SHA256 and sends the base64 digest in `webhook-signature`. The
//! header may carry several space-separated candidates, each optionally
//! prefixed with a version (`v1,<sig>`); any match is accepted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use order_core::{OrderError, OrderResult};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const WEBHOOK_ID_HEADER: &str = "webhook-id";
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "webhook-timestamp";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "webhook-signature";

const SECRET_PREFIX: &str = "whsec_";

/// The three signing headers, as received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub id: Option<String>,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
}

impl WebhookHeaders {
    /// Pick the signing headers out of arbitrary name/value pairs (names are
    /// matched case-insensitively)
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut headers = Self::default();
        for (name, value) in pairs {
            let value = Some(value.to_string());
            match name.to_ascii_lowercase().as_str() {
                WEBHOOK_ID_HEADER => headers.id = value,
                WEBHOOK_TIMESTAMP_HEADER => headers.timestamp = value,
                WEBHOOK_SIGNATURE_HEADER => headers.signature = value,
                _ => {}
            }
        }
        headers
    }
}

/// Verifies webhook signatures against the shared secret
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Vec<u8>,
    tolerance_secs: u64,
}

impl WebhookVerifier {
    /// `whsec_`-prefixed secrets carry a base64 key; anything else is used
    /// as raw bytes.
    pub fn new(secret: &str, tolerance_secs: u64) -> Self {
        let key = secret
            .strip_prefix(SECRET_PREFIX)
            .and_then(|encoded| STANDARD.decode(encoded).ok())
            .unwrap_or_else(|| secret.as_bytes().to_vec());
        Self {
            key,
            tolerance_secs,
        }
    }

    pub fn verify(&self, headers: &WebhookHeaders, body: &[u8]) -> OrderResult<()> {
        self.verify_at(headers, body, Utc::now().timestamp())
    }

    /// Verify against an explicit clock (unix seconds)
    pub fn verify_at(&self, headers: &WebhookHeaders, body: &[u8], now: i64) -> OrderResult<()> {
        let id = required(&headers.id, WEBHOOK_ID_HEADER)?;
        let timestamp = required(&headers.timestamp, WEBHOOK_TIMESTAMP_HEADER)?;
        let signature = required(&headers.signature, WEBHOOK_SIGNATURE_HEADER)?;

        let sent_at: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| OrderError::Security("malformed webhook timestamp".to_string()))?;
        // The timestamp is attacker-controlled; abs_diff cannot overflow.
        if now.abs_diff(sent_at) > self.tolerance_secs {
            return Err(OrderError::Security(
                "webhook timestamp outside tolerance".to_string(),
            ));
        }

        let matched = signature
            .split_whitespace()
            .filter_map(|candidate| {
                let encoded = match candidate.split_once(',') {
                    Some((_version, sig)) => sig,
                    None => candidate,
                };
                STANDARD.decode(encoded).ok()
            })
            .any(|candidate| {
                // verify_slice compares in constant time
                self.mac(id, timestamp, body).verify_slice(&candidate).is_ok()
            });

        if matched {
            Ok(())
        } else {
            Err(OrderError::Security("webhook signature mismatch".to_string()))
        }
    }

    /// Base64 signature for a delivery, as the provider would compute it
    pub fn sign(&self, id: &str, timestamp: i64, body: &[u8]) -> String {
        let mac = self.mac(id, &timestamp.to_string(), body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    fn mac(&self, id: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
        let mut mac =
            <HmacSha256 as Mac>::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> OrderResult<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OrderError::Security(format!("missing {} header", name)))
}
