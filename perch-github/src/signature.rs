//! Webhook signature verification
//!
//! GitHub signs each delivery with HMAC-SHA256 over the raw body and
//! sends the result in `X-Hub-Signature-256` as `sha256=<hex>`.
//! Verification must run on the exact bytes received, before any JSON
//! parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a webhook delivery signature
///
/// Comparison happens inside the Mac verifier, which is constant-time.
/// Returns false for a missing prefix, bad hex, or a mismatch.
pub fn verify_signature(body: &[u8], signature_header: &str, secret: &str) -> bool {
    let Some(hex_digest) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Compute the signature header value for a body
///
/// Used by tests and by outbound tooling that replays deliveries.
pub fn compute_signature(body: &[u8], secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length; unreachable in practice
        Err(_) => return String::from("sha256="),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
