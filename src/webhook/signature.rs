//! HMAC-SHA256 verification of deploy webhook bodies.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Headers checked for a signature, in order of preference.
pub const SIGNATURE_HEADERS: [&str; 4] = [
    "x-webhook-signature",
    "x-hub-signature-256",
    "x-vercel-signature",
    "x-webhook-secret",
];

/// First signature header present on the request.
pub fn signature_from_headers(headers: &HeaderMap) -> Option<&str> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
}

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`.
pub fn sign(payload: &[u8], secret: &str) -> String {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Check `signature` (hex, optionally `sha256=`-prefixed) against `payload`.
///
/// The comparison is constant time; malformed hex is simply a mismatch.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(expected) = hex::decode(sig.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
