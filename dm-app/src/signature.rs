//! Webhook payload signature verification.
//!
//! The platform signs every delivery with HMAC-SHA256 over the exact bytes
//! it sent, carried as `x-hub-signature-256: sha256=<hex>`. Verification
//! must therefore run on the raw request body, before any JSON parsing — a
//! re-serialized body can differ in whitespace or key order and no longer
//! hashes to the signed digest.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SHA256_BLOCK_LEN: usize = 64;

/// Accept iff the header is present and its digest matches the body under
/// `app_secret`. Comparison is constant-time.
pub fn verify_hub_signature(headers: &HeaderMap, body: &[u8], app_secret: &str) -> bool {
    let Some(signature_header) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
    else {
        return false;
    };
    constant_time_eq(
        hub_signature_header(app_secret, body).as_bytes(),
        signature_header.as_bytes(),
    )
}

/// The full `sha256=<hex>` header value for a payload. Exposed so tooling
/// and tests can sign requests the same way the platform does.
pub fn hub_signature_header(app_secret: &str, body: &[u8]) -> String {
    format!("sha256={}", hmac_sha256_hex(app_secret.as_bytes(), body))
}

fn hmac_sha256_hex(key: &[u8], payload: &[u8]) -> String {
    // Keys longer than the block size are hashed down first, per RFC 2104.
    let mut key_block = [0_u8; SHA256_BLOCK_LEN];
    if key.len() > SHA256_BLOCK_LEN {
        let digest = Sha256::digest(key);
        key_block[..digest.len()].copy_from_slice(&digest);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut inner = Sha256::new();
    inner.update(key_block.map(|b| b ^ 0x36));
    inner.update(payload);

    let mut outer = Sha256::new();
    outer.update(key_block.map(|b| b ^ 0x5c));
    outer.update(inner.finalize());

    to_lower_hex(&outer.finalize())
}

fn to_lower_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(
        String::with_capacity(bytes.len() * 2),
        |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        },
    )
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    let mut diff = left.len() ^ right.len();
    for index in 0..left.len().max(right.len()) {
        let l = left.get(index).copied().unwrap_or(0);
        let r = right.get(index).copied().unwrap_or(0);
        diff |= usize::from(l ^ r);
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_signature(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            SIGNATURE_HEADER,
            HeaderValue::from_str(value).expect("signature header"),
        );
        headers
    }

    #[test]
    fn hmac_matches_known_sha256_vector() {
        let digest = hmac_sha256_hex(b"key", b"The quick brown fox jumps over the lazy dog");
        assert_eq!(
            digest,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn valid_signature_is_accepted() {
        let body = br#"{"object":"instagram","entry":[]}"#;
        let headers = headers_with_signature(&hub_signature_header("secret", body));
        assert!(verify_hub_signature(&headers, body, "secret"));
    }

    #[test]
    fn single_byte_body_mutation_is_rejected() {
        let body = br#"{"object":"instagram","entry":[]}"#.to_vec();
        let headers = headers_with_signature(&hub_signature_header("secret", &body));

        let mut tampered = body.clone();
        tampered[10] ^= 1;
        assert!(!verify_hub_signature(&headers, &tampered, "secret"));
    }

    #[test]
    fn signature_under_a_different_secret_is_rejected() {
        let body = br#"{"object":"instagram","entry":[]}"#;
        let headers = headers_with_signature(&hub_signature_header("other-secret", body));
        assert!(!verify_hub_signature(&headers, body, "secret"));
    }

    #[test]
    fn missing_or_malformed_header_is_rejected() {
        let body = b"payload";
        assert!(!verify_hub_signature(&HeaderMap::new(), body, "secret"));

        let headers = headers_with_signature("sha256=not-hex");
        assert!(!verify_hub_signature(&headers, body, "secret"));

        let headers = headers_with_signature("");
        assert!(!verify_hub_signature(&headers, body, "secret"));
    }

    #[test]
    fn long_keys_are_hashed_down_to_block_size() {
        let long_key = vec![0x61_u8; 100];
        let digest = hmac_sha256_hex(&long_key, b"payload");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn constant_time_eq_rejects_length_and_content_differences() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(constant_time_eq(b"", b""));
    }
}
