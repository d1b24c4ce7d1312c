//! Bearer-token request validation.
//!
//! The token is read from the configured env var once at startup and kept
//! only as a SHA-256 hash; requests are checked with a constant-time
//! comparison. No token configured = dev mode, everything passes.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hash the API token from the environment, if set and non-empty.
pub fn token_hash_from_env(var: &str) -> Option<Vec<u8>> {
    match std::env::var(var) {
        Ok(token) if !token.is_empty() => Some(Sha256::digest(token.as_bytes()).to_vec()),
        _ => None,
    }
}

fn token_matches(provided: &str, expected_hash: &[u8]) -> bool {
    let provided_hash = Sha256::digest(provided.as_bytes());
    provided_hash.as_slice().ct_eq(expected_hash).into()
}

/// Validate a request against the startup token hash.
///
/// Accepts `Authorization: Bearer <token>`; `query_token` covers WebSocket
/// clients that cannot set headers.
pub fn validate_request(
    headers: &HeaderMap,
    query_token: Option<&str>,
    expected_hash: Option<&[u8]>,
) -> bool {
    let Some(expected) = expected_hash else {
        return true; // dev mode
    };

    let header_token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match header_token.or(query_token) {
        Some(token) => token_matches(token, expected),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(token: &str) -> Vec<u8> {
        Sha256::digest(token.as_bytes()).to_vec()
    }

    #[test]
    fn dev_mode_passes_everything() {
        let headers = HeaderMap::new();
        assert!(validate_request(&headers, None, None));
    }

    #[test]
    fn bearer_header_validates() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer sesame".parse().unwrap());
        let expected = hash("sesame");
        assert!(validate_request(&headers, None, Some(&expected)));

        headers.insert("authorization", "Bearer wrong".parse().unwrap());
        assert!(!validate_request(&headers, None, Some(&expected)));
    }

    #[test]
    fn query_token_covers_websocket_clients() {
        let headers = HeaderMap::new();
        let expected = hash("sesame");
        assert!(validate_request(&headers, Some("sesame"), Some(&expected)));
        assert!(!validate_request(&headers, Some("nope"), Some(&expected)));
        assert!(!validate_request(&headers, None, Some(&expected)));
    }
}
