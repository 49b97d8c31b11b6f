//! Client identity derivation.
//!
//! Identities are map keys for admission control, nothing more: presented
//! credentials are hashed and truncated so they are never held or logged in
//! clear form.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

/// Derive the rate-limiting identity for a request.
///
/// Precedence: hashed `X-API-Key`, then the first `X-Forwarded-For` entry,
/// then the peer address.
pub fn client_identity(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(api_key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        if !api_key.is_empty() {
            let digest = Sha256::digest(api_key.as_bytes());
            let hex = format!("{digest:x}");
            return hex[..16].to_string();
        }
    }

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.0.0.1:55555".parse().unwrap()
    }

    #[test]
    fn api_key_is_hashed_and_truncated() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret-key"));

        let id = client_identity(&headers, peer());
        assert_eq!(id.len(), 16);
        assert!(!id.contains("secret"));
        // Deterministic for the same credential.
        assert_eq!(id, client_identity(&headers, peer()));
    }

    #[test]
    fn forwarded_for_takes_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.2"),
        );

        assert_eq!(client_identity(&headers, peer()), "203.0.113.7");
    }

    #[test]
    fn falls_back_to_peer_ip() {
        assert_eq!(client_identity(&HeaderMap::new(), peer()), "10.0.0.1");
    }

    #[test]
    fn api_key_outranks_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("k"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));

        assert_ne!(client_identity(&headers, peer()), "203.0.113.7");
    }
}
