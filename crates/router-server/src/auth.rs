//! Inbound authentication.
//!
//! Every POST carries the router token in either `Authorization: Bearer`
//! or `x-api-key`; the two are equally accepted. Presented and configured
//! keys are compared as SHA-256 digests folded byte-for-byte, so neither
//! key length nor early mismatches leak through timing.

use axum::http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

/// Extract the presented token, Bearer first, then `x-api-key`.
fn presented_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim());
        }
    }
    headers.get("x-api-key").and_then(|v| v.to_str().ok())
}

fn digest(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Whether the request carries the configured router token.
#[must_use]
pub fn authorized(headers: &HeaderMap, expected: &SecretString) -> bool {
    match presented_token(headers) {
        Some(token) => constant_time_eq(&digest(token), &digest(expected.expose_secret())),
        None => false,
    }
}
