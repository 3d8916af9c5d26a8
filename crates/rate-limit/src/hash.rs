//! Deterministic, non-reversible API key fingerprinting (spec.md §3:
//! "Key hash").

use sha2::{Digest, Sha256};

/// Hash a raw API key into its durable, non-secret identifier.
///
/// Used as the sole identifier for a key in storage, logs, and the
/// blacklist. Never reversed back to the raw key (spec.md §8: "Secret
/// hygiene").
pub fn key_hash(raw_key: &str) -> String {
    let digest = Sha256::digest(raw_key.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::key_hash;

    #[test]
    fn is_deterministic() {
        assert_eq!(key_hash("my-secret-key"), key_hash("my-secret-key"));
    }

    #[test]
    fn differs_by_input() {
        assert_ne!(key_hash("key-a"), key_hash("key-b"));
    }

    #[test]
    fn never_contains_the_raw_key() {
        let hash = key_hash("AIzaSyExampleRawKey");
        assert!(!hash.contains("AIza"));
        assert_eq!(hash.len(), 64);
    }
}
