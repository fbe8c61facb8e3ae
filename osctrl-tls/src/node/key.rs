use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::store::NodeKey;

/// Deterministic-shaped but unpredictable node key: a hex-encoded SHA-256 of
/// the host identifier, the current Unix-nanosecond timestamp and a random
/// v4 UUID. The timestamp and host identifier give it a deterministic shape
/// for debugging; the UUID is what makes it unguessable.
pub fn generate(host_identifier: &str) -> NodeKey {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let nonce = Uuid::new_v4();

    let mut hasher = Sha256::new();
    hasher.update(host_identifier.as_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(nonce.as_bytes());

    NodeKey(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_not_reused_for_the_same_host() {
        let a = generate("HOST-1");
        let b = generate("HOST-1");
        assert_ne!(a, b);
    }

    #[test]
    fn key_is_hex_of_a_sha256_digest() {
        let key = generate("HOST-1");
        assert_eq!(key.0.len(), 64);
        assert!(key.0.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
