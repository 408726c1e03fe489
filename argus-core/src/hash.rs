//! Content hashing for evidence integrity and analysis caching

use sha2::{Digest, Sha256};

/// SHA-256 of a raw payload, lowercase hex.
pub fn hash_payload(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let a = hash_payload(b"93.184.216.34");
        let b = hash_payload(b"93.184.216.34");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_detects_change() {
        assert_ne!(hash_payload(b"payload"), hash_payload(b"payload "));
    }
}
