//! Integrity: SHA-256 trailer sealing persisted snapshots, verified on load.

use sha2::{Digest, Sha256};

pub const DIGEST_LEN: usize = 32;

/// Hash a byte string. Returns 32-byte digest.
pub fn digest(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Append the digest of `body` to a copy of it.
pub fn seal(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + DIGEST_LEN);
    out.extend_from_slice(body);
    out.extend_from_slice(&digest(body));
    out
}

/// Split a sealed buffer and verify it. Returns the body, or None if truncated or tampered.
pub fn unseal(sealed: &[u8]) -> Option<&[u8]> {
    let split = sealed.len().checked_sub(DIGEST_LEN)?;
    let (body, trailer) = sealed.split_at(split);
    (digest(body) == trailer).then_some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_unseal() {
        let sealed = seal(b"node table");
        assert_eq!(sealed.len(), 10 + DIGEST_LEN);
        assert_eq!(unseal(&sealed), Some(&b"node table"[..]));
    }

    #[test]
    fn rejects_tampered() {
        let mut sealed = seal(b"node table");
        sealed[0] ^= 0x01;
        assert_eq!(unseal(&sealed), None);
    }

    #[test]
    fn rejects_truncated() {
        assert_eq!(unseal(&[0u8; 5]), None);
        let sealed = seal(b"");
        assert_eq!(unseal(&sealed), Some(&b""[..]));
    }
}
