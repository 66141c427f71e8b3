//! Content hashing for uploaded and stored archives.

use sha2::{Digest, Sha256};

/// Lower-case hex sha256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}

/// Exact comparison against a caller supplied lower-case hex digest.
pub fn verify(bytes: &[u8], claimed: &str) -> bool {
  digest(bytes) == claimed
}

/// Whether `s` has the shape of a lower-case hex sha256 digest.
pub fn is_digest(s: &str) -> bool {
  s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
