//! Content-derived identifiers.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `content`.
///
/// Used as the ID of data sources whose identity is their input.
pub fn content_id(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
