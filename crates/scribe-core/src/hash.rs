use sha2::{Digest, Sha256};

/// SHA-256 hex digest over a sequence of string parts.
///
/// Each part is preceded by its byte length so that `["ab", "c"]` and
/// `["a", "bc"]` never collide.
pub fn sha256_hex<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
