//! Canonical signature text.
//!
//! Two signatures that differ only in line-ending style must hash the same.

use sha2::{Digest, Sha256};

/// Collapse CRLF line endings into LF.
///
/// Both raw `\r\n` characters and the JSON-escaped `\\r\\n` sequence found
/// inside signature string values are rewritten.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace(r"\r\n", r"\n")
}

/// Compute SHA256 hash of content.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}
