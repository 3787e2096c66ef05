//! Content fingerprints for dedup and create-echo matching
//!
//! A fingerprint is the BLAKE3 hash of *normalized* idea content. Two
//! submissions that differ only in case or whitespace are the same idea as
//! far as duplicate detection is concerned, so normalization happens before
//! hashing, once, here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// BLAKE3 digest of normalized idea content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a piece of idea content.
    pub fn of_content(content: &str) -> Self {
        let normalized = normalize(content);
        Self(*blake3::hash(normalized.as_bytes()).as_bytes())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough for log correlation
        write!(f, "{}", &hex::encode(self.0)[..12])
    }
}

/// Lowercase, trim, and collapse internal whitespace runs to single spaces.
fn normalize(content: &str) -> String {
    content
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
