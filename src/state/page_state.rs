//! Per-page ledger records
//!
//! A [`PageState`] is the last known fingerprint of one documentation page,
//! keyed in the ledger by its canonical identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The last successful fetch of a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    /// Lowercase hex SHA-256 of the fetched body
    pub content_hash: String,

    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,

    /// Where the processor stored the page
    pub file_path: String,
}

impl PageState {
    /// Creates a record stamped with the current time
    pub fn new(content_hash: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            fetched_at: Utc::now(),
            file_path: file_path.into(),
        }
    }

    /// Returns true if `hash` equals the stored fingerprint
    pub fn matches(&self, hash: &str) -> bool {
        self.content_hash == hash
    }
}

/// Computes the content fingerprint of a body
///
/// # Example
///
/// ```
/// use sumi_harvest::state::content_hash;
///
/// assert_eq!(
///     content_hash(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
