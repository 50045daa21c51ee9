//! Processor seam and associated data structures
//!
//! A [`Processor`] receives every leaf whose content changed since the last
//! run. What it does with the body (conversion, layout, metadata) is its own
//! business; the harvest core only needs the path it stored the result at.

use crate::cancel::CancelToken;
use crate::HarvestError;
use async_trait::async_trait;

/// A fetched leaf handed to the processor
#[derive(Debug, Clone)]
pub struct LeafDocument {
    /// Canonical identity
    pub id: String,

    /// Locator the body was fetched from
    pub url: String,

    /// Content type reported by the server
    pub content_type: Option<String>,

    /// Raw response body
    pub body: Vec<u8>,

    /// Hex SHA-256 of `body`
    pub content_hash: String,

    /// Modification time advertised by the manifest
    pub last_modified: Option<String>,
}

/// Result of processing one leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedOutput {
    /// Where the processed document was stored, recorded in the ledger
    pub file_path: String,
}

/// Per-leaf processing callback
#[async_trait]
pub trait Processor: Send + Sync {
    /// Processes one changed leaf
    ///
    /// Errors are isolated to the leaf; the run carries on with the others.
    async fn process(
        &self,
        cancel: &CancelToken,
        doc: &LeafDocument,
    ) -> Result<ProcessedOutput, HarvestError>;
}
