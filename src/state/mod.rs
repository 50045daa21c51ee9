//! State module for incremental harvesting
//!
//! This module persists what previous runs fetched so that repeated runs
//! only process content that changed.
//!
//! # Components
//!
//! - `PageState`: The last known fingerprint of one page
//! - `Ledger`: Identity → `PageState` table plus the per-run seen-set

mod ledger;
mod page_state;

pub use ledger::Ledger;
pub use page_state::{content_hash, PageState};

use std::path::PathBuf;
use thiserror::Error;

/// Ledger persistence errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to read ledger {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt ledger {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write ledger {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },

    #[error("Ledger operation cancelled")]
    Cancelled,
}
