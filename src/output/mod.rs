//! Output module for processed leaves and run reports
//!
//! This module handles:
//! - The [`Processor`] seam invoked for every changed leaf
//! - Storing raw leaf bodies on disk ([`FileSink`])
//! - Recording and printing run statistics

mod file_sink;
pub mod stats;
mod traits;

pub use file_sink::FileSink;
pub use stats::{
    load_statistics, print_ledger_statistics, print_statistics, HarvestStats, LeafCounters,
    LedgerStatistics, SourceReport,
};
pub use traits::{LeafDocument, ProcessedOutput, Processor};
