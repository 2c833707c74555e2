//! Container formats understood by the indexer.

pub mod ts;
