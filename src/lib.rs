#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsindex - MPEG-2 Transport Stream Indexer
//!
//! `tsindex` scans MPEG-2 transport stream files and reports their
//! container-level structure and timing. It never decodes audio or video.
//!
//! ## Features
//!
//! ### Transport Stream Parsing
//! - 188-byte packet framing with sync-loss recovery
//! - Header, adaptation field and PCR decoding
//! - PSI section reassembly with CRC32 validation
//! - PAT/PMT decoding, including multi-section tables
//! - PES header and PTS/DTS extraction
//!
//! ### Indexing
//! - Overall bitrate and duration from the first and last PCR, wrap-safe
//! - Per-PID packet counts and windowed maximum bitrates
//! - PTS delta constancy for audio streams
//! - Concurrent indexing of many files on tokio's blocking pool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tsindex::config::IndexConfig;
//! use tsindex::index::index_files;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IndexConfig::discover()?;
//!     let paths = vec![PathBuf::from("a.ts"), PathBuf::from("b.ts")];
//!
//!     for result in index_files(paths, config).await? {
//!         match result {
//!             Ok(index) => println!("{}", serde_json::to_string_pretty(&index)?),
//!             Err(e) => eprintln!("{}", e),
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result<T>`] with a [`TsIndexError`]. Only
//! I/O failures abort a scan; corrupt packets and sections are skipped and
//! logged through the `log` facade.

/// Indexing configuration
pub mod config;

/// Error types for the crate
pub mod error;

/// Container parsing, currently MPEG-2 TS
pub mod format;

/// Whole-file estimators and stream indexing
pub mod index;

/// Bit reading and CRC helpers
pub mod utils;

pub use error::{Result, TsIndexError};
