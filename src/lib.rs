//! # irx - inverted-index full-text search
//!
//! irx walks a directory of documents, records every word occurrence in an
//! on-disk inverted index, and answers boolean, phrase and wildcard queries
//! against it.
//!
//! ## Architecture
//!
//! - [`store`] - key-value backends: memory-mapped snapshots for queries and
//!   a journaled store for indexing
//! - [`index`] - posting blobs, the posting store, phrase matching, the
//!   indexing session and the walk driver
//! - [`query`] - normalization, boolean parsing, evaluation and ranking
//! - [`config`] - indexer configuration
//! - [`output`] - result formatting
//!
//! ## Quick Start
//!
//! ```no_run
//! use irx::config::IndexConfig;
//! use irx::index::{IndexReader, build::build_index};
//! use irx::query::QueryExecutor;
//! use std::path::Path;
//!
//! let config = IndexConfig::load(Path::new("index.cfg")).unwrap();
//! build_index(&config, true).unwrap();
//!
//! let reader = IndexReader::open(&config).unwrap();
//! let results = QueryExecutor::new(&reader).execute("cat AND dog").unwrap();
//! for m in results {
//!     println!("{} {}", m.filename, m.occurrence_count);
//! }
//! ```
//!
//! ## Posting format
//!
//! Each word maps to a blob `last_entry_offset:u32 entry*` with
//! `entry := doc_id:u64 count:u32 position:u32[count]`, little-endian.
//! Document ids are negated inode numbers; positions are byte offsets.

pub mod config;
pub mod error;
pub mod index;
pub mod output;
pub mod query;
pub mod store;
pub mod utils;

pub use error::{IndexError, Result};
