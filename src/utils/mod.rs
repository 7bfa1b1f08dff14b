//! Utilities shared by the indexer and the query evaluator.
//!
//! - [`tokenizer`] - splits document content and phrases into words
//! - [`progress`] - progress bars, no-op without the `progress` feature

pub mod progress;
pub mod tokenizer;

pub use tokenizer::{WordTokenizer, Words, phrase_words};
