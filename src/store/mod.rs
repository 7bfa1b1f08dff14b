//! Key-value backends holding the names and words of an index.
//!
//! - [`ConstStore`] - immutable, memory-mapped snapshot used for serving queries
//! - [`JournalStore`] - mutable store used while indexing; every mutation is
//!   journaled and `close_reorganize` folds the journal into a new snapshot
//!
//! Both fold keys to ASCII lower case when created with `ignore_case`.

pub mod constant;
pub mod journal;

pub use constant::ConstStore;
pub use journal::JournalStore;

use crate::error::{IndexError, Result};
use globset::GlobBuilder;
use std::borrow::Cow;

/// Read access shared by both backends
pub trait KvRead {
    type Iter<'a>: Iterator<Item = (&'a [u8], &'a [u8])>
    where
        Self: 'a;

    fn get(&self, key: &[u8]) -> Option<&[u8]>;

    fn len(&self) -> usize;

    fn ignore_case(&self) -> bool;

    /// All entries in ascending key order
    fn iter(&self) -> Self::Iter<'_>;

    fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mutation, only offered by the journaled backend
pub trait KvWrite: KvRead {
    /// Store a new key; fails when the key is already present
    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Store a key, overwriting any previous value
    fn replace(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Drop a key; fails when the key is absent
    fn remove(&mut self, key: &[u8]) -> Result<()>;
}

/// Normalize a key for a store that may ignore case
pub fn fold_key(key: &[u8], ignore_case: bool) -> Cow<'_, [u8]> {
    if ignore_case && key.iter().any(u8::is_ascii_uppercase) {
        Cow::Owned(key.to_ascii_lowercase())
    } else {
        Cow::Borrowed(key)
    }
}

/// Entries whose key matches a `*`/`?` glob pattern
pub fn scan_matching<'a, S: KvRead>(
    store: &'a S,
    pattern: &str,
) -> Result<impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a> {
    let matcher = GlobBuilder::new(pattern)
        .case_insensitive(store.ignore_case())
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map_err(|e| IndexError::QuerySyntax(format!("invalid pattern '{}': {}", pattern, e)))?
        .compile_matcher();

    Ok(store
        .iter()
        .filter(move |(key, _)| matcher.is_match(&*String::from_utf8_lossy(key))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_key() {
        assert_eq!(&*fold_key(b"Hello", true), &b"hello"[..]);
        assert_eq!(&*fold_key(b"Hello", false), &b"Hello"[..]);
        assert!(matches!(fold_key(b"hello", true), Cow::Borrowed(_)));
    }

    #[test]
    fn test_scan_matching() {
        let mut store = JournalStore::in_memory(false);
        for word in ["cat", "cot", "cut", "coat", "Cat"] {
            store.insert(word.as_bytes(), b"").unwrap();
        }

        let hits: Vec<_> = scan_matching(&store, "c?t")
            .unwrap()
            .map(|(k, _)| String::from_utf8_lossy(k).into_owned())
            .collect();
        assert_eq!(hits, vec!["cat", "cot", "cut"]);

        let hits = scan_matching(&store, "c*t").unwrap().count();
        assert_eq!(hits, 4);
    }

    #[test]
    fn test_scan_matching_ignore_case() {
        let mut store = JournalStore::in_memory(true);
        store.insert(b"Apple", b"").unwrap();
        store.insert(b"apricot", b"").unwrap();
        assert_eq!(scan_matching(&store, "AP*").unwrap().count(), 2);
    }
}
