use serde::{Deserialize, Serialize};
use std::fmt;

/// Current on-disk format version written to meta.json
pub const INDEX_VERSION: u32 = 1;

/// Document identifier: the negated filesystem inode of the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub u64);

impl DocId {
    /// Size of the encoded key in bytes
    pub const KEY_SIZE: usize = 8;

    pub fn from_inode(inode: u64) -> Self {
        DocId(inode.wrapping_neg())
    }

    pub fn inode(self) -> u64 {
        self.0.wrapping_neg()
    }

    #[inline]
    pub fn to_key(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Decode an 8-byte key; any other length is rejected
    #[inline]
    pub fn from_key(key: &[u8]) -> Option<Self> {
        let bytes: [u8; 8] = key.try_into().ok()?;
        Some(DocId(u64::from_le_bytes(bytes)))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

/// Operation applied by an indexing session to every visited document
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Operation {
    /// Index new documents
    Add,
    /// Purge a changed document's occurrences and index it again
    Sub,
    /// Remove documents from the index and from disk
    Del,
    /// Verify recorded occurrences against document content
    Check,
}

impl Operation {
    pub fn is_mutating(self) -> bool {
        !matches!(self, Operation::Check)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Add => "add",
            Operation::Sub => "sub",
            Operation::Del => "del",
            Operation::Check => "check",
        };
        f.write_str(name)
    }
}

/// A matching document and how often the query hit it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub filename: String,
    pub occurrence_count: u32,
}

impl MatchRecord {
    pub fn new(filename: impl Into<String>, occurrence_count: u32) -> Self {
        Self {
            filename: filename.into(),
            occurrence_count,
        }
    }
}

/// Index metadata stored in meta.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub ignore_case: bool,
    pub min_word_size: usize,
    pub doc_count: u64,
    pub word_count: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Default for IndexMeta {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            ignore_case: false,
            min_word_size: 3,
            doc_count: 0,
            word_count: 0,
            created_at: 0,
            updated_at: 0,
        }
    }
}

/// Counters reported when an indexing session closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub documents: u64,
    /// Words processed; Del and Check count each distinct word once
    pub occurrences: u64,
    pub skipped_words: u64,
}
