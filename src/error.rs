use crate::index::posting::PostingError;
use std::path::PathBuf;

/// Errors produced while building, updating, checking or querying an index
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cannot access {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("filter command '{command}' failed on {path}: {message}")]
    Filter {
        command: String,
        path: PathBuf,
        message: String,
    },

    #[error("corrupt posting for word '{word}': {source}")]
    CorruptPosting {
        word: String,
        #[source]
        source: PostingError,
    },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("query syntax error: {0}")]
    QuerySyntax(String),

    #[error("store error on {path}: {message}")]
    Store { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::File {
            path: path.into(),
            source,
        }
    }

    pub fn posting(word: &[u8], source: PostingError) -> Self {
        IndexError::CorruptPosting {
            word: String::from_utf8_lossy(word).into_owned(),
            source,
        }
    }

    /// True for conditions meaning the index and the document set have diverged.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            IndexError::CorruptPosting { .. } | IndexError::CorruptIndex(_)
        )
    }
}
