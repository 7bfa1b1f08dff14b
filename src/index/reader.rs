use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::posting_store::PostingStore;
use crate::index::session::read_meta;
use crate::index::types::{DocId, IndexMeta};
use crate::store::{ConstStore, KvRead, journal::journal_path};
use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Read-only view of an index: the names store, the posting store and the
/// metadata.
///
/// Opened over memory-mapped snapshots it is safe to share between threads
/// running queries.
pub struct IndexReader<S: KvRead = ConstStore> {
    db: PathBuf,
    names: S,
    postings: PostingStore<S>,
    meta: IndexMeta,
}

impl IndexReader<ConstStore> {
    /// Open the snapshots under the configured `DB` directory
    pub fn open(config: &IndexConfig) -> Result<Self> {
        let names = open_snapshot(&config.names_path())?;
        let words = open_snapshot(&config.words_path())?;

        if words.ignore_case() != config.ignore_case {
            return Err(IndexError::Config(format!(
                "{} was built with IGNORE_CASE={} but the configuration says {}",
                config.words_path().display(),
                words.ignore_case(),
                config.ignore_case
            )));
        }

        let meta = read_meta(&config.meta_path())?.unwrap_or_else(|| IndexMeta {
            ignore_case: config.ignore_case,
            min_word_size: config.min_word_size,
            doc_count: names.len() as u64,
            word_count: words.len() as u64,
            ..IndexMeta::default()
        });

        let mut reader = Self::from_stores(names, words, config.min_word_size);
        reader.db = config.db.clone();
        reader.meta = meta;
        Ok(reader)
    }
}

fn open_snapshot(path: &Path) -> Result<ConstStore> {
    if !path.exists() {
        return Err(IndexError::Store {
            path: path.to_path_buf(),
            message: "no index found; build it first".to_string(),
        });
    }
    if journal_path(path).exists() {
        log::warn!(
            "{} has unapplied updates; run compact to make them visible",
            path.display()
        );
    }
    ConstStore::open(path)
}

impl<S: KvRead> IndexReader<S> {
    pub fn from_stores(names: S, words: S, min_word_size: usize) -> Self {
        let meta = IndexMeta {
            ignore_case: words.ignore_case(),
            min_word_size,
            doc_count: names.len() as u64,
            word_count: words.len() as u64,
            ..IndexMeta::default()
        };
        Self {
            db: PathBuf::new(),
            names,
            postings: PostingStore::new(words, min_word_size),
            meta,
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn postings(&self) -> &PostingStore<S> {
        &self.postings
    }

    pub fn document_count(&self) -> usize {
        self.names.len()
    }

    /// Filename registered for a document
    pub fn filename(&self, doc_id: DocId) -> Option<Cow<'_, str>> {
        self.names
            .get(&doc_id.to_key())
            .map(String::from_utf8_lossy)
    }

    /// Every registered document, in key order
    pub fn documents(&self) -> impl Iterator<Item = (DocId, Cow<'_, str>)> + '_ {
        self.names.iter().filter_map(|(key, value)| {
            let doc_id = DocId::from_key(key)?;
            Some((doc_id, String::from_utf8_lossy(value)))
        })
    }

    /// Human-readable listing of both stores
    pub fn dump<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "# documents: {}", self.names.len())?;
        for (doc_id, name) in self.documents() {
            writeln!(out, "{} {}", doc_id, name)?;
        }
        writeln!(out)?;
        writeln!(out, "# words: {}", self.postings.word_count())?;
        self.postings.dump(out)
    }
}
