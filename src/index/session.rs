//! The single-writer indexing context.
//!
//! An [`IndexSession`] owns the names store (doc id → filename), the posting
//! store and the state of the running operation. It is constructed by
//! [`IndexSession::create`] or [`IndexSession::open`], fed one document at a
//! time by the walk driver and consumed by [`IndexSession::close`].

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::filter::{ContentFilter, extension};
use crate::index::posting::PostingView;
use crate::index::posting_store::PostingStore;
use crate::index::types::{DocId, INDEX_VERSION, IndexMeta, Operation, SessionStats};
use crate::store::{JournalStore, KvRead, KvWrite, fold_key};
use ahash::AHashSet;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Directory-as-document bookkeeping
#[derive(Debug, Default)]
struct DirectoryDoc {
    /// Set by `enter_directory`, cleared once the directory is registered
    pending: bool,
    doc_id: Option<DocId>,
}

pub struct IndexSession<S = JournalStore> {
    root: PathBuf,
    operation: Operation,
    names: S,
    postings: PostingStore<S>,
    filter: ContentFilter,
    dir_as_doc: Option<DirectoryDoc>,
    pos_start: u64,
    meta: IndexMeta,
    meta_path: Option<PathBuf>,
    stats: SessionStats,
}

impl IndexSession<JournalStore> {
    /// Start a new index, replacing any existing one on close
    pub fn create(config: &IndexConfig) -> Result<Self> {
        fs::create_dir_all(&config.db).map_err(|e| IndexError::file(&config.db, e))?;
        let names = JournalStore::create(&config.names_path(), false)?;
        let words = JournalStore::create(&config.words_path(), config.ignore_case)?;

        let now = unix_now();
        let meta = IndexMeta {
            version: INDEX_VERSION,
            ignore_case: config.ignore_case,
            min_word_size: config.min_word_size,
            created_at: now,
            updated_at: now,
            ..IndexMeta::default()
        };

        let mut session = Self::with_stores(config, Operation::Add, names, words)?;
        session.meta = meta;
        session.meta_path = Some(config.meta_path());
        Ok(session)
    }

    /// Open an existing index for `operation`; `Check` opens it read-only
    pub fn open(config: &IndexConfig, operation: Operation) -> Result<Self> {
        ensure_supported(config, operation)?;

        let (names, words) = if operation.is_mutating() {
            (
                JournalStore::open(&config.names_path(), false)?,
                JournalStore::open(&config.words_path(), config.ignore_case)?,
            )
        } else {
            (
                JournalStore::open_read_only(&config.names_path(), false)?,
                JournalStore::open_read_only(&config.words_path(), config.ignore_case)?,
            )
        };

        let meta = read_meta(&config.meta_path())?.unwrap_or_else(|| IndexMeta {
            ignore_case: config.ignore_case,
            min_word_size: config.min_word_size,
            ..IndexMeta::default()
        });
        if meta.min_word_size != config.min_word_size {
            log::warn!(
                "index was built with MIN_WORD_SIZE={} but the configuration says {}",
                meta.min_word_size,
                config.min_word_size
            );
        }

        let mut session = Self::with_stores(config, operation, names, words)?;
        session.meta = meta;
        session.meta_path = Some(config.meta_path());
        Ok(session)
    }

    /// Flush, fold both journals into new snapshots and record metadata
    pub fn close(self) -> Result<SessionStats> {
        let Self {
            operation,
            names,
            postings,
            mut meta,
            meta_path,
            stats,
            ..
        } = self;
        let words = postings.into_inner()?;

        if operation.is_mutating() {
            meta.doc_count = names.len() as u64;
            meta.word_count = words.len() as u64;
            meta.updated_at = unix_now();

            names.close_reorganize()?;
            words.close_reorganize()?;
            if let Some(path) = meta_path {
                write_meta(&path, &meta)?;
            }
        }

        log::info!(
            "{} finished: {} documents, {} occurrences, {} words skipped",
            operation,
            stats.documents,
            stats.occurrences,
            stats.skipped_words
        );
        Ok(stats)
    }
}

impl<S: KvWrite> IndexSession<S> {
    /// Session over caller-provided stores
    pub fn with_stores(
        config: &IndexConfig,
        operation: Operation,
        names: S,
        words: S,
    ) -> Result<Self> {
        ensure_supported(config, operation)?;
        Ok(Self {
            root: config.directory()?.to_path_buf(),
            operation,
            names,
            postings: PostingStore::with_capacity(
                words,
                config.min_word_size,
                config.dimension as usize,
            ),
            filter: ContentFilter::from_config(config)?,
            dir_as_doc: config.dir_content_as_doc.then(DirectoryDoc::default),
            pos_start: 0,
            meta: IndexMeta::default(),
            meta_path: None,
            stats: SessionStats::default(),
        })
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn postings(&self) -> &PostingStore<S> {
        &self.postings
    }

    pub fn names(&self) -> &S {
        &self.names
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Start a new directory; positions restart at zero and, when directory
    /// content is one document, the next file registers the directory
    pub fn enter_directory(&mut self) {
        self.pos_start = 0;
        if let Some(dir) = self.dir_as_doc.as_mut() {
            dir.pending = true;
            dir.doc_id = None;
        }
    }

    /// Apply the session's operation to one document, `rel_path` being
    /// relative to the document root
    pub fn process_file(&mut self, rel_path: &Path) -> Result<()> {
        let path = self.root.join(rel_path);
        let metadata = fs::metadata(&path).map_err(|e| IndexError::file(&path, e))?;
        let inode = file_identity(&path, &metadata);
        let content = self.filter.load(&path)?;

        let doc_id = match self.dir_as_doc.as_mut() {
            Some(dir) if dir.pending => {
                let doc_id = DocId::from_inode(inode);
                dir.pending = false;
                dir.doc_id = Some(doc_id);
                let name = directory_name(rel_path);
                self.register(doc_id, &name, &content)?;
                doc_id
            }
            Some(dir) => match dir.doc_id {
                Some(doc_id) => doc_id,
                None => {
                    return Err(IndexError::Unsupported(
                        "file visited before entering its directory".to_string(),
                    ));
                }
            },
            None => {
                let doc_id = DocId::from_inode(inode);
                self.register(doc_id, &rel_path.to_string_lossy(), &content)?;
                doc_id
            }
        };

        self.index_words(rel_path, doc_id, &content)?;
        self.postings.flush()?;

        if self.operation == Operation::Del {
            fs::remove_file(&path).map_err(|e| IndexError::file(&path, e))?;
        }
        if self.dir_as_doc.is_some() {
            self.pos_start += content.len() as u64;
        }
        Ok(())
    }

    /// Bring the names store in line with the operation for a document
    fn register(&mut self, doc_id: DocId, name: &str, content: &[u8]) -> Result<()> {
        let key = doc_id.to_key();
        let known = self.names.get(&key).map(|v| String::from_utf8_lossy(v).into_owned());

        match (self.operation, known) {
            (Operation::Add, Some(existing)) => {
                return Err(IndexError::CorruptIndex(format!(
                    "document {} ({}) is already indexed as {}",
                    name, doc_id, existing
                )));
            }
            (Operation::Add, None) => self.names.insert(&key, name.as_bytes())?,
            (_, None) => {
                return Err(IndexError::CorruptIndex(format!(
                    "document {} ({}) is not in the index",
                    name, doc_id
                )));
            }
            (Operation::Del, Some(_)) => self.names.remove(&key)?,
            (Operation::Sub, Some(existing)) => {
                let purged = self.postings.substitute(doc_id)?;
                log::debug!("re-indexing {} ({} words purged)", name, purged);
                if existing != name {
                    self.names.replace(&key, name.as_bytes())?;
                }
            }
            (Operation::Check, Some(_)) => {
                self.postings.verify_document(doc_id, content)?;
            }
        }
        self.stats.documents += 1;
        Ok(())
    }

    fn index_words(&mut self, rel_path: &Path, doc_id: DocId, content: &[u8]) -> Result<()> {
        let ext = extension(rel_path);
        let tokenizer = self.filter.tokenizer_for(&ext);
        let ignore_case = self.postings.ignore_case();
        let mut visited = AHashSet::new();

        for (offset, word) in tokenizer.words(content) {
            if self.filter.is_bad_word(&ext, word) {
                self.stats.skipped_words += 1;
                continue;
            }
            if !self.postings.accepts(word) {
                continue;
            }

            // Del and Check visit each distinct word once per document
            let processed = match self.operation {
                Operation::Add | Operation::Sub => {
                    let position = u32::try_from(self.pos_start + offset as u64).map_err(|_| {
                        IndexError::Unsupported(format!(
                            "{}: positions beyond 4 GiB cannot be recorded",
                            rel_path.display()
                        ))
                    })?;
                    self.postings.add(word, doc_id, position)?;
                    true
                }
                Operation::Del if visited.insert(fold_key(word, ignore_case)) => {
                    self.postings
                        .delete(word, doc_id)
                        .map_err(|e| with_document(e, rel_path))?;
                    true
                }
                Operation::Check if visited.insert(fold_key(word, ignore_case)) => {
                    self.postings
                        .verify(word, doc_id, content)
                        .map_err(|e| with_document(e, rel_path))?;
                    true
                }
                Operation::Del | Operation::Check => false,
            };
            if processed {
                self.stats.occurrences += 1;
            }
        }
        Ok(())
    }
}

impl<S: KvWrite + Sync> IndexSession<S> {
    /// Every entry of every posting must name a registered document.
    ///
    /// Returns the number of entries checked.
    pub fn check_all_entries(&self) -> Result<u64> {
        let words: Vec<(&[u8], &[u8])> = self.postings.store().iter().collect();
        let names = &self.names;

        let counts = words
            .par_iter()
            .map(|&(word, bytes)| {
                let view = PostingView::parse(bytes).map_err(|e| IndexError::posting(word, e))?;
                let mut checked = 0u64;
                for entry in view.entries() {
                    if !names.contains(&entry.doc_id.to_key()) {
                        return Err(IndexError::CorruptIndex(format!(
                            "word '{}' references document {} which has no filename",
                            String::from_utf8_lossy(word),
                            entry.doc_id
                        )));
                    }
                    checked += 1;
                }
                Ok(checked)
            })
            .collect::<Result<Vec<u64>>>()?;

        Ok(counts.into_iter().sum())
    }
}

fn ensure_supported(config: &IndexConfig, operation: Operation) -> Result<()> {
    if config.dir_content_as_doc && operation != Operation::Add {
        return Err(IndexError::Unsupported(format!(
            "'{}' is not available when directory content is indexed as one document",
            operation
        )));
    }
    Ok(())
}

/// Attach the document path to a corruption report
fn with_document(err: IndexError, rel_path: &Path) -> IndexError {
    if err.is_corruption() {
        IndexError::CorruptIndex(format!("{} (in {})", err, rel_path.display()))
    } else {
        err
    }
}

/// Name registered for a directory indexed as one document
fn directory_name(rel_path: &Path) -> String {
    match rel_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    }
}

#[cfg(unix)]
pub(crate) fn file_identity(_path: &Path, metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

#[cfg(not(unix))]
pub(crate) fn file_identity(path: &Path, _metadata: &fs::Metadata) -> u64 {
    use std::hash::{DefaultHasher, Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) fn read_meta(path: &Path) -> Result<Option<IndexMeta>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|e| IndexError::file(path, e))?;
    let meta = serde_json::from_str(&text)
        .map_err(|e| IndexError::CorruptIndex(format!("{}: {}", path.display(), e)))?;
    Ok(Some(meta))
}

pub(crate) fn write_meta(path: &Path, meta: &IndexMeta) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)
        .map_err(|e| IndexError::CorruptIndex(format!("cannot encode index metadata: {}", e)))?;
    fs::write(path, json).map_err(|e| IndexError::file(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(files: &[(&str, &str)], extra: &str) -> (TempDir, IndexConfig) {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        for (name, text) in files {
            let path = docs.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, text).unwrap();
        }
        let config = IndexConfig::from_key_values(&format!(
            "DB {}\nDIRECTORY {}\n{}",
            dir.path().join("db").display(),
            docs.display(),
            extra
        ))
        .unwrap();
        (dir, config)
    }

    fn memory_session(config: &IndexConfig, op: Operation) -> IndexSession<JournalStore> {
        IndexSession::with_stores(
            config,
            op,
            JournalStore::in_memory(false),
            JournalStore::in_memory(config.ignore_case),
        )
        .unwrap()
    }

    #[test]
    fn test_dimension_sizes_word_cache() {
        let (_dir, config) = setup(&[("a.txt", "alpha")], "DIMENSION 4096");
        let session = memory_session(&config, Operation::Add);
        assert!(session.postings().cache_capacity() >= 4096);
    }

    fn inode(config: &IndexConfig, name: &str) -> DocId {
        let path = config.directory().unwrap().join(name);
        let metadata = fs::metadata(&path).unwrap();
        DocId::from_inode(file_identity(&path, &metadata))
    }

    #[test]
    fn test_add_registers_and_indexes() {
        let (_dir, config) = setup(&[("a.txt", "hello world hello")], "");
        let mut session = memory_session(&config, Operation::Add);
        session.enter_directory();
        session.process_file(Path::new("a.txt")).unwrap();

        let doc = inode(&config, "a.txt");
        assert_eq!(session.names().get(&doc.to_key()), Some(&b"a.txt"[..]));
        let hello = session.postings().posting(b"hello").unwrap().unwrap();
        assert_eq!(hello.find(doc).unwrap().occurrence_count(), 2);
        assert_eq!(session.stats().documents, 1);
        assert_eq!(session.stats().occurrences, 3);

        let err = session.process_file(Path::new("a.txt")).unwrap_err();
        assert!(matches!(err, IndexError::CorruptIndex(_)));
    }

    #[test]
    fn test_bad_words_are_skipped() {
        let (_dir, config) = setup(&[("a.txt", "the cat and the dog")], "BAD_WORDS the|and");
        let mut session = memory_session(&config, Operation::Add);
        session.process_file(Path::new("a.txt")).unwrap();
        assert!(session.postings().posting(b"the").unwrap().is_none());
        assert!(session.postings().posting(b"cat").unwrap().is_some());
        assert_eq!(session.stats().skipped_words, 3);
    }

    #[test]
    fn test_bad_words_limited_to_extensions() {
        let (_dir, config) = setup(
            &[("a.txt", "secret kept"), ("b.md", "secret kept")],
            "BAD_WORDS secret\nBAD_WORDS_EXT md",
        );
        let mut session = memory_session(&config, Operation::Add);
        session.process_file(Path::new("a.txt")).unwrap();
        session.process_file(Path::new("b.md")).unwrap();

        let secret = session.postings().posting(b"secret").unwrap().unwrap();
        assert_eq!(secret.entry_count(), 1);
        assert_eq!(secret.last_entry().doc_id, inode(&config, "a.txt"));
        assert_eq!(session.stats().skipped_words, 1);
    }

    #[test]
    fn test_check_counts_distinct_words_once() {
        let (_dir, config) = setup(&[("a.txt", "apple apple banana apple")], "");
        let mut session = IndexSession::create(&config).unwrap();
        session.process_file(Path::new("a.txt")).unwrap();
        assert_eq!(session.close().unwrap().occurrences, 4);

        let mut check = IndexSession::open(&config, Operation::Check).unwrap();
        check.process_file(Path::new("a.txt")).unwrap();
        assert_eq!(check.stats().occurrences, 2);
    }

    #[test]
    fn test_directory_as_document() {
        let (_dir, config) = setup(
            &[("sub/one.txt", "alpha"), ("sub/two.txt", "omega")],
            "DIR_CONTENT_AS_DOC yes",
        );
        let mut session = memory_session(&config, Operation::Add);
        session.enter_directory();
        session.process_file(Path::new("sub/one.txt")).unwrap();
        session.process_file(Path::new("sub/two.txt")).unwrap();

        assert_eq!(session.names().len(), 1);
        let doc = inode(&config, "sub/one.txt");
        assert_eq!(session.names().get(&doc.to_key()), Some(&b"sub"[..]));
        let omega = session.postings().posting(b"omega").unwrap().unwrap();
        let entry = omega.find(doc).unwrap();
        assert_eq!(entry.positions().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_directory_as_document_rejects_other_operations() {
        let (_dir, config) = setup(&[], "DIR_CONTENT_AS_DOC yes");
        let err = IndexSession::with_stores(
            &config,
            Operation::Sub,
            JournalStore::in_memory(false),
            JournalStore::in_memory(false),
        )
        .err()
        .unwrap();
        assert!(matches!(err, IndexError::Unsupported(_)));
    }

    #[test]
    fn test_create_close_open_update() {
        let (_dir, config) = setup(&[("a.txt", "apple banana"), ("b.txt", "banana cherry")], "");

        let mut session = IndexSession::create(&config).unwrap();
        session.enter_directory();
        session.process_file(Path::new("a.txt")).unwrap();
        session.process_file(Path::new("b.txt")).unwrap();
        let stats = session.close().unwrap();
        assert_eq!(stats.documents, 2);

        let meta = read_meta(&config.meta_path()).unwrap().unwrap();
        assert_eq!(meta.doc_count, 2);
        assert_eq!(meta.word_count, 3);

        let check = IndexSession::open(&config, Operation::Check).unwrap();
        assert_eq!(check.check_all_entries().unwrap(), 4);
        check.close().unwrap();

        fs::write(config.directory().unwrap().join("a.txt"), "apple durian").unwrap();
        let mut session = IndexSession::open(&config, Operation::Sub).unwrap();
        session.process_file(Path::new("a.txt")).unwrap();
        let banana = session.postings().posting(b"banana").unwrap().unwrap();
        assert_eq!(banana.entry_count(), 1);
        assert!(session.postings().posting(b"durian").unwrap().is_some());
        session.close().unwrap();

        let mut session = IndexSession::open(&config, Operation::Del).unwrap();
        session.process_file(Path::new("b.txt")).unwrap();
        assert!(session.postings().posting(b"cherry").unwrap().is_none());
        session.close().unwrap();
        assert!(!config.directory().unwrap().join("b.txt").exists());

        let meta = read_meta(&config.meta_path()).unwrap().unwrap();
        assert_eq!(meta.doc_count, 1);
    }

    #[test]
    fn test_check_detects_changed_content() {
        let (_dir, config) = setup(&[("a.txt", "apple banana")], "");
        let mut session = IndexSession::create(&config).unwrap();
        session.process_file(Path::new("a.txt")).unwrap();
        session.close().unwrap();

        fs::write(config.directory().unwrap().join("a.txt"), "banana apple").unwrap();
        let mut check = IndexSession::open(&config, Operation::Check).unwrap();
        let err = check.process_file(Path::new("a.txt")).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_check_all_entries_detects_orphans() {
        let (_dir, config) = setup(&[("a.txt", "apple")], "");
        let mut session = memory_session(&config, Operation::Add);
        session.process_file(Path::new("a.txt")).unwrap();
        let doc = inode(&config, "a.txt");
        session.names.remove(&doc.to_key()).unwrap();
        assert!(session.check_all_entries().unwrap_err().is_corruption());
    }

    #[test]
    fn test_directory_name() {
        assert_eq!(directory_name(Path::new("a/b/c.txt")), "a/b");
        assert_eq!(directory_name(Path::new("c.txt")), ".");
    }
}
