use crate::error::{IndexError, Result};
use crate::index::posting::{PostingBlob, PostingError, PostingView, Removed};
use crate::index::types::DocId;
use crate::store::{KvRead, KvWrite, fold_key};
use ahash::AHashMap;
use memchr::memmem;
use std::borrow::Cow;
use std::io::Write;

/// Word store holding one posting blob per word.
///
/// Appends for the document being indexed are collected in a write-back
/// cache so a word occurring many times in one document is written to the
/// underlying store once. The cache is flushed explicitly, before any
/// operation that scans the whole store, and when the store is unwrapped.
pub struct PostingStore<S> {
    words: S,
    min_word_size: usize,
    pending: AHashMap<Vec<u8>, PostingBlob>,
}

impl<S: KvRead> PostingStore<S> {
    pub fn new(words: S, min_word_size: usize) -> Self {
        Self::with_capacity(words, min_word_size, 0)
    }

    /// Store whose write-back cache starts with room for `capacity` words
    pub fn with_capacity(words: S, min_word_size: usize, capacity: usize) -> Self {
        Self {
            words,
            min_word_size,
            pending: AHashMap::with_capacity(capacity),
        }
    }

    /// Words the write-back cache holds before it reallocates
    pub fn cache_capacity(&self) -> usize {
        self.pending.capacity()
    }

    pub fn store(&self) -> &S {
        &self.words
    }

    pub fn min_word_size(&self) -> usize {
        self.min_word_size
    }

    pub fn ignore_case(&self) -> bool {
        self.words.ignore_case()
    }

    /// Words shorter than the minimum are never stored nor looked up
    #[inline]
    pub fn accepts(&self, word: &[u8]) -> bool {
        word.len() >= self.min_word_size
    }

    fn key<'w>(&self, word: &'w [u8]) -> Cow<'w, [u8]> {
        fold_key(word, self.words.ignore_case())
    }

    /// Number of distinct words in the store, excluding unflushed additions
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Validated posting of `word`, if the word is indexed
    pub fn posting(&self, word: &[u8]) -> Result<Option<PostingView<'_>>> {
        if !self.accepts(word) {
            return Ok(None);
        }
        let key = self.key(word);
        if let Some(blob) = self.pending.get(&*key) {
            return Ok(Some(blob.view()));
        }
        match self.words.get(&key) {
            Some(bytes) => PostingView::parse(bytes)
                .map(Some)
                .map_err(|e| IndexError::posting(word, e)),
            None => Ok(None),
        }
    }

    /// Membership test used while evaluating boolean queries
    pub fn find_doc_id(&self, word: &[u8], doc_id: DocId) -> Result<bool> {
        Ok(self
            .posting(word)?
            .is_some_and(|view| view.contains_doc(doc_id)))
    }

    /// Confirm that every recorded position of `word` in `doc_id` still
    /// points at the word in `content`
    pub fn verify(&self, word: &[u8], doc_id: DocId, content: &[u8]) -> Result<()> {
        if !self.accepts(word) {
            return Ok(());
        }
        let entry = self
            .posting(word)?
            .and_then(|view| view.find(doc_id))
            .ok_or_else(|| IndexError::posting(word, PostingError::ReferenceLost(doc_id)))?;
        check_positions(word, entry.positions(), doc_id, content, self.ignore_case())
    }

    /// Verify every word of the store that references `doc_id`.
    ///
    /// On a case-sensitive index, words that do not occur anywhere in
    /// `content` are passed over. Returns the number of words checked.
    pub fn verify_document(&self, doc_id: DocId, content: &[u8]) -> Result<usize> {
        let ignore_case = self.ignore_case();
        let mut checked = 0;
        for (word, bytes) in self.words.iter() {
            let view = PostingView::parse(bytes).map_err(|e| IndexError::posting(word, e))?;
            let Some(entry) = view.find(doc_id) else {
                continue;
            };
            if !ignore_case && memmem::find(content, word).is_none() {
                continue;
            }
            check_positions(word, entry.positions(), doc_id, content, ignore_case)?;
            checked += 1;
        }
        Ok(checked)
    }

    /// Visit every stored word with its validated posting
    pub fn for_each_posting<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], PostingView<'_>) -> Result<()>,
    {
        debug_assert!(self.pending.is_empty(), "scan with unflushed postings");
        for (word, bytes) in self.words.iter() {
            let view = PostingView::parse(bytes).map_err(|e| IndexError::posting(word, e))?;
            f(word, view)?;
        }
        Ok(())
    }

    /// Human-readable listing of every word and its entries
    pub fn dump<W: Write>(&self, out: &mut W) -> Result<()> {
        self.for_each_posting(|word, view| {
            writeln!(out, "{}", String::from_utf8_lossy(word))?;
            for entry in view.entries() {
                write!(out, "  {} {}:", entry.doc_id, entry.occurrence_count())?;
                for pos in entry.positions() {
                    write!(out, " {}", pos)?;
                }
                writeln!(out)?;
            }
            Ok(())
        })
    }
}

impl<S: KvWrite> PostingStore<S> {
    /// Record an occurrence of `word` in `doc_id` at `position`.
    ///
    /// Returns false when the word is too short to be indexed.
    pub fn add(&mut self, word: &[u8], doc_id: DocId, position: u32) -> Result<bool> {
        if !self.accepts(word) {
            return Ok(false);
        }
        let key = self.key(word).into_owned();

        if let Some(blob) = self.pending.get_mut(&key) {
            blob.push(doc_id, position)
                .map_err(|e| IndexError::posting(word, e))?;
            return Ok(true);
        }

        let blob = match self.words.get(&key) {
            Some(bytes) => {
                let mut blob =
                    PostingBlob::from_bytes(bytes).map_err(|e| IndexError::posting(word, e))?;
                blob.push(doc_id, position)
                    .map_err(|e| IndexError::posting(word, e))?;
                blob
            }
            None => PostingBlob::new(doc_id, position),
        };
        self.pending.insert(key, blob);
        Ok(true)
    }

    /// Remove `doc_id`'s entry from the posting of `word`
    pub fn delete(&mut self, word: &[u8], doc_id: DocId) -> Result<()> {
        if !self.accepts(word) {
            return Ok(());
        }
        self.flush()?;
        let key = self.key(word).into_owned();
        self.remove_entry(&key, doc_id)
    }

    fn remove_entry(&mut self, key: &[u8], doc_id: DocId) -> Result<()> {
        let bytes = self
            .words
            .get(key)
            .ok_or_else(|| IndexError::posting(key, PostingError::ReferenceLost(doc_id)))?;
        let mut blob = PostingBlob::from_bytes(bytes).map_err(|e| IndexError::posting(key, e))?;

        match blob
            .remove(doc_id)
            .map_err(|e| IndexError::posting(key, e))?
        {
            Removed::Emptied => self.words.remove(key),
            Removed::Compacted => self.words.replace(key, blob.as_bytes()),
        }
    }

    /// Purge every occurrence of `doc_id` from the whole store.
    ///
    /// This scans every word; the cost is proportional to the store size for
    /// each re-indexed document. Returns the number of words touched.
    pub fn substitute(&mut self, doc_id: DocId) -> Result<usize> {
        self.flush()?;

        let mut affected = Vec::new();
        for (word, bytes) in self.words.iter() {
            let view = PostingView::parse(bytes).map_err(|e| IndexError::posting(word, e))?;
            if view.find(doc_id).is_some() {
                affected.push(word.to_vec());
            }
        }

        for word in &affected {
            self.remove_entry(word, doc_id)?;
        }
        log::debug!("substitute {}: purged from {} words", doc_id, affected.len());
        Ok(affected.len())
    }

    /// Write cached postings through to the store
    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        for (key, blob) in self.pending.drain() {
            self.words.replace(&key, blob.as_bytes())?;
        }
        Ok(())
    }

    /// Flush and hand back the underlying store
    pub fn into_inner(mut self) -> Result<S> {
        self.flush()?;
        Ok(self.words)
    }
}

fn check_positions(
    word: &[u8],
    positions: impl Iterator<Item = u32>,
    doc_id: DocId,
    content: &[u8],
    ignore_case: bool,
) -> Result<()> {
    for pos in positions {
        let start = pos as usize;
        let found = content
            .get(start..start + word.len())
            .is_some_and(|slice| {
                if ignore_case {
                    slice.eq_ignore_ascii_case(word)
                } else {
                    slice == word
                }
            });
        if !found {
            return Err(IndexError::CorruptIndex(format!(
                "word '{}' reference at position {} for document {} lost",
                String::from_utf8_lossy(word),
                pos,
                doc_id
            )));
        }
    }
    Ok(())
}
