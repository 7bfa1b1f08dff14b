//! Positional matching of multi-word terms.
//!
//! A phrase is split into sub-words with the word tokenizer. Sub-words below
//! the minimum word size cannot be looked up; they are skipped but still
//! count for `1 + len` bytes of distance. The first sub-word long enough to
//! be indexed is the anchor. For every anchor position the remaining
//! sub-words are matched left to right, each taking the first recorded
//! position that starts no more than the allowed distance after the end of
//! the previous sub-word.

use crate::error::Result;
use crate::index::posting::{EntryRef, PostingView};
use crate::index::posting_store::PostingStore;
use crate::index::types::DocId;
use crate::store::KvRead;
use crate::utils::phrase_words;

/// How far apart consecutive sub-words may be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proximity {
    /// Strict phrase: next word starts at most this many bytes after the
    /// previous one ends
    Within(u32),
    /// All words present in the document, order and distance irrelevant
    Near,
}

impl Proximity {
    #[inline]
    fn accepts(self, previous_end: u32, position: u32) -> bool {
        match self {
            Proximity::Within(max) => {
                position >= previous_end && position - previous_end <= max
            }
            Proximity::Near => true,
        }
    }
}

struct SubWord<'s> {
    len: u32,
    /// `None` for sub-words too short to be indexed
    posting: Option<PostingView<'s>>,
}

/// A phrase with its sub-word postings loaded once for one query
pub struct PhraseMatcher<'s> {
    anchor_len: u32,
    anchor: PostingView<'s>,
    rest: Vec<SubWord<'s>>,
    proximity: Proximity,
}

impl<'s> PhraseMatcher<'s> {
    /// Prepare a phrase; `None` when no document can match it, because every
    /// sub-word is too short or an indexable sub-word is not in the store
    pub fn new<S: KvRead>(
        store: &'s PostingStore<S>,
        phrase: &str,
        proximity: Proximity,
    ) -> Result<Option<Self>> {
        let mut anchor: Option<(u32, PostingView<'s>)> = None;
        let mut rest = Vec::new();

        for word in phrase_words(phrase) {
            let len = word.len() as u32;
            if !store.accepts(word) {
                if anchor.is_some() {
                    rest.push(SubWord { len, posting: None });
                }
                continue;
            }
            let Some(view) = store.posting(word)? else {
                return Ok(None);
            };
            if anchor.is_none() {
                anchor = Some((len, view));
            } else {
                rest.push(SubWord {
                    len,
                    posting: Some(view),
                });
            }
        }

        Ok(anchor.map(|(anchor_len, anchor)| Self {
            anchor_len,
            anchor,
            rest,
            proximity,
        }))
    }

    pub fn proximity(&self) -> Proximity {
        self.proximity
    }

    /// Number of anchor positions in `doc_id` that complete the phrase;
    /// zero means no match
    pub fn matches(&self, doc_id: DocId) -> u32 {
        match self.anchor.find(doc_id) {
            Some(entry) => self.count_in(entry),
            None => 0,
        }
    }

    /// Call `f` with every matching document and its match count
    pub fn for_each_match<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(DocId, u32) -> Result<()>,
    {
        for entry in self.anchor.entries() {
            let hits = self.count_in(entry);
            if hits > 0 {
                f(entry.doc_id, hits)?;
            }
        }
        Ok(())
    }

    fn count_in(&self, anchor: EntryRef<'s>) -> u32 {
        let doc_id = anchor.doc_id;

        // Every indexed sub-word must occur in the document at all
        let mut entries = Vec::with_capacity(self.rest.len());
        for sub in &self.rest {
            match sub.posting {
                Some(view) => match view.find(doc_id) {
                    Some(entry) => entries.push(Some(entry)),
                    None => return 0,
                },
                None => entries.push(None),
            }
        }

        let mut hits = 0;
        'anchor: for start in anchor.positions() {
            let mut previous_end = start.saturating_add(self.anchor_len);
            for (sub, entry) in self.rest.iter().zip(&entries) {
                match entry {
                    None => previous_end = previous_end.saturating_add(1 + sub.len),
                    Some(entry) => {
                        let next = entry
                            .positions()
                            .find(|&pos| self.proximity.accepts(previous_end, pos));
                        match next {
                            Some(pos) => previous_end = pos.saturating_add(sub.len),
                            None => continue 'anchor,
                        }
                    }
                }
            }
            hits += 1;
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JournalStore;
    use crate::utils::WordTokenizer;

    fn index(docs: &[(u64, &str)], min: usize) -> PostingStore<JournalStore> {
        let mut store = PostingStore::new(JournalStore::in_memory(false), min);
        for &(inode, text) in docs {
            for (pos, word) in WordTokenizer::default().words(text.as_bytes()) {
                store.add(word, DocId::from_inode(inode), pos as u32).unwrap();
            }
            store.flush().unwrap();
        }
        store
    }

    fn doc(n: u64) -> DocId {
        DocId::from_inode(n)
    }

    #[test]
    fn test_adjacent_words_match() {
        let store = index(&[(1, "alpha beta"), (2, "beta alpha")], 3);
        let phrase = PhraseMatcher::new(&store, "alpha beta", Proximity::Within(2))
            .unwrap()
            .unwrap();
        assert_eq!(phrase.matches(doc(1)), 1);
        assert_eq!(phrase.matches(doc(2)), 0);
    }

    #[test]
    fn test_distance_boundary() {
        // alpha ends at 5; beta at 7 is a gap of 2, at 8 a gap of 3
        let store = index(&[(1, "alpha  beta"), (2, "alpha   beta")], 3);
        let phrase = PhraseMatcher::new(&store, "alpha beta", Proximity::Within(2))
            .unwrap()
            .unwrap();
        assert_eq!(phrase.matches(doc(1)), 1);
        assert_eq!(phrase.matches(doc(2)), 0);
    }

    #[test]
    fn test_short_words_consume_distance() {
        let store = index(&[(1, "war of the worlds"), (2, "war the worlds")], 3);
        let phrase = PhraseMatcher::new(&store, "war of the worlds", Proximity::Within(2))
            .unwrap()
            .unwrap();
        assert_eq!(phrase.matches(doc(1)), 1);
        // "of" is still charged for when it is absent from the text
        assert_eq!(phrase.matches(doc(2)), 0);
    }

    #[test]
    fn test_near_ignores_order() {
        let store = index(&[(1, "beta and then much later alpha"), (2, "alpha only")], 3);
        let phrase = PhraseMatcher::new(&store, "alpha beta", Proximity::Near)
            .unwrap()
            .unwrap();
        assert_eq!(phrase.matches(doc(1)), 1);
        assert_eq!(phrase.matches(doc(2)), 0);
    }

    #[test]
    fn test_counts_each_anchor_position() {
        let store = index(&[(1, "new york and new york again, new jersey")], 3);
        let phrase = PhraseMatcher::new(&store, "new york", Proximity::Within(2))
            .unwrap()
            .unwrap();
        assert_eq!(phrase.matches(doc(1)), 2);
    }

    #[test]
    fn test_missing_sub_word_means_no_matcher() {
        let store = index(&[(1, "alpha beta")], 3);
        assert!(
            PhraseMatcher::new(&store, "alpha gamma", Proximity::Within(2))
                .unwrap()
                .is_none()
        );
        assert!(
            PhraseMatcher::new(&store, "a b", Proximity::Within(2))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_for_each_match() {
        let store = index(
            &[(1, "big red dog"), (2, "red dog"), (3, "dog red"), (4, "red big dog")],
            3,
        );
        let phrase = PhraseMatcher::new(&store, "red dog", Proximity::Within(2))
            .unwrap()
            .unwrap();
        let mut found = Vec::new();
        phrase
            .for_each_match(|doc_id, hits| {
                found.push((doc_id, hits));
                Ok(())
            })
            .unwrap();
        found.sort();
        let mut expected = vec![(doc(1), 1), (doc(2), 1)];
        expected.sort();
        assert_eq!(found, expected);
    }
}
