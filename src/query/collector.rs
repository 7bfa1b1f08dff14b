use crate::index::types::MatchRecord;
use ahash::AHashSet;
use std::cmp::Ordering;

/// Match ordering: higher occurrence count first, then filename ascending
pub fn compare_matches(a: &MatchRecord, b: &MatchRecord) -> Ordering {
    b.occurrence_count
        .cmp(&a.occurrence_count)
        .then_with(|| a.filename.cmp(&b.filename))
}

/// Accumulates the matches of one query
#[derive(Debug, Default)]
pub struct MatchCollector {
    matches: Vec<MatchRecord>,
    /// Filenames already collected, when deduplicating
    seen: Option<AHashSet<String>>,
}

impl MatchCollector {
    pub fn new(dedup: bool) -> Self {
        Self {
            matches: Vec::new(),
            seen: dedup.then(AHashSet::new),
        }
    }

    /// Record a match; returns false when deduplication dropped it
    pub fn push(&mut self, filename: &str, occurrence_count: u32) -> bool {
        if let Some(seen) = self.seen.as_mut() {
            if !seen.insert(filename.to_string()) {
                return false;
            }
        }
        self.matches
            .push(MatchRecord::new(filename, occurrence_count));
        true
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Matches sorted by [`compare_matches`]
    pub fn into_ranked(self) -> Vec<MatchRecord> {
        let mut matches = self.matches;
        matches.sort_by(compare_matches);
        matches
    }
}
