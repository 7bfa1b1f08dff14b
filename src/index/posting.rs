//! Binary codec for per-word occurrence lists.
//!
//! A posting blob is laid out as
//!
//! ```text
//! blob  := last_entry_offset:u32 entry*
//! entry := doc_id:u64 occurrence_count:u32 position:u32[occurrence_count]
//! ```
//!
//! All integers are little-endian. `last_entry_offset` always designates the
//! final entry, which is the entry of the document most recently appended
//! during sequential indexing.

use crate::index::types::DocId;
use memchr::memmem;

/// Size of the `last_entry_offset` header
pub const HEADER_SIZE: usize = 4;

/// Size of an entry without its positions
pub const ENTRY_HEADER_SIZE: usize = 12;

const INITIAL_CAPACITY: usize = 64;

/// Structural problems found while decoding or mutating a blob
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PostingError {
    #[error("blob of {len} bytes is too short to hold an entry")]
    Truncated { len: usize },

    #[error("entry at offset {offset} declares {count} occurrences but only {available} bytes remain")]
    EntryOverrun {
        offset: usize,
        count: u32,
        available: usize,
    },

    #[error("entry at offset {offset} has no occurrences")]
    EmptyEntry { offset: usize },

    #[error("last entry offset is {offset} but the final entry starts at {expected}")]
    BadLastOffset { offset: usize, expected: usize },

    #[error("reference lost: no entry for document {0}")]
    ReferenceLost(DocId),

    #[error("blob exceeds the 4 GiB addressable size")]
    TooLarge,
}

/// Size in bytes of an entry holding `count` positions
#[inline]
pub fn entry_size(count: u32) -> usize {
    ENTRY_HEADER_SIZE + 4 * count as usize
}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

#[inline]
fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

#[inline]
fn write_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Check that entries tile the blob exactly and the header points at the last one
fn validate(bytes: &[u8]) -> Result<(), PostingError> {
    if bytes.len() < HEADER_SIZE + ENTRY_HEADER_SIZE {
        return Err(PostingError::Truncated { len: bytes.len() });
    }
    if u32::try_from(bytes.len()).is_err() {
        return Err(PostingError::TooLarge);
    }

    let mut offset = HEADER_SIZE;
    let mut final_entry = offset;
    while offset < bytes.len() {
        let available = bytes.len() - offset;
        if available < ENTRY_HEADER_SIZE {
            return Err(PostingError::EntryOverrun {
                offset,
                count: 0,
                available,
            });
        }
        let count = read_u32(bytes, offset + 8);
        if count == 0 {
            return Err(PostingError::EmptyEntry { offset });
        }
        let size = entry_size(count);
        if size > available {
            return Err(PostingError::EntryOverrun {
                offset,
                count,
                available,
            });
        }
        final_entry = offset;
        offset += size;
    }

    let last = read_u32(bytes, 0) as usize;
    if last != final_entry {
        return Err(PostingError::BadLastOffset {
            offset: last,
            expected: final_entry,
        });
    }
    Ok(())
}

/// One entry of a validated blob
#[derive(Debug, Clone, Copy)]
pub struct EntryRef<'a> {
    pub offset: usize,
    pub doc_id: DocId,
    positions: &'a [u8],
}

impl<'a> EntryRef<'a> {
    /// Decode the entry at `offset` of an already validated blob
    fn at(bytes: &'a [u8], offset: usize) -> Self {
        let count = read_u32(bytes, offset + 8);
        let start = offset + ENTRY_HEADER_SIZE;
        Self {
            offset,
            doc_id: DocId(read_u64(bytes, offset)),
            positions: &bytes[start..start + 4 * count as usize],
        }
    }

    pub fn occurrence_count(&self) -> u32 {
        (self.positions.len() / 4) as u32
    }

    pub fn size(&self) -> usize {
        ENTRY_HEADER_SIZE + self.positions.len()
    }

    pub fn positions(self) -> impl Iterator<Item = u32> + 'a {
        self.positions
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    }
}

/// Iterator over the entries of a blob, in storage order
pub struct Entries<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = EntryRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.bytes.len() {
            return None;
        }
        let entry = EntryRef::at(self.bytes, self.offset);
        self.offset += entry.size();
        Some(entry)
    }
}

/// Borrowed, validated view of a posting blob
#[derive(Debug, Clone, Copy)]
pub struct PostingView<'a> {
    bytes: &'a [u8],
}

impl<'a> PostingView<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, PostingError> {
        validate(bytes)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn last_entry_offset(&self) -> usize {
        read_u32(self.bytes, 0) as usize
    }

    pub fn last_entry(&self) -> EntryRef<'a> {
        EntryRef::at(self.bytes, self.last_entry_offset())
    }

    pub fn entries(&self) -> Entries<'a> {
        Entries {
            bytes: self.bytes,
            offset: HEADER_SIZE,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries().count()
    }

    /// Linear scan from the start of the blob; entries are not sorted
    pub fn find(&self, doc_id: DocId) -> Option<EntryRef<'a>> {
        self.entries().find(|entry| entry.doc_id == doc_id)
    }

    /// Membership test by searching the raw bytes for the 8-byte doc key.
    ///
    /// A hit only counts when it sits on a 4-byte boundary and an entry of the
    /// declared size fits behind it, which rejects most accidental matches
    /// inside position arrays.
    pub fn contains_doc(&self, doc_id: DocId) -> bool {
        let key = doc_id.to_key();
        let body = &self.bytes[HEADER_SIZE..];
        memmem::find_iter(body, &key).any(|at| {
            if at % 4 != 0 {
                return false;
            }
            let offset = HEADER_SIZE + at;
            if offset + ENTRY_HEADER_SIZE > self.bytes.len() {
                return false;
            }
            let count = read_u32(self.bytes, offset + 8);
            count > 0 && offset + entry_size(count) <= self.bytes.len()
        })
    }

    pub fn total_occurrences(&self) -> u64 {
        self.entries()
            .map(|entry| u64::from(entry.occurrence_count()))
            .sum()
    }
}

/// Outcome of removing a document from a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removed {
    /// The document held the only entry; the word key must be dropped
    Emptied,
    /// The entry was cut out and later entries moved down
    Compacted,
}

/// Owned, growable posting blob used while indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingBlob {
    buf: Vec<u8>,
}

impl PostingBlob {
    /// Start a blob with a single occurrence
    pub fn new(doc_id: DocId, position: u32) -> Self {
        let mut buf = Vec::with_capacity(INITIAL_CAPACITY);
        buf.extend_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
        buf.extend_from_slice(&doc_id.to_key());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&position.to_le_bytes());
        Self { buf }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PostingError> {
        validate(bytes)?;
        let mut buf = Vec::with_capacity(bytes.len().max(INITIAL_CAPACITY));
        buf.extend_from_slice(bytes);
        Ok(Self { buf })
    }

    pub fn view(&self) -> PostingView<'_> {
        PostingView { bytes: &self.buf }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Grow to `max(needed, 2 * capacity)` when `extra` bytes do not fit
    fn reserve(&mut self, extra: usize) {
        let needed = self.buf.len() + extra;
        let capacity = self.buf.capacity();
        if needed > capacity {
            let target = needed.max(capacity * 2);
            self.buf.reserve_exact(target - self.buf.len());
        }
    }

    /// Record one occurrence.
    ///
    /// If the final entry belongs to `doc_id` the position is appended to it,
    /// otherwise a new entry is appended and becomes the final entry.
    pub fn push(&mut self, doc_id: DocId, position: u32) -> Result<(), PostingError> {
        let last = self.view().last_entry_offset();
        if read_u64(&self.buf, last) == doc_id.0 {
            self.reserve(4);
            let count = read_u32(&self.buf, last + 8) + 1;
            write_u32(&mut self.buf, last + 8, count);
            self.buf.extend_from_slice(&position.to_le_bytes());
        } else {
            let offset = u32::try_from(self.buf.len()).map_err(|_| PostingError::TooLarge)?;
            self.reserve(ENTRY_HEADER_SIZE + 4);
            self.buf.extend_from_slice(&doc_id.to_key());
            self.buf.extend_from_slice(&1u32.to_le_bytes());
            self.buf.extend_from_slice(&position.to_le_bytes());
            write_u32(&mut self.buf, 0, offset);
        }
        if u32::try_from(self.buf.len()).is_err() {
            return Err(PostingError::TooLarge);
        }
        Ok(())
    }

    /// Cut the entry of `doc_id` out of the blob
    pub fn remove(&mut self, doc_id: DocId) -> Result<Removed, PostingError> {
        let (offset, size) = self
            .view()
            .find(doc_id)
            .map(|entry| (entry.offset, entry.size()))
            .ok_or(PostingError::ReferenceLost(doc_id))?;

        if offset == HEADER_SIZE && HEADER_SIZE + size == self.buf.len() {
            return Ok(Removed::Emptied);
        }

        self.buf.drain(offset..offset + size);

        let final_entry = self
            .view()
            .entries()
            .last()
            .map(|entry| entry.offset)
            .unwrap_or(HEADER_SIZE);
        write_u32(&mut self.buf, 0, final_entry as u32);
        Ok(Removed::Compacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(n: u64) -> DocId {
        DocId::from_inode(n)
    }

    fn positions_of(view: PostingView<'_>, doc_id: DocId) -> Vec<u32> {
        view.find(doc_id)
            .map(|entry| entry.positions().collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_new_blob_layout() {
        let blob = PostingBlob::new(doc(7), 42);
        assert_eq!(blob.len(), HEADER_SIZE + entry_size(1));
        let view = PostingView::parse(blob.as_bytes()).unwrap();
        assert_eq!(view.last_entry_offset(), HEADER_SIZE);
        assert_eq!(view.last_entry().doc_id, doc(7));
        assert_eq!(positions_of(view, doc(7)), vec![42]);
    }

    #[test]
    fn test_push_same_doc_extends_last_entry() {
        let mut blob = PostingBlob::new(doc(1), 0);
        blob.push(doc(1), 12).unwrap();
        blob.push(doc(1), 30).unwrap();

        let view = blob.view();
        assert_eq!(view.entry_count(), 1);
        assert_eq!(view.last_entry().occurrence_count(), 3);
        assert_eq!(positions_of(view, doc(1)), vec![0, 12, 30]);
    }

    #[test]
    fn test_push_new_doc_becomes_last_entry() {
        let mut blob = PostingBlob::new(doc(1), 0);
        blob.push(doc(1), 5).unwrap();
        blob.push(doc(2), 9).unwrap();

        let view = PostingView::parse(blob.as_bytes()).unwrap();
        assert_eq!(view.entry_count(), 2);
        assert_eq!(view.last_entry_offset(), HEADER_SIZE + entry_size(2));
        assert_eq!(view.last_entry().doc_id, doc(2));
        assert_eq!(positions_of(view, doc(1)), vec![0, 5]);
        assert_eq!(positions_of(view, doc(2)), vec![9]);
    }

    #[test]
    fn test_interleaved_docs_get_separate_entries() {
        // Only the final entry is extended, so returning to an earlier
        // document starts a fresh entry for it.
        let mut blob = PostingBlob::new(doc(1), 0);
        blob.push(doc(2), 1).unwrap();
        blob.push(doc(1), 2).unwrap();
        let view = blob.view();
        assert_eq!(view.entry_count(), 3);
        assert_eq!(view.last_entry().doc_id, doc(1));
    }

    #[test]
    fn test_growth_doubles_capacity() {
        let mut blob = PostingBlob::new(doc(1), 0);
        let mut previous = blob.capacity();
        for pos in 1..200 {
            blob.push(doc(1), pos).unwrap();
            if blob.capacity() != previous {
                assert!(blob.capacity() >= previous * 2);
                previous = blob.capacity();
            }
        }
        assert_eq!(blob.view().last_entry().occurrence_count(), 200);
    }

    #[test]
    fn test_remove_first_of_two_compacts() {
        let mut blob = PostingBlob::new(doc(1), 3);
        blob.push(doc(2), 8).unwrap();

        assert_eq!(blob.remove(doc(1)).unwrap(), Removed::Compacted);

        let view = PostingView::parse(blob.as_bytes()).unwrap();
        assert_eq!(view.entry_count(), 1);
        assert_eq!(view.last_entry_offset(), HEADER_SIZE);
        assert_eq!(view.last_entry().doc_id, doc(2));
        assert_eq!(positions_of(view, doc(2)), vec![8]);
    }

    #[test]
    fn test_remove_last_entry_moves_header_back() {
        let mut blob = PostingBlob::new(doc(1), 3);
        blob.push(doc(1), 4).unwrap();
        blob.push(doc(2), 8).unwrap();
        blob.push(doc(3), 9).unwrap();

        blob.remove(doc(3)).unwrap();
        let view = PostingView::parse(blob.as_bytes()).unwrap();
        assert_eq!(view.last_entry().doc_id, doc(2));
        assert_eq!(view.last_entry_offset(), HEADER_SIZE + entry_size(2));

        // Appending continues on the new final entry
        blob.push(doc(2), 20).unwrap();
        assert_eq!(positions_of(blob.view(), doc(2)), vec![8, 20]);
    }

    #[test]
    fn test_remove_sole_entry_empties() {
        let mut blob = PostingBlob::new(doc(1), 0);
        blob.push(doc(1), 4).unwrap();
        assert_eq!(blob.remove(doc(1)).unwrap(), Removed::Emptied);
    }

    #[test]
    fn test_remove_missing_is_reference_lost() {
        let mut blob = PostingBlob::new(doc(1), 0);
        assert_eq!(
            blob.remove(doc(2)),
            Err(PostingError::ReferenceLost(doc(2)))
        );
    }

    #[test]
    fn test_parse_rejects_truncated() {
        let blob = PostingBlob::new(doc(1), 0);
        let bytes = blob.as_bytes();
        assert!(matches!(
            PostingView::parse(&bytes[..bytes.len() - 2]),
            Err(PostingError::Truncated { .. }) | Err(PostingError::EntryOverrun { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_count_past_end() {
        let mut blob = PostingBlob::new(doc(1), 0);
        blob.push(doc(1), 1).unwrap();
        let mut bytes = blob.as_bytes().to_vec();
        write_u32(&mut bytes, HEADER_SIZE + 8, 9);
        assert!(matches!(
            PostingView::parse(&bytes),
            Err(PostingError::EntryOverrun { count: 9, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_zero_count() {
        let mut bytes = PostingBlob::new(doc(1), 0).as_bytes().to_vec();
        write_u32(&mut bytes, HEADER_SIZE + 8, 0);
        assert!(matches!(
            PostingView::parse(&bytes),
            Err(PostingError::EmptyEntry { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_stale_last_offset() {
        let mut blob = PostingBlob::new(doc(1), 0);
        blob.push(doc(2), 1).unwrap();
        let mut bytes = blob.as_bytes().to_vec();
        write_u32(&mut bytes, 0, HEADER_SIZE as u32);
        assert!(matches!(
            PostingView::parse(&bytes),
            Err(PostingError::BadLastOffset { .. })
        ));
    }

    #[test]
    fn test_contains_doc() {
        let mut blob = PostingBlob::new(doc(1), 0);
        blob.push(doc(2), 7).unwrap();
        blob.push(doc(3), 9).unwrap();
        let view = blob.view();
        assert!(view.contains_doc(doc(1)));
        assert!(view.contains_doc(doc(2)));
        assert!(view.contains_doc(doc(3)));
        assert!(!view.contains_doc(doc(4)));
    }

    #[test]
    fn test_contains_doc_rejects_key_inside_positions() {
        // Two trailing positions spell out the key of another document but
        // there is no room for an entry behind them.
        let target = DocId(0x0000_0002_0000_0001);
        let mut blob = PostingBlob::new(doc(1), 1);
        blob.push(doc(1), 2).unwrap();
        let view = blob.view();
        assert!(memmem::find(view.as_bytes(), &target.to_key()).is_some());
        assert!(!view.contains_doc(target));
        assert!(view.find(target).is_none());
    }

    #[test]
    fn test_from_bytes_round_trip_keeps_appending() {
        let mut blob = PostingBlob::new(doc(1), 0);
        blob.push(doc(2), 1).unwrap();
        let mut reloaded = PostingBlob::from_bytes(blob.as_bytes()).unwrap();
        reloaded.push(doc(2), 6).unwrap();
        assert_eq!(positions_of(reloaded.view(), doc(2)), vec![1, 6]);
        assert_eq!(reloaded.view().total_occurrences(), 3);
    }
}
