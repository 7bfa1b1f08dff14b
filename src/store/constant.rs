//! Immutable snapshot store.
//!
//! File layout (little-endian):
//!
//! ```text
//! magic "IRXSNAP1" | count:u32 | flags:u32 | offset:u64[count] | record*
//! record := klen:u32 vlen:u32 key value
//! ```
//!
//! Records are sorted by key so lookups are a binary search over the offset
//! table. The whole file is bounds-checked when it is opened.

use crate::error::{IndexError, Result};
use crate::store::{KvRead, fold_key};
use memmap2::Mmap;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 8] = b"IRXSNAP1";
const FIXED_HEADER: usize = 16;
const RECORD_HEADER: usize = 8;
pub(crate) const FLAG_IGNORE_CASE: u32 = 1;

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

fn store_error(path: &Path, message: impl Into<String>) -> IndexError {
    IndexError::Store {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Memory-mapped read-only key-value snapshot
pub struct ConstStore {
    path: PathBuf,
    mmap: Mmap,
    count: usize,
    ignore_case: bool,
}

impl ConstStore {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| IndexError::file(path, e))?;
        // SAFETY: snapshots are only ever replaced by rename, never written in place
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| IndexError::file(path, e))?;

        if mmap.len() < FIXED_HEADER || &mmap[..8] != MAGIC {
            return Err(store_error(path, "not a snapshot file"));
        }
        let count = read_u32(&mmap, 8) as usize;
        let flags = read_u32(&mmap, 12);

        let store = Self {
            path: path.to_path_buf(),
            mmap,
            count,
            ignore_case: flags & FLAG_IGNORE_CASE != 0,
        };
        store.validate()?;
        Ok(store)
    }

    fn validate(&self) -> Result<()> {
        let bytes = &self.mmap[..];
        let table_end = self
            .count
            .checked_mul(8)
            .and_then(|n| n.checked_add(FIXED_HEADER))
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| store_error(&self.path, "offset table exceeds file size"))?;

        let mut previous: Option<&[u8]> = None;
        for index in 0..self.count {
            let offset = read_u64(bytes, FIXED_HEADER + index * 8) as usize;
            if offset < table_end || offset + RECORD_HEADER > bytes.len() {
                return Err(store_error(
                    &self.path,
                    format!("record {} starts out of bounds", index),
                ));
            }
            let klen = read_u32(bytes, offset) as usize;
            let vlen = read_u32(bytes, offset + 4) as usize;
            if offset + RECORD_HEADER + klen + vlen > bytes.len() {
                return Err(store_error(
                    &self.path,
                    format!("record {} runs past end of file", index),
                ));
            }
            let key = &bytes[offset + RECORD_HEADER..offset + RECORD_HEADER + klen];
            if previous.is_some_and(|prev| prev >= key) {
                return Err(store_error(
                    &self.path,
                    format!("record {} is out of order", index),
                ));
            }
            previous = Some(key);
        }
        Ok(())
    }

    fn record(&self, index: usize) -> (&[u8], &[u8]) {
        let bytes = &self.mmap[..];
        let offset = read_u64(bytes, FIXED_HEADER + index * 8) as usize;
        let klen = read_u32(bytes, offset) as usize;
        let vlen = read_u32(bytes, offset + 4) as usize;
        let start = offset + RECORD_HEADER;
        (
            &bytes[start..start + klen],
            &bytes[start + klen..start + klen + vlen],
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Iterator over a snapshot in key order
pub struct ConstIter<'a> {
    store: &'a ConstStore,
    next: usize,
}

impl<'a> Iterator for ConstIter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.store.count {
            return None;
        }
        let record = self.store.record(self.next);
        self.next += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.store.count - self.next;
        (remaining, Some(remaining))
    }
}

impl KvRead for ConstStore {
    type Iter<'a> = ConstIter<'a>;

    fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let key = fold_key(key, self.ignore_case);
        let (mut lo, mut hi) = (0, self.count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (candidate, value) = self.record(mid);
            match candidate.cmp(&*key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(value),
            }
        }
        None
    }

    fn len(&self) -> usize {
        self.count
    }

    fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    fn iter(&self) -> Self::Iter<'_> {
        ConstIter {
            store: self,
            next: 0,
        }
    }
}

/// Write a snapshot from entries already sorted by key.
///
/// The file is written next to `path` and renamed over it, so readers either
/// see the old snapshot or the new one.
pub fn write_snapshot(path: &Path, ignore_case: bool, entries: &[(&[u8], &[u8])]) -> Result<()> {
    let count = u32::try_from(entries.len())
        .map_err(|_| store_error(path, "too many records for one snapshot"))?;
    let flags = if ignore_case { FLAG_IGNORE_CASE } else { 0 };

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let file = File::create(&tmp_path).map_err(|e| IndexError::file(&tmp_path, e))?;
    let mut writer = BufWriter::new(file);

    writer.write_all(MAGIC)?;
    writer.write_all(&count.to_le_bytes())?;
    writer.write_all(&flags.to_le_bytes())?;

    let mut offset = (FIXED_HEADER + entries.len() * 8) as u64;
    for (key, value) in entries {
        writer.write_all(&offset.to_le_bytes())?;
        offset += (RECORD_HEADER + key.len() + value.len()) as u64;
    }

    for (key, value) in entries {
        let klen = u32::try_from(key.len()).map_err(|_| store_error(path, "key too large"))?;
        let vlen = u32::try_from(value.len()).map_err(|_| store_error(path, "value too large"))?;
        writer.write_all(&klen.to_le_bytes())?;
        writer.write_all(&vlen.to_le_bytes())?;
        writer.write_all(key)?;
        writer.write_all(value)?;
    }

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| IndexError::file(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(dir: &TempDir, ignore_case: bool) -> PathBuf {
        let path = dir.path().join("sample.db");
        let entries: [(&[u8], &[u8]); 4] = [
            (b"alpha", b"1"),
            (b"beta", b"22"),
            (b"delta", b""),
            (b"gamma", b"333"),
        ];
        write_snapshot(&path, ignore_case, &entries).unwrap();
        path
    }

    #[test]
    fn test_write_and_lookup() {
        let dir = TempDir::new().unwrap();
        let store = ConstStore::open(&sample(&dir, false)).unwrap();

        assert_eq!(store.len(), 4);
        assert_eq!(store.get(b"alpha"), Some(&b"1"[..]));
        assert_eq!(store.get(b"gamma"), Some(&b"333"[..]));
        assert_eq!(store.get(b"delta"), Some(&b""[..]));
        assert_eq!(store.get(b"epsilon"), None);
        assert_eq!(store.get(b"Alpha"), None);
    }

    #[test]
    fn test_iter_in_key_order() {
        let dir = TempDir::new().unwrap();
        let store = ConstStore::open(&sample(&dir, false)).unwrap();
        let keys: Vec<&[u8]> = store.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"alpha"[..], &b"beta"[..], &b"delta"[..], &b"gamma"[..]]);
    }

    #[test]
    fn test_ignore_case_flag() {
        let dir = TempDir::new().unwrap();
        let store = ConstStore::open(&sample(&dir, true)).unwrap();
        assert!(store.ignore_case());
        assert_eq!(store.get(b"BETA"), Some(&b"22"[..]));
    }

    #[test]
    fn test_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        write_snapshot(&path, false, &[]).unwrap();
        let store = ConstStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get(b"x"), None);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bogus.db");
        std::fs::write(&path, b"definitely not a snapshot").unwrap();
        assert!(matches!(
            ConstStore::open(&path),
            Err(IndexError::Store { .. })
        ));
    }

    #[test]
    fn test_rejects_truncated_file() {
        let dir = TempDir::new().unwrap();
        let path = sample(&dir, false);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();
        assert!(matches!(
            ConstStore::open(&path),
            Err(IndexError::Store { .. })
        ));
    }
}
