//! Mutable store used while indexing.
//!
//! The working set lives in an ordered map loaded from the snapshot. Every
//! mutation is first appended to `<snapshot>.journal`:
//!
//! ```text
//! record := op:u8 klen:u32 vlen:u32 key value      (op 1 = put, 2 = remove)
//! ```
//!
//! Reopening after a crash replays the journal on top of the snapshot; a torn
//! final record is discarded. `close_reorganize` writes a fresh snapshot and
//! deletes the journal.

use crate::error::{IndexError, Result};
use crate::store::constant::{ConstStore, write_snapshot};
use crate::store::{KvRead, KvWrite, fold_key};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const OP_PUT: u8 = 1;
const OP_REMOVE: u8 = 2;
const RECORD_HEADER: usize = 9;

/// Path of the journal that accompanies a snapshot
pub fn journal_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot.as_os_str().to_owned();
    name.push(".journal");
    PathBuf::from(name)
}

pub struct JournalStore {
    path: PathBuf,
    persistent: bool,
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    journal: Option<BufWriter<File>>,
    ignore_case: bool,
    read_only: bool,
    dirty: bool,
}

impl JournalStore {
    /// Start an empty store that replaces whatever exists at `path` on close.
    ///
    /// Bulk builds write no journal; an interrupted build leaves the previous
    /// snapshot untouched.
    pub fn create(path: &Path, ignore_case: bool) -> Result<Self> {
        let journal = journal_path(path);
        if journal.exists() {
            fs::remove_file(&journal).map_err(|e| IndexError::file(&journal, e))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            persistent: true,
            map: BTreeMap::new(),
            journal: None,
            ignore_case,
            read_only: false,
            dirty: true,
        })
    }

    /// Open an existing store for incremental updates
    pub fn open(path: &Path, ignore_case: bool) -> Result<Self> {
        let mut store = Self::load(path, ignore_case, false)?;
        let journal = journal_path(path);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal)
            .map_err(|e| IndexError::file(&journal, e))?;
        store.journal = Some(BufWriter::new(file));
        Ok(store)
    }

    /// Open an existing store, replaying its journal, without allowing writes
    pub fn open_read_only(path: &Path, ignore_case: bool) -> Result<Self> {
        Self::load(path, ignore_case, true)
    }

    /// A store that never touches the filesystem
    pub fn in_memory(ignore_case: bool) -> Self {
        Self {
            path: PathBuf::from("<memory>"),
            persistent: false,
            map: BTreeMap::new(),
            journal: None,
            ignore_case,
            read_only: false,
            dirty: false,
        }
    }

    fn load(path: &Path, ignore_case: bool, read_only: bool) -> Result<Self> {
        if !path.exists() {
            return Err(IndexError::Store {
                path: path.to_path_buf(),
                message: "no index found; build it first".to_string(),
            });
        }

        let snapshot = ConstStore::open(path)?;
        if snapshot.ignore_case() != ignore_case {
            return Err(IndexError::Config(format!(
                "{} was built with IGNORE_CASE={} but the configuration says {}",
                path.display(),
                snapshot.ignore_case(),
                ignore_case
            )));
        }
        let mut map: BTreeMap<Vec<u8>, Vec<u8>> = snapshot
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect();
        drop(snapshot);

        let journal = journal_path(path);
        let mut dirty = false;
        if journal.exists() {
            let bytes = fs::read(&journal).map_err(|e| IndexError::file(&journal, e))?;
            let (applied, valid_len) = replay(&bytes, &mut map);
            if applied > 0 {
                log::info!(
                    "replayed {} journal records for {}",
                    applied,
                    path.display()
                );
                dirty = true;
            }
            if valid_len < bytes.len() {
                log::warn!(
                    "discarding {} bytes of torn journal tail in {}",
                    bytes.len() - valid_len,
                    journal.display()
                );
                if !read_only {
                    let file = OpenOptions::new()
                        .write(true)
                        .open(&journal)
                        .map_err(|e| IndexError::file(&journal, e))?;
                    file.set_len(valid_len as u64)?;
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            persistent: true,
            map,
            journal: None,
            ignore_case,
            read_only,
            dirty,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Push buffered journal records to disk
    pub fn sync(&mut self) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.flush()?;
            journal.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Write a new snapshot holding the current contents and drop the journal
    pub fn close_reorganize(mut self) -> Result<()> {
        if !self.persistent || self.read_only {
            return Ok(());
        }

        if let Some(mut journal) = self.journal.take() {
            journal.flush()?;
        }

        if self.dirty || !self.path.exists() {
            let entries: Vec<(&[u8], &[u8])> = self
                .map
                .iter()
                .map(|(k, v)| (k.as_slice(), v.as_slice()))
                .collect();
            write_snapshot(&self.path, self.ignore_case, &entries)?;
            log::debug!(
                "reorganized {} ({} records)",
                self.path.display(),
                entries.len()
            );
        }

        let journal = journal_path(&self.path);
        if journal.exists() {
            fs::remove_file(&journal).map_err(|e| IndexError::file(&journal, e))?;
        }
        Ok(())
    }

    fn error(&self, key: &[u8], message: &str) -> IndexError {
        IndexError::Store {
            path: self.path.clone(),
            message: format!("{} '{}'", message, String::from_utf8_lossy(key)),
        }
    }

    fn log_op(&mut self, op: u8, key: &[u8], value: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(self.error(key, "store is read-only, cannot modify"));
        }
        if let Some(journal) = self.journal.as_mut() {
            let klen = u32::try_from(key.len()).map_err(|_| IndexError::Store {
                path: self.path.clone(),
                message: "key too large".to_string(),
            })?;
            let vlen = u32::try_from(value.len()).map_err(|_| IndexError::Store {
                path: self.path.clone(),
                message: "value too large".to_string(),
            })?;
            journal.write_all(&[op])?;
            journal.write_all(&klen.to_le_bytes())?;
            journal.write_all(&vlen.to_le_bytes())?;
            journal.write_all(key)?;
            journal.write_all(value)?;
        }
        self.dirty = true;
        Ok(())
    }
}

/// Apply journal records to `map`; returns the record count and the length of
/// the intact prefix
fn replay(bytes: &[u8], map: &mut BTreeMap<Vec<u8>, Vec<u8>>) -> (usize, usize) {
    let mut offset = 0;
    let mut applied = 0;
    while offset + RECORD_HEADER <= bytes.len() {
        let op = bytes[offset];
        let klen = u32::from_le_bytes([
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
            bytes[offset + 4],
        ]) as usize;
        let vlen = u32::from_le_bytes([
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
            bytes[offset + 8],
        ]) as usize;
        let end = offset + RECORD_HEADER + klen + vlen;
        if end > bytes.len() {
            break;
        }
        let key = &bytes[offset + RECORD_HEADER..offset + RECORD_HEADER + klen];
        let value = &bytes[offset + RECORD_HEADER + klen..end];
        match op {
            OP_PUT => {
                map.insert(key.to_vec(), value.to_vec());
            }
            OP_REMOVE => {
                map.remove(key);
            }
            _ => break,
        }
        applied += 1;
        offset = end;
    }
    (applied, offset)
}

/// Iterator over a journaled store in key order
pub struct JournalIter<'a> {
    inner: btree_map::Iter<'a, Vec<u8>, Vec<u8>>,
}

impl<'a> Iterator for JournalIter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl KvRead for JournalStore {
    type Iter<'a> = JournalIter<'a>;

    fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let key = fold_key(key, self.ignore_case);
        self.map.get(&*key).map(Vec::as_slice)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    fn iter(&self) -> Self::Iter<'_> {
        JournalIter {
            inner: self.map.iter(),
        }
    }
}

impl KvWrite for JournalStore {
    fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = fold_key(key, self.ignore_case).into_owned();
        if self.map.contains_key(&key) {
            return Err(self.error(&key, "key already exists"));
        }
        self.log_op(OP_PUT, &key, value)?;
        self.map.insert(key, value.to_vec());
        Ok(())
    }

    fn replace(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = fold_key(key, self.ignore_case).into_owned();
        self.log_op(OP_PUT, &key, value)?;
        self.map.insert(key, value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<()> {
        let key = fold_key(key, self.ignore_case).into_owned();
        if !self.map.contains_key(&key) {
            return Err(self.error(&key, "no such key"));
        }
        self.log_op(OP_REMOVE, &key, &[])?;
        self.map.remove(&key);
        Ok(())
    }
}
