use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::session::{read_meta, write_meta};
use crate::store::{JournalStore, KvRead, journal::journal_path};

/// Fold journals left by interrupted or incremental runs into new snapshots.
///
/// Returns the number of stores that had a journal.
pub fn reorganize(config: &IndexConfig) -> Result<usize> {
    let names_path = config.names_path();
    let words_path = config.words_path();
    if !names_path.exists() || !words_path.exists() {
        return Err(IndexError::Store {
            path: config.db.clone(),
            message: "no index found; build it first".to_string(),
        });
    }

    let pending: Vec<_> = [(&names_path, false), (&words_path, config.ignore_case)]
        .into_iter()
        .filter(|(path, _)| journal_path(path).exists())
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let mut counts = Vec::with_capacity(2);
    for &(path, ignore_case) in &pending {
        let store = JournalStore::open(path, ignore_case)?;
        counts.push((path.clone(), store.len() as u64));
        store.close_reorganize()?;
        log::info!("folded journal of {}", path.display());
    }

    if let Some(mut meta) = read_meta(&config.meta_path())? {
        for (path, count) in counts {
            if path == names_path {
                meta.doc_count = count;
            } else {
                meta.word_count = count;
            }
        }
        write_meta(&config.meta_path(), &meta)?;
    }
    Ok(pending.len())
}
