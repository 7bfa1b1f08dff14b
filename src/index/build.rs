use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::session::{IndexSession, file_identity};
use crate::index::types::{Operation, SessionStats};
use crate::store::KvRead;
use crate::utils::progress::{document_bar, spinner};
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Regular files of one directory, relative to the document root, ordered by
/// inode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentGroup {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

impl DocumentGroup {
    fn count(groups: &[DocumentGroup]) -> usize {
        groups.iter().map(|g| g.files.len()).sum()
    }
}

/// Walk the document root, skipping the index directory
pub fn collect_documents(config: &IndexConfig) -> Result<Vec<DocumentGroup>> {
    let root = canonical(config.directory()?)?;
    let db = config.db.canonicalize().ok();

    let walker = WalkBuilder::new(&root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| db.as_deref() != Some(entry.path()))
        .build();

    let mut groups: BTreeMap<PathBuf, Vec<(u64, PathBuf)>> = BTreeMap::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(rel_path) = entry.path().strip_prefix(&root) else {
            continue;
        };
        let metadata = fs::metadata(entry.path()).map_err(|e| IndexError::file(entry.path(), e))?;
        let inode = file_identity(entry.path(), &metadata);
        let dir = rel_path.parent().map(Path::to_path_buf).unwrap_or_default();
        groups
            .entry(dir)
            .or_default()
            .push((inode, rel_path.to_path_buf()));
    }

    Ok(into_groups(groups))
}

fn into_groups(groups: BTreeMap<PathBuf, Vec<(u64, PathBuf)>>) -> Vec<DocumentGroup> {
    groups
        .into_iter()
        .map(|(dir, mut files)| {
            files.sort();
            DocumentGroup {
                dir,
                files: files.into_iter().map(|(_, path)| path).collect(),
            }
        })
        .collect()
}

/// Group files named on the command line; paths may be absolute or relative
/// to the document root
fn explicit_documents(config: &IndexConfig, files: &[PathBuf]) -> Result<Vec<DocumentGroup>> {
    let root = canonical(config.directory()?)?;
    let mut groups: BTreeMap<PathBuf, Vec<(u64, PathBuf)>> = BTreeMap::new();

    for file in files {
        let full = if file.is_absolute() {
            file.clone()
        } else {
            root.join(file)
        };
        let full = canonical(&full)?;
        let rel_path = full.strip_prefix(&root).map_err(|_| {
            IndexError::Config(format!(
                "{} is outside the document root {}",
                file.display(),
                root.display()
            ))
        })?;
        let metadata = fs::metadata(&full).map_err(|e| IndexError::file(&full, e))?;
        let dir = rel_path.parent().map(Path::to_path_buf).unwrap_or_default();
        groups
            .entry(dir)
            .or_default()
            .push((file_identity(&full, &metadata), rel_path.to_path_buf()));
    }

    Ok(into_groups(groups))
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|e| IndexError::file(path, e))
}

/// Index every document under the root into a fresh index
pub fn build_index(config: &IndexConfig, quiet: bool) -> Result<SessionStats> {
    let root = config.directory()?;
    if !quiet {
        println!("Indexing: {}", root.display());
    }
    fs::create_dir_all(&config.db).map_err(|e| IndexError::file(&config.db, e))?;

    let discover = spinner("Discovering files...", quiet);
    let groups = collect_documents(config)?;
    if let Some(spinner) = discover {
        spinner.finish_with_message(format!("Found {} files", DocumentGroup::count(&groups)));
    }

    let session = IndexSession::create(config)?;
    run(session, &groups, quiet)
}

/// Apply `operation` to the named files, or to the whole tree when none are
/// given
pub fn update_index(
    config: &IndexConfig,
    operation: Operation,
    files: &[PathBuf],
    quiet: bool,
) -> Result<SessionStats> {
    if !operation.is_mutating() {
        return Err(IndexError::Unsupported(
            "use the check command to verify an index".to_string(),
        ));
    }
    let session = IndexSession::open(config, operation)?;
    let groups = if files.is_empty() {
        collect_documents(config)?
    } else {
        explicit_documents(config, files)?
    };
    run(session, &groups, quiet)
}

fn run(mut session: IndexSession, groups: &[DocumentGroup], quiet: bool) -> Result<SessionStats> {
    let bar = document_bar(
        DocumentGroup::count(groups) as u64,
        "Processing files...",
        quiet,
    );

    for group in groups {
        session.enter_directory();
        for file in &group.files {
            session.process_file(file)?;
            if let Some(ref bar) = bar {
                bar.inc(1);
            }
        }
    }

    if let Some(bar) = bar {
        bar.finish_with_message(format!("Processed {} documents", session.stats().documents));
    }

    let finalize = spinner("Reorganizing index...", quiet);
    let stats = session.close()?;
    if let Some(spinner) = finalize {
        spinner.finish_with_message("Index complete");
    }
    Ok(stats)
}

/// Verify the index against the documents.
///
/// The first phase re-reads every document and checks each recorded
/// occurrence; the second checks that every posting entry names a registered
/// document. Progress markers are written to `out`.
pub fn check_index<W: Write>(config: &IndexConfig, out: &mut W) -> Result<SessionStats> {
    let mut session = IndexSession::open(config, Operation::Check)?;
    let groups = collect_documents(config)?;

    write!(out, "CHECK_1")?;
    out.flush()?;
    for group in &groups {
        session.enter_directory();
        for file in &group.files {
            session.process_file(file)?;
            write!(out, ".")?;
        }
        out.flush()?;
    }

    let registered = session.names().len();
    if registered != session.stats().documents as usize {
        return Err(IndexError::CorruptIndex(format!(
            "{} documents are registered but {} were found",
            registered,
            session.stats().documents
        )));
    }

    write!(out, "CHECK_2")?;
    out.flush()?;
    let entries = session.check_all_entries()?;
    log::debug!("{} posting entries resolved", entries);
    writeln!(out, "OK")?;

    session.close()
}
