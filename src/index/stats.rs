use crate::config::IndexConfig;
use crate::index::reader::IndexReader;
use crate::store::journal::journal_path;
use anyhow::Result;
use std::path::Path;

/// Display index statistics
pub fn show_stats(config: &IndexConfig) -> Result<()> {
    let reader = IndexReader::open(config)?;
    let meta = reader.meta();

    println!("Index Statistics");
    println!("================");
    println!();
    println!("Index location:   {}", reader.db_path().display());
    if let Some(dir) = config.directory.as_deref() {
        println!("Documents root:   {}", dir.display());
    }
    println!("Index version:    {}", meta.version);
    println!("Document count:   {}", reader.document_count());
    println!("Word count:       {}", reader.postings().word_count());
    println!("Ignore case:      {}", if meta.ignore_case { "yes" } else { "no" });
    println!("Min word size:    {}", meta.min_word_size);

    let pending: Vec<String> = [config.names_path(), config.words_path()]
        .iter()
        .filter(|path| journal_path(path).exists())
        .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    if !pending.is_empty() {
        println!("Pending journal:  {} (run 'irx compact')", pending.join(", "));
    }

    // Most frequent words by total occurrences
    let mut frequent: Vec<(String, u64, usize)> = Vec::new();
    reader.postings().for_each_posting(|word, view| {
        frequent.push((
            String::from_utf8_lossy(word).into_owned(),
            view.total_occurrences(),
            view.entry_count(),
        ));
        Ok(())
    })?;
    frequent.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    if !frequent.is_empty() {
        println!();
        println!("Most frequent words:");
        for (word, occurrences, docs) in frequent.iter().take(15) {
            println!("  {:20} {} in {} documents", word, occurrences, docs);
        }
        if frequent.len() > 15 {
            println!("  ... and {} more", frequent.len() - 15);
        }
    }

    // Index size
    if let Ok(size) = dir_size(reader.db_path()) {
        println!();
        println!("Index size:       {}", format_size(size));
    }

    // Timestamps
    println!();
    println!("Created:          {}", format_timestamp(meta.created_at));
    println!("Updated:          {}", format_timestamp(meta.updated_at));

    Ok(())
}

/// Calculate directory size recursively
fn dir_size(path: &Path) -> std::io::Result<u64> {
    let mut size = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                size += entry.metadata()?.len();
            } else if path.is_dir() {
                size += dir_size(&path)?;
            }
        }
    }
    Ok(size)
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format unix timestamp
fn format_timestamp(ts: u64) -> String {
    if ts == 0 {
        return "unknown".to_string();
    }
    use std::time::{Duration, UNIX_EPOCH};
    let datetime = UNIX_EPOCH + Duration::from_secs(ts);
    format!("{:?}", datetime)
}
