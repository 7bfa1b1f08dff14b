//! Per-extension content preparation: external filter commands, tag
//! skipping and the bad-words exclusion list.

use crate::config::{IndexConfig, split_list};
use crate::error::{IndexError, Result};
use crate::utils::WordTokenizer;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

/// Placeholder replaced by the document path in a filter command
const FILE_PLACEHOLDER: &str = "$FILE";

/// External command turning a document into plain text on its stdout
#[derive(Debug, Clone)]
pub struct FilterCommand {
    line: String,
    program: String,
    args: Vec<String>,
}

impl FilterCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = split_list(line).into_iter();
        let program = words
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| IndexError::Config(format!("empty filter command '{}'", line)))?;
        Ok(Self {
            line: line.to_string(),
            program,
            args: words.collect(),
        })
    }

    /// Run on `path`; `$FILE` arguments become the path, otherwise the path
    /// is appended as the last argument
    pub fn run(&self, path: &Path) -> Result<Vec<u8>> {
        let file = path.to_string_lossy();
        let mut command = Command::new(&self.program);
        let mut substituted = false;
        for arg in &self.args {
            if arg.contains(FILE_PLACEHOLDER) {
                command.arg(arg.replace(FILE_PLACEHOLDER, &file));
                substituted = true;
            } else {
                command.arg(arg);
            }
        }
        if !substituted {
            command.arg(path);
        }

        let output = command
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| self.failure(path, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(
                path,
                format!("{} {}", output.status, stderr.trim()).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }

    fn failure(&self, path: &Path, message: String) -> IndexError {
        IndexError::Filter {
            command: self.line.clone(),
            path: path.to_path_buf(),
            message,
        }
    }
}

/// Content and tokenizer settings for the documents of one index
#[derive(Debug, Clone)]
pub struct ContentFilter {
    skip_tag_ext: Vec<String>,
    commands: Vec<(String, FilterCommand)>,
    bad_words: Option<GlobSet>,
    bad_words_ext: Vec<String>,
}

impl ContentFilter {
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        let commands = config
            .filter_ext
            .iter()
            .zip(&config.filter_cmd)
            .map(|(ext, line)| Ok((ext.clone(), FilterCommand::parse(line)?)))
            .collect::<Result<Vec<_>>>()?;

        let bad_words = match config.bad_words.as_deref() {
            Some(patterns) => Some(build_bad_words(patterns, config.ignore_case)?),
            None => None,
        };

        Ok(Self {
            skip_tag_ext: config.skip_tag_xml.clone(),
            commands,
            bad_words,
            bad_words_ext: config.bad_words_ext.clone(),
        })
    }

    /// Document text, through the filter command registered for its extension
    pub fn load(&self, path: &Path) -> Result<Vec<u8>> {
        let ext = extension(path);
        match self.commands.iter().find(|(e, _)| *e == ext) {
            Some((_, command)) => {
                log::debug!("filtering {} through '{}'", path.display(), command.line);
                command.run(path)
            }
            None => fs::read(path).map_err(|e| IndexError::file(path, e)),
        }
    }

    pub fn tokenizer_for(&self, ext: &str) -> WordTokenizer {
        WordTokenizer::new(self.skip_tag_ext.iter().any(|e| e == ext))
    }

    /// Exclusion list active for documents with this extension, if any
    pub fn bad_words_for(&self, ext: &str) -> Option<&GlobSet> {
        let active = self.bad_words_ext.is_empty() || self.bad_words_ext.iter().any(|e| e == ext);
        self.bad_words.as_ref().filter(|_| active)
    }

    pub fn is_bad_word(&self, ext: &str, word: &[u8]) -> bool {
        self.bad_words_for(ext)
            .is_some_and(|set| set.is_match(&*String::from_utf8_lossy(word)))
    }
}

/// Extension without the dot, empty when there is none
pub fn extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn build_bad_words(patterns: &str, ignore_case: bool) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns.split('|').map(str::trim).filter(|p| !p.is_empty()) {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .literal_separator(false)
            .build()
            .map_err(|e| IndexError::Config(format!("BAD_WORDS pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IndexError::Config(format!("BAD_WORDS: {}", e)))
}
