//! Indexer configuration.
//!
//! Two file formats are accepted. The classic one is a list of `KEY value`
//! lines:
//!
//! ```text
//! # where the stores live
//! DB            /var/lib/irx
//! DIRECTORY     /srv/docs
//! IGNORE_CASE   yes
//! SKIP_TAG_XML  html xml
//! FILTER_EXT    pdf
//! FILTER_CMD    "pdftotext $FILE -"
//! ```
//!
//! A file ending in `.json` is read as a JSON object with the same keys.
//! Both go through the same serde model, so list values may be written as a
//! whitespace-separated string (double quotes group words) or a JSON array.

use crate::error::{IndexError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const NAMES_FILE: &str = "names.db";
pub const WORDS_FILE: &str = "words.db";
pub const META_FILE: &str = "meta.json";

fn default_dimension() -> u32 {
    1000
}

fn default_min_word_size() -> usize {
    3
}

fn default_max_distance() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct IndexConfig {
    /// Directory holding the names and words stores
    #[serde(deserialize_with = "lenient::path")]
    pub db: PathBuf,

    /// Root of the document tree
    #[serde(default, deserialize_with = "lenient::optional_path")]
    pub directory: Option<PathBuf>,

    /// Expected number of distinct words per document, used to size the
    /// indexing write-back cache
    #[serde(default = "default_dimension", deserialize_with = "lenient::number")]
    pub dimension: u32,

    #[serde(default, deserialize_with = "lenient::boolean")]
    pub ignore_case: bool,

    /// Extensions whose XML/HTML tags are skipped while tokenizing
    #[serde(default, deserialize_with = "lenient::extensions")]
    pub skip_tag_xml: Vec<String>,

    #[serde(default = "default_min_word_size", deserialize_with = "lenient::number")]
    pub min_word_size: usize,

    /// `|`-separated glob patterns of words never indexed
    #[serde(default, deserialize_with = "lenient::optional_text")]
    pub bad_words: Option<String>,

    /// Extensions the bad words apply to; empty means every extension
    #[serde(default, deserialize_with = "lenient::extensions")]
    pub bad_words_ext: Vec<String>,

    /// Treat each directory's files as one logical document
    #[serde(default, deserialize_with = "lenient::boolean")]
    pub dir_content_as_doc: bool,

    #[serde(default, deserialize_with = "lenient::extensions")]
    pub filter_ext: Vec<String>,

    /// Commands producing text for the matching `FILTER_EXT` entry
    #[serde(default, deserialize_with = "lenient::list")]
    pub filter_cmd: Vec<String>,

    /// Maximum gap between the words of a quoted phrase
    #[serde(default = "default_max_distance", deserialize_with = "lenient::number")]
    pub max_distance: u32,
}

impl IndexConfig {
    /// Load from a `KEY value` file, or from JSON when the name ends in `.json`
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| IndexError::file(path, e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let value = if is_json {
            serde_json::from_str(&text)
                .map_err(|e| IndexError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            Value::Object(parse_key_values(&text))
        };

        Self::from_value(value).map_err(|e| match e {
            IndexError::Config(message) => {
                IndexError::Config(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Parse the `KEY value` format from a string
    pub fn from_key_values(text: &str) -> Result<Self> {
        Self::from_value(Value::Object(parse_key_values(text)))
    }

    fn from_value(value: Value) -> Result<Self> {
        let config: IndexConfig =
            serde_json::from_value(value).map_err(|e| IndexError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.filter_ext.len() != self.filter_cmd.len() {
            return Err(IndexError::Config(format!(
                "FILTER_EXT lists {} extensions but FILTER_CMD lists {} commands",
                self.filter_ext.len(),
                self.filter_cmd.len()
            )));
        }
        if self.min_word_size == 0 {
            return Err(IndexError::Config(
                "MIN_WORD_SIZE must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The document root; required by every operation that walks documents
    pub fn directory(&self) -> Result<&Path> {
        self.directory
            .as_deref()
            .ok_or_else(|| IndexError::Config("DIRECTORY is required".to_string()))
    }

    pub fn names_path(&self) -> PathBuf {
        self.db.join(NAMES_FILE)
    }

    pub fn words_path(&self) -> PathBuf {
        self.db.join(WORDS_FILE)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.db.join(META_FILE)
    }
}

/// Turn `KEY value` lines into a JSON object of string values
fn parse_key_values(text: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let (key, rest) = match line.find(char::is_whitespace) {
            Some(at) => (&line[..at], line[at..].trim()),
            None => (line, ""),
        };
        let rest = rest.strip_prefix('=').map(str::trim).unwrap_or(rest);
        map.insert(key.to_ascii_uppercase(), Value::String(rest.to_string()));
    }
    map
}

/// Strip one pair of surrounding double quotes from a single quoted value
fn unquote(value: &str) -> &str {
    match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(inner) if !inner.contains('"') => inner,
        _ => value,
    }
}

/// Split a list value on whitespace; double quotes group words into one item
pub fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;

    for c in value.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    items.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        items.push(current);
    }
    items
}

/// Field deserializers accepting both typed JSON values and the strings of
/// the `KEY value` format
mod lenient {
    use super::{split_list, unquote};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::fmt::Display;
    use std::path::PathBuf;
    use std::str::FromStr;

    pub fn optional_text<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => {
                let s = unquote(s.trim());
                Ok((!s.is_empty()).then(|| s.to_string()))
            }
            Value::Null => Ok(None),
            other => Err(D::Error::custom(format!("expected a string, found {}", other))),
        }
    }

    pub fn optional_path<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<PathBuf>, D::Error> {
        Ok(optional_text(deserializer)?.map(PathBuf::from))
    }

    pub fn path<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
        optional_path(deserializer)?.ok_or_else(|| D::Error::custom("path must not be empty"))
    }

    pub fn boolean<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Bool(b) => Ok(b),
            Value::Number(n) => Ok(n.as_u64() != Some(0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "yes" | "y" | "true" | "on" => Ok(true),
                "" | "0" | "no" | "n" | "false" | "off" => Ok(false),
                other => Err(D::Error::custom(format!("invalid boolean '{}'", other))),
            },
            Value::Null => Ok(false),
            other => Err(D::Error::custom(format!("invalid boolean {}", other))),
        }
    }

    pub fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let text = match Value::deserialize(deserializer)? {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            other => return Err(D::Error::custom(format!("invalid number {}", other))),
        };
        text.parse()
            .map_err(|e| D::Error::custom(format!("invalid number '{}': {}", text, e)))
    }

    pub fn list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(split_list(&s)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(D::Error::custom(format!("invalid list item {}", other))),
                })
                .collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(D::Error::custom(format!("invalid list {}", other))),
        }
    }

    /// A list of file extensions, stored without the leading dot
    pub fn extensions<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(list(deserializer)?
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .collect())
    }
}
