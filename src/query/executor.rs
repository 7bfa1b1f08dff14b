use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::index::phrase::{PhraseMatcher, Proximity};
use crate::index::posting::PostingView;
use crate::index::reader::IndexReader;
use crate::index::types::{DocId, MatchRecord};
use crate::query::collector::MatchCollector;
use crate::query::normalize::{normalize, rejoin_args};
use crate::query::parser::{Leaf, parse_boolean};
use crate::store::{ConstStore, KvRead, scan_matching};
use roaring::RoaringTreemap;
use std::borrow::Cow;

/// Query evaluation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Largest gap in bytes between consecutive words of a quoted phrase
    pub max_distance: u32,
    /// Report a document once when several expanded words reach it
    pub dedup_wildcards: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_distance: 2,
            dedup_wildcards: true,
        }
    }
}

impl QueryOptions {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            max_distance: config.max_distance,
            ..Self::default()
        }
    }
}

/// How a term is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    /// Single word, looked up directly
    Plain,
    /// `*`/`?` pattern expanded over the word store
    Meta,
    /// Several words matched by position
    Phrase,
}

/// Classify one term of a query; `quoted` terms are never wildcards
pub fn classify(term: &str, quoted: bool) -> TermKind {
    if term.contains(char::is_whitespace) {
        TermKind::Phrase
    } else if !quoted && term.contains(['*', '?']) {
        TermKind::Meta
    } else {
        TermKind::Plain
    }
}

fn is_wildcard(term: &str) -> bool {
    term.contains(['*', '?'])
}

/// Strip one pair of surrounding double quotes
fn unquote(text: &str) -> Option<&str> {
    text.strip_prefix('"')?.strip_suffix('"')
}

/// Leaf of a boolean query, resolved once per query
enum LeafEval<'r> {
    /// Matches every document
    All,
    /// Matches nothing: unknown word, too short, or phrase with a missing word
    Never,
    Plain(PostingView<'r>),
    Meta(RoaringTreemap),
    Phrase(PhraseMatcher<'r>),
}

impl LeafEval<'_> {
    fn matches(&self, doc_id: DocId) -> bool {
        match self {
            LeafEval::All => true,
            LeafEval::Never => false,
            LeafEval::Plain(view) => view.contains_doc(doc_id),
            LeafEval::Meta(docs) => docs.contains(doc_id.0),
            LeafEval::Phrase(phrase) => phrase.matches(doc_id) > 0,
        }
    }
}

/// Evaluates queries against an open index
pub struct QueryExecutor<'r, S: KvRead = ConstStore> {
    reader: &'r IndexReader<S>,
    options: QueryOptions,
}

impl<'r, S: KvRead> QueryExecutor<'r, S> {
    pub fn new(reader: &'r IndexReader<S>) -> Self {
        Self::with_options(reader, QueryOptions::default())
    }

    pub fn with_options(reader: &'r IndexReader<S>, options: QueryOptions) -> Self {
        Self { reader, options }
    }

    /// Evaluate a query given as shell arguments
    pub fn execute_args<A: AsRef<str>>(&self, args: &[A]) -> Result<Vec<MatchRecord>> {
        self.execute(&rejoin_args(args))
    }

    /// Evaluate a query and return its matches ranked by occurrence count
    pub fn execute(&self, raw: &str) -> Result<Vec<MatchRecord>> {
        let query = normalize(raw);
        if query.text.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!("query '{}' (boolean: {})", query.text, query.boolean);

        let collector = if query.boolean {
            self.boolean(&query.text)?
        } else {
            match unquote(&query.text) {
                Some(inner) => self.term(inner, true)?,
                None => self.term(&query.text, false)?,
            }
        };
        Ok(collector.into_ranked())
    }

    fn term(&self, text: &str, quoted: bool) -> Result<MatchCollector> {
        if !quoted && is_wildcard(text) {
            if text.contains(char::is_whitespace) {
                return Err(IndexError::QuerySyntax(format!(
                    "wildcard terms cannot contain whitespace: '{}'",
                    text
                )));
            }
            if text == "*" {
                return self.all_documents();
            }
            return self.meta(text);
        }

        match classify(text, quoted) {
            TermKind::Phrase => {
                let proximity = if quoted {
                    Proximity::Within(self.options.max_distance)
                } else {
                    Proximity::Near
                };
                self.phrase(text, proximity)
            }
            _ => self.plain(text),
        }
    }

    fn filename(&self, doc_id: DocId) -> Result<Cow<'r, str>> {
        self.reader.filename(doc_id).ok_or_else(|| {
            IndexError::CorruptIndex(format!("document {} has postings but no filename", doc_id))
        })
    }

    fn all_documents(&self) -> Result<MatchCollector> {
        let mut collector = MatchCollector::new(false);
        for (_, name) in self.reader.documents() {
            collector.push(&name, 0);
        }
        Ok(collector)
    }

    fn plain(&self, word: &str) -> Result<MatchCollector> {
        let mut collector = MatchCollector::new(false);
        if let Some(view) = self.reader.postings().posting(word.as_bytes())? {
            for entry in view.entries() {
                let name = self.filename(entry.doc_id)?;
                collector.push(&name, entry.occurrence_count());
            }
        }
        Ok(collector)
    }

    fn meta(&self, pattern: &str) -> Result<MatchCollector> {
        let mut collector = MatchCollector::new(self.options.dedup_wildcards);
        let postings = self.reader.postings();
        let mut expanded = 0usize;
        for (word, bytes) in scan_matching(postings.store(), pattern)? {
            if !postings.accepts(word) {
                continue;
            }
            expanded += 1;
            let view = PostingView::parse(bytes).map_err(|e| IndexError::posting(word, e))?;
            for entry in view.entries() {
                let name = self.filename(entry.doc_id)?;
                collector.push(&name, entry.occurrence_count());
            }
        }
        log::debug!("'{}' expanded to {} words", pattern, expanded);
        Ok(collector)
    }

    fn phrase(&self, text: &str, proximity: Proximity) -> Result<MatchCollector> {
        let mut collector = MatchCollector::new(false);
        if let Some(matcher) = PhraseMatcher::new(self.reader.postings(), text, proximity)? {
            matcher.for_each_match(|doc_id, hits| {
                let name = self.filename(doc_id)?;
                collector.push(&name, hits);
                Ok(())
            })?;
        }
        Ok(collector)
    }

    /// Documents of a wildcard pattern, as a set of doc ids
    fn meta_documents(&self, pattern: &str) -> Result<RoaringTreemap> {
        let postings = self.reader.postings();
        let mut docs = RoaringTreemap::new();
        for (word, bytes) in scan_matching(postings.store(), pattern)? {
            if !postings.accepts(word) {
                continue;
            }
            let view = PostingView::parse(bytes).map_err(|e| IndexError::posting(word, e))?;
            for entry in view.entries() {
                docs.insert(entry.doc_id.0);
            }
        }
        Ok(docs)
    }

    fn resolve(&self, leaf: &Leaf) -> Result<LeafEval<'r>> {
        let (text, quoted) = match leaf {
            Leaf::Word(word) => (word.as_str(), false),
            Leaf::Phrase(phrase) => (phrase.as_str(), true),
        };
        if !quoted && text == "*" {
            return Ok(LeafEval::All);
        }

        let eval = match classify(text, quoted) {
            TermKind::Meta => LeafEval::Meta(self.meta_documents(text)?),
            TermKind::Phrase => {
                match PhraseMatcher::new(
                    self.reader.postings(),
                    text,
                    Proximity::Within(self.options.max_distance),
                )? {
                    Some(matcher) => LeafEval::Phrase(matcher),
                    None => LeafEval::Never,
                }
            }
            TermKind::Plain => match self.reader.postings().posting(text.as_bytes())? {
                Some(view) => LeafEval::Plain(view),
                None => LeafEval::Never,
            },
        };
        Ok(eval)
    }

    /// Evaluate a boolean expression over every registered document
    fn boolean(&self, text: &str) -> Result<MatchCollector> {
        let query = parse_boolean(text)?;
        let leaves = query
            .leaves
            .iter()
            .map(|leaf| self.resolve(leaf))
            .collect::<Result<Vec<_>>>()?;

        let mut collector = MatchCollector::new(false);
        let mut memo: Vec<Option<bool>> = vec![None; leaves.len()];
        for (doc_id, name) in self.reader.documents() {
            memo.fill(None);
            let matched = query.expr.evaluate(&mut |slot| {
                Ok(*memo[slot].get_or_insert_with(|| leaves[slot].matches(doc_id)))
            })?;
            if matched {
                collector.push(&name, 0);
            }
        }
        Ok(collector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::posting_store::PostingStore;
    use crate::store::{JournalStore, KvWrite};
    use crate::utils::WordTokenizer;

    fn reader(docs: &[(u64, &str, &str)]) -> IndexReader<JournalStore> {
        let mut names = JournalStore::in_memory(false);
        let mut words = PostingStore::new(JournalStore::in_memory(false), 3);
        for &(inode, name, text) in docs {
            let doc_id = DocId::from_inode(inode);
            names.insert(&doc_id.to_key(), name.as_bytes()).unwrap();
            for (pos, word) in WordTokenizer::default().words(text.as_bytes()) {
                words.add(word, doc_id, pos as u32).unwrap();
            }
            words.flush().unwrap();
        }
        IndexReader::from_stores(names, words.into_inner().unwrap(), 3)
    }

    fn names(matches: &[MatchRecord]) -> Vec<&str> {
        matches.iter().map(|m| m.filename.as_str()).collect()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("cat", false), TermKind::Plain);
        assert_eq!(classify("c?t", false), TermKind::Meta);
        assert_eq!(classify("c?t", true), TermKind::Plain);
        assert_eq!(classify("red fox", true), TermKind::Phrase);
    }

    #[test]
    fn test_plain_word_counts() {
        let reader = reader(&[(1, "a.txt", "hello world hello"), (2, "b.txt", "hello")]);
        let results = QueryExecutor::new(&reader).execute("hello").unwrap();
        assert_eq!(
            results,
            vec![MatchRecord::new("a.txt", 2), MatchRecord::new("b.txt", 1)]
        );
        assert!(QueryExecutor::new(&reader).execute("missing").unwrap().is_empty());
        assert!(QueryExecutor::new(&reader).execute("   ").unwrap().is_empty());
    }

    #[test]
    fn test_quoted_single_word() {
        let reader = reader(&[(1, "a.txt", "hello")]);
        let results = QueryExecutor::new(&reader).execute("\"hello\"").unwrap();
        assert_eq!(names(&results), vec!["a.txt"]);
    }

    #[test]
    fn test_boolean_and() {
        let reader = reader(&[(1, "both.txt", "cat and dog"), (2, "cat.txt", "cat only")]);
        let results = QueryExecutor::new(&reader).execute("cat AND dog").unwrap();
        assert_eq!(results, vec![MatchRecord::new("both.txt", 0)]);
    }

    #[test]
    fn test_boolean_or_not_and_wildcards() {
        let reader = reader(&[
            (1, "a.txt", "cat"),
            (2, "b.txt", "dog"),
            (3, "c.txt", "cot bird"),
        ]);
        let exec = QueryExecutor::new(&reader);
        assert_eq!(names(&exec.execute("cat or dog").unwrap()), vec!["a.txt", "b.txt"]);
        assert_eq!(names(&exec.execute("not cat").unwrap()), vec!["b.txt", "c.txt"]);
        assert_eq!(names(&exec.execute("c?t and not bird").unwrap()), vec!["a.txt"]);
        assert_eq!(
            names(&exec.execute("\"cot bird\" or dog").unwrap()),
            vec!["b.txt", "c.txt"]
        );
    }

    #[test]
    fn test_boolean_syntax_error() {
        let reader = reader(&[(1, "a.txt", "cat")]);
        let err = QueryExecutor::new(&reader).execute("cat and").unwrap_err();
        assert!(matches!(err, IndexError::QuerySyntax(_)));
    }

    #[test]
    fn test_wildcard_dedup() {
        let reader = reader(&[(1, "both.txt", "cat cot"), (2, "cot.txt", "cot")]);

        let dedup = QueryExecutor::new(&reader).execute("c?t").unwrap();
        assert_eq!(names(&dedup), vec!["both.txt", "cot.txt"]);

        let options = QueryOptions {
            dedup_wildcards: false,
            ..QueryOptions::default()
        };
        let all = QueryExecutor::with_options(&reader, options)
            .execute("c?t")
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_wildcard_with_space_is_error() {
        let reader = reader(&[(1, "a.txt", "cat")]);
        let err = QueryExecutor::new(&reader).execute("c?t dog").unwrap_err();
        assert!(matches!(err, IndexError::QuerySyntax(_)));
    }

    #[test]
    fn test_match_all() {
        let reader = reader(&[(1, "a.txt", "cat"), (2, "b.txt", "")]);
        let results = QueryExecutor::new(&reader).execute("*").unwrap();
        assert_eq!(names(&results), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_phrase_and_near() {
        let reader = reader(&[
            (1, "exact.txt", "the red fox ran"),
            (2, "apart.txt", "fox, then much later red"),
        ]);
        let exec = QueryExecutor::new(&reader);
        assert_eq!(names(&exec.execute("\"red fox\"").unwrap()), vec!["exact.txt"]);
        assert_eq!(
            names(&exec.execute("red fox").unwrap()),
            vec!["apart.txt", "exact.txt"]
        );
        assert_eq!(
            names(&exec.execute_args(&["red fox"]).unwrap()),
            vec!["apart.txt", "exact.txt"]
        );
        assert_eq!(
            names(&exec.execute_args(&["red fox", "ran"]).unwrap()),
            vec!["exact.txt"]
        );
    }

    #[test]
    fn test_single_argument_is_whole_query() {
        let reader = reader(&[
            (1, "both.txt", "the cat chased the dog"),
            (2, "cat.txt", "a lonely cat"),
            (3, "near.txt", "red things and a fox"),
        ]);
        let exec = QueryExecutor::new(&reader);
        assert_eq!(
            exec.execute_args(&["cat AND dog"]).unwrap(),
            exec.execute("cat AND dog").unwrap()
        );
        assert_eq!(names(&exec.execute_args(&["cat AND dog"]).unwrap()), vec!["both.txt"]);
        assert_eq!(
            exec.execute_args(&["red fox"]).unwrap(),
            exec.execute("red fox").unwrap()
        );
        assert_eq!(names(&exec.execute_args(&["red fox"]).unwrap()), vec!["near.txt"]);
    }

    #[test]
    fn test_max_distance_option() {
        let reader = reader(&[(1, "gap.txt", "red    fox")]);
        let strict = QueryExecutor::new(&reader);
        assert!(strict.execute("\"red fox\"").unwrap().is_empty());

        let loose = QueryExecutor::with_options(
            &reader,
            QueryOptions {
                max_distance: 4,
                ..QueryOptions::default()
            },
        );
        assert_eq!(names(&loose.execute("\"red fox\"").unwrap()), vec!["gap.txt"]);
    }
}
