//! Query evaluation.
//!
//! A raw query is normalized, then either parsed as a boolean expression
//! (when it contains `and`/`or`/`not` tokens) or evaluated as a single term:
//! a plain word, a `*`/`?` pattern expanded over the word store, or a phrase.
//! Matches are ranked by occurrence count.

pub mod collector;
pub mod executor;
pub mod normalize;
pub mod parser;

pub use collector::{MatchCollector, compare_matches};
pub use executor::{QueryExecutor, QueryOptions, TermKind, classify};
pub use normalize::{NormalizedQuery, normalize, rejoin_args};
pub use parser::{BoolExpr, BoolQuery, Leaf, parse_boolean};
