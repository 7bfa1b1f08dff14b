//! Boolean query expressions.
//!
//! ```text
//! expr   := term (OR term)*
//! term   := factor ((AND)? factor)*
//! factor := NOT* atom
//! atom   := '(' expr ')' | '"' phrase '"' | word
//! ```
//!
//! Operators are the upper-case keywords produced by query normalization.
//! Adjacent factors without an operator are joined by AND. Identical leaves
//! share one slot so their value can be memoised per document.

use crate::error::{IndexError, Result};

/// A leaf of a boolean query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    /// Bare word, possibly with `*`/`?` wildcards
    Word(String),
    /// Quoted text, matched as a phrase
    Phrase(String),
}

/// Boolean expression over leaf slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoolExpr {
    Leaf(usize),
    And(Vec<BoolExpr>),
    Or(Vec<BoolExpr>),
    Not(Box<BoolExpr>),
}

impl BoolExpr {
    /// Evaluate with short-circuiting; `leaf` is called with a slot index
    pub fn evaluate<F>(&self, leaf: &mut F) -> Result<bool>
    where
        F: FnMut(usize) -> Result<bool>,
    {
        match self {
            BoolExpr::Leaf(slot) => leaf(*slot),
            BoolExpr::And(nodes) => {
                for node in nodes {
                    if !node.evaluate(leaf)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            BoolExpr::Or(nodes) => {
                for node in nodes {
                    if node.evaluate(leaf)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            BoolExpr::Not(inner) => Ok(!inner.evaluate(leaf)?),
        }
    }
}

/// Parsed boolean query: the expression and its distinct leaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoolQuery {
    pub expr: BoolExpr,
    pub leaves: Vec<Leaf>,
}

/// Parse a normalized boolean query
pub fn parse_boolean(input: &str) -> Result<BoolQuery> {
    let mut parser = BoolParser::new(input);
    let expr = parser.parse_expr()?;
    parser.skip_whitespace();
    if !parser.is_eof() {
        return Err(syntax(format!(
            "garbage at end of query: '{}'",
            parser.remaining()
        )));
    }
    Ok(BoolQuery {
        expr,
        leaves: parser.leaves,
    })
}

fn syntax(message: String) -> IndexError {
    IndexError::QuerySyntax(message)
}

struct BoolParser<'a> {
    input: &'a str,
    pos: usize,
    leaves: Vec<Leaf>,
}

impl<'a> BoolParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            leaves: Vec::new(),
        }
    }

    fn parse_expr(&mut self) -> Result<BoolExpr> {
        let mut nodes = vec![self.parse_term()?];
        while self.consume_keyword("OR") {
            nodes.push(self.parse_term()?);
        }
        Ok(collapse(nodes, BoolExpr::Or))
    }

    fn parse_term(&mut self) -> Result<BoolExpr> {
        let mut nodes = vec![self.parse_factor()?];
        loop {
            self.skip_whitespace();
            if self.is_eof() || self.peek_char() == Some(')') || self.at_keyword("OR") {
                break;
            }
            self.consume_keyword("AND");
            nodes.push(self.parse_factor()?);
        }
        Ok(collapse(nodes, BoolExpr::And))
    }

    fn parse_factor(&mut self) -> Result<BoolExpr> {
        let mut negations = 0;
        while self.consume_keyword("NOT") {
            negations += 1;
        }
        let mut node = self.parse_atom()?;
        for _ in 0..negations {
            node = BoolExpr::Not(Box::new(node));
        }
        Ok(node)
    }

    fn parse_atom(&mut self) -> Result<BoolExpr> {
        self.skip_whitespace();

        if self.is_eof() || self.peek_char() == Some(')') {
            return Err(self.missing_operand());
        }
        if self.at_keyword("AND") || self.at_keyword("OR") {
            return Err(self.missing_operand());
        }

        if self.consume_char('(') {
            let start = self.pos;
            let node = self.parse_expr()?;
            self.skip_whitespace();
            if !self.consume_char(')') {
                return Err(syntax(format!(
                    "runaway parenthesis: '({}'",
                    &self.input[start..]
                )));
            }
            return Ok(node);
        }

        if self.consume_char('"') {
            let start = self.pos;
            while !self.is_eof() && self.peek_char() != Some('"') {
                self.advance();
            }
            if !self.consume_char('"') {
                return Err(syntax(format!(
                    "unterminated quote: '\"{}'",
                    &self.input[start..]
                )));
            }
            let phrase = self.input[start..self.pos - 1].to_string();
            return Ok(self.leaf(Leaf::Phrase(phrase)));
        }

        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || ch == '(' || ch == ')' {
                break;
            }
            self.advance();
        }
        let word = self.input[start..self.pos].to_string();
        Ok(self.leaf(Leaf::Word(word)))
    }

    fn leaf(&mut self, leaf: Leaf) -> BoolExpr {
        let slot = match self.leaves.iter().position(|l| *l == leaf) {
            Some(slot) => slot,
            None => {
                self.leaves.push(leaf);
                self.leaves.len() - 1
            }
        };
        BoolExpr::Leaf(slot)
    }

    fn missing_operand(&self) -> IndexError {
        if self.is_eof() {
            syntax("missing operand at end of query".to_string())
        } else {
            syntax(format!("missing operand before '{}'", self.remaining()))
        }
    }

    /// True when the input continues with `keyword` as a whole token
    fn at_keyword(&self, keyword: &str) -> bool {
        let rest = self.remaining();
        rest.starts_with(keyword)
            && rest[keyword.len()..]
                .chars()
                .next()
                .is_none_or(|c| c.is_whitespace() || c == '(' || c == ')')
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        if self.at_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn remaining(&self) -> &str {
        &self.input[self.pos..]
    }
}

fn collapse(mut nodes: Vec<BoolExpr>, join: fn(Vec<BoolExpr>) -> BoolExpr) -> BoolExpr {
    if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        join(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(s: &str) -> Leaf {
        Leaf::Word(s.to_string())
    }

    fn eval(query: &BoolQuery, truth: &[bool]) -> bool {
        query.expr.evaluate(&mut |slot| Ok(truth[slot])).unwrap()
    }

    #[test]
    fn test_single_word() {
        let q = parse_boolean("cat").unwrap();
        assert_eq!(q.expr, BoolExpr::Leaf(0));
        assert_eq!(q.leaves, vec![word("cat")]);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let q = parse_boolean("cat AND dog OR bird").unwrap();
        assert_eq!(
            q.expr,
            BoolExpr::Or(vec![
                BoolExpr::And(vec![BoolExpr::Leaf(0), BoolExpr::Leaf(1)]),
                BoolExpr::Leaf(2)
            ])
        );
        assert!(eval(&q, &[false, false, true]));
        assert!(!eval(&q, &[true, false, false]));
    }

    #[test]
    fn test_implicit_and() {
        let q = parse_boolean("cat dog OR bird").unwrap();
        assert!(matches!(q.expr, BoolExpr::Or(ref nodes) if matches!(nodes[0], BoolExpr::And(_))));
    }

    #[test]
    fn test_not_and_parentheses() {
        let q = parse_boolean("NOT (cat OR dog)").unwrap();
        assert!(eval(&q, &[false, false]));
        assert!(!eval(&q, &[false, true]));

        let q = parse_boolean("NOT NOT cat").unwrap();
        assert!(eval(&q, &[true]));
    }

    #[test]
    fn test_phrase_leaf_and_shared_slots() {
        let q = parse_boolean("\"red fox\" AND fox OR fox").unwrap();
        assert_eq!(
            q.leaves,
            vec![Leaf::Phrase("red fox".to_string()), word("fox")]
        );
    }

    #[test]
    fn test_keywords_need_token_boundaries() {
        let q = parse_boolean("ORANGE ANDROID").unwrap();
        assert_eq!(q.leaves, vec![word("ORANGE"), word("ANDROID")]);
        let q = parse_boolean("(cat)AND(dog)").unwrap();
        assert_eq!(q.leaves.len(), 2);
    }

    #[test]
    fn test_wildcard_word() {
        let q = parse_boolean("c?t OR do*").unwrap();
        assert_eq!(q.leaves, vec![word("c?t"), word("do*")]);
    }

    #[test]
    fn test_syntax_errors() {
        for input in ["cat AND", "OR dog", "NOT", "(cat", "cat)", "()", "\"open", ""] {
            let err = parse_boolean(input).unwrap_err();
            assert!(
                matches!(err, IndexError::QuerySyntax(_)),
                "expected syntax error for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_error_messages() {
        let err = parse_boolean("cat)").unwrap_err().to_string();
        assert!(err.contains("garbage at end"));
        let err = parse_boolean("(cat OR dog").unwrap_err().to_string();
        assert!(err.contains("runaway parenthesis"));
        let err = parse_boolean("cat OR").unwrap_err().to_string();
        assert!(err.contains("missing operand"));
    }
}
