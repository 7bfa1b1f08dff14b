use regex::Regex;
use std::sync::LazyLock;

/// Any operator word anywhere, quoted or not; a cheap pre-filter
static OPERATOR_WORD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(^|\s)(or|and|not)(\s|$)").ok());

/// A query string after trimming, unescaping and operator detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub text: String,
    /// True when `text` holds upper-cased `OR`/`AND`/`NOT` operators
    pub boolean: bool,
}

/// Prepare raw query text for evaluation.
///
/// Backslash escapes are removed. When a whitespace-delimited token outside
/// double quotes is `or`, `and` or `not` in any case, the query is boolean and
/// those tokens are upper-cased.
pub fn normalize(raw: &str) -> NormalizedQuery {
    let text = unescape(raw.trim());

    let maybe_boolean = match OPERATOR_WORD.as_ref() {
        Some(re) => re.is_match(&text),
        None => true,
    };
    if !maybe_boolean {
        return NormalizedQuery {
            text,
            boolean: false,
        };
    }

    let mut out = String::with_capacity(text.len());
    let mut boolean = false;
    let mut quoted = false;
    let mut token = String::new();

    for c in text.chars() {
        if quoted {
            out.push(c);
            if c == '"' {
                quoted = false;
            }
        } else if c == '"' {
            if token.is_empty() {
                out.push(c);
                quoted = true;
            } else {
                token.push(c);
            }
        } else if c.is_whitespace() {
            boolean |= flush_token(&mut token, &mut out);
            out.push(c);
        } else {
            token.push(c);
        }
    }
    boolean |= flush_token(&mut token, &mut out);

    NormalizedQuery { text: out, boolean }
}

/// Move a finished token to `out`, upper-cased if it is an operator
fn flush_token(token: &mut String, out: &mut String) -> bool {
    let operator = is_operator(token);
    if operator {
        out.push_str(&token.to_ascii_uppercase());
    } else {
        out.push_str(token);
    }
    token.clear();
    operator
}

fn is_operator(token: &str) -> bool {
    ["or", "and", "not"]
        .iter()
        .any(|op| token.eq_ignore_ascii_case(op))
}

/// Drop backslashes, keeping the character each one escapes
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Rebuild a query split into shell arguments.
///
/// A single argument is the whole query as typed. When there are several,
/// an argument holding whitespace was quoted on the command line and is
/// quoted again.
pub fn rejoin_args<S: AsRef<str>>(args: &[S]) -> String {
    if let [only] = args {
        return only.as_ref().to_string();
    }
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            if arg.contains(char::is_whitespace) && !arg.starts_with('"') {
                format!("\"{}\"", arg)
            } else {
                arg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_query_untouched() {
        let q = normalize("  hello world ");
        assert_eq!(q.text, "hello world");
        assert!(!q.boolean);
    }

    #[test]
    fn test_operators_upper_cased() {
        let q = normalize("cat and dog Or not bird");
        assert_eq!(q.text, "cat AND dog OR NOT bird");
        assert!(q.boolean);
    }

    #[test]
    fn test_operators_inside_quotes_ignored() {
        let q = normalize("\"salt and pepper\"");
        assert_eq!(q.text, "\"salt and pepper\"");
        assert!(!q.boolean);

        let q = normalize("\"salt and pepper\" or vinegar");
        assert_eq!(q.text, "\"salt and pepper\" OR vinegar");
        assert!(q.boolean);
    }

    #[test]
    fn test_operator_must_be_whole_token() {
        let q = normalize("android notes");
        assert!(!q.boolean);
        assert_eq!(q.text, "android notes");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(normalize(r"c\*t").text, "c*t");
        assert_eq!(normalize(r"a\\b").text, r"a\b");
    }

    #[test]
    fn test_rejoin_args() {
        assert_eq!(rejoin_args(&["cat", "and", "dog"]), "cat and dog");
        assert_eq!(rejoin_args(&["red fox", "den"]), "\"red fox\" den");
        assert_eq!(rejoin_args(&["\"red fox\""]), "\"red fox\"");
        assert_eq!(rejoin_args(&["red fox"]), "red fox");
        assert_eq!(rejoin_args(&["cat AND dog"]), "cat AND dog");
        let empty: [&str; 0] = [];
        assert_eq!(rejoin_args(&empty), "");
    }
}
