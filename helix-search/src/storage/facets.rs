//! Exact-value keys for term-level queries.
//!
//! Every key is `<path>\0<value>`. Keys of one path sort next to each other
//! and below `<path>\u{1}`, so a term-dictionary range that starts at
//! [`path_start`] and stops before [`path_end`] never reaches another path.
//! Numbers are encoded so that their keys sort in numeric order.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tantivy::tokenizer::{TextAnalyzer, TokenStream};

use crate::domain::Scalar;

const SEPARATOR: char = '\0';

/// Longer strings are searchable as text only, never as an exact value.
pub const MAX_KEYWORD_LEN: usize = 256;

/// Keys extracted from one document source.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Facets {
    /// Every path holding a non-null value, including its parent objects.
    pub paths: BTreeSet<String>,
    /// Raw string and boolean values.
    pub keywords: BTreeSet<String>,
    /// String values after analysis, one key per token.
    pub tokens: BTreeSet<String>,
    pub numbers: BTreeSet<String>,
}

impl Facets {
    pub fn extract(source: &Map<String, Value>, analyzer: &mut TextAnalyzer) -> Self {
        let mut facets = Self::default();
        for (key, value) in source {
            facets.visit(key, value, analyzer);
        }
        facets
    }

    fn visit(&mut self, path: &str, value: &Value, analyzer: &mut TextAnalyzer) {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    self.visit(path, item, analyzer);
                }
            }
            Value::Object(map) => {
                for (key, child) in map {
                    self.visit(&format!("{path}.{key}"), child, analyzer);
                }
            }
            Value::String(text) => {
                self.mark(path);
                if text.chars().count() <= MAX_KEYWORD_LEN {
                    self.keywords.insert(key(path, text));
                }
                let mut stream = analyzer.token_stream(text);
                while stream.advance() {
                    self.tokens.insert(key(path, &stream.token().text));
                }
            }
            Value::Number(number) => {
                self.mark(path);
                if let Some(number) = number.as_f64() {
                    self.numbers.insert(number_key(path, number));
                }
            }
            Value::Bool(flag) => {
                self.mark(path);
                self.keywords.insert(key(path, if *flag { "true" } else { "false" }));
            }
        }
    }

    fn mark(&mut self, path: &str) {
        for (dot, _) in path.match_indices('.') {
            self.paths.insert(path[..dot].to_string());
        }
        self.paths.insert(path.to_string());
    }
}

pub fn key(path: &str, value: &str) -> String {
    format!("{path}{SEPARATOR}{value}")
}

pub fn number_key(path: &str, value: f64) -> String {
    format!("{path}{SEPARATOR}{:016x}", sortable(value))
}

/// Lowest key of `path`.
pub fn path_start(path: &str) -> String {
    format!("{path}{SEPARATOR}")
}

/// Sorts above every key of `path` and below the keys of any other path
/// sharing it as a prefix.
pub fn path_end(path: &str) -> String {
    format!("{path}\u{1}")
}

/// Numeric view of a query value. Strings holding a number count, so a
/// range written with quoted bounds still compares numerically.
#[allow(clippy::cast_precision_loss)] // keys compare as f64
pub fn scalar_number(value: &Scalar) -> Option<f64> {
    match value {
        Scalar::Int(int) => Some(*int as f64),
        Scalar::Float(float) => Some(*float),
        Scalar::Str(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        Scalar::Bool(_) => None,
    }
}

/// Maps an f64 onto a u64 with the same ordering. `-0.0` and `0.0` share
/// one key.
const fn sortable(value: f64) -> u64 {
    let bits = (value + 0.0).to_bits();
    if bits >> 63 == 0 {
        bits | (1 << 63)
    } else {
        !bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tantivy::tokenizer::{LowerCaser, SimpleTokenizer};

    fn analyzer() -> TextAnalyzer {
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .build()
    }

    fn extract(source: Value) -> Facets {
        let Value::Object(map) = source else {
            panic!("source must be an object");
        };
        Facets::extract(&map, &mut analyzer())
    }

    #[test]
    fn test_paths_include_parents_and_skip_nulls() {
        let facets = extract(json!({
            "author": {"name": "Frank Herbert", "born": null},
            "tags": [],
            "deleted_at": null,
            "year": 1965
        }));
        let paths: Vec<&str> = facets.paths.iter().map(String::as_str).collect();
        assert_eq!(paths, vec!["author", "author.name", "year"]);
    }

    #[test]
    fn test_strings_yield_keyword_and_tokens() {
        let facets = extract(json!({"title": "Dune Messiah", "draft": false}));
        assert!(facets.keywords.contains(&key("title", "Dune Messiah")));
        assert!(facets.keywords.contains(&key("draft", "false")));
        assert!(facets.tokens.contains(&key("title", "dune")));
        assert!(facets.tokens.contains(&key("title", "messiah")));
        assert!(facets.numbers.is_empty());
    }

    #[test]
    fn test_long_strings_are_not_keywords() {
        let long = "x".repeat(MAX_KEYWORD_LEN + 1);
        let facets = extract(json!({ "body": long }));
        assert!(facets.keywords.is_empty());
        assert_eq!(facets.tokens.len(), 1);
    }

    #[test]
    fn test_number_keys_sort_numerically() {
        let values = [-1e9, -2.5, -1.0, 0.0, 0.5, 1.0, 2.0, 10.0, 1965.0, 1e12];
        let keys: Vec<String> = values.iter().map(|v| number_key("n", *v)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(number_key("n", -0.0), number_key("n", 0.0));
    }

    #[test]
    fn test_path_bounds_enclose_only_that_path() {
        let inside = number_key("year", 1e300);
        let other = key("year.month", "a");
        assert!(path_start("year") <= inside && inside < path_end("year"));
        assert!(other >= path_end("year"));
        assert!(path_end("year") > key("year", &char::MAX.to_string()));
    }

    #[test]
    fn test_scalar_number_coerces_numeric_strings() {
        assert_eq!(scalar_number(&Scalar::Int(3)), Some(3.0));
        assert_eq!(scalar_number(&Scalar::Str(" 1966 ".into())), Some(1966.0));
        assert_eq!(scalar_number(&Scalar::Str("2020-01-01".into())), None);
        assert_eq!(scalar_number(&Scalar::Str("NaN".into())), None);
        assert_eq!(scalar_number(&Scalar::Bool(true)), None);
    }
}
