//! Lowers a [`QueryNode`] tree onto tantivy queries.
//!
//! Structural nodes map to tantivy combinators directly. Full-text leaves are
//! rendered as query-parser expressions against the `_source` JSON field,
//! which gives them the same tokenizer the documents were indexed with.
//! Term-level leaves run against the exact-value key fields described in
//! [`super::facets`].

use std::ops::Bound;

use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, ConstScoreQuery, EmptyQuery, Occur, Query, QueryParser,
    RangeQuery, TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::Term;

use crate::domain::{BoolQuery, MultiMatchType, Operator, QueryNode, RangeBounds, Scalar};
use crate::error::{HelixSearchError, ParseError, Result};

use super::facets;
use super::tantivy_shard::{
    ShardFields, ALL_FIELD, ID_FIELD, KEYWORDS_FIELD, NUMBERS_FIELD, PATHS_FIELD, SOURCE_FIELD,
    TOKENS_FIELD,
};

pub struct QueryCompiler<'a> {
    pub fields: &'a ShardFields,
    pub parser: &'a QueryParser,
}

impl QueryCompiler<'_> {
    pub fn compile(&self, node: &QueryNode) -> Result<Box<dyn Query>> {
        Ok(match node {
            QueryNode::MatchAll => Box::new(AllQuery),
            QueryNode::MatchNone => Box::new(EmptyQuery),
            QueryNode::Bool(bool_query) => self.compile_bool(bool_query)?,
            QueryNode::Boost { query, boost } => {
                Box::new(BoostQuery::new(self.compile(query)?, *boost))
            }
            QueryNode::Ids { values } => self.ids(values.iter().map(String::as_str)),
            QueryNode::Term { field, value } if field == ID_FIELD => {
                self.ids([value.to_string().as_str()])
            }
            QueryNode::Terms { field, values } if field == ID_FIELD => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                self.ids(values.iter().map(String::as_str))
            }
            QueryNode::Match { field, query, .. } | QueryNode::MatchPhrase { field, query }
                if field == ID_FIELD =>
            {
                self.ids(query.split_whitespace())
            }
            QueryNode::Term { field, value } => self.term(field, value),
            QueryNode::Terms { field, values } => {
                any_of(values.iter().map(|value| self.term(field, value)).collect())
            }
            QueryNode::Range { field, bounds } => self.range(field, bounds)?,
            QueryNode::Prefix { field, value } => self.prefix(field, value),
            QueryNode::Exists { field } => self.exists(field),
            leaf => match render(leaf) {
                Some(expr) => self.parse(&expr)?,
                None => Box::new(EmptyQuery),
            },
        })
    }

    fn compile_bool(&self, bool_query: &BoolQuery) -> Result<Box<dyn Query>> {
        if bool_query.is_empty() {
            return Ok(Box::new(AllQuery));
        }
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for node in &bool_query.must {
            clauses.push((Occur::Must, self.compile(node)?));
        }
        // Filters restrict matches without contributing to the score.
        for node in &bool_query.filter {
            clauses.push((Occur::Must, Box::new(BoostQuery::new(self.compile(node)?, 0.0))));
        }
        for node in &bool_query.should {
            clauses.push((Occur::Should, self.compile(node)?));
        }
        for node in &bool_query.must_not {
            clauses.push((Occur::MustNot, self.compile(node)?));
        }
        if bool_query.must.is_empty() && bool_query.filter.is_empty() && bool_query.should.is_empty() {
            clauses.push((Occur::Must, Box::new(AllQuery)));
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn ids<'v>(&self, ids: impl IntoIterator<Item = &'v str>) -> Box<dyn Query> {
        any_of(
            ids.into_iter()
                .map(|id| exact(self.fields.id, id))
                .collect(),
        )
    }

    /// An exact value matches the raw string, one analyzed token, or the
    /// number it spells.
    fn term(&self, field: &str, value: &Scalar) -> Box<dyn Query> {
        let text = value.to_string();
        if is_catch_all(field) {
            let term = Term::from_field_text(self.fields.all, &text.to_lowercase());
            return Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
        }
        let mut clauses = vec![exact(self.fields.keywords, &facets::key(field, &text))];
        if matches!(value, Scalar::Str(_)) {
            clauses.push(exact(self.fields.tokens, &facets::key(field, &text)));
        }
        if let Some(number) = facets::scalar_number(value) {
            clauses.push(exact(self.fields.numbers, &facets::number_key(field, number)));
        }
        any_of(clauses)
    }

    /// Bounds that all read as numbers compare numerically. Anything else
    /// compares the raw strings.
    fn range(&self, field: &str, bounds: &RangeBounds) -> Result<Box<dyn Query>> {
        if is_catch_all(field) {
            return Err(HelixSearchError::Parse(ParseError::unsupported(format!(
                "[range] cannot run against [{field}]"
            ))));
        }
        let numeric = [bounds.lower(), bounds.upper()]
            .into_iter()
            .flatten()
            .all(|(value, _)| facets::scalar_number(value).is_some());
        let encode = |value: &Scalar| match facets::scalar_number(value) {
            Some(number) if numeric => facets::number_key(field, number),
            _ => facets::key(field, &value.to_string()),
        };
        let lower = bounds
            .lower()
            .map_or(Bound::Included(facets::path_start(field)), |(value, inclusive)| {
                if inclusive {
                    Bound::Included(encode(value))
                } else {
                    Bound::Excluded(encode(value))
                }
            });
        let upper = bounds
            .upper()
            .map_or(Bound::Excluded(facets::path_end(field)), |(value, inclusive)| {
                if inclusive {
                    Bound::Included(encode(value))
                } else {
                    Bound::Excluded(encode(value))
                }
            });
        let target = if numeric { NUMBERS_FIELD } else { KEYWORDS_FIELD };
        Ok(constant(str_range(target, &lower, &upper)))
    }

    fn prefix(&self, field: &str, value: &str) -> Box<dyn Query> {
        if value.is_empty() {
            return self.exists(field);
        }
        if is_catch_all(field) {
            return constant(prefix_range(ALL_FIELD, value.to_lowercase()));
        }
        constant(any_of(vec![
            prefix_range(TOKENS_FIELD, facets::key(field, &value.to_lowercase())),
            prefix_range(KEYWORDS_FIELD, facets::key(field, value)),
        ]))
    }

    fn exists(&self, field: &str) -> Box<dyn Query> {
        if is_catch_all(field) {
            return constant(str_range(PATHS_FIELD, &Bound::Unbounded, &Bound::Unbounded));
        }
        constant(exact(self.fields.paths, field))
    }

    fn parse(&self, expr: &str) -> Result<Box<dyn Query>> {
        self.parser.parse_query(expr).map_err(|err| {
            HelixSearchError::Parse(ParseError::unsupported(format!(
                "query cannot run against this index: {err}"
            )))
        })
    }
}

fn exact(field: Field, value: &str) -> Box<dyn Query> {
    let term = Term::from_field_text(field, value);
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

fn any_of(queries: Vec<Box<dyn Query>>) -> Box<dyn Query> {
    if queries.is_empty() {
        return Box::new(EmptyQuery);
    }
    Box::new(BooleanQuery::new(
        queries.into_iter().map(|query| (Occur::Should, query)).collect(),
    ))
}

fn constant(query: Box<dyn Query>) -> Box<dyn Query> {
    Box::new(ConstScoreQuery::new(query, 1.0))
}

fn str_range(field: &str, lower: &Bound<String>, upper: &Bound<String>) -> Box<dyn Query> {
    Box::new(RangeQuery::new_str_bounds(
        field.to_string(),
        lower.as_ref().map(String::as_str),
        upper.as_ref().map(String::as_str),
    ))
}

fn prefix_range(field: &str, start: String) -> Box<dyn Query> {
    let end = format!("{start}{}", char::MAX);
    str_range(field, &Bound::Included(start), &Bound::Excluded(end))
}

fn is_catch_all(field: &str) -> bool {
    matches!(field, "_all" | "*")
}

/// Renders a full-text leaf as a query-parser expression. `None` means the
/// leaf can never match, such as a match query without any words.
fn render(node: &QueryNode) -> Option<String> {
    match node {
        QueryNode::Match {
            field,
            query,
            operator,
        } => render_match(&field_path(field), query, *operator),
        QueryNode::MatchPhrase { field, query } => render_phrase(&field_path(field), query),
        QueryNode::MultiMatch {
            fields,
            query,
            kind,
            operator,
        } => {
            let clauses: Vec<String> = fields
                .iter()
                .filter_map(|field| {
                    let path = field_path(field);
                    match kind {
                        MultiMatchType::Phrase => render_phrase(&path, query),
                        MultiMatchType::BestFields | MultiMatchType::MostFields => {
                            render_match(&path, query, *operator)
                        }
                    }
                })
                .map(|clause| format!("({clause})"))
                .collect();
            (!clauses.is_empty()).then(|| clauses.join(" "))
        }
        _ => None,
    }
}

fn field_path(field: &str) -> String {
    if is_catch_all(field) {
        ALL_FIELD.to_string()
    } else {
        format!("{SOURCE_FIELD}.{field}")
    }
}

fn render_match(path: &str, query: &str, operator: Operator) -> Option<String> {
    let required = match operator {
        Operator::And => "+",
        Operator::Or => "",
    };
    let clauses: Vec<String> = query
        .split_whitespace()
        .filter_map(quote)
        .map(|word| format!("{required}{path}:{word}"))
        .collect();
    (!clauses.is_empty()).then(|| clauses.join(" "))
}

fn render_phrase(path: &str, query: &str) -> Option<String> {
    quote(query).map(|phrase| format!("{path}:{phrase}"))
}

/// Wraps text in quotes for the query parser. Characters that would end the
/// quoted section are dropped, so user text can never change the expression.
fn quote(text: &str) -> Option<String> {
    let cleaned: String = text
        .chars()
        .map(|c| if matches!(c, '"' | '\\') { ' ' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| format!("\"{cleaned}\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn match_node(field: &str, query: &str, operator: Operator) -> QueryNode {
        QueryNode::Match {
            field: field.into(),
            query: query.into(),
            operator,
        }
    }

    #[test]
    fn test_render_match_operators() {
        assert_eq!(
            render(&match_node("title", "dune messiah", Operator::Or)).unwrap(),
            r#"_source.title:"dune" _source.title:"messiah""#
        );
        assert_eq!(
            render(&match_node("_all", "dune messiah", Operator::And)).unwrap(),
            r#"+_all:"dune" +_all:"messiah""#
        );
        assert_eq!(render(&match_node("title", "   ", Operator::Or)), None);
    }

    #[test]
    fn test_render_escapes_quotes() {
        assert_eq!(
            render(&QueryNode::MatchPhrase {
                field: "title".into(),
                query: r#"say "hi" \ now"#.into(),
            })
            .unwrap(),
            r#"_source.title:"say  hi    now""#
        );
        assert_eq!(quote(r#"""#), None);
    }

    #[test]
    fn test_render_multi_match_joins_fields() {
        let node = QueryNode::MultiMatch {
            fields: vec!["title".into(), "body".into()],
            query: "spice".into(),
            kind: MultiMatchType::Phrase,
            operator: Operator::Or,
        };
        assert_eq!(
            render(&node).unwrap(),
            r#"(_source.title:"spice") (_source.body:"spice")"#
        );
    }

    #[test]
    fn test_term_level_leaves_are_not_rendered() {
        let prefix = QueryNode::Prefix {
            field: "title".into(),
            value: "du".into(),
        };
        let exists = QueryNode::Exists { field: "title".into() };
        assert_eq!(render(&prefix), None);
        assert_eq!(render(&exists), None);
    }
}
