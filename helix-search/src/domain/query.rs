use std::time::Duration;

/// Leaf value of term-level queries.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Operator {
    #[default]
    Or,
    And,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MultiMatchType {
    #[default]
    BestFields,
    MostFields,
    Phrase,
}

/// Range bounds; at least one is set, and never both forms on one side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeBounds {
    pub gt: Option<Scalar>,
    pub gte: Option<Scalar>,
    pub lt: Option<Scalar>,
    pub lte: Option<Scalar>,
}

impl RangeBounds {
    pub const fn lower(&self) -> Option<(&Scalar, bool)> {
        match (&self.gte, &self.gt) {
            (Some(v), _) => Some((v, true)),
            (None, Some(v)) => Some((v, false)),
            (None, None) => None,
        }
    }

    pub const fn upper(&self) -> Option<(&Scalar, bool)> {
        match (&self.lte, &self.lt) {
            (Some(v), _) => Some((v, true)),
            (None, Some(v)) => Some((v, false)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<QueryNode>,
    pub should: Vec<QueryNode>,
    pub must_not: Vec<QueryNode>,
    pub filter: Vec<QueryNode>,
}

impl BoolQuery {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
            && self.should.is_empty()
            && self.must_not.is_empty()
            && self.filter.is_empty()
    }
}

/// Parsed query tree. Field names are already validated.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    MatchAll,
    MatchNone,
    Match {
        field: String,
        query: String,
        operator: Operator,
    },
    MatchPhrase {
        field: String,
        query: String,
    },
    MultiMatch {
        fields: Vec<String>,
        query: String,
        kind: MultiMatchType,
        operator: Operator,
    },
    Term {
        field: String,
        value: Scalar,
    },
    Terms {
        field: String,
        values: Vec<Scalar>,
    },
    Range {
        field: String,
        bounds: RangeBounds,
    },
    Prefix {
        field: String,
        value: String,
    },
    Exists {
        field: String,
    },
    Ids {
        values: Vec<String>,
    },
    Bool(BoolQuery),
    Boost {
        query: Box<QueryNode>,
        boost: f32,
    },
}

/// Which parts of `_source` are returned with each hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SourceFilter {
    #[default]
    All,
    None,
    Includes(Vec<String>),
}

impl SourceFilter {
    pub fn apply(&self, source: serde_json::Value) -> Option<serde_json::Value> {
        match self {
            Self::All => Some(source),
            Self::None => None,
            Self::Includes(paths) => {
                let mut out = serde_json::Map::new();
                for path in paths {
                    copy_path(&source, &mut out, path);
                }
                Some(serde_json::Value::Object(out))
            }
        }
    }
}

fn copy_path(source: &serde_json::Value, out: &mut serde_json::Map<String, serde_json::Value>, path: &str) {
    let (head, rest) = path.split_once('.').map_or((path, None), |(h, r)| (h, Some(r)));
    let Some(value) = source.get(head) else {
        return;
    };
    match rest {
        None => {
            out.insert(head.to_string(), value.clone());
        }
        Some(rest) => {
            let slot = out
                .entry(head.to_string())
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
            if let serde_json::Value::Object(inner) = slot {
                copy_path(value, inner, rest);
            }
        }
    }
}

/// A fully translated search body.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: QueryNode,
    pub size: usize,
    pub from: usize,
    pub source: SourceFilter,
    pub timeout: Option<Duration>,
}

impl SearchRequest {
    pub const DEFAULT_SIZE: usize = 10;

    pub const fn new(query: QueryNode) -> Self {
        Self {
            query,
            size: Self::DEFAULT_SIZE,
            from: 0,
            source: SourceFilter::All,
            timeout: None,
        }
    }

    #[must_use]
    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub const fn with_from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    /// Number of hits each shard must produce so the merged page is exact.
    pub const fn window(&self) -> usize {
        self.from.saturating_add(self.size)
    }
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self::new(QueryNode::MatchAll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_range_bounds_prefer_inclusive() {
        let bounds = RangeBounds {
            gte: Some(Scalar::Int(1)),
            lt: Some(Scalar::Int(5)),
            ..Default::default()
        };
        assert_eq!(bounds.lower(), Some((&Scalar::Int(1), true)));
        assert_eq!(bounds.upper(), Some((&Scalar::Int(5), false)));
    }

    #[test]
    fn test_source_filter_includes_nested_paths() {
        let source = json!({"title": "Dune", "author": {"name": "Herbert", "born": 1920}, "year": 1965});
        let filter = SourceFilter::Includes(vec!["title".into(), "author.name".into(), "missing".into()]);
        assert_eq!(
            filter.apply(source),
            Some(json!({"title": "Dune", "author": {"name": "Herbert"}}))
        );
    }

    #[test]
    fn test_source_filter_none_drops_source() {
        assert_eq!(SourceFilter::None.apply(json!({"a": 1})), None);
    }

    #[test]
    fn test_window_saturates() {
        let req = SearchRequest::default().with_from(usize::MAX).with_size(10);
        assert_eq!(req.window(), usize::MAX);
    }
}
