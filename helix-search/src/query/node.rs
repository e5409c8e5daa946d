//! Key-dispatch decoding of query nodes.
//!
//! Every node is a single-key object whose key names the node kind. Each kind
//! declares the parameters it understands; anything else is rejected instead
//! of being silently ignored.

use serde_json::{Map, Value};

use crate::domain::{BoolQuery, MultiMatchType, Operator, QueryNode, RangeBounds, Scalar};
use crate::error::ParseError;

type Result<T> = std::result::Result<T, ParseError>;

pub fn parse_node(value: &Value, context: &str) -> Result<QueryNode> {
    let (kind, body) = single_entry(value, context)?;
    match kind {
        "match_all" => {
            let params = Params::new(body, kind, &["boost"])?;
            params.boosted(QueryNode::MatchAll)
        }
        "match_none" => {
            Params::new(body, kind, &[])?;
            Ok(QueryNode::MatchNone)
        }
        "match" => parse_match(body),
        "match_phrase" => parse_match_phrase(body),
        "multi_match" => parse_multi_match(body),
        "term" => parse_term(body),
        "terms" => parse_terms(body),
        "range" => parse_range(body),
        "prefix" => parse_prefix(body),
        "exists" => {
            let params = Params::new(body, kind, &["field", "boost"])?;
            let field = params.required_str("field")?;
            validate_field(field, kind)?;
            params.boosted(QueryNode::Exists {
                field: field.to_string(),
            })
        }
        "ids" => {
            let params = Params::new(body, kind, &["values", "boost"])?;
            let values = params
                .required("values")?
                .as_array()
                .ok_or_else(|| ParseError::unsupported("[ids] values must be an array"))?
                .iter()
                .map(|v| scalar(v, "ids").map(|s| s.to_string()))
                .collect::<Result<Vec<_>>>()?;
            params.boosted(QueryNode::Ids { values })
        }
        "bool" => parse_bool(body, context),
        other => Err(ParseError::unsupported(format!(
            "unknown query [{other}] in [{context}]"
        ))),
    }
}

fn parse_match(body: &Value) -> Result<QueryNode> {
    let (field, options) = field_entry(body, "match")?;
    if let Value::Object(_) = options {
        let params = Params::new(options, "match", &["query", "operator", "boost"])?;
        let query = scalar(params.required("query")?, "match")?.to_string();
        let operator = params.operator()?;
        params.boosted(QueryNode::Match {
            field,
            query,
            operator,
        })
    } else {
        Ok(QueryNode::Match {
            field,
            query: scalar(options, "match")?.to_string(),
            operator: Operator::Or,
        })
    }
}

fn parse_match_phrase(body: &Value) -> Result<QueryNode> {
    let (field, options) = field_entry(body, "match_phrase")?;
    if let Value::Object(_) = options {
        let params = Params::new(options, "match_phrase", &["query", "boost"])?;
        let query = scalar(params.required("query")?, "match_phrase")?.to_string();
        params.boosted(QueryNode::MatchPhrase { field, query })
    } else {
        Ok(QueryNode::MatchPhrase {
            field,
            query: scalar(options, "match_phrase")?.to_string(),
        })
    }
}

fn parse_multi_match(body: &Value) -> Result<QueryNode> {
    let params = Params::new(body, "multi_match", &["query", "fields", "type", "operator", "boost"])?;
    let query = scalar(params.required("query")?, "multi_match")?.to_string();
    let fields = match params.get("fields") {
        None => vec!["_all".to_string()],
        Some(Value::Array(items)) if items.is_empty() => vec!["_all".to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                let field = item
                    .as_str()
                    .ok_or_else(|| ParseError::unsupported("[multi_match] fields must be strings"))?;
                validate_field(field, "multi_match")?;
                Ok(field.to_string())
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(ParseError::unsupported(
                "[multi_match] fields must be an array of strings",
            ));
        }
    };
    let kind = match params.str("type")? {
        None | Some("best_fields") => MultiMatchType::BestFields,
        Some("most_fields") => MultiMatchType::MostFields,
        Some("phrase") => MultiMatchType::Phrase,
        Some(other) => {
            return Err(ParseError::unsupported(format!(
                "[multi_match] type [{other}] is not supported"
            )));
        }
    };
    let operator = params.operator()?;
    params.boosted(QueryNode::MultiMatch {
        fields,
        query,
        kind,
        operator,
    })
}

fn parse_term(body: &Value) -> Result<QueryNode> {
    let (field, options) = field_entry(body, "term")?;
    if let Value::Object(_) = options {
        let params = Params::new(options, "term", &["value", "boost"])?;
        let value = scalar(params.required("value")?, "term")?;
        params.boosted(QueryNode::Term { field, value })
    } else {
        Ok(QueryNode::Term {
            field,
            value: scalar(options, "term")?,
        })
    }
}

fn parse_terms(body: &Value) -> Result<QueryNode> {
    let map = body
        .as_object()
        .ok_or_else(|| ParseError::unsupported("[terms] must be an object"))?;
    let mut boost = None;
    let mut entry = None;
    for (key, value) in map {
        if key == "boost" {
            boost = Some(boost_value(value)?);
        } else if entry.replace((key, value)).is_some() {
            return Err(ParseError::unsupported("[terms] supports exactly one field"));
        }
    }
    let (field, values) =
        entry.ok_or_else(|| ParseError::unsupported("[terms] requires a field"))?;
    validate_field(field, "terms")?;
    let values = values
        .as_array()
        .ok_or_else(|| ParseError::unsupported(format!("[terms] values for [{field}] must be an array")))?
        .iter()
        .map(|v| scalar(v, "terms"))
        .collect::<Result<Vec<_>>>()?;
    Ok(wrap_boost(
        QueryNode::Terms {
            field: field.clone(),
            values,
        },
        boost,
    ))
}

fn parse_range(body: &Value) -> Result<QueryNode> {
    let (field, options) = field_entry(body, "range")?;
    let params = Params::new(options, "range", &["gt", "gte", "lt", "lte", "boost"])?;
    let bound = |key: &str| params.get(key).map(|v| scalar(v, "range")).transpose();
    let bounds = RangeBounds {
        gt: bound("gt")?,
        gte: bound("gte")?,
        lt: bound("lt")?,
        lte: bound("lte")?,
    };
    if bounds.gt.is_some() && bounds.gte.is_some() {
        return Err(ParseError::unsupported(format!(
            "[range] on [{field}] cannot combine gt and gte"
        )));
    }
    if bounds.lt.is_some() && bounds.lte.is_some() {
        return Err(ParseError::unsupported(format!(
            "[range] on [{field}] cannot combine lt and lte"
        )));
    }
    if bounds.lower().is_none() && bounds.upper().is_none() {
        return Err(ParseError::unsupported(format!(
            "[range] on [{field}] needs at least one bound"
        )));
    }
    params.boosted(QueryNode::Range { field, bounds })
}

fn parse_prefix(body: &Value) -> Result<QueryNode> {
    let (field, options) = field_entry(body, "prefix")?;
    if let Value::Object(_) = options {
        let params = Params::new(options, "prefix", &["value", "boost"])?;
        let value = scalar(params.required("value")?, "prefix")?.to_string();
        params.boosted(QueryNode::Prefix { field, value })
    } else {
        Ok(QueryNode::Prefix {
            field,
            value: scalar(options, "prefix")?.to_string(),
        })
    }
}

fn parse_bool(body: &Value, context: &str) -> Result<QueryNode> {
    let params = Params::new(body, "bool", &["must", "should", "must_not", "filter", "boost"])?;
    let clauses = |key: &str| -> Result<Vec<QueryNode>> {
        let clause_context = format!("{context}.bool.{key}");
        match params.get(key) {
            None => Ok(Vec::new()),
            Some(node @ Value::Object(_)) => Ok(vec![parse_node(node, &clause_context)?]),
            Some(Value::Array(nodes)) => nodes
                .iter()
                .enumerate()
                .map(|(i, node)| parse_node(node, &format!("{clause_context}[{i}]")))
                .collect(),
            Some(_) => Err(ParseError::unsupported(format!(
                "[{clause_context}] must be a query object or an array of queries"
            ))),
        }
    };
    let query = BoolQuery {
        must: clauses("must")?,
        should: clauses("should")?,
        must_not: clauses("must_not")?,
        filter: clauses("filter")?,
    };
    params.boosted(QueryNode::Bool(query))
}

/// Validated parameter object of one node kind.
struct Params<'a> {
    kind: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    fn new(value: &'a Value, kind: &'a str, allowed: &[&str]) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| ParseError::unsupported(format!("[{kind}] must be an object")))?;
        if let Some(key) = map.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(ParseError::unsupported(format!(
                "[{kind}] does not support [{key}]"
            )));
        }
        Ok(Self { kind, map })
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key)
    }

    fn required(&self, key: &str) -> Result<&'a Value> {
        self.get(key).ok_or_else(|| {
            ParseError::unsupported(format!("[{}] requires [{key}]", self.kind))
        })
    }

    fn str(&self, key: &str) -> Result<Option<&'a str>> {
        self.get(key)
            .map(|v| {
                v.as_str().ok_or_else(|| {
                    ParseError::unsupported(format!("[{}] [{key}] must be a string", self.kind))
                })
            })
            .transpose()
    }

    fn required_str(&self, key: &str) -> Result<&'a str> {
        self.str(key)?.ok_or_else(|| {
            ParseError::unsupported(format!("[{}] requires [{key}]", self.kind))
        })
    }

    fn operator(&self) -> Result<Operator> {
        match self.str("operator")?.map(str::to_ascii_lowercase).as_deref() {
            None | Some("or") => Ok(Operator::Or),
            Some("and") => Ok(Operator::And),
            Some(other) => Err(ParseError::unsupported(format!(
                "[{}] operator [{other}] must be and/or",
                self.kind
            ))),
        }
    }

    fn boosted(&self, node: QueryNode) -> Result<QueryNode> {
        let boost = self.get("boost").map(boost_value).transpose()?;
        Ok(wrap_boost(node, boost))
    }
}

fn wrap_boost(node: QueryNode, boost: Option<f32>) -> QueryNode {
    match boost {
        #[allow(clippy::float_cmp)] // 1.0 is exactly representable
        Some(b) if b != 1.0 => QueryNode::Boost {
            query: Box::new(node),
            boost: b,
        },
        _ => node,
    }
}

#[allow(clippy::cast_possible_truncation)] // boosts are small factors
fn boost_value(value: &Value) -> Result<f32> {
    value
        .as_f64()
        .filter(|b| b.is_finite() && *b >= 0.0)
        .map(|b| b as f32)
        .ok_or_else(|| ParseError::unsupported("[boost] must be a non-negative number"))
}

fn single_entry<'a>(value: &'a Value, context: &str) -> Result<(&'a str, &'a Value)> {
    let map = value
        .as_object()
        .ok_or_else(|| ParseError::unsupported(format!("[{context}] must be a query object")))?;
    let mut entries = map.iter();
    match (entries.next(), entries.next()) {
        (Some((key, body)), None) => Ok((key.as_str(), body)),
        (None, _) => Err(ParseError::unsupported(format!("[{context}] is an empty query object"))),
        (Some(_), Some(_)) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            Err(ParseError::unsupported(format!(
                "[{context}] must hold exactly one query, found [{}]",
                keys.join(", ")
            )))
        }
    }
}

fn field_entry<'a>(body: &'a Value, kind: &str) -> Result<(String, &'a Value)> {
    let (field, options) = single_entry(body, kind)?;
    validate_field(field, kind)?;
    Ok((field.to_string(), options))
}

fn scalar(value: &Value, kind: &str) -> Result<Scalar> {
    match value {
        Value::String(s) => Ok(Scalar::Str(s.clone())),
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::Number(n) => n.as_i64().map_or_else(
            || {
                n.as_f64()
                    .map(Scalar::Float)
                    .ok_or_else(|| ParseError::unsupported(format!("[{kind}] number out of range")))
            },
            |i| Ok(Scalar::Int(i)),
        ),
        Value::Null | Value::Array(_) | Value::Object(_) => Err(ParseError::unsupported(format!(
            "[{kind}] expects a string, number or boolean value"
        ))),
    }
}

/// Field paths end up inside engine query expressions, so only a plain
/// identifier alphabet is accepted. `_all` and `*` address every field.
pub fn validate_field(field: &str, kind: &str) -> Result<()> {
    if field == "*" {
        return Ok(());
    }
    let mut chars = field.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '@');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '@'));
    if valid_start && valid_rest && !field.ends_with('.') && !field.contains("..") {
        Ok(())
    } else {
        Err(ParseError::unsupported(format!(
            "[{kind}] field name [{field}] is not supported"
        )))
    }
}
