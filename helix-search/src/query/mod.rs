//! Request-body translation.
//!
//! Turns raw search bodies and multi-search header lines into typed
//! [`SearchRequest`]s and [`TargetSelector`]s. Nothing here touches the
//! registry or the shards, so a rejected body never reaches the engine.

mod node;

use std::time::Duration;

use serde_json::{Map, Value};

use crate::domain::{SearchRequest, SourceFilter, TargetSelector};
use crate::error::ParseError;

pub use node::validate_field;

/// Header keys clients commonly send that carry no meaning here.
const IGNORED_HEADER_KEYS: &[&str] = &[
    "preference",
    "routing",
    "search_type",
    "request_cache",
    "ignore_unavailable",
    "allow_no_indices",
    "expand_wildcards",
    "ccs_minimize_roundtrips",
];

pub fn parse(raw: &[u8]) -> Result<SearchRequest, ParseError> {
    parse_with_default_size(raw, SearchRequest::DEFAULT_SIZE)
}

/// Like [`parse`], with `default_size` applied when the body has no `size`.
/// An empty body means match-all.
pub fn parse_with_default_size(raw: &[u8], default_size: usize) -> Result<SearchRequest, ParseError> {
    let request = SearchRequest::default().with_size(default_size);
    if raw.trim_ascii().is_empty() {
        return Ok(request);
    }
    let map = parse_object(raw, "search request")?;
    build_request(&map, request)
}

/// Decodes one multi-search header line. `None` means the header names no
/// index, so the request-level default applies.
pub fn parse_header(raw: &[u8]) -> Result<Option<TargetSelector>, ParseError> {
    if raw.trim_ascii().is_empty() {
        return Ok(None);
    }
    let map = parse_object(raw, "multi-search header")?;
    let mut selector = None;
    for (key, value) in &map {
        match key.as_str() {
            "index" => selector = Some(header_index(value)?),
            ignored if IGNORED_HEADER_KEYS.contains(&ignored) => {}
            other => {
                return Err(ParseError::unsupported(format!(
                    "unknown key [{other}] in multi-search header"
                )));
            }
        }
    }
    Ok(selector)
}

fn parse_object(raw: &[u8], what: &str) -> Result<Map<String, Value>, ParseError> {
    match serde_json::from_slice::<Value>(raw).map_err(|e| ParseError::from_json(&e, raw))? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::unsupported(format!("{what} must be a JSON object"))),
    }
}

fn build_request(map: &Map<String, Value>, mut request: SearchRequest) -> Result<SearchRequest, ParseError> {
    for (key, value) in map {
        match key.as_str() {
            "query" => request.query = node::parse_node(value, "query")?,
            "size" => request.size = non_negative(value, "size")?,
            "from" => request.from = non_negative(value, "from")?,
            "_source" => request.source = source_filter(value)?,
            "timeout" => request.timeout = Some(timeout(value)?),
            other => {
                return Err(ParseError::unsupported(format!(
                    "unknown key [{other}] in search request"
                )));
            }
        }
    }
    Ok(request)
}

fn non_negative(value: &Value, key: &str) -> Result<usize, ParseError> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| ParseError::unsupported(format!("[{key}] must be a non-negative integer")))
}

fn source_filter(value: &Value) -> Result<SourceFilter, ParseError> {
    match value {
        Value::Bool(true) => Ok(SourceFilter::All),
        Value::Bool(false) => Ok(SourceFilter::None),
        Value::String(path) => Ok(SourceFilter::Includes(vec![source_path(path)?])),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| ParseError::unsupported("[_source] entries must be strings"))
                    .and_then(source_path)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SourceFilter::Includes),
        _ => Err(ParseError::unsupported(
            "[_source] must be a boolean, a field name or a list of field names",
        )),
    }
}

fn source_path(path: &str) -> Result<String, ParseError> {
    validate_field(path, "_source")?;
    Ok(path.to_string())
}

/// Accepts `"500ms"`, `"2s"`, `"1m"` or a bare number of milliseconds.
fn timeout(value: &Value) -> Result<Duration, ParseError> {
    let invalid = || ParseError::unsupported("[timeout] must look like 500ms, 2s or 1m");
    let duration = match value {
        Value::Number(n) => Duration::from_millis(n.as_u64().ok_or_else(invalid)?),
        Value::String(s) => {
            let s = s.trim();
            let (digits, unit_ms) = if let Some(d) = s.strip_suffix("ms") {
                (d, 1)
            } else if let Some(d) = s.strip_suffix('s') {
                (d, 1_000)
            } else if let Some(d) = s.strip_suffix('m') {
                (d, 60_000)
            } else {
                return Err(invalid());
            };
            let amount: u64 = digits.trim().parse().map_err(|_| invalid())?;
            Duration::from_millis(amount.saturating_mul(unit_ms))
        }
        _ => return Err(invalid()),
    };
    if duration.is_zero() {
        return Err(ParseError::unsupported("[timeout] must be greater than zero"));
    }
    Ok(duration)
}

fn header_index(value: &Value) -> Result<TargetSelector, ParseError> {
    match value {
        Value::String(names) => Ok(TargetSelector::from_names([names])),
        Value::Array(items) => {
            let names = items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        ParseError::unsupported("[index] in multi-search header must hold strings")
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TargetSelector::from_names(names))
        }
        _ => Err(ParseError::unsupported(
            "[index] in multi-search header must be a string or a list of strings",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoolQuery, Operator, QueryNode};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_body_is_match_all() {
        let req = parse(b"").unwrap();
        assert_eq!(req, SearchRequest::default());
        assert_eq!(parse_with_default_size(b"  \n", 25).unwrap().size, 25);
    }

    #[test]
    fn test_full_request() {
        let body = br#"{
            "query": {"match": {"title": "dune"}},
            "size": 5,
            "from": 10,
            "_source": ["title", "author.name"],
            "timeout": "250ms"
        }"#;
        let req = parse(body).unwrap();
        assert_eq!(
            req.query,
            QueryNode::Match {
                field: "title".into(),
                query: "dune".into(),
                operator: Operator::Or,
            }
        );
        assert_eq!(req.size, 5);
        assert_eq!(req.from, 10);
        assert_eq!(
            req.source,
            SourceFilter::Includes(vec!["title".into(), "author.name".into()])
        );
        assert_eq!(req.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_malformed_json_keeps_tokenizer_message() {
        let err = parse(br#"{"query":{"match_all":{x}},"size":10}"#).unwrap_err();
        match &err {
            ParseError::Syntax { message, line, .. } => {
                assert!(message.contains("key must be a string"), "{message}");
                assert_eq!(*line, 1);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_object_body_is_unsupported() {
        assert!(matches!(parse(b"[1,2]"), Err(ParseError::UnsupportedShape(_))));
        assert!(matches!(parse(b"42"), Err(ParseError::UnsupportedShape(_))));
    }

    #[test]
    fn test_unknown_top_level_key_is_rejected() {
        for body in [
            &br#"{"aggs": {"by_tag": {"terms": {"field": "tag"}}}}"#[..],
            br#"{"sort": [{"year": "desc"}]}"#,
            br#"{"query": {"query_string": {"query": "a AND b"}}}"#,
        ] {
            assert!(matches!(parse(body), Err(ParseError::UnsupportedShape(_))));
        }
    }

    #[test]
    fn test_size_and_from_must_be_non_negative_integers() {
        assert!(parse(br#"{"size": -1}"#).is_err());
        assert!(parse(br#"{"from": 1.5}"#).is_err());
        assert!(parse(br#"{"size": "10"}"#).is_err());
        assert_eq!(parse(br#"{"size": 0}"#).unwrap().size, 0);
    }

    #[test]
    fn test_source_variants() {
        assert_eq!(parse(br#"{"_source": false}"#).unwrap().source, SourceFilter::None);
        assert_eq!(
            parse(br#"{"_source": "title"}"#).unwrap().source,
            SourceFilter::Includes(vec!["title".into()])
        );
        assert!(parse(br#"{"_source": {"includes": ["a"]}}"#).is_err());
    }

    #[test]
    fn test_timeout_units() {
        let t = |s: &str| parse(format!(r#"{{"timeout": {s}}}"#).as_bytes()).map(|r| r.timeout);
        assert_eq!(t(r#""2s""#).unwrap(), Some(Duration::from_secs(2)));
        assert_eq!(t(r#""1m""#).unwrap(), Some(Duration::from_secs(60)));
        assert_eq!(t("750").unwrap(), Some(Duration::from_millis(750)));
        assert!(t(r#""soon""#).is_err());
        assert!(t(r#""0ms""#).is_err());
    }

    #[test]
    fn test_empty_bool_parses() {
        let req = parse(br#"{"query": {"bool": {}}}"#).unwrap();
        assert_eq!(req.query, QueryNode::Bool(BoolQuery::default()));
    }

    #[test]
    fn test_header_index_forms() {
        assert_eq!(parse_header(b"{}").unwrap(), None);
        assert_eq!(
            parse_header(br#"{"index": "books"}"#).unwrap(),
            Some(TargetSelector::Names(vec!["books".into()]))
        );
        assert_eq!(
            parse_header(br#"{"index": ["books", "films,books"]}"#).unwrap(),
            Some(TargetSelector::Names(vec!["books".into(), "films".into()]))
        );
        assert_eq!(parse_header(br#"{"index": "_all"}"#).unwrap(), Some(TargetSelector::All));
    }

    #[test]
    fn test_header_ignores_routing_keys_and_rejects_unknown() {
        assert!(parse_header(br#"{"index": "a", "preference": "_local"}"#).is_ok());
        assert!(matches!(
            parse_header(br#"{"index": "a", "colour": "blue"}"#),
            Err(ParseError::UnsupportedShape(_))
        ));
        assert!(matches!(parse_header(b"{nope"), Err(ParseError::Syntax { .. })));
        assert!(parse_header(br#"{"index": 7}"#).is_err());
    }
}
