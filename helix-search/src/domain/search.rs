use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HelixSearchError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score")]
    pub score: f32,
    #[serde(rename = "_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
}

impl Hit {
    /// Merge order: score descending, then document id, then index name.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Partial result of one shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardHits {
    pub hits: Vec<Hit>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardsInfo {
    pub total: usize,
    pub successful: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ShardsInfo {
    pub const fn all_successful(total: usize) -> Self {
        Self {
            total,
            successful: total,
            skipped: 0,
            failed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    pub relation: TotalRelation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalRelation {
    Eq,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitsEnvelope {
    pub total: TotalHits,
    pub max_score: Option<f32>,
    pub hits: Vec<Hit>,
}

/// Successful search, shaped like an Elasticsearch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub took: u64,
    pub timed_out: bool,
    #[serde(rename = "_shards")]
    pub shards: ShardsInfo,
    pub hits: HitsEnvelope,
}

impl SearchResponse {
    pub fn new(took: u64, shard_total: usize, total: u64, hits: Vec<Hit>) -> Self {
        let max_score = hits.iter().map(|h| h.score).reduce(f32::max);
        Self {
            took,
            timed_out: false,
            shards: ShardsInfo::all_successful(shard_total),
            hits: HitsEnvelope {
                total: TotalHits {
                    value: total,
                    relation: TotalRelation::Eq,
                },
                max_score,
                hits,
            },
        }
    }

    pub const fn total(&self) -> u64 {
        self.hits.total.value
    }

    pub fn ids(&self) -> Vec<&str> {
        self.hits.hits.iter().map(|h| h.id.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}

impl From<&HelixSearchError> for ErrorBody {
    fn from(err: &HelixSearchError) -> Self {
        Self {
            error: err.client_message(),
            status: err.status_code(),
        }
    }
}

/// One entry of a multi-search response. Failures are reported in place so
/// sibling entries are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultiSearchItem {
    Success {
        #[serde(flatten)]
        response: SearchResponse,
        status: u16,
    },
    Failure(ErrorBody),
}

impl MultiSearchItem {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub const fn response(&self) -> Option<&SearchResponse> {
        match self {
            Self::Success { response, .. } => Some(response),
            Self::Failure(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(body) => Some(&body.error),
        }
    }
}

impl From<crate::error::Result<SearchResponse>> for MultiSearchItem {
    fn from(result: crate::error::Result<SearchResponse>) -> Self {
        match result {
            Ok(response) => Self::Success {
                response,
                status: 200,
            },
            Err(err) => Self::Failure(ErrorBody::from(&err)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSearchResponse {
    pub took: u64,
    pub responses: Vec<MultiSearchItem>,
}
