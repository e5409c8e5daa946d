pub mod document;
pub mod index;
pub mod query;
pub mod search;
pub mod target;

pub use document::{Document, route_id};
pub use index::{IndexMeta, StorageType, validate_index_name};
pub use query::{
    BoolQuery, MultiMatchType, Operator, QueryNode, RangeBounds, Scalar, SearchRequest, SourceFilter,
};
pub use search::{
    ErrorBody, Hit, HitsEnvelope, MultiSearchItem, MultiSearchResponse, SearchResponse, ShardHits,
    ShardsInfo, TotalHits, TotalRelation,
};
pub use target::TargetSelector;
