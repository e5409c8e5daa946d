//! Elasticsearch-compatible search over sharded tantivy indices.
//!
//! Requests flow through three layers: the [`query`] translator turns a
//! request body into a typed [`SearchRequest`], the [`Registry`] resolves
//! target names to live indices, and the [`SearchCoordinator`] fans the
//! query out to every shard and merges the ranked partial results.

pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod ports;
pub mod query;
pub mod registry;
pub mod services;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use config::{Config, SearchConfig, ServerConfig, StorageConfig};
pub use domain::{
    Document, Hit, IndexMeta, MultiSearchItem, MultiSearchResponse, QueryNode, SearchRequest,
    SearchResponse, StorageType, TargetSelector,
};
pub use error::{ErrorKind, HelixSearchError, ParseError, Result};
pub use registry::{Index, PendingIndex, Registry};
pub use services::{CancellationToken, SearchCoordinator};
