use std::sync::Arc;

use crate::domain::{Document, IndexMeta, QueryNode, ShardHits};
use crate::error::Result;

/// One partition of an index's inverted-index storage.
///
/// Implementations are shared behind `Arc` across concurrent searches, so
/// every method takes `&self`. Once `close` has run, every other method must
/// fail with an error instead of touching released resources.
pub trait ShardStore: Send + Sync {
    fn shard_id(&self) -> usize;

    /// Runs `query` and returns at most `limit` hits in [`crate::domain::Hit::rank_cmp`]
    /// order, plus the number of matching documents in this shard. Among hits
    /// tied on score the smallest ids are the ones kept.
    fn execute(&self, query: &QueryNode, limit: usize) -> Result<ShardHits>;

    /// Adds or replaces documents; they are searchable once this returns.
    fn put_documents(&self, docs: &[Document]) -> Result<()>;

    /// Returns whether a document with this id existed.
    fn delete_document(&self, id: &str) -> Result<bool>;

    fn doc_count(&self) -> Result<u64>;

    fn close(&self) -> Result<()>;
}

/// Opens shard storage for an index and removes it once the index is gone.
pub trait ShardFactory: Send + Sync {
    fn open(&self, meta: &IndexMeta, shard_id: usize) -> Result<Arc<dyn ShardStore>>;

    /// Deletes whatever `open` left behind. Shards are closed before this runs.
    fn destroy(&self, meta: &IndexMeta) -> Result<()>;
}
