use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{Document, IndexMeta, StorageType};
use crate::error::{HelixSearchError, Result};
use crate::ports::{ShardFactory, ShardStore};

/// A live index: its descriptor plus one open store per shard.
pub struct Index {
    meta: IndexMeta,
    shards: Vec<Arc<dyn ShardStore>>,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("meta", &self.meta)
            .field("shards", &self.shards.len())
            .finish()
    }
}

impl Index {
    /// Opens every shard. Shards opened before a failure are closed again.
    pub(crate) fn open(meta: IndexMeta, factory: &dyn ShardFactory) -> Result<Self> {
        let mut shards = Vec::with_capacity(meta.shard_count);
        for shard_id in 0..meta.shard_count {
            match factory.open(&meta, shard_id) {
                Ok(shard) => shards.push(shard),
                Err(err) => {
                    for shard in &shards {
                        if let Err(close_err) = shard.close() {
                            tracing::warn!(index = %meta.name, shard = shard.shard_id(), error = %close_err, "failed to close shard");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(Self { meta, shards })
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub const fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub const fn storage_type(&self) -> StorageType {
        self.meta.storage_type
    }

    pub const fn shard_count(&self) -> usize {
        self.meta.shard_count
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.meta.created_at
    }

    pub fn shards(&self) -> &[Arc<dyn ShardStore>] {
        &self.shards
    }

    fn shard_for(&self, id: &str) -> Result<&Arc<dyn ShardStore>> {
        let slot = crate::domain::route_id(id, self.shards.len());
        self.shards
            .get(slot)
            .ok_or_else(|| HelixSearchError::Internal(format!("index [{}] has no shard {slot}", self.meta.name)))
    }

    /// Stores one document and returns its id.
    pub fn put_document(&self, id: Option<String>, source: Value) -> Result<String> {
        let doc = Document::new(id, source)?;
        self.shard_for(&doc.id)?.put_documents(std::slice::from_ref(&doc))?;
        Ok(doc.id)
    }

    /// Stores a batch, one commit per touched shard. Returns how many
    /// documents were written.
    pub fn put_documents(&self, docs: Vec<Document>) -> Result<usize> {
        let count = docs.len();
        let mut by_shard: BTreeMap<usize, Vec<Document>> = BTreeMap::new();
        for doc in docs {
            by_shard
                .entry(doc.route(self.shards.len()))
                .or_default()
                .push(doc);
        }
        for (slot, batch) in by_shard {
            let shard = self.shards.get(slot).ok_or_else(|| {
                HelixSearchError::Internal(format!("index [{}] has no shard {slot}", self.meta.name))
            })?;
            shard.put_documents(&batch)?;
        }
        Ok(count)
    }

    pub fn delete_document(&self, id: &str) -> Result<()> {
        if self.shard_for(id)?.delete_document(id)? {
            Ok(())
        } else {
            Err(HelixSearchError::DocumentNotFound {
                index: self.meta.name.clone(),
                id: id.to_string(),
            })
        }
    }

    pub fn doc_count(&self) -> Result<u64> {
        self.shards.iter().map(|s| s.doc_count()).sum()
    }

    /// Closes every shard, returning the first failure after trying all.
    pub(crate) fn close(&self) -> Result<()> {
        let mut first_err = None;
        for shard in &self.shards {
            if let Err(err) = shard.close() {
                tracing::warn!(index = %self.meta.name, shard = shard.shard_id(), error = %err, "failed to close shard");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
