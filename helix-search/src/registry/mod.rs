//! Process-wide catalog of live indices.
//!
//! The registry owns every [`Index`] and is the only place indices are
//! created, published or removed. Readers take a snapshot under a shared
//! lock, so a search resolving several names sees one consistent view even
//! while another request is creating or deleting indices.
//!
//! Creation is two-phase. [`Registry::create`] opens the shards and returns a
//! [`PendingIndex`] that nobody else can see; [`Registry::persist`] writes the
//! descriptor and publishes the index. Dropping a pending index without
//! persisting it releases the name and its storage.
//!
//! A name stays reserved while its storage is being created or destroyed, so
//! a create racing a delete of the same name returns `IndexExists` instead
//! of sharing a data directory with the index being torn down.

mod index;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::domain::{IndexMeta, StorageType, TargetSelector};
use crate::error::{HelixSearchError, Result};
use crate::ports::{MetadataStore, ShardFactory};
use crate::storage::{FsMetadataStore, TantivyShardFactory};

pub use index::Index;

type Reservations = Arc<Mutex<HashSet<String>>>;

pub struct Registry {
    indices: RwLock<BTreeMap<String, Arc<Index>>>,
    reserved: Reservations,
    store: Arc<dyn MetadataStore>,
    factory: Arc<dyn ShardFactory>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("indices", &self.list_all())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// An empty registry. Nothing is loaded from `store`.
    pub fn new(store: Arc<dyn MetadataStore>, factory: Arc<dyn ShardFactory>) -> Self {
        Self {
            indices: RwLock::new(BTreeMap::new()),
            reserved: Arc::new(Mutex::new(HashSet::new())),
            store,
            factory,
        }
    }

    /// Builds a registry from persisted descriptors, reopening every shard.
    pub fn open(store: Arc<dyn MetadataStore>, factory: Arc<dyn ShardFactory>) -> Result<Self> {
        let registry = Self::new(store, factory);
        let metas = registry.store.load_all()?;
        {
            let mut indices = registry.indices.write();
            for meta in metas {
                let name = meta.name.clone();
                let index = Index::open(meta, registry.factory.as_ref()).inspect_err(|err| {
                    tracing::error!(index = %name, error = %err, "failed to reopen index");
                })?;
                indices.insert(name, Arc::new(index));
            }
        }
        tracing::info!(indices = registry.len(), "registry loaded");
        Ok(registry)
    }

    /// Registry over `<data_dir>/meta` descriptors and tantivy shards.
    pub fn open_dir(data_dir: &Path, writer_memory_bytes: usize) -> Result<Self> {
        let store = Arc::new(FsMetadataStore::new(data_dir.join("meta")));
        let factory = Arc::new(TantivyShardFactory::new(data_dir, writer_memory_bytes));
        Self::open(store, factory)
    }

    /// Opens storage for a new index and reserves its name. The index stays
    /// invisible until it is passed to [`Registry::persist`].
    pub fn create(&self, name: &str, storage_type: StorageType, shard_count: usize) -> Result<PendingIndex> {
        let meta = IndexMeta::new(name, storage_type, shard_count)?;
        let claim = {
            let mut reserved = self.reserved.lock();
            if reserved.contains(&meta.name) || self.indices.read().contains_key(&meta.name) {
                return Err(HelixSearchError::IndexExists(meta.name));
            }
            NameClaim::take(&mut reserved, &meta.name, &self.reserved)
        };

        let mut pending = PendingIndex {
            claim,
            index: None,
            factory: Arc::clone(&self.factory),
        };
        // Anything on disk under an unregistered name is leftover data.
        self.factory.destroy(&meta)?;
        pending.index = Some(Index::open(meta, self.factory.as_ref())?);
        Ok(pending)
    }

    /// Writes the descriptor and publishes the index. On failure the pending
    /// index is discarded and the name becomes free again.
    pub fn persist(&self, mut pending: PendingIndex) -> Result<Arc<Index>> {
        let Some(index) = pending.index.take() else {
            return Err(HelixSearchError::Internal(format!(
                "pending index [{}] has no storage",
                pending.name()
            )));
        };

        let mut indices = self.indices.write();
        if indices.contains_key(pending.name()) {
            pending.index = Some(index);
            return Err(HelixSearchError::IndexExists(pending.name().to_string()));
        }
        if let Err(err) = self.store.save(index.meta()) {
            pending.index = Some(index);
            return Err(err);
        }
        let index = Arc::new(index);
        indices.insert(pending.name().to_string(), Arc::clone(&index));
        drop(indices);

        tracing::info!(
            index = %index.name(),
            storage = %index.storage_type(),
            shards = index.shard_count(),
            "created index"
        );
        Ok(index)
    }

    /// Removes the index from the catalog, then closes and deletes its
    /// storage. Searches already holding the index see closed shards.
    ///
    /// Storage is destroyed even when closing a shard fails; that close error
    /// is returned once the data is gone.
    pub fn delete(&self, name: &str) -> Result<()> {
        let (index, _claim) = {
            let mut reserved = self.reserved.lock();
            let mut indices = self.indices.write();
            let Some(index) = indices.get(name).cloned() else {
                return Err(HelixSearchError::IndexNotFound(name.to_string()));
            };
            match self.store.remove(name) {
                Ok(()) => {}
                Err(HelixSearchError::IndexNotFound(_)) => {
                    tracing::warn!(index = %name, "index had no stored descriptor");
                }
                Err(err) => return Err(err),
            }
            indices.remove(name);
            (index, NameClaim::take(&mut reserved, name, &self.reserved))
        };

        let closed = index.close();
        if let Err(err) = &closed {
            tracing::warn!(index = %name, error = %err, "index did not close cleanly, removing its data anyway");
        }
        self.factory.destroy(index.meta())?;
        closed?;
        tracing::info!(index = %name, "deleted index");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<Index>> {
        self.indices
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| HelixSearchError::IndexNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indices.read().contains_key(name)
    }

    /// Every live index name, sorted.
    pub fn list_all(&self) -> Vec<String> {
        self.indices.read().keys().cloned().collect()
    }

    pub fn list(&self) -> Vec<IndexMeta> {
        self.indices.read().values().map(|i| i.meta().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.indices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.read().is_empty()
    }

    /// Resolves a selector against one snapshot. Either every named index
    /// exists or the first missing name is reported.
    pub fn resolve(&self, selector: &TargetSelector) -> Result<Vec<Arc<Index>>> {
        let indices = self.indices.read();
        match selector {
            TargetSelector::All => Ok(indices.values().cloned().collect()),
            TargetSelector::Names(names) => names
                .iter()
                .map(|name| {
                    indices
                        .get(name)
                        .cloned()
                        .ok_or_else(|| HelixSearchError::IndexNotFound(name.clone()))
                })
                .collect(),
        }
    }

    /// Closes every shard without touching descriptors or data.
    pub fn close(&self) -> Result<()> {
        let indices: Vec<Arc<Index>> = self.indices.read().values().cloned().collect();
        let mut first_err = None;
        for index in indices {
            if let Err(err) = index.close() {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Keeps a name in the reservation set until dropped.
struct NameClaim {
    name: String,
    reserved: Reservations,
}

impl NameClaim {
    fn take(set: &mut HashSet<String>, name: &str, reserved: &Reservations) -> Self {
        set.insert(name.to_string());
        Self {
            name: name.to_string(),
            reserved: Arc::clone(reserved),
        }
    }
}

impl Drop for NameClaim {
    fn drop(&mut self) {
        self.reserved.lock().remove(&self.name);
    }
}

/// An index whose shards are open but which is not yet in the catalog.
#[must_use = "a pending index is discarded unless passed to Registry::persist"]
pub struct PendingIndex {
    // Dropped after `Drop::drop` has discarded the storage.
    claim: NameClaim,
    index: Option<Index>,
    factory: Arc<dyn ShardFactory>,
}

impl PendingIndex {
    pub fn name(&self) -> &str {
        &self.claim.name
    }

    pub fn index(&self) -> Option<&Index> {
        self.index.as_ref()
    }
}

impl Drop for PendingIndex {
    fn drop(&mut self) {
        if let Some(index) = self.index.take() {
            let discarded = index.close().and_then(|()| self.factory.destroy(index.meta()));
            if let Err(err) = discarded {
                tracing::warn!(index = %self.name(), error = %err, "failed to discard pending index");
            }
        }
    }
}
