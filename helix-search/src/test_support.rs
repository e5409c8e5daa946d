//! In-memory fakes for the storage ports.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::domain::{Document, Hit, IndexMeta, QueryNode, ShardHits};
use crate::error::{HelixSearchError, Result};
use crate::ports::{MetadataStore, ShardFactory, ShardStore};

#[derive(Default)]
pub struct MemoryMetadataStore {
    metas: Mutex<BTreeMap<String, IndexMeta>>,
    fail_saves: AtomicBool,
}

impl MemoryMetadataStore {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn names(&self) -> Vec<String> {
        self.metas.lock().keys().cloned().collect()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn save(&self, meta: &IndexMeta) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(HelixSearchError::Io(std::io::Error::other("injected save failure")));
        }
        let mut metas = self.metas.lock();
        if metas.contains_key(&meta.name) {
            return Err(HelixSearchError::IndexExists(meta.name.clone()));
        }
        metas.insert(meta.name.clone(), meta.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.metas
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| HelixSearchError::IndexNotFound(name.to_string()))
    }

    fn load_all(&self) -> Result<Vec<IndexMeta>> {
        Ok(self.metas.lock().values().cloned().collect())
    }
}

/// Shard that ignores the query and returns its stored hits in rank order.
/// Hits can be scripted with exact scores to exercise merging.
pub struct ScriptedShard {
    index: String,
    shard_id: usize,
    hits: Mutex<Vec<Hit>>,
    delay: Duration,
    fail: bool,
    close_delay: Duration,
    fail_close: bool,
    closed: AtomicBool,
    closed_count: Arc<AtomicUsize>,
}

impl ScriptedShard {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HelixSearchError::ShardClosed {
                index: self.index.clone(),
                shard: self.shard_id,
            });
        }
        Ok(())
    }
}

impl ShardStore for ScriptedShard {
    fn shard_id(&self) -> usize {
        self.shard_id
    }

    fn execute(&self, query: &QueryNode, limit: usize) -> Result<ShardHits> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.check_open()?;
        if self.fail {
            return Err(HelixSearchError::Internal(format!(
                "scripted failure in shard {} of [{}]",
                self.shard_id, self.index
            )));
        }
        if *query == QueryNode::MatchNone {
            return Ok(ShardHits::default());
        }
        let mut hits = self.hits.lock().clone();
        hits.sort_by(Hit::rank_cmp);
        let total = hits.len() as u64;
        hits.truncate(limit);
        Ok(ShardHits { hits, total })
    }

    fn put_documents(&self, docs: &[Document]) -> Result<()> {
        self.check_open()?;
        let mut hits = self.hits.lock();
        for doc in docs {
            hits.retain(|h| h.id != doc.id);
            hits.push(Hit {
                index: self.index.clone(),
                id: doc.id.clone(),
                score: 1.0,
                source: Some(serde_json::Value::Object(doc.source.clone())),
            });
        }
        Ok(())
    }

    fn delete_document(&self, id: &str) -> Result<bool> {
        self.check_open()?;
        let mut hits = self.hits.lock();
        let before = hits.len();
        hits.retain(|h| h.id != id);
        Ok(hits.len() != before)
    }

    fn doc_count(&self) -> Result<u64> {
        self.check_open()?;
        Ok(self.hits.lock().len() as u64)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.close_delay.is_zero() {
            std::thread::sleep(self.close_delay);
        }
        self.closed_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(HelixSearchError::Io(std::io::Error::other("injected close failure")));
        }
        Ok(())
    }
}

/// Factory for [`ScriptedShard`]s with per-shard hit scripts, delays and
/// failures, plus counters for lifecycle assertions.
#[derive(Default)]
pub struct ScriptedShardFactory {
    scripts: Mutex<HashMap<(String, usize), Vec<(String, f32)>>>,
    delays: Mutex<HashMap<String, Duration>>,
    failing: Mutex<Vec<(String, usize)>>,
    close_delays: Mutex<HashMap<String, Duration>>,
    failing_close: Mutex<Vec<String>>,
    fail_open_at: Mutex<Option<usize>>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    destroyed: Mutex<Vec<String>>,
}

impl ScriptedShardFactory {
    /// Hits (id, score) returned by one shard of `index`.
    pub fn script(&self, index: &str, shard: usize, hits: &[(&str, f32)]) {
        self.scripts.lock().insert(
            (index.to_string(), shard),
            hits.iter().map(|(id, score)| ((*id).to_string(), *score)).collect(),
        );
    }

    /// Every shard of `index` sleeps this long before answering.
    pub fn delay(&self, index: &str, delay: Duration) {
        self.delays.lock().insert(index.to_string(), delay);
    }

    pub fn fail_shard(&self, index: &str, shard: usize) {
        self.failing.lock().push((index.to_string(), shard));
    }

    /// Closing any shard of `index` takes this long.
    pub fn close_delay(&self, index: &str, delay: Duration) {
        self.close_delays.lock().insert(index.to_string(), delay);
    }

    /// Every shard of `index` reports an error when closed.
    pub fn fail_close(&self, index: &str) {
        self.failing_close.lock().push(index.to_string());
    }

    /// The `n`th call to `open` (zero based) fails.
    pub fn fail_open_at(&self, n: usize) {
        *self.fail_open_at.lock() = Some(n);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().clone()
    }
}

impl ShardFactory for ScriptedShardFactory {
    fn open(&self, meta: &IndexMeta, shard_id: usize) -> Result<Arc<dyn ShardStore>> {
        if *self.fail_open_at.lock() == Some(self.opened()) {
            return Err(HelixSearchError::Io(std::io::Error::other("injected open failure")));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let key = (meta.name.clone(), shard_id);
        let hits = self
            .scripts
            .lock()
            .get(&key)
            .map(|script| {
                script
                    .iter()
                    .map(|(id, score)| Hit {
                        index: meta.name.clone(),
                        id: id.clone(),
                        score: *score,
                        source: Some(serde_json::json!({ "id": id })),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Arc::new(ScriptedShard {
            index: meta.name.clone(),
            shard_id,
            hits: Mutex::new(hits),
            delay: self.delays.lock().get(&meta.name).copied().unwrap_or_default(),
            fail: self.failing.lock().contains(&key),
            close_delay: self.close_delays.lock().get(&meta.name).copied().unwrap_or_default(),
            fail_close: self.failing_close.lock().contains(&meta.name),
            closed: AtomicBool::new(false),
            closed_count: Arc::clone(&self.closed),
        }))
    }

    fn destroy(&self, meta: &IndexMeta) -> Result<()> {
        self.destroyed.lock().push(meta.name.clone());
        Ok(())
    }
}
