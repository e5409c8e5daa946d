//! Shard storage backed by one tantivy index per shard.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value as _, STORED, STRING, TEXT};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Score, Searcher};
use tantivy::{TantivyDocument, Term};

use crate::domain::{Document, Hit, IndexMeta, QueryNode, ShardHits, StorageType};
use crate::error::{HelixSearchError, Result};
use crate::ports::{ShardFactory, ShardStore};

use super::compile::QueryCompiler;
use super::facets::Facets;

pub const ID_FIELD: &str = "_id";
pub const RAW_FIELD: &str = "_raw";
pub const ALL_FIELD: &str = "_all";
pub const SOURCE_FIELD: &str = "_source";
pub const PATHS_FIELD: &str = "_paths";
pub const KEYWORDS_FIELD: &str = "_keywords";
pub const TOKENS_FIELD: &str = "_tokens";
pub const NUMBERS_FIELD: &str = "_numbers";

/// tantivy refuses writer budgets below this.
pub const MIN_WRITER_MEMORY_BYTES: usize = 15_000_000;

fn shard_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(ID_FIELD, STRING | STORED);
    builder.add_text_field(RAW_FIELD, STORED);
    builder.add_text_field(ALL_FIELD, TEXT);
    builder.add_json_field(SOURCE_FIELD, TEXT);
    for name in [PATHS_FIELD, KEYWORDS_FIELD, TOKENS_FIELD, NUMBERS_FIELD] {
        builder.add_text_field(name, STRING);
    }
    builder.build()
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ShardFields {
    pub id: Field,
    pub raw: Field,
    pub all: Field,
    pub paths: Field,
    pub keywords: Field,
    pub tokens: Field,
    pub numbers: Field,
}

impl ShardFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        Ok(Self {
            id: schema.get_field(ID_FIELD)?,
            raw: schema.get_field(RAW_FIELD)?,
            all: schema.get_field(ALL_FIELD)?,
            paths: schema.get_field(PATHS_FIELD)?,
            keywords: schema.get_field(KEYWORDS_FIELD)?,
            tokens: schema.get_field(TOKENS_FIELD)?,
            numbers: schema.get_field(NUMBERS_FIELD)?,
        })
    }
}

/// Opens tantivy shards under `<data_dir>/indices/<name>/shard-<n>` for disk
/// indices, or in RAM for memory indices.
#[derive(Debug, Clone)]
pub struct TantivyShardFactory {
    data_dir: PathBuf,
    writer_memory_bytes: usize,
}

impl TantivyShardFactory {
    pub fn new(data_dir: impl Into<PathBuf>, writer_memory_bytes: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            writer_memory_bytes: writer_memory_bytes.max(MIN_WRITER_MEMORY_BYTES),
        }
    }

    /// Factory for processes that only ever create memory indices.
    pub fn in_memory() -> Self {
        Self::new(PathBuf::new(), MIN_WRITER_MEMORY_BYTES)
    }

    fn index_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join("indices").join(name)
    }

    fn open_disk_index(dir: &Path) -> Result<Index> {
        if dir.join("meta.json").exists() {
            return Ok(Index::open_in_dir(dir)?);
        }
        std::fs::create_dir_all(dir)?;
        Ok(Index::create_in_dir(dir, shard_schema())?)
    }
}

impl ShardFactory for TantivyShardFactory {
    fn open(&self, meta: &IndexMeta, shard_id: usize) -> Result<Arc<dyn ShardStore>> {
        let index = match meta.storage_type {
            StorageType::Memory => Index::create_in_ram(shard_schema()),
            StorageType::Disk => {
                Self::open_disk_index(&self.index_dir(&meta.name).join(format!("shard-{shard_id}")))?
            }
        };
        let shard = TantivyShard::new(&meta.name, shard_id, index, self.writer_memory_bytes)?;
        tracing::debug!(index = %meta.name, shard = shard_id, storage = %meta.storage_type, "opened shard");
        Ok(Arc::new(shard))
    }

    fn destroy(&self, meta: &IndexMeta) -> Result<()> {
        if meta.storage_type != StorageType::Disk {
            return Ok(());
        }
        let dir = self.index_dir(&meta.name);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!(index = %meta.name, path = %dir.display(), "removed shard data");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub struct TantivyShard {
    index_name: String,
    shard_id: usize,
    schema: Schema,
    fields: ShardFields,
    reader: IndexReader,
    parser: QueryParser,
    analyzer: TextAnalyzer,
    writer: Mutex<Option<IndexWriter>>,
    closed: AtomicBool,
}

impl TantivyShard {
    fn new(index_name: &str, shard_id: usize, index: Index, writer_memory_bytes: usize) -> Result<Self> {
        let schema = index.schema();
        let fields = ShardFields::resolve(&schema)?;
        let writer: IndexWriter = index.writer_with_num_threads(1, writer_memory_bytes)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let parser = QueryParser::for_index(&index, vec![fields.all]);
        let analyzer = index
            .tokenizers()
            .get("default")
            .ok_or_else(|| HelixSearchError::Internal("default tokenizer is not registered".into()))?;
        Ok(Self {
            index_name: index_name.to_string(),
            shard_id,
            schema,
            fields,
            reader,
            parser,
            analyzer,
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed_error(&self) -> HelixSearchError {
        HelixSearchError::ShardClosed {
            index: self.index_name.clone(),
            shard: self.shard_id,
        }
    }

    /// Runs `apply` against the writer, commits and makes the result visible.
    fn write(&self, apply: impl FnOnce(&mut IndexWriter) -> Result<()>) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or_else(|| self.closed_error())?;
        if let Err(err) = apply(writer) {
            writer.rollback()?;
            return Err(err);
        }
        writer.commit()?;
        drop(guard);
        self.reader.reload()?;
        Ok(())
    }

    fn to_tantivy(&self, doc: &Document, analyzer: &mut TextAnalyzer) -> Result<TantivyDocument> {
        let facets = Facets::extract(&doc.source, analyzer);
        let mut fields = Map::new();
        fields.insert(ID_FIELD.to_string(), Value::String(doc.id.clone()));
        fields.insert(
            RAW_FIELD.to_string(),
            Value::String(serde_json::to_string(&doc.source)?),
        );
        fields.insert(ALL_FIELD.to_string(), Value::String(doc.all_text()));
        fields.insert(SOURCE_FIELD.to_string(), Value::Object(doc.source.clone()));
        for (name, keys) in [
            (PATHS_FIELD, facets.paths),
            (KEYWORDS_FIELD, facets.keywords),
            (TOKENS_FIELD, facets.tokens),
            (NUMBERS_FIELD, facets.numbers),
        ] {
            fields.insert(
                name.to_string(),
                Value::Array(keys.into_iter().map(Value::String).collect()),
            );
        }
        let json = Value::Object(fields).to_string();
        TantivyDocument::parse_json(&self.schema, &json).map_err(|err| {
            HelixSearchError::invalid(format!("document [{}] cannot be indexed: {err}", doc.id))
        })
    }

    fn id_term(&self, id: &str) -> Term {
        Term::from_field_text(self.fields.id, id)
    }

    /// Best `limit` documents plus every document tied with the last of
    /// them, so the caller can break ties by id rather than by doc address.
    fn collect_top(
        searcher: &Searcher,
        query: &dyn Query,
        limit: usize,
    ) -> Result<(Vec<(Score, DocAddress)>, usize)> {
        let (mut top, count) = searcher.search(query, &(TopDocs::with_limit(limit), Count))?;
        let mut fetch = limit;
        while top.len() == fetch && fetch < count {
            let cutoff = top[limit - 1].0;
            if top[fetch - 1].0 < cutoff {
                break;
            }
            fetch = fetch.saturating_mul(2).min(count);
            top = searcher.search(query, &TopDocs::with_limit(fetch))?;
        }
        if let Some(&(cutoff, _)) = top.get(limit - 1) {
            top.retain(|(score, _)| *score >= cutoff);
        }
        Ok((top, count))
    }
}

impl ShardStore for TantivyShard {
    fn shard_id(&self) -> usize {
        self.shard_id
    }

    fn execute(&self, query: &QueryNode, limit: usize) -> Result<ShardHits> {
        self.ensure_open()?;
        let compiled = QueryCompiler {
            fields: &self.fields,
            parser: &self.parser,
        }
        .compile(query)?;
        let searcher = self.reader.searcher();

        // TopDocs rejects a zero limit, so size-0 searches only count.
        let (top, count) = if limit == 0 {
            (Vec::new(), searcher.search(&*compiled, &Count)?)
        } else {
            Self::collect_top(&searcher, &*compiled, limit)?
        };

        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address)?;
            let id = doc
                .get_first(self.fields.id)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let source = doc
                .get_first(self.fields.raw)
                .and_then(|v| v.as_str())
                .map(serde_json::from_str::<Value>)
                .transpose()?;
            hits.push(Hit {
                index: self.index_name.clone(),
                id,
                score,
                source,
            });
        }
        hits.sort_by(Hit::rank_cmp);
        hits.truncate(limit);
        Ok(ShardHits {
            hits,
            total: u64::try_from(count).unwrap_or(u64::MAX),
        })
    }

    fn put_documents(&self, docs: &[Document]) -> Result<()> {
        self.ensure_open()?;
        let mut analyzer = self.analyzer.clone();
        let prepared = docs
            .iter()
            .map(|doc| Ok((self.id_term(&doc.id), self.to_tantivy(doc, &mut analyzer)?)))
            .collect::<Result<Vec<_>>>()?;
        self.write(|writer| {
            for (term, doc) in prepared {
                // Delete-then-add within one commit replaces an existing id.
                writer.delete_term(term);
                writer.add_document(doc)?;
            }
            Ok(())
        })
    }

    fn delete_document(&self, id: &str) -> Result<bool> {
        self.ensure_open()?;
        let term = self.id_term(id);
        let query = TermQuery::new(term.clone(), IndexRecordOption::Basic);
        if self.reader.searcher().search(&query, &Count)? == 0 {
            return Ok(false);
        }
        self.write(|writer| {
            writer.delete_term(term);
            Ok(())
        })?;
        Ok(true)
    }

    fn doc_count(&self) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.reader.searcher().num_docs())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let writer = self.writer.lock().take();
        if let Some(mut writer) = writer {
            writer.commit()?;
            writer.wait_merging_threads()?;
        }
        tracing::debug!(index = %self.index_name, shard = self.shard_id, "closed shard");
        Ok(())
    }
}
