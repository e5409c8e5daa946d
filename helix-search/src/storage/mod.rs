//! Storage adapters: tantivy-backed shards and the on-disk index catalog.

mod compile;
mod facets;
pub mod metadata_fs;
pub mod tantivy_shard;

pub use metadata_fs::FsMetadataStore;
pub use tantivy_shard::{MIN_WRITER_MEMORY_BYTES, TantivyShard, TantivyShardFactory};
