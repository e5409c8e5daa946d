pub mod metadata;
pub mod shard;

pub use metadata::MetadataStore;
pub use shard::{ShardFactory, ShardStore};
