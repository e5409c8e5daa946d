use crate::domain::IndexMeta;
use crate::error::Result;

/// Durable catalog of index descriptors.
pub trait MetadataStore: Send + Sync {
    /// Fails with `IndexExists` if a descriptor with the same name is stored.
    fn save(&self, meta: &IndexMeta) -> Result<()>;

    /// Fails with `IndexNotFound` if nothing is stored under `name`.
    fn remove(&self, name: &str) -> Result<()>;

    fn load_all(&self) -> Result<Vec<IndexMeta>>;
}
