use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HelixSearchError, Result};

const MAX_NAME_BYTES: usize = 255;
const FORBIDDEN_NAME_CHARS: &[char] = &[
    '/', '\\', '*', '?', '"', '<', '>', '|', ',', '#', ':', ' ', '\t', '\n', '\r',
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Disk,
    Memory,
}

impl StorageType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StorageType {
    type Err = HelixSearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disk" => Ok(Self::Disk),
            "memory" | "mem" => Ok(Self::Memory),
            _ => Err(HelixSearchError::invalid(format!(
                "unknown storage type [{s}], expected disk or memory"
            ))),
        }
    }
}

/// Durable descriptor of an index. Everything here is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub storage_type: StorageType,
    pub shard_count: usize,
    pub created_at: DateTime<Utc>,
}

impl IndexMeta {
    pub fn new(name: impl Into<String>, storage_type: StorageType, shard_count: usize) -> Result<Self> {
        let name = name.into();
        validate_index_name(&name)?;
        if shard_count < 1 {
            return Err(HelixSearchError::invalid(format!(
                "index [{name}] needs at least one shard, got {shard_count}"
            )));
        }
        Ok(Self {
            name,
            storage_type,
            shard_count,
            created_at: Utc::now(),
        })
    }

    /// Checks a descriptor that came from persistent storage.
    pub fn validate(&self) -> Result<()> {
        validate_index_name(&self.name)?;
        if self.shard_count < 1 {
            return Err(HelixSearchError::invalid(format!(
                "index [{}] has shard_count 0",
                self.name
            )));
        }
        Ok(())
    }
}

/// Index names double as directory and file names, so anything that could
/// escape the data directory or collide with target syntax is rejected.
pub fn validate_index_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(HelixSearchError::invalid("index name must not be empty"));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(HelixSearchError::invalid(format!(
            "index name is longer than {MAX_NAME_BYTES} bytes"
        )));
    }
    if name == "." || name == ".." {
        return Err(HelixSearchError::invalid(format!("index name [{name}] is reserved")));
    }
    if name.starts_with(['_', '-', '+']) {
        return Err(HelixSearchError::invalid(format!(
            "index name [{name}] must not start with '_', '-' or '+'"
        )));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(HelixSearchError::invalid(format!(
            "index name [{name}] must not contain {c:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_from_str() {
        assert_eq!("disk".parse::<StorageType>().unwrap(), StorageType::Disk);
        assert_eq!("Memory".parse::<StorageType>().unwrap(), StorageType::Memory);
        let err = "tape".parse::<StorageType>().unwrap_err();
        assert!(matches!(err, HelixSearchError::InvalidArgument(_)));
    }

    #[test]
    fn test_new_rejects_zero_shards() {
        let err = IndexMeta::new("books", StorageType::Disk, 0).unwrap_err();
        assert!(matches!(err, HelixSearchError::InvalidArgument(_)));
    }

    #[test]
    fn test_index_name_rules() {
        assert!(validate_index_name("TestSearchDSL.index_1").is_ok());
        assert!(validate_index_name("logs-2024.01").is_ok());
        for bad in ["", ".", "..", "_search", "-x", "a/b", "a,b", "a b", "a*"] {
            assert!(validate_index_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_meta_serde_round_trip() {
        let meta = IndexMeta::new("books", StorageType::Memory, 2).unwrap();
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"memory\""));
        let back: IndexMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
