use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::StorageType;
use crate::error::{HelixSearchError, Result};
use crate::storage::MIN_WRITER_MEMORY_BYTES;

const PROJECT_CONFIG: &str = ".helix/helix-search.toml";
const CONFIG_FILE_NAME: &str = "helix-search.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".helix/search"),
            server: ServerConfig::default(),
            search: SearchConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 4080)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_size: usize,
    pub max_result_window: usize,
    pub timeout_ms: u64,
    pub msearch_concurrency: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_size: 10,
            max_result_window: 10_000,
            timeout_ms: 30_000,
            msearch_concurrency: 8,
        }
    }
}

impl SearchConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub default_storage: StorageType,
    pub default_shards: usize,
    pub writer_memory_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_storage: StorageType::Disk,
            default_shards: 3,
            writer_memory_bytes: 20_000_000,
        }
    }
}

impl Config {
    /// Global file, then project file, then environment. Later sources win
    /// key by key.
    pub fn load() -> Result<Self> {
        let mut merged = toml::Table::new();
        if let Some(global) = Self::global_path() {
            merge_tables(&mut merged, read_table(&global)?);
        }
        merge_tables(&mut merged, read_table(Path::new(PROJECT_CONFIG))?);
        Self::from_table(merged)?.with_env_overrides()
    }

    /// Loads exactly one file. Environment overrides still apply.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HelixSearchError::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        Self::from_table(read_table(path)?)?.with_env_overrides()
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let table = content
            .parse::<toml::Table>()
            .map_err(|e| HelixSearchError::Config(e.to_string()))?;
        Self::from_table(table)
    }

    fn from_table(table: toml::Table) -> Result<Self> {
        let config: Self = toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| HelixSearchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn global_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "helix")
            .map(|d| d.config_dir().join(CONFIG_FILE_NAME))
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("HELIX_SEARCH_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(bind) = std::env::var("HELIX_SEARCH_BIND") {
            self.server.bind = bind
                .parse()
                .map_err(|e| HelixSearchError::Config(format!("HELIX_SEARCH_BIND={bind}: {e}")))?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.writer_memory_bytes < MIN_WRITER_MEMORY_BYTES {
            return Err(HelixSearchError::Config(format!(
                "storage.writer_memory_bytes must be at least {MIN_WRITER_MEMORY_BYTES}, got {}",
                self.storage.writer_memory_bytes
            )));
        }
        if self.storage.default_shards == 0 {
            return Err(HelixSearchError::Config(
                "storage.default_shards must be at least 1".to_string(),
            ));
        }
        if self.search.max_result_window == 0 || self.search.msearch_concurrency == 0 {
            return Err(HelixSearchError::Config(
                "search.max_result_window and search.msearch_concurrency must be positive".to_string(),
            ));
        }
        if self.search.timeout_ms == 0 {
            return Err(HelixSearchError::Config("search.timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

fn read_table(path: &Path) -> Result<toml::Table> {
    if !path.exists() {
        return Ok(toml::Table::new());
    }
    let content = std::fs::read_to_string(path)?;
    content
        .parse::<toml::Table>()
        .map_err(|e| HelixSearchError::Config(format!("{}: {e}", path.display())))
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let toml::Value::Table(incoming) = value else {
            base.insert(key, value);
            continue;
        };
        if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
            merge_tables(existing, incoming);
        } else {
            base.insert(key, toml::Value::Table(incoming));
        }
    }
}
