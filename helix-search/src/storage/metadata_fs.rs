//! Index descriptors stored as one JSON file per index.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::domain::IndexMeta;
use crate::error::{HelixSearchError, Result};
use crate::ports::MetadataStore;

/// Writes `<dir>/<name>.json`. Saves go through a temporary file and a
/// rename so a crash never leaves a half-written descriptor behind.
///
/// Concurrent saves of the same name are serialized by the registry; this
/// store only guards against names that are already on disk.
#[derive(Debug, Clone)]
pub struct FsMetadataStore {
    dir: PathBuf,
}

impl FsMetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl MetadataStore for FsMetadataStore {
    fn save(&self, meta: &IndexMeta) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(&meta.name);
        if target.exists() {
            return Err(HelixSearchError::IndexExists(meta.name.clone()));
        }

        let tmp = self.dir.join(format!(".{}.json.tmp", meta.name));
        let body = serde_json::to_vec_pretty(meta)?;
        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(&body)?;
            file.sync_all()
        });
        if let Err(err) = written.and_then(|()| fs::rename(&tmp, &target)) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(HelixSearchError::IndexNotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Unreadable or invalid descriptors are logged and skipped.
    fn load_all(&self) -> Result<Vec<IndexMeta>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut metas = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match read_descriptor(&path) {
                Ok(meta) => metas.push(meta),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable index descriptor");
                }
            }
        }
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(metas)
    }
}

fn read_descriptor(path: &Path) -> Result<IndexMeta> {
    let meta: IndexMeta = serde_json::from_slice(&fs::read(path)?)?;
    meta.validate()?;
    let file_stem = path.file_stem().and_then(|s| s.to_str());
    if file_stem != Some(meta.name.as_str()) {
        return Err(HelixSearchError::Internal(format!(
            "descriptor for [{}] stored under a different file name",
            meta.name
        )));
    }
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StorageType;
    use tempfile::TempDir;

    fn meta(name: &str) -> IndexMeta {
        IndexMeta::new(name, StorageType::Disk, 2).unwrap()
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = FsMetadataStore::new(tmp.path().join("meta"));
        store.save(&meta("films")).unwrap();
        store.save(&meta("books")).unwrap();

        let loaded = store.load_all().unwrap();
        let names: Vec<_> = loaded.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["books", "films"]);
        assert_eq!(loaded[0].shard_count, 2);
    }

    #[test]
    fn test_duplicate_save_fails() {
        let tmp = TempDir::new().unwrap();
        let store = FsMetadataStore::new(tmp.path());
        store.save(&meta("books")).unwrap();
        assert!(matches!(
            store.save(&meta("books")),
            Err(HelixSearchError::IndexExists(name)) if name == "books"
        ));
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = FsMetadataStore::new(tmp.path());
        store.save(&meta("books")).unwrap();
        store.remove("books").unwrap();
        assert!(matches!(
            store.remove("books"),
            Err(HelixSearchError::IndexNotFound(_))
        ));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_load_skips_corrupt_and_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = FsMetadataStore::new(tmp.path());
        store.save(&meta("books")).unwrap();
        fs::write(tmp.path().join("broken.json"), b"{not json").unwrap();
        fs::write(tmp.path().join(".films.json.tmp"), b"{}").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"hello").unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "books");
    }

    #[test]
    fn test_missing_directory_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FsMetadataStore::new(tmp.path().join("never-created"));
        assert!(store.load_all().unwrap().is_empty());
    }
}
