use std::sync::Arc;

use helix_search::storage::MIN_WRITER_MEMORY_BYTES;
use helix_search::{
    HelixSearchError, Registry, SearchConfig, SearchCoordinator, StorageType, TargetSelector,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

fn open(dir: &TempDir) -> Registry {
    Registry::open_dir(dir.path(), MIN_WRITER_MEMORY_BYTES).unwrap()
}

#[tokio::test]
async fn test_disk_index_survives_restart() {
    let dir = TempDir::new().unwrap();
    let created_at = {
        let registry = open(&dir);
        let pending = registry.create("articles", StorageType::Disk, 2).unwrap();
        let index = registry.persist(pending).unwrap();
        index
            .put_document(Some("a".into()), json!({ "body": "tantivy shards on disk" }))
            .unwrap();
        index
            .put_document(Some("b".into()), json!({ "body": "nothing relevant here" }))
            .unwrap();
        let created_at = index.created_at();
        registry.close().unwrap();
        created_at
    };

    let registry = Arc::new(open(&dir));
    let index = registry.get("articles").unwrap();
    assert_eq!(index.storage_type(), StorageType::Disk);
    assert_eq!(index.shard_count(), 2);
    assert_eq!(index.created_at(), created_at);
    assert_eq!(index.doc_count().unwrap(), 2);

    let coordinator = SearchCoordinator::new(Arc::clone(&registry), SearchConfig::default());
    let response = coordinator
        .search(
            &TargetSelector::single("articles"),
            br#"{"query":{"match":{"body":"shards"}}}"#,
        )
        .await
        .unwrap();
    assert_eq!(response.ids(), vec!["a"]);
    registry.close().unwrap();
}

#[test]
fn test_memory_index_reloads_empty() {
    let dir = TempDir::new().unwrap();
    {
        let registry = open(&dir);
        let index = registry
            .persist(registry.create("scratch", StorageType::Memory, 1).unwrap())
            .unwrap();
        index.put_document(None, json!({ "note": "gone after restart" })).unwrap();
        assert_eq!(index.doc_count().unwrap(), 1);
        registry.close().unwrap();
    }

    let registry = open(&dir);
    assert_eq!(registry.list_all(), vec!["scratch".to_string()]);
    assert_eq!(registry.get("scratch").unwrap().doc_count().unwrap(), 0);
    registry.close().unwrap();
}

#[test]
fn test_deleted_index_stays_deleted() {
    let dir = TempDir::new().unwrap();
    {
        let registry = open(&dir);
        for name in ["keep", "drop"] {
            registry
                .persist(registry.create(name, StorageType::Disk, 1).unwrap())
                .unwrap();
        }
        registry.delete("drop").unwrap();
        registry.close().unwrap();
    }

    let registry = open(&dir);
    assert_eq!(registry.list_all(), vec!["keep".to_string()]);
    assert!(matches!(
        registry.get("drop"),
        Err(HelixSearchError::IndexNotFound(name)) if name == "drop"
    ));
    assert!(!dir.path().join("indices").join("drop").exists());
    registry.close().unwrap();
}

#[test]
fn test_create_racing_delete_gets_fresh_storage() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(open(&dir));
    let old = registry
        .persist(registry.create("events", StorageType::Disk, 2).unwrap())
        .unwrap();
    old.put_document(Some("old".into()), json!({ "v": 1 })).unwrap();
    drop(old);

    let deleter = {
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || registry.delete("events"))
    };
    let index = loop {
        match registry.create("events", StorageType::Disk, 2) {
            Ok(pending) => break registry.persist(pending).unwrap(),
            Err(HelixSearchError::IndexExists(_)) => std::thread::yield_now(),
            Err(err) => panic!("unexpected create error: {err}"),
        }
    };
    deleter.join().unwrap().unwrap();

    index.put_document(Some("new".into()), json!({ "v": 2 })).unwrap();
    assert_eq!(index.doc_count().unwrap(), 1);
    registry.close().unwrap();
    drop(index);
    drop(registry);

    let registry = open(&dir);
    assert_eq!(registry.get("events").unwrap().doc_count().unwrap(), 1);
    registry.close().unwrap();
}
